use nom::{
	bytes::complete::{
		tag,
		take_until
	},
	character::complete::not_line_ending,
	combinator::value,
	error::ParseError,
	IResult,
	sequence::{
		pair,
		tuple
	}
};

/// Parses a C-style line comment
pub fn c_comment<'a, E>(input: &'a str) -> IResult<&'a str, (), E>
where
	E: ParseError<&'a str>
{
	value((), pair(tag("//"), not_line_ending))(input)
}

/// Parses a C-style block comment; block comments do not nest
pub fn block_comment<'a, E>(input: &'a str) -> IResult<&'a str, (), E>
where
	E: ParseError<&'a str>
{
	value((), tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

#[cfg(test)]
mod tests {
	use nom::error::Error;

	#[test]
	fn test_c_comment() {
		assert_eq!(super::c_comment::<'_, Error<&str>>("// frames\nnext"), Ok(("\nnext", ())));
		assert!(super::c_comment::<'_, Error<&str>>("/ frames").is_err());
	}

	#[test]
	fn test_block_comment() {
		assert_eq!(super::block_comment::<'_, Error<&str>>("/* a\n/* b */ c"), Ok((" c", ())));
		assert!(super::block_comment::<'_, Error<&str>>("/* open").is_err());
	}
}
