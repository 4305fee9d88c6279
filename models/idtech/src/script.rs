//! Property list scripts describing how mesh frames and images are grouped into MDL frames and
//! skins.
//!
//! A script is a top-level dictionary with optional `frames` and `skins` arrays:
//!
//! ```text
//! {
//! 	frames = (
//! 		{ frameno = 0; name = stand1; },
//! 		{ intervals = ( 0.1, 0.2 ); name = run; frames = ( { }, { } ); }
//! 	);
//! 	skins = ( { name = skin0; } );
//! }
//! ```
//!
//! Frame entries take a `name`, a `frameno` selecting a mesh frame, and for groups a `frames`
//! array of sub-entries with optional `intervals`. A group without `intervals` is written as
//! single frames. Missing times are generated in 0.1 second steps and excess times are ignored.
//! Skin entries name an image, or hold a `skins` array of sub-entries and optional `intervals`.

use std::{
	collections::HashMap,
	fmt,
	str::FromStr
};

use nom::{
	branch::alt,
	bytes::complete::{
		is_not,
		take_while1
	},
	character::complete::{
		char,
		hex_digit0,
		multispace1
	},
	combinator::{
		cut,
		map,
		opt,
		value,
		verify
	},
	error::ParseError,
	IResult,
	multi::{
		fold_many0,
		many0,
		separated_list0
	},
	Parser,
	sequence::{
		pair,
		preceded,
		separated_pair,
		terminated
	}
};

use thiserror::Error;

use rgk_core::{
	nom_ext::{
		block_comment,
		c_comment
	},
	scene::{
		MeshFrame,
		Pose
	},
	texture::Image
};

use crate::convert::{
	ImportedGroup,
	ImportedMesh,
	SkinSource
};

/// Characters allowed in unquoted strings
const QUOTABLE: &str = "!#$%&*+-./:?@|~_^";

/// Spacing of generated group times, in seconds
pub const DEFAULT_INTERVAL: f32 = 0.1;

#[derive(Error, Debug, PartialEq)]
pub enum ScriptError {
	#[error("Malformed property list at line {0}")]
	Syntax(usize),
	#[error("Expected {expected} for \"{key}\"")]
	Type {
		key: &'static str,
		expected: &'static str,
	},
	#[error("Not a number: {0}")]
	Number(String),
	#[error("Nested {0} group")]
	NestedGroup(&'static str),
	#[error("No mesh frame {0}")]
	FrameIndex(f32),
	#[error("Skin entry without a name")]
	MissingName,
	#[error("Unknown skin image {0}")]
	UnknownImage(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlItem {
	String(String),
	Array(Vec<PlItem>),
	/// Entries in document order
	Dict(Vec<(String, PlItem)>),
	Data(Vec<u8>),
}

impl PlItem {
	/// Looks up a dictionary entry; the last of duplicate keys wins
	pub fn get(&self, key: &str) -> Option<&PlItem> {
		match self {
			PlItem::Dict(entries) => entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
			_ => None,
		}
	}

	fn write(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
		match self {
			PlItem::String(s) => write_string(f, s),
			PlItem::Data(data) => {
				write!(f, "<")?;
				for b in data.iter() {
					write!(f, "{:02x}", b)?;
				}
				write!(f, ">")
			},
			PlItem::Array(items) if items.is_empty() => write!(f, "( )"),
			PlItem::Array(items) => {
				writeln!(f, "(")?;
				for (i, item) in items.iter().enumerate() {
					write!(f, "{}", "\t".repeat(level + 1))?;
					item.write(f, level + 1)?;
					if i + 1 < items.len() {
						writeln!(f, ",")?;
					}
				}
				write!(f, "\n{})", "\t".repeat(level))
			},
			PlItem::Dict(entries) if entries.is_empty() => write!(f, "{{ }}"),
			PlItem::Dict(entries) => {
				writeln!(f, "{{")?;
				for (key, item) in entries.iter() {
					write!(f, "{}", "\t".repeat(level + 1))?;
					write_string(f, key)?;
					write!(f, " = ")?;
					item.write(f, level + 1)?;
					writeln!(f, ";")?;
				}
				write!(f, "{}}}", "\t".repeat(level))
			},
		}
	}
}

impl fmt::Display for PlItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.write(f, 0)
	}
}

impl FromStr for PlItem {
	type Err = ScriptError;

	fn from_str(src: &str) -> Result<Self, Self::Err> {
		let line = |rest: &str| src[..src.len() - rest.len()].matches('\n').count() + 1;

		match terminated(item::<nom::error::Error<&str>>, ignored)(src) {
			Ok(("", item)) => Ok(item),
			Ok((rest, _)) => Err(ScriptError::Syntax(line(rest))),
			Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ScriptError::Syntax(line(e.input))),
			Err(nom::Err::Incomplete(_)) => Err(ScriptError::Syntax(line(""))),
		}
	}
}

pub fn is_quotable(c: char) -> bool {
	c.is_ascii_alphanumeric() || QUOTABLE.contains(c)
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
	if !s.is_empty() && s.chars().all(is_quotable) {
		return write!(f, "{}", s);
	}

	write!(f, "\"")?;
	for c in s.chars() {
		match c {
			'"' => write!(f, "\\\"")?,
			'\\' => write!(f, "\\\\")?,
			'\n' => write!(f, "\\n")?,
			'\t' => write!(f, "\\t")?,
			c => write!(f, "{}", c)?,
		}
	}
	write!(f, "\"")
}

/// Whitespace and comments
fn ignored<'a, E>(input: &'a str) -> IResult<&'a str, (), E>
where
	E: ParseError<&'a str>
{
	value((), many0(alt((
		value((), multispace1),
		c_comment,
		block_comment
	))))(input)
}

fn skip<'a, F, O, E>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
	E: ParseError<&'a str>,
	F: Parser<&'a str, O, E>,
{
	preceded(ignored, inner)
}

fn quoted<'a, E>(input: &'a str) -> IResult<&'a str, String, E>
where
	E: ParseError<&'a str>
{
	let escape = preceded(char('\\'), alt((
		value('\n', char('n')),
		value('\t', char('t')),
		value('\'', char('\'')),
		value('"', char('"')),
		value('\\', char('\\')),
	)));

	preceded(
		char('"'),
		cut(terminated(
			fold_many0(
				alt((
					map(is_not("\"\\"), String::from),
					map(escape, String::from),
				)),
				String::new,
				|mut s, part| {
					s.push_str(&part);
					s
				}
			),
			char('"')
		))
	)(input)
}

fn string<'a, E>(input: &'a str) -> IResult<&'a str, String, E>
where
	E: ParseError<&'a str>
{
	alt((
		quoted,
		map(take_while1(is_quotable), String::from)
	))(input)
}

fn nibble(c: u8) -> u8 {
	(c as char).to_digit(16).unwrap_or(0) as u8
}

fn data<'a, E>(input: &'a str) -> IResult<&'a str, Vec<u8>, E>
where
	E: ParseError<&'a str>
{
	map(
		preceded(char('<'), cut(terminated(verify(hex_digit0, |s: &str| s.len() % 2 == 0), char('>')))),
		|s: &str| s.as_bytes().chunks(2).map(|p| nibble(p[0]) << 4 | nibble(p[1])).collect()
	)(input)
}

fn entry<'a, E>(input: &'a str) -> IResult<&'a str, (String, PlItem), E>
where
	E: ParseError<&'a str>
{
	separated_pair(skip(string), skip(char('=')), item)(input)
}

fn dict<'a, E>(input: &'a str) -> IResult<&'a str, Vec<(String, PlItem)>, E>
where
	E: ParseError<&'a str>
{
	preceded(
		char('{'),
		cut(terminated(
			separated_list0(skip(char(';')), entry),
			pair(opt(skip(char(';'))), skip(char('}')))
		))
	)(input)
}

fn array<'a, E>(input: &'a str) -> IResult<&'a str, Vec<PlItem>, E>
where
	E: ParseError<&'a str>
{
	preceded(
		char('('),
		cut(terminated(
			separated_list0(skip(char(',')), item),
			pair(opt(skip(char(','))), skip(char(')')))
		))
	)(input)
}

fn item<'a, E>(input: &'a str) -> IResult<&'a str, PlItem, E>
where
	E: ParseError<&'a str>
{
	skip(alt((
		map(dict, PlItem::Dict),
		map(array, PlItem::Array),
		map(data, PlItem::Data),
		map(string, PlItem::String),
	)))(input)
}

fn text<'i>(item: &'i PlItem, key: &'static str) -> Result<&'i str, ScriptError> {
	match item {
		PlItem::String(s) => Ok(s),
		_ => Err(ScriptError::Type { key: key, expected: "a string" }),
	}
}

fn list<'i>(item: &'i PlItem, key: &'static str) -> Result<&'i [PlItem], ScriptError> {
	match item {
		PlItem::Array(items) => Ok(items),
		_ => Err(ScriptError::Type { key: key, expected: "an array" }),
	}
}

fn number(item: &PlItem, key: &'static str) -> Result<f32, ScriptError> {
	let s = text(item, key)?;
	s.trim().parse().map_err(|_| ScriptError::Number(s.to_string()))
}

fn numbers(item: &PlItem, key: &'static str) -> Result<Vec<f32>, ScriptError> {
	list(item, key)?.iter().map(|i| number(i, key)).collect()
}

fn check_dict(item: &PlItem, key: &'static str) -> Result<(), ScriptError> {
	match item {
		PlItem::Dict(_) => Ok(()),
		_ => Err(ScriptError::Type { key: key, expected: "a dictionary" }),
	}
}

fn times_item(times: &[f32]) -> PlItem {
	PlItem::Array(times.iter().map(|t| PlItem::String(t.to_string())).collect())
}

/// Takes group times from `intervals`, dropping excess ones and generating missing ones
pub fn pad_times(intervals: &[f32], count: usize) -> Vec<f32> {
	let mut times: Vec<f32> = intervals.iter().copied().take(count).collect();
	while times.len() < count {
		times.push(times.last().copied().unwrap_or(0.0) + DEFAULT_INTERVAL);
	}
	times
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameEntry {
	pub name: Option<String>,
	/// Mesh frame to capture; fractions are truncated
	pub frameno: Option<f32>,
	/// Present for frame groups
	pub frames: Option<Vec<FrameEntry>>,
	pub intervals: Option<Vec<f32>>,
}

impl FrameEntry {
	pub fn single(name: &str, frameno: usize) -> FrameEntry {
		FrameEntry {
			name: Some(name.to_string()),
			frameno: Some(frameno as f32),
			..FrameEntry::default()
		}
	}

	fn from_item(item: &PlItem) -> Result<FrameEntry, ScriptError> {
		check_dict(item, "frames")?;

		let mut entry = FrameEntry::default();
		if let Some(name) = item.get("name") {
			entry.name = Some(text(name, "name")?.to_string());
		}
		if let Some(frameno) = item.get("frameno") {
			entry.frameno = Some(number(frameno, "frameno")?);
		}
		if let Some(frames) = item.get("frames") {
			let members: Result<Vec<_>, _> = list(frames, "frames")?.iter().map(FrameEntry::from_item).collect();
			entry.frames = Some(members?);
		}
		if let Some(intervals) = item.get("intervals") {
			entry.intervals = Some(numbers(intervals, "intervals")?);
		}

		Ok(entry)
	}

	fn to_item(&self) -> PlItem {
		let mut entries = vec![];
		if let Some(intervals) = &self.intervals {
			entries.push(("intervals".to_string(), times_item(intervals)));
		}
		if let Some(frames) = &self.frames {
			entries.push(("frames".to_string(), PlItem::Array(frames.iter().map(|f| f.to_item()).collect())));
		}
		if let Some(frameno) = self.frameno {
			entries.push(("frameno".to_string(), PlItem::String(frameno.to_string())));
		}
		if let Some(name) = &self.name {
			entries.push(("name".to_string(), PlItem::String(name.clone())));
		}
		PlItem::Dict(entries)
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinEntry {
	/// Image name; ignored for groups
	pub name: Option<String>,
	/// Present for skin groups
	pub skins: Option<Vec<SkinEntry>>,
	pub intervals: Option<Vec<f32>>,
}

impl SkinEntry {
	pub fn single(name: &str) -> SkinEntry {
		SkinEntry {
			name: Some(name.to_string()),
			..SkinEntry::default()
		}
	}

	fn from_item(item: &PlItem) -> Result<SkinEntry, ScriptError> {
		check_dict(item, "skins")?;

		let mut entry = SkinEntry::default();
		if let Some(name) = item.get("name") {
			entry.name = Some(text(name, "name")?.to_string());
		}
		if let Some(skins) = item.get("skins") {
			let members: Result<Vec<_>, _> = list(skins, "skins")?.iter().map(SkinEntry::from_item).collect();
			entry.skins = Some(members?);
		}
		if let Some(intervals) = item.get("intervals") {
			entry.intervals = Some(numbers(intervals, "intervals")?);
		}

		Ok(entry)
	}

	fn to_item(&self) -> PlItem {
		let mut entries = vec![];
		if let Some(intervals) = &self.intervals {
			entries.push(("intervals".to_string(), times_item(intervals)));
		}
		if let Some(skins) = &self.skins {
			entries.push(("skins".to_string(), PlItem::Array(skins.iter().map(|s| s.to_item()).collect())));
		}
		if let Some(name) = &self.name {
			entries.push(("name".to_string(), PlItem::String(name.clone())));
		}
		PlItem::Dict(entries)
	}

	fn image(&self, images: &HashMap<String, Image>) -> Result<Image, ScriptError> {
		let name = self.name.as_ref().ok_or(ScriptError::MissingName)?;
		images.get(name).cloned().ok_or_else(|| ScriptError::UnknownImage(name.clone()))
	}
}

/// Frame and skin layout of a model. A missing list means the script leaves that part alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelScript {
	pub frames: Option<Vec<FrameEntry>>,
	pub skins: Option<Vec<SkinEntry>>,
}

impl ModelScript {
	/// Describes an imported mesh; skin images are named `skin{index}` after their flattened
	/// position in [`ImportedMesh::skins`]
	pub fn from_mesh(mesh: &ImportedMesh) -> ModelScript {
		let mut frames = vec![];
		let mut i = 0;
		while i < mesh.frames.len() {
			match mesh.frames[i].group.and_then(|g| mesh.groups.get(g)) {
				Some(group) => {
					frames.push(FrameEntry {
						name: group.name.clone(),
						frameno: None,
						frames: Some(group.members.clone().map(|j| FrameEntry::single(&mesh.frames[j].name, j)).collect()),
						intervals: group.times.clone(),
					});
					i = group.members.end.max(i + 1);
				},
				None => {
					frames.push(FrameEntry::single(&mesh.frames[i].name, i));
					i += 1;
				},
			}
		}

		let skin_name = |k: usize| format!("skin{}", k);
		let mut skins = vec![];
		let mut k = 0;
		while k < mesh.skins.len() {
			match mesh.skin_groups.iter().find(|g: &&ImportedGroup| g.members.contains(&k)) {
				Some(group) => {
					skins.push(SkinEntry {
						name: None,
						skins: Some(group.members.clone().map(|j| SkinEntry::single(&skin_name(j))).collect()),
						intervals: group.times.clone(),
					});
					k = group.members.end.max(k + 1);
				},
				None => {
					skins.push(SkinEntry::single(&skin_name(k)));
					k += 1;
				},
			}
		}

		ModelScript {
			frames: Some(frames),
			skins: Some(skins),
		}
	}

	/// Picks and groups mesh frames. Without a frame list every mesh frame becomes a single pose.
	pub fn build_poses(&self, frames: &[MeshFrame]) -> Result<Vec<Pose>, ScriptError> {
		let entries = match &self.frames {
			Some(entries) => entries,
			None => return Ok(frames.iter().cloned().map(Pose::Single).collect()),
		};

		let pick = |frameno: f32, name: String| -> Result<MeshFrame, ScriptError> {
			let index = frameno.trunc();
			if !(index >= 0.0) || index as usize >= frames.len() {
				return Err(ScriptError::FrameIndex(frameno));
			}

			let mut frame = frames[index as usize].clone();
			frame.name = Some(name);
			Ok(frame)
		};

		let mut poses = vec![];
		let mut next = 0.0;
		for entry in entries.iter() {
			let base = entry.frameno.unwrap_or(next);
			let name = entry.name.clone().unwrap_or_else(|| "frame".to_string());

			let subs = match &entry.frames {
				Some(subs) => subs,
				None => {
					poses.push(Pose::Single(pick(base, name)?));
					next = base + 1.0;
					continue;
				},
			};

			let mut members = vec![];
			for (i, sub) in subs.iter().enumerate() {
				if sub.frames.is_some() {
					return Err(ScriptError::NestedGroup("frame"));
				}

				let frameno = sub.frameno.unwrap_or(base + i as f32);
				let sub_name = sub.name.clone().unwrap_or_else(|| format!("{}{}", name, i + 1));
				members.push(pick(frameno, sub_name)?);
				next = frameno + 1.0;
			}

			match &entry.intervals {
				Some(intervals) => poses.push(Pose::Group {
					times: pad_times(intervals, members.len()),
					frames: members,
				}),
				None => poses.extend(members.into_iter().map(Pose::Single)),
			}
		}

		Ok(poses)
	}

	/// Looks up skin images by name. Without a skin list nothing is returned.
	pub fn build_skins(&self, images: &HashMap<String, Image>) -> Result<Vec<SkinSource>, ScriptError> {
		let entries = match &self.skins {
			Some(entries) => entries,
			None => return Ok(vec![]),
		};

		let mut sources = vec![];
		for entry in entries.iter() {
			let subs = match &entry.skins {
				Some(subs) => subs,
				None => {
					sources.push(SkinSource::Single(entry.image(images)?));
					continue;
				},
			};

			let mut members = vec![];
			for sub in subs.iter() {
				if sub.skins.is_some() {
					return Err(ScriptError::NestedGroup("skin"));
				}
				members.push(sub.image(images)?);
			}

			sources.push(SkinSource::Group {
				times: pad_times(entry.intervals.as_deref().unwrap_or(&[]), members.len()),
				images: members,
			});
		}

		Ok(sources)
	}

	fn to_item(&self) -> PlItem {
		let mut entries = vec![];
		if let Some(frames) = &self.frames {
			entries.push(("frames".to_string(), PlItem::Array(frames.iter().map(|f| f.to_item()).collect())));
		}
		if let Some(skins) = &self.skins {
			entries.push(("skins".to_string(), PlItem::Array(skins.iter().map(|s| s.to_item()).collect())));
		}
		PlItem::Dict(entries)
	}
}

impl FromStr for ModelScript {
	type Err = ScriptError;

	fn from_str(src: &str) -> Result<Self, Self::Err> {
		let root: PlItem = src.parse()?;
		check_dict(&root, "script")?;

		let mut script = ModelScript::default();
		if let Some(frames) = root.get("frames") {
			let entries: Result<Vec<_>, _> = list(frames, "frames")?.iter().map(FrameEntry::from_item).collect();
			script.frames = Some(entries?);
		}
		if let Some(skins) = root.get("skins") {
			let entries: Result<Vec<_>, _> = list(skins, "skins")?.iter().map(SkinEntry::from_item).collect();
			script.skins = Some(entries?);
		}

		Ok(script)
	}
}

impl fmt::Display for ModelScript {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_item())
	}
}
