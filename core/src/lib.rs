#[cfg(feature = "io_ext")]
pub mod io_ext;

#[cfg(feature = "nom_ext")]
pub mod nom_ext;

pub mod scene;
pub mod texture;

/// Converts a 4-byte string into a 32-bit little endian integer.
/// Byte strings longer than 4 bytes are truncated.
#[macro_export]
macro_rules! rtag4 {
	($b4: literal) => {
		u32::from_le_bytes([$b4[0], $b4[1], $b4[2], $b4[3]])
	}
}

#[cfg(test)]
mod tests {
	#[test]
	fn test_tags() {
		assert_eq!(rtag4!(b"IDPO"), 0x4F504449);
		assert_eq!(rtag4!(b"MD16").to_le_bytes(), *b"MD16");
		assert_eq!(rtag4!(b"RAPO"), u32::from_be_bytes(*b"RAPO").swap_bytes());
	}
}
