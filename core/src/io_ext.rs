use std::io::{
	Error,
	ErrorKind,
	Read,
	Result,
	Write
};

use ultraviolet::vec::Vec3;

pub trait ReadBinExt: Read {
	/// Reads exactly `len` raw bytes.
	///
	/// The buffer grows with the data actually read, so a bogus length taken from a corrupt
	/// header fails with [`ErrorKind::UnexpectedEof`] instead of allocating up front.
	#[inline]
	fn read_block(&mut self, len: usize) -> Result<Vec<u8>>
	where
		Self: Sized,
	{
		let mut data = vec![];
		self.by_ref().take(len as u64).read_to_end(&mut data)?;

		if data.len() < len {
			return Err(Error::new(ErrorKind::UnexpectedEof,
				format!("expected {} bytes, got {}", len, data.len())));
		}

		Ok(data)
	}

	/// Reads a fixed-length string, keeping everything before the first null byte
	#[inline]
	fn read_fixed_str(&mut self, len: usize) -> Result<String>
	where
		Self: Sized,
	{
		let raw = self.read_block(len)?;
		let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());

		Ok(raw[..end].iter().map(|b| *b as char).collect())
	}

	/// Reads `count` little endian floats
	#[inline]
	fn read_f32_vec_le(&mut self, count: usize) -> Result<Vec<f32>> {
		let mut out: Vec<f32> = vec![];
		let mut f = [0; 4];

		for _ in 0..count {
			self.read_exact(&mut f)?;
			out.push(f32::from_le_bytes(f));
		}

		Ok(out)
	}

	/// Reads a little endian 3D vector
	#[inline]
	fn read_vec3_le(&mut self) -> Result<Vec3> {
		let mut x = [0; 4];
		let mut y = x;
		let mut z = y;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;
		self.read_exact(&mut z)?;

		Ok(Vec3::new(f32::from_le_bytes(x), f32::from_le_bytes(y), f32::from_le_bytes(z)))
	}
}

impl<R> ReadBinExt for R
where
	R: Read + ?Sized,
{
}

pub trait WriteBinExt: Write {
	/// Writes a string into a fixed-length field, zero-padded or truncated to `len` bytes.
	/// Characters outside of Latin-1 are replaced with `?`.
	#[inline]
	fn write_fixed_str(&mut self, s: &str, len: usize) -> Result<()> {
		let mut raw: Vec<u8> = s.chars()
			.map(|c| u8::try_from(c).unwrap_or(b'?'))
			.take(len)
			.collect();
		raw.resize(len, 0);

		self.write_all(&raw)
	}

	/// Writes a slice of little endian floats
	#[inline]
	fn write_f32_slice_le(&mut self, data: &[f32]) -> Result<()> {
		for f in data.iter() {
			self.write_all(&f.to_le_bytes())?;
		}

		Ok(())
	}

	/// Writes a little endian 3D vector
	#[inline]
	fn write_vec3_le(&mut self, v: Vec3) -> Result<()> {
		self.write_all(&v.x.to_le_bytes())?;
		self.write_all(&v.y.to_le_bytes())?;
		self.write_all(&v.z.to_le_bytes())
	}
}

impl<W> WriteBinExt for W
where
	W: Write + ?Sized,
{
}

#[cfg(test)]
mod tests {
	use std::io::ErrorKind;

	use ultraviolet::vec::Vec3;

	use super::*;

	#[test]
	fn test_read_fixed_str() {
		let mut data = &b"frame1\x00\x00junk\x00\x00\x00\x00rest"[..];
		assert_eq!("frame1".to_string(), data.read_fixed_str(16).unwrap());
		assert_eq!(b"rest", data);
	}

	#[test]
	fn test_read_fixed_str_unterminated() {
		let mut data = &b"abcdefgh"[..];
		assert_eq!("abcd".to_string(), data.read_fixed_str(4).unwrap());
	}

	#[test]
	fn test_read_block_truncated() {
		let mut data = &b"\x01\x02\x03"[..];
		let err = data.read_block(4).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
	}

	#[test]
	fn test_read_vec3() {
		let mut vec3: &[u8] = &[0x5c, 0x1f, 0x7f, 0x3c, 0xa4, 0xfb, 0xf0, 0x3d, 0xd4, 0xf1, 0xb6, 0x3d][..];
		assert_eq!(Vec3::new(0.0155714415, 0.117667466, 0.089328438), vec3.read_vec3_le().unwrap());

		let mut short: &[u8] = &[0x5c, 0x1f, 0x7f, 0x3c][..];
		assert_eq!(short.read_vec3_le().unwrap_err().kind(), ErrorKind::UnexpectedEof);
	}

	#[test]
	fn test_read_f32_vec() {
		let mut data: &[u8] = &[0, 0, 0, 0, 0xcd, 0xcc, 0xcc, 0x3d][..];
		assert_eq!(vec![0.0, 0.1], data.read_f32_vec_le(2).unwrap());
	}

	#[test]
	fn test_write_fixed_str() {
		let mut out: Vec<u8> = vec![];
		out.write_fixed_str("run", 6).unwrap();
		out.write_fixed_str("a_very_long_frame_name", 4).unwrap();
		assert_eq!(b"run\x00\x00\x00a_ve", out.as_slice());
	}

	#[test]
	fn test_write_vecs() {
		let mut out: Vec<u8> = vec![];
		out.write_vec3_le(Vec3::new(0.0155714415, 0.117667466, 0.089328438)).unwrap();
		out.write_f32_slice_le(&[0.1]).unwrap();
		assert_eq!(out, vec![0x5c, 0x1f, 0x7f, 0x3c, 0xa4, 0xfb, 0xf0, 0x3d, 0xd4, 0xf1, 0xb6, 0x3d,
			0xcd, 0xcc, 0xcc, 0x3d]);
	}
}
