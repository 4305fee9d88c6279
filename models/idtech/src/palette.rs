use std::collections::HashMap;
use thiserror::Error;

use rgk_core::texture::Color;

pub const PALETTE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum PaletteError {
	#[error("Palette data must be 768 bytes, got {0}")]
	Size(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaletteId {
	Quake,
	HexenII,
}

/// Fixed 256-entry RGB color table
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
	colors: [[u8; 3]; PALETTE_SIZE],
}

impl Palette {
	/// Returns a palette bundled with the crate.
	/// Only the Quake table ships; load others with [`Palette::from_rgb_bytes`].
	pub fn builtin(id: PaletteId) -> Option<Palette> {
		match id {
			PaletteId::Quake => Some(Palette::quake()),
			PaletteId::HexenII => None,
		}
	}

	pub fn quake() -> Palette {
		Palette {
			colors: QUAKE,
		}
	}

	/// Creates a palette from 768 bytes of packed RGB triples, as found in `palette.lmp`
	pub fn from_rgb_bytes(data: &[u8]) -> Result<Palette, PaletteError> {
		if data.len() != PALETTE_SIZE * 3 {
			return Err(PaletteError::Size(data.len()));
		}

		let mut colors = [[0; 3]; PALETTE_SIZE];
		for (c, rgb) in colors.iter_mut().zip(data.chunks_exact(3)) {
			c.copy_from_slice(rgb);
		}

		Ok(Palette {
			colors: colors,
		})
	}

	pub fn colors(&self) -> &[[u8; 3]; PALETTE_SIZE] {
		&self.colors
	}

	pub fn get(&self, index: u8) -> [u8; 3] {
		self.colors[index as usize]
	}

	pub fn to_colors(&self) -> Vec<Color> {
		self.colors.iter().map(|c| Color::from_rgb8(*c)).collect()
	}

	/// Returns the index of the color closest to `rgb` by squared distance.
	/// Ties go to the lowest index.
	pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
		let mut best = (u32::MAX, 0);

		for (i, c) in self.colors.iter().enumerate() {
			let dist: u32 = rgb.iter().zip(c.iter())
				.map(|(a, b)| {
					let d = (*a as i32) - (*b as i32);
					(d * d) as u32
				})
				.sum();

			if dist < best.0 {
				best = (dist, i);
			}
		}

		best.1 as u8
	}

	/// Creates a caching quantizer for converting a batch of images
	pub fn quantizer(&self) -> Quantizer<'_> {
		Quantizer {
			palette: self,
			cache: HashMap::new(),
		}
	}
}

impl Default for Palette {
	fn default() -> Self {
		Palette::quake()
	}
}

/// Nearest-color lookup with a cache keyed by exact input color
pub struct Quantizer<'a> {
	palette: &'a Palette,
	cache: HashMap<[u8; 3], u8>,
}

impl<'a> Quantizer<'a> {
	pub fn index(&mut self, rgb: [u8; 3]) -> u8 {
		let palette = self.palette;
		*self.cache.entry(rgb).or_insert_with(|| palette.nearest(rgb))
	}

	/// Quantizes every pixel, preserving order
	pub fn quantize(&mut self, pixels: &[Color]) -> Vec<u8> {
		pixels.iter().map(|c| self.index(c.to_rgb8())).collect()
	}

	pub fn cached(&self) -> usize {
		self.cache.len()
	}
}

#[rustfmt::skip]
const QUAKE: [[u8; 3]; PALETTE_SIZE] = [
	[0, 0, 0], [15, 15, 15], [31, 31, 31], [47, 47, 47], [63, 63, 63], [75, 75, 75], [91, 91, 91], [107, 107, 107],
	[123, 123, 123], [139, 139, 139], [155, 155, 155], [171, 171, 171], [187, 187, 187], [203, 203, 203], [219, 219, 219], [235, 235, 235],
	[15, 11, 7], [23, 15, 11], [31, 23, 11], [39, 27, 15], [47, 35, 19], [55, 43, 23], [63, 47, 23], [75, 55, 27],
	[83, 59, 27], [91, 67, 31], [99, 75, 31], [107, 83, 31], [115, 87, 31], [123, 95, 35], [131, 103, 35], [143, 111, 35],
	[11, 11, 15], [19, 19, 27], [27, 27, 39], [39, 39, 51], [47, 47, 63], [55, 55, 75], [63, 63, 87], [71, 71, 103],
	[79, 79, 115], [91, 91, 127], [99, 99, 139], [107, 107, 151], [115, 115, 163], [123, 123, 175], [131, 131, 187], [139, 139, 203],
	[0, 0, 0], [7, 7, 0], [11, 11, 0], [19, 19, 0], [27, 27, 0], [35, 35, 0], [43, 43, 7], [47, 47, 7],
	[55, 55, 7], [63, 63, 7], [71, 71, 7], [75, 75, 11], [83, 83, 11], [91, 91, 11], [99, 99, 11], [107, 107, 15],
	[7, 0, 0], [15, 0, 0], [23, 0, 0], [31, 0, 0], [39, 0, 0], [47, 0, 0], [55, 0, 0], [63, 0, 0],
	[71, 0, 0], [79, 0, 0], [87, 0, 0], [95, 0, 0], [103, 0, 0], [111, 0, 0], [119, 0, 0], [127, 0, 0],
	[19, 19, 0], [27, 27, 0], [35, 35, 0], [47, 43, 0], [55, 47, 0], [67, 55, 0], [75, 59, 7], [87, 67, 7],
	[95, 71, 7], [107, 75, 11], [119, 83, 15], [131, 87, 19], [139, 91, 19], [151, 95, 27], [163, 99, 31], [175, 103, 35],
	[35, 19, 7], [47, 23, 11], [59, 31, 15], [75, 35, 19], [87, 43, 23], [99, 47, 31], [115, 55, 35], [127, 59, 43],
	[143, 67, 51], [159, 79, 51], [175, 99, 47], [191, 119, 47], [207, 143, 43], [223, 171, 39], [239, 203, 31], [255, 243, 27],
	[11, 7, 0], [27, 19, 0], [43, 35, 15], [55, 43, 19], [71, 51, 27], [83, 55, 35], [99, 63, 43], [111, 71, 51],
	[127, 83, 63], [139, 95, 71], [155, 107, 83], [167, 123, 95], [183, 135, 107], [195, 147, 123], [211, 163, 139], [227, 179, 151],
	[171, 139, 163], [159, 127, 151], [147, 115, 135], [139, 103, 123], [127, 91, 111], [119, 83, 99], [107, 75, 87], [95, 63, 75],
	[87, 55, 67], [75, 47, 55], [67, 39, 47], [55, 31, 35], [43, 23, 27], [35, 19, 19], [23, 11, 11], [15, 7, 7],
	[187, 115, 159], [175, 107, 143], [163, 95, 131], [151, 87, 119], [139, 79, 107], [127, 75, 95], [115, 67, 83], [107, 59, 75],
	[95, 51, 63], [83, 43, 55], [71, 35, 43], [59, 31, 35], [47, 23, 27], [35, 19, 19], [23, 11, 11], [15, 7, 7],
	[219, 195, 187], [203, 179, 167], [191, 163, 155], [175, 151, 139], [163, 135, 123], [151, 123, 111], [135, 111, 95], [123, 99, 83],
	[107, 87, 71], [95, 75, 59], [83, 63, 51], [67, 51, 39], [55, 43, 31], [39, 31, 23], [27, 19, 15], [15, 11, 7],
	[111, 131, 123], [103, 123, 111], [95, 115, 103], [87, 107, 95], [79, 99, 87], [71, 91, 79], [63, 83, 71], [55, 75, 63],
	[47, 67, 55], [43, 59, 47], [35, 51, 39], [31, 43, 31], [23, 35, 23], [15, 27, 19], [11, 19, 11], [7, 11, 7],
	[255, 243, 27], [239, 223, 23], [219, 203, 19], [203, 183, 15], [187, 167, 15], [171, 151, 11], [155, 131, 7], [139, 115, 7],
	[123, 99, 7], [107, 83, 0], [91, 71, 0], [75, 55, 0], [59, 43, 0], [43, 31, 0], [27, 15, 0], [11, 7, 0],
	[0, 0, 255], [11, 11, 239], [19, 19, 223], [27, 27, 207], [35, 35, 191], [43, 43, 175], [47, 47, 159], [47, 47, 143],
	[47, 47, 127], [47, 47, 111], [47, 47, 95], [43, 43, 79], [35, 35, 63], [27, 27, 47], [19, 19, 31], [11, 11, 15],
	[43, 0, 0], [59, 0, 0], [75, 7, 0], [95, 7, 0], [111, 15, 0], [127, 23, 7], [147, 31, 7], [163, 39, 11],
	[183, 51, 15], [195, 75, 27], [207, 99, 43], [219, 127, 59], [227, 151, 79], [231, 171, 95], [239, 191, 119], [247, 211, 139],
	[167, 123, 59], [183, 155, 55], [199, 195, 55], [231, 227, 87], [127, 191, 255], [171, 231, 255], [215, 255, 255], [103, 0, 0],
	[139, 0, 0], [179, 0, 0], [215, 0, 0], [255, 0, 0], [255, 243, 147], [255, 247, 199], [255, 255, 255], [159, 91, 83],
];

#[cfg(test)]
mod tests {
	use rgk_core::texture::Color;

	use super::*;

	fn red_blue() -> Palette {
		let mut data = vec![0; 768];
		data[15..18].copy_from_slice(&[255, 0, 0]);
		data[27..30].copy_from_slice(&[0, 0, 255]);
		Palette::from_rgb_bytes(&data).unwrap()
	}

	#[test]
	fn test_nearest() {
		let pal = red_blue();
		assert_eq!(pal.nearest([250, 5, 5]), 5);
		assert_eq!(pal.nearest([10, 0, 200]), 9);
		// every other entry is black, the first one wins
		assert_eq!(pal.nearest([1, 1, 1]), 0);
	}

	#[test]
	fn test_quake() {
		let pal = Palette::builtin(PaletteId::Quake).unwrap();
		assert_eq!(pal.get(0), [0, 0, 0]);
		assert_eq!(pal.get(255), [159, 91, 83]);
		assert_eq!(pal.nearest([255, 0, 0]), 251);
		assert_eq!(pal.nearest([0, 0, 0]), 0);
		assert_eq!(pal.to_colors().len(), PALETTE_SIZE);
		assert_eq!(Palette::builtin(PaletteId::HexenII), None);
	}

	#[test]
	fn test_from_rgb_bytes() {
		assert!(matches!(Palette::from_rgb_bytes(&[0; 767]), Err(PaletteError::Size(767))));

		let data: Vec<u8> = (0..768).map(|i| (i / 3) as u8).collect();
		let pal = Palette::from_rgb_bytes(&data).unwrap();
		assert_eq!(pal.get(200), [200, 200, 200]);
	}

	#[test]
	fn test_quantizer_cache() {
		let pal = red_blue();
		let mut q = pal.quantizer();
		let pixels = vec![
			Color::from_rgb8([250, 5, 5]),
			Color::from_rgb8([250, 5, 5]),
			Color::from_rgb8([0, 0, 250]),
			Color::from_rgb8([250, 5, 5]),
		];

		assert_eq!(q.quantize(&pixels), vec![5, 5, 9, 5]);
		assert_eq!(q.cached(), 2);
	}
}
