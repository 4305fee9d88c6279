#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
	pub red: f32,
	pub green: f32,
	pub blue: f32,
	pub alpha: f32,
}

impl Color {
	/// Creates an opaque color from 8-bit RGB components
	pub fn from_rgb8(rgb: [u8; 3]) -> Color {
		Color {
			red: (rgb[0] as f32) / 255.0,
			green: (rgb[1] as f32) / 255.0,
			blue: (rgb[2] as f32) / 255.0,
			alpha: 1.0,
		}
	}

	/// Returns the 8-bit RGB components, rounded to nearest. Alpha is ignored.
	pub fn to_rgb8(&self) -> [u8; 3] {
		[to_u8(self.red), to_u8(self.green), to_u8(self.blue)]
	}
}

fn to_u8(c: f32) -> u8 {
	(c * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

/// Paletted texture
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
	pub palette: Vec<Color>,
	pub indices: Vec<usize>,
	pub width: usize,
	pub height: usize,
}

impl Texture {
	pub fn new(width: usize, height: usize) -> Texture {
		Texture {
			palette: vec![],
			indices: vec![],
			width: width,
			height: height,
		}
	}

	/// Uses the palette and indices to build a pixel array
	pub fn pixels(&self) -> Vec<Color> {
		self.indices.iter().map(|i| self.palette[*i]).collect()
	}
}

/// Truecolor pixel buffer, stored row-major from the top row down
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
	pub pixels: Vec<Color>,
	pub width: usize,
	pub height: usize,
}

impl Image {
	/// Creates an opaque black image
	pub fn new(width: usize, height: usize) -> Image {
		Image {
			pixels: vec![Color::from_rgb8([0, 0, 0]); width * height],
			width: width,
			height: height,
		}
	}

	pub fn from_rgb8(width: usize, height: usize, rgb: &[[u8; 3]]) -> Image {
		Image {
			pixels: rgb.iter().map(|c| Color::from_rgb8(*c)).collect(),
			width: width,
			height: height,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rgb8() {
		let c = Color::from_rgb8([255, 128, 3]);
		assert_eq!(c.to_rgb8(), [255, 128, 3]);

		let over = Color { red: 1.5, green: -0.2, blue: 0.5, alpha: 1.0 };
		assert_eq!(over.to_rgb8(), [255, 0, 128]);
	}

	#[test]
	fn test_texture_pixels() {
		let mut tex = Texture::new(2, 1);
		tex.palette = vec![Color::from_rgb8([0, 0, 0]), Color::from_rgb8([255, 255, 255])];
		tex.indices = vec![1, 0];
		assert_eq!(tex.pixels(), vec![Color::from_rgb8([255, 255, 255]), Color::from_rgb8([0, 0, 0])]);
	}

	#[test]
	fn test_image() {
		let img = Image::from_rgb8(2, 2, &[[1, 1, 1], [2, 2, 2], [3, 3, 3], [4, 4, 4]]);
		assert_eq!(img.pixels[3].to_rgb8(), [4, 4, 4]);
		assert_eq!(Image::new(3, 2).pixels.len(), 6);
	}
}
