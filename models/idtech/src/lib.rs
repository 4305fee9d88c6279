pub mod anorms;
pub mod convert;
pub mod mdl;
pub mod palette;

#[cfg(feature = "script")]
pub mod script;

#[cfg(feature = "import")]
use std::io::{
	BufReader,
	Read
};

#[cfg(feature = "export")]
use std::io::{
	BufWriter,
	Write
};

#[cfg(any(feature = "import", feature = "export"))]
use std::{
	fs::File,
	path::Path
};

pub use mdl::QuakeModel;

#[cfg(feature = "import")]
pub use mdl::import::QuakeImportError;

#[cfg(feature = "export")]
pub use mdl::export::QuakeExportError;

/// Parses a model from a byte stream
#[cfg(feature = "import")]
pub fn decode<R>(mut buf: R) -> Result<QuakeModel, QuakeImportError>
where
	R: Read,
{
	QuakeModel::read(&mut buf)
}

#[cfg(feature = "import")]
pub fn read_file<P>(path: P) -> Result<QuakeModel, QuakeImportError>
where
	P: AsRef<Path>,
{
	let file = File::open(path)?;
	decode(BufReader::new(file))
}

/// Validates a model and serializes it
#[cfg(feature = "export")]
pub fn encode(model: &QuakeModel) -> Result<Vec<u8>, QuakeExportError> {
	let mut out = vec![];
	model.write(&mut out)?;
	Ok(out)
}

#[cfg(feature = "export")]
pub fn write_file<P>(model: &QuakeModel, path: P) -> Result<(), QuakeExportError>
where
	P: AsRef<Path>,
{
	// validate before touching the file system
	model.validate()?;

	let mut buf = BufWriter::new(File::create(path)?);
	model.write(&mut buf)?;
	buf.flush()?;
	Ok(())
}

#[cfg(all(test, feature = "import", feature = "export"))]
mod tests {
	use pretty_assertions::assert_eq;

	use crate::mdl::*;

	use super::*;

	fn triangle() -> QuakeModel {
		let mut header = Header::new(Profile::default());
		header.skin_width = 2;
		header.skin_height = 2;

		let mut model = QuakeModel::new(header);
		model.skins.push(Skin::Single(vec![1, 2, 3, 4]));
		model.st_verts = vec![StVert::new(0, 0), StVert::new(1, 0), StVert::new(1, 1)];
		model.tris.push(Triangle::Tri { orient: FaceOrient::Front, verts: [0, 1, 2] });

		let mut frame = SimpleFrame::new("stand1");
		frame.push_vertex(Vertex::new([0, 0, 0], 5));
		frame.push_vertex(Vertex::new([255, 0, 0], 5));
		frame.push_vertex(Vertex::new([0, 255, 0], 5));
		model.frames.push(Frame::Single(frame));

		model.sync_counts();
		model
	}

	#[test]
	fn test_encode_decode() {
		let model = triangle();
		let data = encode(&model).unwrap();
		assert_eq!(&data[..4], b"IDPO");
		assert_eq!(decode(data.as_slice()).unwrap(), model);
	}

	#[test]
	fn test_encode_invalid() {
		let mut model = triangle();
		model.header.num_tris = 2;
		assert!(matches!(encode(&model), Err(QuakeExportError::Count { section: "triangles", .. })));
	}

	#[test]
	fn test_decode_garbage() {
		assert!(matches!(decode(&b"IDP"[..]), Err(QuakeImportError::Truncated)));
		assert!(matches!(decode(&b"JUNKJUNK"[..]), Err(QuakeImportError::Magic(_))));
	}

	#[test]
	fn test_files() {
		let path = std::env::temp_dir().join(format!("rgk-idtech-{}.mdl", std::process::id()));
		let model = triangle();

		write_file(&model, &path).unwrap();
		let read = read_file(&path);
		std::fs::remove_file(&path).unwrap();
		assert_eq!(read.unwrap(), model);

		assert!(matches!(read_file(&path), Err(QuakeImportError::IO { .. })));
	}
}
