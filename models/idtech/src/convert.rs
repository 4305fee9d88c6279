//! Conversion between MDL models and the kit's intermediate mesh representation

use bitflags::bitflags;
use std::ops::Range;

#[cfg(feature = "import")]
use log::warn;

use ultraviolet::{
	mat::Mat4,
	vec::{
		Vec2,
		Vec3,
		Vec4
	}
};

use rgk_core::{
	scene::Face,
	texture::Texture
};

use crate::{
	mdl::*,
	palette::Palette
};

#[cfg(feature = "import")]
use crate::mdl::import::QuakeImportError;

#[cfg(feature = "export")]
pub use export::*;

bitflags! {
	pub struct ImportFlag: u32 {
		/// Reverse triangle winding; MDL and the intermediate format use opposite orders
		const FLIP_WINDING = 1;
		/// Rotate triangles whose last vertex index is 0, for consumers that treat a trailing
		/// zero as a terminator
		const ROTATE_ZERO_TAIL = 2;
		/// Gather runs of single frames whose names share a prefix up to the first digit
		/// ("run1", "run2", ...) into untimed groups named after the prefix
		const MERGE_FRAMES = 4;
	}
}

impl Default for ImportFlag {
	fn default() -> Self {
		ImportFlag::FLIP_WINDING
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportCfg {
	pub flags: ImportFlag,
	pub palette: Palette,
	pub scale: f32,
}

impl Default for ImportCfg {
	fn default() -> Self {
		Self {
			flags: ImportFlag::default(),
			palette: Palette::quake(),
			scale: 1.0,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportedFrame {
	pub name: String,
	/// Index into [`ImportedMesh::groups`], if this frame belongs to a group
	pub group: Option<usize>,
	pub positions: Vec<Vec3>,
}

/// A run of consecutive frames or skins played as one animation
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedGroup {
	/// Only set for groups gathered by [`ImportFlag::MERGE_FRAMES`]
	pub name: Option<String>,
	/// Cumulative end times as stored in the file; merged groups have none
	pub times: Option<Vec<f32>>,
	pub members: Range<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportedMesh {
	/// Every frame in file order, group members flattened
	pub frames: Vec<ImportedFrame>,
	pub groups: Vec<ImportedGroup>,
	pub faces: Vec<Face>,
	/// UVs for each corner of the matching face
	pub uvs: Vec<[Vec2; 3]>,
	/// Every skin image in file order, group members flattened
	pub skins: Vec<Texture>,
	pub skin_groups: Vec<ImportedGroup>,
}

/// Returns the transform from quantized vertex space to world space
pub fn frame_transform(header: &Header, scale: f32) -> Mat4 {
	let s = header.scale * scale;
	let o = header.scale_origin * scale;

	Mat4::new(
		Vec4::new(s.x, 0.0, 0.0, 0.0),
		Vec4::new(0.0, s.y, 0.0, 0.0),
		Vec4::new(0.0, 0.0, s.z, 0.0),
		Vec4::new(o.x, o.y, o.z, 1.0),
	)
}

/// Normalizes a texture coordinate, moving on-seam coordinates of back faces to the skin's
/// right half
pub fn st_to_uv(st: &StVert, orient: FaceOrient, width: u32, height: u32) -> Vec2 {
	let w = width.max(1) as f32;
	let h = height.max(1) as f32;

	let mut s = st.s as f32;
	if st.is_on_seam() && orient == FaceOrient::Back {
		s += w / 2.0;
	}

	Vec2::new(s / w, 1.0 - (st.t as f32) / h)
}

/// Returns the part of a frame name in front of its first digit
pub fn name_base(name: &str) -> &str {
	&name[..name.find(|c: char| c.is_ascii_digit()).unwrap_or(name.len())]
}

#[cfg(feature = "import")]
fn merge_frames(frames: &mut [ImportedFrame], groups: &mut Vec<ImportedGroup>) {
	let mut i = 0;
	while i < frames.len() {
		if frames[i].group.is_some() {
			i += 1;
			continue;
		}

		let base = name_base(&frames[i].name).to_string();
		let mut end = i + 1;
		while end < frames.len() && frames[end].group.is_none() && name_base(&frames[end].name) == base {
			end += 1;
		}

		for f in frames[i..end].iter_mut() {
			f.group = Some(groups.len());
		}

		groups.push(ImportedGroup {
			name: Some(base),
			times: None,
			members: i..end,
		});
		i = end;
	}
}

/// Builds vertex positions, faces, UVs and skins out of a decoded model
#[cfg(feature = "import")]
pub fn document_to_mesh(model: &QuakeModel, cfg: &ImportCfg) -> Result<ImportedMesh, QuakeImportError> {
	let h = &model.header;
	let m = frame_transform(h, cfg.scale);

	let mut frames = vec![];
	let mut groups = vec![];
	for (i, frame) in model.frames.iter().enumerate() {
		let (group, times) = match frame {
			Frame::Single(_) => (None, None),
			Frame::Group { frames: members, .. } if members.is_empty() => {
				warn!("Skipping empty frame group {}", i);
				continue;
			},
			Frame::Group { times, .. } => (Some(groups.len()), Some(times)),
		};

		let start = frames.len();
		for (j, f) in frame.simple_frames().iter().enumerate() {
			let name = match (f.name.is_empty(), group) {
				(false, _) => f.name.clone(),
				(true, None) => format!("frame{}", i),
				(true, Some(_)) => format!("frame{}_{}", i, j + 1),
			};

			frames.push(ImportedFrame {
				name: name,
				group: group,
				positions: f.verts.iter().map(|v| m.transform_point3(v.position())).collect(),
			});
		}

		if let Some(times) = times {
			groups.push(ImportedGroup {
				name: None,
				times: Some(times.clone()),
				members: start..frames.len(),
			});
		}
	}

	if cfg.flags.contains(ImportFlag::MERGE_FRAMES) {
		merge_frames(&mut frames, &mut groups);
	}

	let mut faces = vec![];
	let mut uvs = vec![];
	for (i, tri) in model.tris.iter().enumerate() {
		let mut tv = tri.vertex_indices();
		if tv.iter().any(|v| *v >= h.num_verts as usize) {
			return Err(QuakeImportError::VertexIndex(i));
		}

		let mut sts = [Vec2::zero(); 3];
		for (uv, st) in sts.iter_mut().zip(tri.st_indices().iter()) {
			let st = model.st_verts.get(*st).ok_or(QuakeImportError::StVertIndex(i))?;
			*uv = st_to_uv(st, tri.orient(), h.skin_width, h.skin_height);
		}

		if cfg.flags.contains(ImportFlag::FLIP_WINDING) {
			tv.reverse();
			sts.reverse();
		}

		if cfg.flags.contains(ImportFlag::ROTATE_ZERO_TAIL) && tv[2] == 0 {
			tv.rotate_right(1);
			sts.rotate_right(1);
		}

		faces.push(Face::Triangle(tv));
		uvs.push(sts);
	}

	let colors = cfg.palette.to_colors();
	let mut skins = vec![];
	let mut skin_groups = vec![];
	for (i, skin) in model.skins.iter().enumerate() {
		let start = skins.len();
		for image in skin.images().iter() {
			let mut tex = Texture::new(h.skin_width as usize, h.skin_height as usize);
			tex.palette = colors.clone();
			tex.indices = image.iter().map(|i| *i as usize).collect();
			skins.push(tex);
		}

		match skin {
			Skin::Group { .. } if start == skins.len() => warn!("Skipping empty skin group {}", i),
			Skin::Group { times, .. } => skin_groups.push(ImportedGroup {
				name: None,
				times: Some(times.clone()),
				members: start..skins.len(),
			}),
			Skin::Single(_) => {},
		}
	}

	Ok(ImportedMesh {
		frames: frames,
		groups: groups,
		faces: faces,
		uvs: uvs,
		skins: skins,
		skin_groups: skin_groups,
	})
}

#[cfg(feature = "export")]
pub mod export {
	use log::warn;
	use std::collections::HashMap;

	use ultraviolet::vec::{
		Vec2,
		Vec3
	};

	use rgk_core::{
		scene::{
			Mesh,
			MeshFrame,
			Pose
		},
		texture::Image
	};

	use crate::{
		anorms::compress_normal,
		mdl::{
			export::QuakeExportError,
			*
		},
		palette::{
			Palette,
			Quantizer
		}
	};

	/// Size of the blank skin written when none is supplied
	pub const NULL_SKIN_SIZE: usize = 4;

	#[derive(Clone, Debug, PartialEq)]
	pub struct ExportCfg {
		pub sync_type: SyncType,
		pub effects: EffectFlags,
		/// Store 16-bit vertex coordinates (MD16)
		pub md16: bool,
		pub palette: Palette,
		/// Applied to every position and to the eye position
		pub scale: f32,
		pub eye_position: Vec3,
	}

	impl Default for ExportCfg {
		fn default() -> Self {
			Self {
				sync_type: SyncType::Synchronized,
				effects: EffectFlags::empty(),
				md16: false,
				palette: Palette::quake(),
				scale: 1.0,
				eye_position: Vec3::zero(),
			}
		}
	}

	#[derive(Clone, Debug, PartialEq)]
	pub enum SkinSource {
		Single(Image),
		/// Animated skin; `times` holds the cumulative end time of each image
		Group {
			images: Vec<Image>,
			times: Vec<f32>,
		},
	}

	/// Triangles over a vertex table shared by positions and texture coordinates
	#[derive(Clone, Debug, Default, PartialEq)]
	pub struct SharedTris {
		pub tris: Vec<[u32; 3]>,
		/// UV of each shared vertex
		pub uvs: Vec<Vec2>,
		/// Mesh vertex of each shared vertex
		pub vertmap: Vec<usize>,
	}

	/// Fan-triangulates every face and allocates one shared vertex per distinct
	/// (mesh vertex, UV) pair. Winding is reversed.
	pub fn build_tris(mesh: &Mesh) -> Result<SharedTris, QuakeExportError> {
		let mut out = SharedTris::default();
		let mut index: HashMap<(usize, u32, u32), u32> = HashMap::new();

		for (fi, face) in mesh.faces.iter().enumerate() {
			let corners = face.indices();
			let uvs = mesh.uvs.get(fi).map(|u| u.as_slice()).unwrap_or(&[]);
			if uvs.len() != corners.len() {
				return Err(QuakeExportError::FaceUvCount(fi, corners.len(), uvs.len()));
			}

			for [a, b, c] in face.fan() {
				let mut tri = [0; 3];

				for (t, corner) in tri.iter_mut().zip([a, c, b]) {
					let v = corners[corner];
					let uv = uvs[corner];
					let next = out.vertmap.len() as u32;

					*t = *index.entry((v, uv.x.to_bits(), uv.y.to_bits())).or_insert_with(|| {
						out.vertmap.push(v);
						out.uvs.push(uv);
						next
					});
				}

				out.tris.push(tri);
			}
		}

		Ok(out)
	}

	/// Maps UVs to skin pixels, flipping V since skins are stored top row first.
	/// Coordinates outside of the skin wrap around.
	pub fn convert_stverts(uvs: &[Vec2], width: usize, height: usize) -> Vec<StVert> {
		let w = width.max(1) as i32;
		let h = height.max(1) as i32;

		uvs.iter().map(|uv| {
			let s = (uv.x * ((w - 1) as f32) + 0.5).round() as i32;
			let t = ((1.0 - uv.y) * ((h - 1) as f32) + 0.5).round() as i32;
			StVert::new(s.rem_euclid(w), t.rem_euclid(h))
		}).collect()
	}

	/// Quantizes a position against the model-wide origin and scale. With `md16` the low byte
	/// of an 8.8 fixed point value goes to [`Vertex::frac`].
	pub fn quantize(pos: Vec3, origin: Vec3, scale: Vec3, md16: bool) -> Vertex {
		let mut vert = Vertex::new([0; 3], 0);
		let p = [pos.x, pos.y, pos.z];
		let o = [origin.x, origin.y, origin.z];
		let s = [scale.x, scale.y, scale.z];

		for i in 0..3 {
			let q = match s[i] == 0.0 {
				true => 0.0,
				false => (p[i] - o[i]) / s[i],
			};

			if md16 {
				let fixed = (q * 256.0).round().clamp(0.0, 65535.0) as u16;
				vert.v[i] = (fixed >> 8) as u8;
				vert.frac[i] = (fixed & 0xFF) as u8;
			} else {
				vert.v[i] = q.round().clamp(0.0, 255.0) as u8;
			}
		}

		vert
	}

	/// Axis-aligned bounds, grown one point at a time
	#[derive(Clone, Copy, Debug, PartialEq)]
	pub struct Bounds {
		pub min: Vec3,
		pub max: Vec3,
	}

	impl Bounds {
		pub fn new(p: Vec3) -> Bounds {
			Bounds {
				min: p,
				max: p,
			}
		}

		pub fn add(&mut self, p: Vec3) {
			self.min = Vec3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
			self.max = Vec3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
		}

		/// Distance from the origin to the farthest corner
		pub fn radius(&self) -> f32 {
			let r = |a: f32, b: f32| a.abs().max(b.abs());
			Vec3::new(r(self.min.x, self.max.x), r(self.min.y, self.max.y), r(self.min.z, self.max.z)).mag()
		}
	}

	/// Mean area of the triangles in the given pose
	pub fn average_area(tris: &[[u32; 3]], positions: &[Vec3]) -> f32 {
		if tris.is_empty() {
			return 0.0;
		}

		let total: f32 = tris.iter().map(|t| {
			let [a, b, c] = t.map(|i| positions[i as usize]);
			(a - b).cross(c - b).mag() / 2.0
		}).sum();

		total / (tris.len() as f32)
	}

	/// A pose resolved to shared vertices, still in world space
	struct RawFrame {
		name: String,
		positions: Vec<Vec3>,
		normals: Vec<u8>,
	}

	fn raw_frame(frame: &MeshFrame, index: usize, name: String, vertmap: &[usize], scale: f32)
		-> Result<RawFrame, QuakeExportError>
	{
		let mut positions = vec![];
		let mut normals = vec![];

		for v in vertmap.iter() {
			let p = frame.positions.get(*v).ok_or(QuakeExportError::MissingVertex(index, *v))?;
			positions.push(*p * scale);
			normals.push(frame.normals.get(*v).map(|n| compress_normal(*n)).unwrap_or(0));
		}

		Ok(RawFrame {
			name: frame.name.clone().unwrap_or(name),
			positions: positions,
			normals: normals,
		})
	}

	fn convert_image(image: &Image, dims: &mut Option<(usize, usize)>, q: &mut Quantizer)
		-> Result<Skin, QuakeExportError>
	{
		match *dims {
			Some((w, h)) if (w, h) != (image.width, image.height) =>
				return Err(QuakeExportError::SkinDimensions(w, h, image.width, image.height)),
			_ => *dims = Some((image.width, image.height)),
		}

		if image.pixels.len() != image.width * image.height {
			return Err(QuakeExportError::ImageSize(image.pixels.len(), image.width, image.height));
		}

		Ok(Skin::Single(q.quantize(&image.pixels)))
	}

	/// Palettizes the given skins; all images must share one size
	pub fn make_skins(sources: &[SkinSource], palette: &Palette) -> Result<(Vec<Skin>, usize, usize), QuakeExportError> {
		if sources.is_empty() {
			let size = NULL_SKIN_SIZE;
			return Ok((vec![Skin::Single(vec![0; size * size])], size, size));
		}

		let mut q = palette.quantizer();
		let mut dims = None;
		let mut skins = vec![];

		for source in sources.iter() {
			skins.push(match source {
				SkinSource::Single(image) => convert_image(image, &mut dims, &mut q)?,
				SkinSource::Group { images, times } => {
					let mut members = vec![];
					for image in images.iter() {
						members.push(convert_image(image, &mut dims, &mut q)?);
					}
					Skin::group(members, times.clone())?
				},
			});
		}

		let (w, h) = dims.unwrap_or((NULL_SKIN_SIZE, NULL_SKIN_SIZE));
		Ok((skins, w, h))
	}

	/// Builds a version 6 model out of an animated mesh and its skins
	pub fn mesh_to_document(mesh: &Mesh, skins: &[SkinSource], cfg: &ExportCfg) -> Result<QuakeModel, QuakeExportError> {
		let shared = build_tris(mesh)?;
		let (skins, skin_width, skin_height) = make_skins(skins, &cfg.palette)?;

		// Gather poses in world space first; quantization needs the bounds of all of them
		let mut poses = vec![];
		for (i, pose) in mesh.poses.iter().enumerate() {
			poses.push(match pose {
				Pose::Single(f) => (vec![raw_frame(f, i, format!("frame{}", i), &shared.vertmap, cfg.scale)?], None),
				Pose::Group { frames, .. } if frames.is_empty() => return Err(QuakeExportError::EmptyGroup),
				Pose::Group { frames, times } => {
					let mut members = vec![];
					for (j, f) in frames.iter().enumerate() {
						members.push(raw_frame(f, i, format!("frame{}_{}", i, j + 1), &shared.vertmap, cfg.scale)?);
					}
					(members, Some(times))
				},
			});
		}

		let first = poses.first().and_then(|(f, _)| f.first()).ok_or(QuakeExportError::NoFrames)?;
		let size = average_area(&shared.tris, &first.positions);

		let mut bounds = Bounds::new(first.positions.first().copied().unwrap_or(Vec3::zero()));
		for (frames, _) in poses.iter() {
			for f in frames.iter() {
				for p in f.positions.iter() {
					bounds.add(*p);
				}
			}
		}

		let extent = bounds.max - bounds.min;
		let scale = extent / 255.0;
		if extent.x == 0.0 || extent.y == 0.0 || extent.z == 0.0 {
			warn!("Mesh is flat along at least one axis: {:?}", extent);
		}

		let profile = Profile::new(if cfg.md16 { Ident::Md16 } else { Ident::Idpo }, Version::V6);
		let mut header = Header::new(profile);
		header.scale = scale;
		header.scale_origin = bounds.min;
		header.bounding_radius = bounds.radius();
		header.eye_position = cfg.eye_position * cfg.scale;
		header.skin_width = skin_width as u32;
		header.skin_height = skin_height as u32;
		header.num_verts = shared.vertmap.len() as u32;
		header.sync_type = cfg.sync_type;
		header.set_effects(cfg.effects);
		header.size = size;

		let mut model = QuakeModel::new(header);
		model.skins = skins;
		model.st_verts = convert_stverts(&shared.uvs, skin_width, skin_height);
		model.tris = shared.tris.iter().map(|t| Triangle::Tri {
			orient: FaceOrient::Front,
			verts: *t,
		}).collect();

		for (frames, times) in poses.into_iter() {
			let mut quantized = vec![];
			for raw in frames.into_iter() {
				let mut frame = SimpleFrame::new(&raw.name);
				for (p, n) in raw.positions.iter().zip(raw.normals.iter()) {
					let mut vert = quantize(*p, bounds.min, scale, cfg.md16);
					vert.normal_index = *n;
					frame.push_vertex(vert);
				}
				quantized.push(Frame::Single(frame));
			}

			match times {
				Some(times) => model.frames.push(Frame::group(quantized, times.clone())?),
				None => model.frames.extend(quantized),
			}
		}

		model.sync_counts();
		Ok(model)
	}

}
