use bitflags::bitflags;

#[cfg(feature = "import")]
use byteorder::ReadBytesExt;

#[cfg(feature = "export")]
use byteorder::WriteBytesExt;

use byteorder::LE;
use log::debug;
use std::io;

use ultraviolet::vec::Vec3;

use rgk_core::{
	io_ext::{
		ReadBinExt,
		WriteBinExt
	},
	rtag4
};

#[cfg(feature = "import")]
use import::QuakeImportError;

#[cfg(feature = "export")]
use export::QuakeExportError;

pub const FRAME_NAME_LEN: usize = 16;
pub const MAX_PRECALC_NORMALS: u8 = 162;

/// Value the engine's model compiler stores for on-seam texture coordinates
pub const ALIAS_ONSEAM: i32 = 0x20;

const ALIAS_SINGLE: i32 = 0;
const ALIAS_GROUP: i32 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u32)]
pub enum Ident {
	/// Quake
	Idpo = rtag4!(b"IDPO"),
	/// QuakeForge, 16-bit vertex coordinates
	Md16 = rtag4!(b"MD16"),
	/// Hexen II: Portal of Praevus
	Rapo = rtag4!(b"RAPO"),
}

impl Ident {
	pub fn from_u32(magic: u32) -> Option<Ident> {
		match magic {
			m if m == Ident::Idpo as u32 => Some(Ident::Idpo),
			m if m == Ident::Md16 as u32 => Some(Ident::Md16),
			m if m == Ident::Rapo as u32 => Some(Ident::Rapo),
			_ => None,
		}
	}

	/// Frames carry a second vertex pass holding the fractional byte of each coordinate
	pub fn has_fractional_verts(self) -> bool {
		self == Ident::Md16
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(i32)]
pub enum Version {
	V3 = 3,
	V6 = 6,
	V50 = 50,
}

impl Version {
	pub fn from_i32(version: i32) -> Option<Version> {
		match version {
			3 => Some(Version::V3),
			6 => Some(Version::V6),
			50 => Some(Version::V50),
			_ => None,
		}
	}

	pub fn has_flags_and_size(self) -> bool {
		self != Version::V3
	}

	pub fn has_frame_names(self) -> bool {
		self != Version::V3
	}

	/// The header declares its own texture coordinate count instead of reusing the vertex count
	pub fn has_st_vert_count(self) -> bool {
		self == Version::V50
	}

	/// Triangles index 3D vertices and texture coordinates separately
	pub fn uses_split_triangles(self) -> bool {
		self == Version::V50
	}
}

/// Field layout of a file, resolved once from its header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Profile {
	pub ident: Ident,
	pub version: Version,
}

impl Profile {
	pub fn new(ident: Ident, version: Version) -> Profile {
		Profile {
			ident: ident,
			version: version,
		}
	}
}

impl Default for Profile {
	fn default() -> Self {
		Profile::new(Ident::Idpo, Version::V6)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(i32)]
pub enum SyncType {
	Synchronized = 0,
	Random,
}

bitflags! {
	pub struct EffectFlags: u32 {
		const ROCKET = 1;
		const GRENADE = 1 << 1;
		const GIB = 1 << 2;
		const ROTATE = 1 << 3;
		const TRACER = 1 << 4;
		const ZOMGIB = 1 << 5;
		const TRACER2 = 1 << 6;
		const TRACER3 = 1 << 7;
		// Hexen II
		const FIREBALL = 1 << 8;
		const ICE = 1 << 9;
		const MIP_MAP = 1 << 10;
		const SPIT = 1 << 11;
		const TRANSPARENT = 1 << 12;
		const SPELL = 1 << 13;
		const HOLEY = 1 << 14;
		const SPECIAL_TRANS = 1 << 15;
		const FACE_VIEW = 1 << 16;
		const VORP_MISSILE = 1 << 17;
		const SET_STAFF = 1 << 18;
		const MAGICMISSILE = 1 << 19;
		const BONESHARD = 1 << 20;
		const SCARAB = 1 << 21;
		const ACIDBALL = 1 << 22;
		const BLOODSHOT = 1 << 23;
		const MIP_MAP_FAR = 1 << 24;
	}
}

/// Engine names of every effect bit
pub const EFFECT_NAMES: [(EffectFlags, &str); 25] = [
	(EffectFlags::ROCKET, "EF_ROCKET"),
	(EffectFlags::GRENADE, "EF_GRENADE"),
	(EffectFlags::GIB, "EF_GIB"),
	(EffectFlags::ROTATE, "EF_ROTATE"),
	(EffectFlags::TRACER, "EF_TRACER"),
	(EffectFlags::ZOMGIB, "EF_ZOMGIB"),
	(EffectFlags::TRACER2, "EF_TRACER2"),
	(EffectFlags::TRACER3, "EF_TRACER3"),
	(EffectFlags::FIREBALL, "EF_FIREBALL"),
	(EffectFlags::ICE, "EF_ICE"),
	(EffectFlags::MIP_MAP, "EF_MIP_MAP"),
	(EffectFlags::SPIT, "EF_SPIT"),
	(EffectFlags::TRANSPARENT, "EF_TRANSPARENT"),
	(EffectFlags::SPELL, "EF_SPELL"),
	(EffectFlags::HOLEY, "EF_HOLEY"),
	(EffectFlags::SPECIAL_TRANS, "EF_SPECIAL_TRANS"),
	(EffectFlags::FACE_VIEW, "EF_FACE_VIEW"),
	(EffectFlags::VORP_MISSILE, "EF_VORP_MISSILE"),
	(EffectFlags::SET_STAFF, "EF_SET_STAFF"),
	(EffectFlags::MAGICMISSILE, "EF_MAGICMISSILE"),
	(EffectFlags::BONESHARD, "EF_BONESHARD"),
	(EffectFlags::SCARAB, "EF_SCARAB"),
	(EffectFlags::ACIDBALL, "EF_ACIDBALL"),
	(EffectFlags::BLOODSHOT, "EF_BLOODSHOT"),
	(EffectFlags::MIP_MAP_FAR, "EF_MIP_MAP_FAR"),
];

impl EffectFlags {
	pub fn from_name(name: &str) -> Option<EffectFlags> {
		EFFECT_NAMES.iter().find(|(_, n)| *n == name).map(|(f, _)| *f)
	}

	/// Returns the engine name of every set bit, lowest bit first
	pub fn names(&self) -> Vec<&'static str> {
		EFFECT_NAMES.iter().filter(|(f, _)| self.contains(*f)).map(|(_, n)| *n).collect()
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
	pub profile: Profile,
	pub scale: Vec3,
	pub scale_origin: Vec3,
	pub bounding_radius: f32,
	pub eye_position: Vec3,
	pub num_skins: u32,
	pub skin_width: u32,
	pub skin_height: u32,
	pub num_verts: u32,
	pub num_tris: u32,
	pub num_frames: u32,
	pub sync_type: SyncType,
	/// Raw effect bits, v6+. Bits without a name are kept as stored.
	pub flags: u32,
	pub size: f32, // v6+, average triangle area
	pub num_st_verts: u32, // only stored by v50
}

impl Header {
	pub fn new(profile: Profile) -> Header {
		Header {
			profile: profile,
			scale: Vec3::one(),
			scale_origin: Vec3::zero(),
			bounding_radius: 1.0,
			eye_position: Vec3::zero(),
			num_skins: 0,
			skin_width: 0,
			skin_height: 0,
			num_verts: 0,
			num_tris: 0,
			num_frames: 0,
			sync_type: SyncType::Synchronized,
			flags: 0,
			size: 0.0,
			num_st_verts: 0,
		}
	}

	/// Returns the named effect bits
	pub fn effects(&self) -> EffectFlags {
		EffectFlags::from_bits_truncate(self.flags)
	}

	/// Replaces the named effect bits, keeping any unnamed ones
	pub fn set_effects(&mut self, effects: EffectFlags) {
		self.flags = (self.flags & !EffectFlags::all().bits()) | effects.bits();
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Header, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		let magic = buf.read_u32::<LE>()?;
		let ident = Ident::from_u32(magic).ok_or(QuakeImportError::Magic(magic))?;

		let version = buf.read_i32::<LE>()?;
		let version = Version::from_i32(version).ok_or(QuakeImportError::Version(version))?;

		let profile = Profile::new(ident, version);

		let mut header = Header::new(profile);
		header.scale = buf.read_vec3_le()?;
		header.scale_origin = buf.read_vec3_le()?;
		header.bounding_radius = buf.read_f32::<LE>()?;
		header.eye_position = buf.read_vec3_le()?;
		header.num_skins = buf.read_u32::<LE>()?;
		header.skin_width = buf.read_u32::<LE>()?;
		header.skin_height = buf.read_u32::<LE>()?;
		header.num_verts = buf.read_u32::<LE>()?;
		header.num_tris = buf.read_u32::<LE>()?;
		header.num_frames = buf.read_u32::<LE>()?;
		header.sync_type = match buf.read_i32::<LE>()? {
			0 => SyncType::Synchronized,
			_ => SyncType::Random,
		};

		if version.has_flags_and_size() {
			header.flags = buf.read_u32::<LE>()?;
			header.size = buf.read_f32::<LE>()?;
		}

		header.num_st_verts = match version.has_st_vert_count() {
			true => buf.read_u32::<LE>()?,
			false => header.num_verts,
		};

		Ok(header)
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		let version = self.profile.version;

		buf.write_u32::<LE>(self.profile.ident as u32)?;
		buf.write_i32::<LE>(version as i32)?;
		buf.write_vec3_le(self.scale)?;
		buf.write_vec3_le(self.scale_origin)?;
		buf.write_f32::<LE>(self.bounding_radius)?;
		buf.write_vec3_le(self.eye_position)?;
		buf.write_u32::<LE>(self.num_skins)?;
		buf.write_u32::<LE>(self.skin_width)?;
		buf.write_u32::<LE>(self.skin_height)?;
		buf.write_u32::<LE>(self.num_verts)?;
		buf.write_u32::<LE>(self.num_tris)?;
		buf.write_u32::<LE>(self.num_frames)?;
		buf.write_i32::<LE>(self.sync_type as i32)?;

		if version.has_flags_and_size() {
			buf.write_u32::<LE>(self.flags)?;
			buf.write_f32::<LE>(self.size)?;
		}

		if version.has_st_vert_count() {
			buf.write_u32::<LE>(self.num_st_verts)?;
		}

		Ok(())
	}
}

/// Palette-indexed skin, one byte per pixel, rows top to bottom
#[derive(Clone, Debug, PartialEq)]
pub enum Skin {
	Single(Vec<u8>),
	/// Animated skin; `times` holds the cumulative end time of each image
	Group {
		times: Vec<f32>,
		data: Vec<Vec<u8>>,
	},
}

impl Skin {
	/// Builds an animated skin out of single skins
	#[cfg(feature = "export")]
	pub fn group(skins: Vec<Skin>, times: Vec<f32>) -> Result<Skin, QuakeExportError> {
		check_times(skins.len(), &times)?;

		let mut data = vec![];
		for skin in skins.into_iter() {
			match skin {
				Skin::Single(pixels) => data.push(pixels),
				Skin::Group { .. } => return Err(QuakeExportError::NestedGroup),
			}
		}

		Ok(Skin::Group {
			times: times,
			data: data,
		})
	}

	/// Returns the pixel data of every image, group members included
	pub fn images(&self) -> Vec<&[u8]> {
		match self {
			Skin::Single(data) => vec![data.as_slice()],
			Skin::Group { data, .. } => data.iter().map(|d| d.as_slice()).collect(),
		}
	}

	#[cfg(feature = "import")]
	fn read<R>(width: usize, height: usize, buf: &mut R) -> Result<Skin, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		let size = width * height;

		match buf.read_i32::<LE>()? {
			ALIAS_SINGLE => Ok(Skin::Single(buf.read_block(size)?)),
			ALIAS_GROUP => {
				let num = buf.read_u32::<LE>()? as usize;
				let times = buf.read_f32_vec_le(num)?;
				import::warn_times("skin", &times);

				let mut data = vec![];
				for _ in 0..num {
					data.push(buf.read_block(size)?);
				}

				Ok(Skin::Group {
					times: times,
					data: data,
				})
			},
			t => Err(QuakeImportError::GroupType(t)),
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		match self {
			Skin::Single(data) => {
				buf.write_i32::<LE>(ALIAS_SINGLE)?;
				buf.write_all(data)
			},
			Skin::Group { times, data } => {
				buf.write_i32::<LE>(ALIAS_GROUP)?;
				buf.write_u32::<LE>(data.len() as u32)?;
				buf.write_f32_slice_le(times)?;
				for d in data.iter() {
					buf.write_all(d)?;
				}

				Ok(())
			},
		}
	}
}

/// Texture coordinate in skin pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StVert {
	/// Raw seam marker; any non-zero value means the coordinate lies on the seam
	pub on_seam: i32,
	pub s: i32,
	pub t: i32,
}

impl StVert {
	pub fn new(s: i32, t: i32) -> StVert {
		StVert {
			on_seam: 0,
			s: s,
			t: t,
		}
	}

	pub fn is_on_seam(&self) -> bool {
		self.on_seam != 0
	}

	/// Marks the coordinate with [`ALIAS_ONSEAM`], or clears the marker
	pub fn set_on_seam(&mut self, on_seam: bool) {
		self.on_seam = match on_seam {
			true => ALIAS_ONSEAM,
			false => 0,
		};
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<StVert, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		Ok(StVert {
			on_seam: buf.read_i32::<LE>()?,
			s: buf.read_i32::<LE>()?,
			t: buf.read_i32::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_i32::<LE>(self.on_seam)?;
		buf.write_i32::<LE>(self.s)?;
		buf.write_i32::<LE>(self.t)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(i32)]
pub enum FaceOrient {
	Back = 0,
	Front,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Triangle {
	/// v3 and v6: indices are shared between vertices and texture coordinates
	Tri {
		orient: FaceOrient,
		verts: [u32; 3],
	},
	/// v50
	NTri {
		orient: FaceOrient,
		verts: [u16; 3],
		st_verts: [u16; 3],
	},
}

impl Triangle {
	pub fn orient(&self) -> FaceOrient {
		match self {
			Triangle::Tri { orient, .. } | Triangle::NTri { orient, .. } => *orient,
		}
	}

	pub fn vertex_indices(&self) -> [usize; 3] {
		match self {
			Triangle::Tri { verts, .. } => verts.map(|v| v as usize),
			Triangle::NTri { verts, .. } => verts.map(|v| v as usize),
		}
	}

	pub fn st_indices(&self) -> [usize; 3] {
		match self {
			Triangle::Tri { verts, .. } => verts.map(|v| v as usize),
			Triangle::NTri { st_verts, .. } => st_verts.map(|v| v as usize),
		}
	}

	#[cfg(feature = "import")]
	fn read<R>(version: Version, buf: &mut R) -> Result<Triangle, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		let orient = match buf.read_i32::<LE>()? {
			0 => FaceOrient::Back,
			_ => FaceOrient::Front,
		};

		if version.uses_split_triangles() {
			let mut verts = [0; 3];
			let mut st_verts = [0; 3];
			buf.read_u16_into::<LE>(&mut verts)?;
			buf.read_u16_into::<LE>(&mut st_verts)?;

			Ok(Triangle::NTri {
				orient: orient,
				verts: verts,
				st_verts: st_verts,
			})
		} else {
			let mut verts = [0; 3];
			buf.read_u32_into::<LE>(&mut verts)?;

			Ok(Triangle::Tri {
				orient: orient,
				verts: verts,
			})
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_i32::<LE>(self.orient() as i32)?;

		match self {
			Triangle::Tri { verts, .. } => {
				for v in verts.iter() {
					buf.write_u32::<LE>(*v)?;
				}
			},
			Triangle::NTri { verts, st_verts, .. } => {
				for v in verts.iter().chain(st_verts.iter()) {
					buf.write_u16::<LE>(*v)?;
				}
			},
		}

		Ok(())
	}
}

/// Byte-quantized position plus a compressed normal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
	pub v: [u8; 3],
	/// Fractional byte of each coordinate, only stored by MD16 files
	pub frac: [u8; 3],
	pub normal_index: u8,
}

impl Vertex {
	pub fn new(v: [u8; 3], normal_index: u8) -> Vertex {
		Vertex {
			v: v,
			frac: [0; 3],
			normal_index: normal_index,
		}
	}

	/// Returns the quantized position, in scale units
	pub fn position(&self) -> Vec3 {
		let c = |i: usize| (self.v[i] as f32) + (self.frac[i] as f32) / 256.0;
		Vec3::new(c(0), c(1), c(2))
	}

	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> io::Result<Vertex>
	where
		R: ReadBytesExt,
	{
		let mut v = [0; 3];
		buf.read_exact(&mut v)?;

		Ok(Vertex::new(v, buf.read_u8()?))
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_all(&self.v)?;
		buf.write_u8(self.normal_index)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimpleFrame {
	pub bb_min: Vertex,
	pub bb_max: Vertex,
	pub name: String, // v6+, at most 16 bytes
	pub verts: Vec<Vertex>,
}

impl SimpleFrame {
	/// Creates an empty frame, with its bounds inverted until the first vertex is pushed
	pub fn new(name: &str) -> SimpleFrame {
		SimpleFrame {
			bb_min: Vertex::new([u8::MAX; 3], 0),
			bb_max: Vertex::new([0; 3], 0),
			name: name.to_string(),
			verts: vec![],
		}
	}

	pub fn push_vertex(&mut self, vert: Vertex) {
		for i in 0..3 {
			self.bb_min.v[i] = self.bb_min.v[i].min(vert.v[i]);
			self.bb_max.v[i] = self.bb_max.v[i].max(vert.v[i]);
		}

		self.verts.push(vert);
	}

	#[cfg(feature = "import")]
	fn read<R>(profile: Profile, num_verts: usize, buf: &mut R) -> Result<SimpleFrame, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		let bb_min = Vertex::read(buf)?;
		let bb_max = Vertex::read(buf)?;

		let name = match profile.version.has_frame_names() {
			true => buf.read_fixed_str(FRAME_NAME_LEN)?,
			false => String::new(),
		};

		let mut verts = vec![];
		for _ in 0..num_verts {
			verts.push(Vertex::read(buf)?);
		}

		if profile.ident.has_fractional_verts() {
			for vert in verts.iter_mut() {
				vert.frac = Vertex::read(buf)?.v;
			}
		}

		Ok(SimpleFrame {
			bb_min: bb_min,
			bb_max: bb_max,
			name: name,
			verts: verts,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, profile: Profile, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		self.bb_min.write(buf)?;
		self.bb_max.write(buf)?;

		if profile.version.has_frame_names() {
			buf.write_fixed_str(&self.name, FRAME_NAME_LEN)?;
		}

		for vert in self.verts.iter() {
			vert.write(buf)?;
		}

		if profile.ident.has_fractional_verts() {
			for vert in self.verts.iter() {
				buf.write_all(&vert.frac)?;
				buf.write_u8(vert.normal_index)?;
			}
		}

		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
	Single(SimpleFrame),
	/// Engine-side sub-animation; `times` holds the cumulative end time of each frame
	Group {
		bb_min: Vertex,
		bb_max: Vertex,
		times: Vec<f32>,
		frames: Vec<SimpleFrame>,
	},
}

impl Frame {
	/// Builds a frame group out of single frames, merging their bounds
	#[cfg(feature = "export")]
	pub fn group(frames: Vec<Frame>, times: Vec<f32>) -> Result<Frame, QuakeExportError> {
		check_times(frames.len(), &times)?;

		let mut bb_min = Vertex::new([u8::MAX; 3], 0);
		let mut bb_max = Vertex::new([0; 3], 0);
		let mut members = vec![];

		for frame in frames.into_iter() {
			let frame = match frame {
				Frame::Single(f) => f,
				Frame::Group { .. } => return Err(QuakeExportError::NestedGroup),
			};

			for i in 0..3 {
				bb_min.v[i] = bb_min.v[i].min(frame.bb_min.v[i]);
				bb_max.v[i] = bb_max.v[i].max(frame.bb_max.v[i]);
			}

			members.push(frame);
		}

		Ok(Frame::Group {
			bb_min: bb_min,
			bb_max: bb_max,
			times: times,
			frames: members,
		})
	}

	/// Returns every single frame, group members included
	pub fn simple_frames(&self) -> Vec<&SimpleFrame> {
		match self {
			Frame::Single(f) => vec![f],
			Frame::Group { frames, .. } => frames.iter().collect(),
		}
	}

	#[cfg(feature = "import")]
	fn read<R>(profile: Profile, num_verts: usize, buf: &mut R) -> Result<Frame, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		match buf.read_i32::<LE>()? {
			ALIAS_SINGLE => Ok(Frame::Single(SimpleFrame::read(profile, num_verts, buf)?)),
			ALIAS_GROUP => {
				let num = buf.read_u32::<LE>()? as usize;
				let bb_min = Vertex::read(buf)?;
				let bb_max = Vertex::read(buf)?;
				let times = buf.read_f32_vec_le(num)?;
				import::warn_times("frame", &times);

				let mut frames = vec![];
				for _ in 0..num {
					frames.push(SimpleFrame::read(profile, num_verts, buf)?);
				}

				Ok(Frame::Group {
					bb_min: bb_min,
					bb_max: bb_max,
					times: times,
					frames: frames,
				})
			},
			t => Err(QuakeImportError::GroupType(t)),
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, profile: Profile, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		match self {
			Frame::Single(frame) => {
				buf.write_i32::<LE>(ALIAS_SINGLE)?;
				frame.write(profile, buf)
			},
			Frame::Group { bb_min, bb_max, times, frames } => {
				buf.write_i32::<LE>(ALIAS_GROUP)?;
				buf.write_u32::<LE>(frames.len() as u32)?;
				bb_min.write(buf)?;
				bb_max.write(buf)?;
				buf.write_f32_slice_le(times)?;
				for frame in frames.iter() {
					frame.write(profile, buf)?;
				}

				Ok(())
			},
		}
	}
}

/// Group times must be one per member and strictly ascending
#[cfg(feature = "export")]
fn check_times(members: usize, times: &[f32]) -> Result<(), QuakeExportError> {
	if members == 0 {
		return Err(QuakeExportError::EmptyGroup);
	}

	if times.len() != members {
		return Err(QuakeExportError::TimeCount(times.len(), members));
	}

	if let Some(i) = times.windows(2).position(|w| !(w[0] < w[1])) {
		return Err(QuakeExportError::TimeOrder(i + 1));
	}

	Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuakeModel {
	pub header: Header,
	pub skins: Vec<Skin>,
	pub st_verts: Vec<StVert>,
	pub tris: Vec<Triangle>,
	pub frames: Vec<Frame>,
}

impl QuakeModel {
	pub fn new(header: Header) -> QuakeModel {
		QuakeModel {
			header: header,
			skins: vec![],
			st_verts: vec![],
			tris: vec![],
			frames: vec![],
		}
	}

	/// Updates the header's section counts from the model's contents.
	/// The vertex count is taken from the first frame, if any.
	pub fn sync_counts(&mut self) {
		self.header.num_skins = self.skins.len() as u32;
		self.header.num_st_verts = self.st_verts.len() as u32;
		self.header.num_tris = self.tris.len() as u32;
		self.header.num_frames = self.frames.len() as u32;

		if let Some(frame) = self.frames.first().and_then(|f| f.simple_frames().first().copied()) {
			self.header.num_verts = frame.verts.len() as u32;
		}
	}

	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<QuakeModel, QuakeImportError>
	where
		R: ReadBytesExt,
	{
		let header = Header::read(buf)?;
		let profile = header.profile;
		debug!("MDL {:?}: {} skins ({}x{}), {} verts, {} st verts, {} tris, {} frames", profile,
			header.num_skins, header.skin_width, header.skin_height, header.num_verts,
			header.num_st_verts, header.num_tris, header.num_frames);

		let mut model = QuakeModel::new(header);

		for _ in 0..header.num_skins {
			model.skins.push(Skin::read(header.skin_width as usize, header.skin_height as usize, buf)?);
		}

		for _ in 0..header.num_st_verts {
			model.st_verts.push(StVert::read(buf)?);
		}

		for _ in 0..header.num_tris {
			model.tris.push(Triangle::read(profile.version, buf)?);
		}

		for _ in 0..header.num_frames {
			model.frames.push(Frame::read(profile, header.num_verts as usize, buf)?);
		}

		Ok(model)
	}

	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> Result<(), QuakeExportError>
	where
		W: WriteBytesExt,
	{
		self.validate()?;

		let profile = self.header.profile;
		debug!("Writing MDL {:?}: {} skins, {} st verts, {} tris, {} frames", profile,
			self.skins.len(), self.st_verts.len(), self.tris.len(), self.frames.len());

		self.header.write(buf)?;

		for skin in self.skins.iter() {
			skin.write(buf)?;
		}

		for st in self.st_verts.iter() {
			st.write(buf)?;
		}

		for tri in self.tris.iter() {
			tri.write(buf)?;
		}

		for frame in self.frames.iter() {
			frame.write(profile, buf)?;
		}

		Ok(())
	}

	/// Checks that the header's counts and the contents agree with each other
	#[cfg(feature = "export")]
	pub fn validate(&self) -> Result<(), QuakeExportError> {
		let h = &self.header;
		let version = h.profile.version;

		check_count("skins", h.num_skins, self.skins.len())?;
		check_count("st verts", h.num_st_verts, self.st_verts.len())?;
		check_count("triangles", h.num_tris, self.tris.len())?;
		check_count("frames", h.num_frames, self.frames.len())?;

		if !version.has_st_vert_count() {
			check_count("st verts", h.num_verts, self.st_verts.len())?;
		}

		let skin_size = (h.skin_width as usize) * (h.skin_height as usize);
		for (i, skin) in self.skins.iter().enumerate() {
			if let Skin::Group { times, data } = skin {
				check_times(data.len(), times)?;
			}

			for image in skin.images().iter() {
				if image.len() != skin_size {
					return Err(QuakeExportError::SkinSize(i, image.len(), skin_size));
				}
			}
		}

		for (i, tri) in self.tris.iter().enumerate() {
			if matches!(tri, Triangle::NTri { .. }) != version.uses_split_triangles() {
				return Err(QuakeExportError::TriangleVersion(i, version as i32));
			}

			if tri.vertex_indices().iter().any(|v| *v >= h.num_verts as usize) {
				return Err(QuakeExportError::VertexIndex(i));
			}

			if tri.st_indices().iter().any(|st| *st >= self.st_verts.len()) {
				return Err(QuakeExportError::StVertIndex(i));
			}
		}

		for (i, frame) in self.frames.iter().enumerate() {
			if let Frame::Group { times, frames, .. } = frame {
				check_times(frames.len(), times)?;
			}

			for f in frame.simple_frames().iter() {
				if f.verts.len() != h.num_verts as usize {
					return Err(QuakeExportError::FrameVertexCount(i, f.verts.len(), h.num_verts));
				}
			}
		}

		Ok(())
	}
}

#[cfg(feature = "export")]
fn check_count(section: &'static str, declared: u32, found: usize) -> Result<(), QuakeExportError> {
	match declared as usize == found {
		true => Ok(()),
		false => Err(QuakeExportError::Count {
			section: section,
			declared: declared,
			found: found,
		}),
	}
}

#[cfg(feature = "import")]
pub mod import {
	use log::warn;
	use std::io;
	use thiserror::Error;

	#[derive(Debug, Error)]
	pub enum QuakeImportError {
		#[error("Unknown/unsupported grouping type: {0}")]
		GroupType(i32),
		#[error("I/O error")]
		IO {
			source: io::Error,
		},
		#[error("Not an MDL file: {:?}", tag_text(.0))]
		Magic(u32),
		#[error("Texture coordinate index out of bounds in triangle {0}")]
		StVertIndex(usize),
		#[error("Unexpected end of file")]
		Truncated,
		#[error("Vertex index out of bounds in triangle {0}")]
		VertexIndex(usize),
		#[error("Unknown/unsupported version: {0}")]
		Version(i32),
	}

	impl From<io::Error> for QuakeImportError {
		fn from(source: io::Error) -> Self {
			match source.kind() {
				io::ErrorKind::UnexpectedEof => QuakeImportError::Truncated,
				_ => QuakeImportError::IO { source: source },
			}
		}
	}

	fn tag_text(magic: &u32) -> String {
		String::from_utf8_lossy(&magic.to_le_bytes()).into_owned()
	}

	/// Group times are kept as stored, but engines expect them ascending
	pub(super) fn warn_times(kind: &str, times: &[f32]) {
		if times.windows(2).any(|w| !(w[0] < w[1])) {
			warn!("{} group times are not ascending: {:?}", kind, times);
		}
	}

	#[cfg(test)]
	mod tests {
		use super::QuakeImportError;
		use super::super::*;

		fn header_bytes(magic: &[u8; 4], version: i32) -> Vec<u8> {
			let mut data = magic.to_vec();
			data.extend_from_slice(&version.to_le_bytes());
			data.extend_from_slice(&[0; 80]);
			data
		}

		#[test]
		fn test_bad_magic() {
			let data = header_bytes(b"IDP2", 6);
			match QuakeModel::read(&mut data.as_slice()) {
				Err(e @ QuakeImportError::Magic(_)) => assert_eq!(e.to_string(), "Not an MDL file: \"IDP2\""),
				r => panic!("unexpected result: {:?}", r),
			}
		}

		#[test]
		fn test_bad_version() {
			let data = header_bytes(b"IDPO", 8);
			assert!(matches!(QuakeModel::read(&mut data.as_slice()), Err(QuakeImportError::Version(8))));
		}

		#[test]
		fn test_truncated_header() {
			let data = header_bytes(b"IDPO", 6);
			assert!(matches!(QuakeModel::read(&mut &data[..40]), Err(QuakeImportError::Truncated)));
		}

		#[test]
		fn test_empty_v3() {
			let data = header_bytes(b"IDPO", 3);
			let model = QuakeModel::read(&mut &data[..76]).unwrap();
			assert_eq!(model.header.profile, Profile::new(Ident::Idpo, Version::V3));
			assert_eq!(model.header.flags, 0);
			assert!(model.frames.is_empty());
		}

		#[test]
		fn test_bad_group_type() {
			let mut data = header_bytes(b"IDPO", 6);
			data.truncate(84);
			// one 1x1 skin
			data[48..52].copy_from_slice(&1u32.to_le_bytes());
			data[52..56].copy_from_slice(&1u32.to_le_bytes());
			data[56..60].copy_from_slice(&1u32.to_le_bytes());
			data.extend_from_slice(&2i32.to_le_bytes());
			assert!(matches!(QuakeModel::read(&mut data.as_slice()), Err(QuakeImportError::GroupType(2))));
		}
	}
}

#[cfg(feature = "export")]
pub mod export {
	use std::io;
	use thiserror::Error;

	#[derive(Debug, Error)]
	pub enum QuakeExportError {
		#[error("Declared {section} count is {declared}, found {found}")]
		Count {
			section: &'static str,
			declared: u32,
			found: usize,
		},
		#[error("Groups need at least one member")]
		EmptyGroup,
		#[error("Face {0} has {1} corners but {2} UVs")]
		FaceUvCount(usize, usize, usize),
		#[error("Frame {0} has {1} vertices, expected {2}")]
		FrameVertexCount(usize, usize, u32),
		#[error("I/O error")]
		IO {
			#[from]
			source: io::Error,
		},
		#[error("Image holds {0} pixels, expected {1}x{2}")]
		ImageSize(usize, usize, usize),
		#[error("Pose {0} has no position for vertex {1}")]
		MissingVertex(usize, usize),
		#[error("Groups cannot be nested")]
		NestedGroup,
		#[error("Mesh has no poses")]
		NoFrames,
		#[error("Skin {0} is {1} bytes, expected {2}")]
		SkinSize(usize, usize, usize),
		#[error("Skin images differ in size: {0}x{1} and {2}x{3}")]
		SkinDimensions(usize, usize, usize, usize),
		#[error("Texture coordinate index out of bounds in triangle {0}")]
		StVertIndex(usize),
		#[error("Group has {0} times for {1} members")]
		TimeCount(usize, usize),
		#[error("Group times must be strictly ascending, broken at index {0}")]
		TimeOrder(usize),
		#[error("Triangle {0} does not match version {1}")]
		TriangleVersion(usize, i32),
		#[error("Vertex index out of bounds in triangle {0}")]
		VertexIndex(usize),
	}
}

#[cfg(all(test, feature = "import", feature = "export"))]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use super::export::QuakeExportError;

	fn vert(x: u8, y: u8, z: u8, n: u8) -> Vertex {
		Vertex::new([x, y, z], n)
	}

	fn simple_frame(name: &str, seed: u8, md16: bool) -> SimpleFrame {
		let mut frame = SimpleFrame::new(name);
		for i in 0..4u8 {
			let mut v = vert(seed.wrapping_add(i * 7), 200 - i * 3, i * 50, i + 10);
			if md16 {
				v.frac = [i * 60, 255 - i, 128];
			}
			frame.push_vertex(v);
		}
		frame
	}

	/// Builds a consistent model exercising every section of the given profile
	fn sample(profile: Profile, grouped: bool) -> QuakeModel {
		let md16 = profile.ident.has_fractional_verts();
		let mut header = Header::new(profile);
		header.scale = Vec3::new(0.25, 0.5, 0.125);
		header.scale_origin = Vec3::new(-16.0, -8.5, 0.0);
		header.bounding_radius = 42.5;
		header.eye_position = Vec3::new(0.0, 0.0, 22.0);
		header.skin_width = 4;
		header.skin_height = 2;
		header.sync_type = SyncType::Random;
		if profile.version.has_flags_and_size() {
			header.set_effects(EffectFlags::ROTATE | EffectFlags::FIREBALL);
			header.size = 3.75;
		}

		let mut model = QuakeModel::new(header);
		model.skins.push(Skin::Single((0..8).collect()));

		let name = |s: &str| match profile.version.has_frame_names() {
			true => s.to_string(),
			false => String::new(),
		};

		if grouped {
			model.skins.push(Skin::group(vec![Skin::Single(vec![1; 8]), Skin::Single(vec![2; 8])],
				vec![0.1, 0.3]).unwrap());
		}

		if profile.version.uses_split_triangles() {
			model.st_verts = vec![StVert::new(0, 0), StVert::new(3, 0), StVert::new(3, 1)];
			model.st_verts[1].set_on_seam(true);
			model.tris.push(Triangle::NTri { orient: FaceOrient::Front, verts: [0, 1, 2], st_verts: [0, 1, 2] });
			model.tris.push(Triangle::NTri { orient: FaceOrient::Back, verts: [0, 2, 3], st_verts: [0, 2, 1] });
		} else {
			model.st_verts = vec![StVert::new(0, 0), StVert::new(3, 0), StVert::new(3, 1), StVert::new(0, 1)];
			model.st_verts[1].set_on_seam(true);
			model.tris.push(Triangle::Tri { orient: FaceOrient::Front, verts: [0, 1, 2] });
			model.tris.push(Triangle::Tri { orient: FaceOrient::Back, verts: [0, 2, 3] });
		}

		model.frames.push(Frame::Single(simple_frame(&name("stand1"), 3, md16)));
		if grouped {
			let members = vec![
				Frame::Single(simple_frame(&name("run1"), 40, md16)),
				Frame::Single(simple_frame(&name("run2"), 80, md16)),
			];
			model.frames.push(Frame::group(members, vec![0.1, 0.2]).unwrap());
		}

		model.sync_counts();
		model.header.num_verts = 4;
		model
	}

	fn round_trip(model: &QuakeModel) -> QuakeModel {
		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();
		QuakeModel::read(&mut data.as_slice()).unwrap()
	}

	#[test]
	fn test_round_trip() {
		let profiles = [
			Profile::new(Ident::Idpo, Version::V3),
			Profile::new(Ident::Idpo, Version::V6),
			Profile::new(Ident::Md16, Version::V6),
			Profile::new(Ident::Rapo, Version::V50),
			Profile::new(Ident::Md16, Version::V50),
		];

		for profile in profiles.iter() {
			for grouped in [false, true] {
				let model = sample(*profile, grouped);
				assert_eq!(model, round_trip(&model));
			}
		}
	}

	#[test]
	fn test_v6_layout() {
		let model = sample(Profile::default(), false);
		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();

		let header_len = 84;
		let skin_len = 4 + 8;
		let st_len = 4 * 12;
		let tri_len = 2 * 16;
		let frame_len = 4 + 8 + 16 + 4 * 4;
		assert_eq!(data.len(), header_len + skin_len + st_len + tri_len + frame_len);
		assert_eq!(&data[0..4], b"IDPO");
		assert_eq!(&data[4..8], &6i32.to_le_bytes());

		// on-seam flag of the second st vert
		let st1 = header_len + skin_len + 12;
		assert_eq!(&data[st1..st1 + 4], &ALIAS_ONSEAM.to_le_bytes());

		// frame name follows the bounding box
		let name = header_len + skin_len + st_len + tri_len + 4 + 8;
		assert_eq!(&data[name..name + 7], b"stand1\x00");
	}

	#[test]
	fn test_v50_layout() {
		let model = sample(Profile::new(Ident::Rapo, Version::V50), false);
		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();

		// num_st_verts trails the v6 header fields
		assert_eq!(&data[84..88], &3u32.to_le_bytes());
		let tris = 88 + 12 + 3 * 12;
		assert_eq!(&data[tris + 4..tris + 10], &[0, 0, 1, 0, 2, 0]);
	}

	#[test]
	fn test_md16_second_pass() {
		let model = sample(Profile::new(Ident::Md16, Version::V6), false);
		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();

		let frame = 84 + 12 + 4 * 12 + 2 * 16;
		let base = frame + 4 + 8 + 16;
		let frac = base + 16;
		assert_eq!(&data[base..base + 4], &[3, 200, 0, 10]);
		assert_eq!(&data[frac..frac + 4], &[0, 255, 128, 10]);
		assert_eq!(data.len(), frac + 16);

		let read = round_trip(&model);
		let v = read.frames[0].simple_frames()[0].verts[1];
		assert_eq!(v.position(), Vec3::new(10.0 + 60.0 / 256.0, 197.0 + 254.0 / 256.0, 50.5));
	}

	#[test]
	fn test_truncated_frames() {
		let model = sample(Profile::default(), true);
		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();
		data.truncate(data.len() - 3);

		assert!(matches!(QuakeModel::read(&mut data.as_slice()),
			Err(import::QuakeImportError::Truncated)));
	}

	#[test]
	fn test_group_times() {
		let frames = || vec![
			Frame::Single(simple_frame("a", 0, false)),
			Frame::Single(simple_frame("b", 1, false)),
			Frame::Single(simple_frame("c", 2, false)),
		];

		assert!(Frame::group(frames(), vec![0.0, 0.1, 0.3]).is_ok());
		assert!(matches!(Frame::group(frames(), vec![0.0, 0.3, 0.1]), Err(QuakeExportError::TimeOrder(2))));
		assert!(matches!(Frame::group(frames(), vec![0.0, 0.1]), Err(QuakeExportError::TimeCount(2, 3))));

		let skins = || vec![Skin::Single(vec![0]), Skin::Single(vec![1]), Skin::Single(vec![2])];
		assert!(Skin::group(skins(), vec![0.0, 0.1, 0.3]).is_ok());
		assert!(matches!(Skin::group(skins(), vec![0.0, 0.3, 0.1]), Err(QuakeExportError::TimeOrder(2))));
		assert!(matches!(Skin::group(vec![], vec![]), Err(QuakeExportError::EmptyGroup)));
	}

	#[test]
	fn test_nested_group() {
		let inner = Frame::group(vec![Frame::Single(simple_frame("a", 0, false))], vec![0.1]).unwrap();
		assert!(matches!(Frame::group(vec![inner], vec![0.1]), Err(QuakeExportError::NestedGroup)));

		let inner = Skin::group(vec![Skin::Single(vec![0])], vec![0.1]).unwrap();
		assert!(matches!(Skin::group(vec![inner], vec![0.1]), Err(QuakeExportError::NestedGroup)));
	}

	#[test]
	fn test_group_bounds() {
		let a = simple_frame("a", 3, false);
		let b = simple_frame("b", 80, false);
		assert_eq!(a.bb_min.v, [3, 191, 0]);
		assert_eq!(a.bb_max.v, [24, 200, 150]);

		match Frame::group(vec![Frame::Single(a), Frame::Single(b)], vec![0.1, 0.2]).unwrap() {
			Frame::Group { bb_min, bb_max, .. } => {
				assert_eq!(bb_min.v, [3, 191, 0]);
				assert_eq!(bb_max.v, [101, 200, 150]);
			},
			f => panic!("not a group: {:?}", f),
		}
	}

	#[test]
	fn test_validate() {
		let mut model = sample(Profile::default(), false);
		model.skins.push(Skin::Single(vec![0; 3]));
		model.sync_counts();
		assert!(matches!(model.validate(), Err(QuakeExportError::SkinSize(1, 3, 8))));

		let mut model = sample(Profile::default(), false);
		model.header.num_tris = 5;
		assert!(matches!(model.write(&mut Vec::<u8>::new()), Err(QuakeExportError::Count { declared: 5, found: 2, .. })));

		let mut model = sample(Profile::default(), false);
		if let Frame::Single(f) = &mut model.frames[0] {
			f.verts.pop();
		}
		assert!(matches!(model.validate(), Err(QuakeExportError::FrameVertexCount(0, 3, 4))));

		let mut model = sample(Profile::default(), false);
		model.tris[0] = Triangle::Tri { orient: FaceOrient::Front, verts: [0, 1, 4] };
		assert!(matches!(model.validate(), Err(QuakeExportError::VertexIndex(0))));

		let mut model = sample(Profile::new(Ident::Rapo, Version::V50), false);
		model.tris[1] = Triangle::Tri { orient: FaceOrient::Front, verts: [0, 1, 2] };
		assert!(matches!(model.validate(), Err(QuakeExportError::TriangleVersion(1, 50))));
	}

	#[test]
	fn test_validate_group_times() {
		let mut model = sample(Profile::default(), true);
		model.skins[1] = Skin::Group { times: vec![0.3, 0.1], data: vec![vec![1; 8], vec![2; 8]] };
		assert!(matches!(model.validate(), Err(QuakeExportError::TimeOrder(1))));
		assert!(matches!(model.write(&mut Vec::<u8>::new()), Err(QuakeExportError::TimeOrder(1))));

		let mut model = sample(Profile::default(), true);
		if let Frame::Group { times, .. } = &mut model.frames[1] {
			times.push(0.3);
		}
		assert!(matches!(model.validate(), Err(QuakeExportError::TimeCount(3, 2))));
		assert!(matches!(model.write(&mut Vec::<u8>::new()), Err(QuakeExportError::TimeCount(3, 2))));
	}

	#[test]
	fn test_unnamed_effect_bits() {
		let mut model = sample(Profile::default(), false);
		model.header.flags = EffectFlags::ROTATE.bits() | 1 << 26;

		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();
		assert_eq!(&data[76..80], &0x4000008u32.to_le_bytes());

		let mut read = QuakeModel::read(&mut data.as_slice()).unwrap();
		assert_eq!(read.header.flags, 0x4000008);
		assert_eq!(read.header.effects(), EffectFlags::ROTATE);

		let mut again: Vec<u8> = vec![];
		read.write(&mut again).unwrap();
		assert_eq!(again, data);

		read.header.set_effects(EffectFlags::HOLEY);
		assert_eq!(read.header.flags, EffectFlags::HOLEY.bits() | 1 << 26);
	}

	#[test]
	fn test_raw_on_seam() {
		let mut model = sample(Profile::default(), false);
		model.st_verts[1].on_seam = 1;

		let mut data: Vec<u8> = vec![];
		model.write(&mut data).unwrap();
		// header, one 8 byte skin behind its tag, then the first st vert
		let st1 = 84 + 4 + 8 + 12;
		assert_eq!(&data[st1..st1 + 4], &[1, 0, 0, 0]);

		let read = QuakeModel::read(&mut data.as_slice()).unwrap();
		assert_eq!(read.st_verts[1].on_seam, 1);
		assert!(read.st_verts[1].is_on_seam());
		assert!(!read.st_verts[0].is_on_seam());

		let mut again: Vec<u8> = vec![];
		read.write(&mut again).unwrap();
		assert_eq!(again, data);
	}

	#[test]
	fn test_long_frame_name() {
		let mut model = sample(Profile::default(), false);
		if let Frame::Single(f) = &mut model.frames[0] {
			f.name = "a_rather_long_frame_name".to_string();
		}

		let read = round_trip(&model);
		assert_eq!(read.frames[0].simple_frames()[0].name, "a_rather_long_fr");
	}

	#[test]
	fn test_effect_names() {
		let flags = EffectFlags::ROCKET | EffectFlags::MIP_MAP_FAR;
		assert_eq!(flags.names(), vec!["EF_ROCKET", "EF_MIP_MAP_FAR"]);
		assert_eq!(EffectFlags::from_name("EF_SCARAB"), Some(EffectFlags::SCARAB));
		assert_eq!(EffectFlags::from_name("EF_NONE"), None);

		for (flag, name) in EFFECT_NAMES.iter() {
			assert_eq!(flag.bits().count_ones(), 1);
			assert_eq!(EffectFlags::from_name(name), Some(*flag));
		}
		assert_eq!(EFFECT_NAMES.iter().fold(EffectFlags::empty(), |a, (f, _)| a | *f), EffectFlags::all());
	}
}
