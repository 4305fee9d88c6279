use ultraviolet::vec::{
	Vec2,
	Vec3
};

#[derive(Clone, Debug, PartialEq)]
pub enum Face {
	Triangle([usize; 3]),
	Quad([usize; 4]),
	Ngon(Vec<usize>),
}

impl Face {
	pub fn indices(&self) -> &[usize] {
		match self {
			Face::Triangle(t) => &t[..],
			Face::Quad(q) => &q[..],
			Face::Ngon(n) => &n[..],
		}
	}

	/// Fan-triangulates the face around its first corner.
	///
	/// Yields corner positions within the face (not vertex indices), so per-corner data such as
	/// UVs can be looked up alongside. A face with `n` corners gives `n - 2` triangles.
	pub fn fan(&self) -> impl Iterator<Item = [usize; 3]> {
		let n = self.indices().len();
		(1..n.saturating_sub(1)).map(|i| [0, i, i + 1])
	}
}

/// One pose of a mesh: a position and normal for every vertex
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshFrame {
	pub name: Option<String>,
	pub positions: Vec<Vec3>,
	pub normals: Vec<Vec3>,
}

impl MeshFrame {
	pub fn new(positions: Vec<Vec3>) -> MeshFrame {
		MeshFrame {
			name: None,
			positions: positions,
			normals: vec![],
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pose {
	Single(MeshFrame),
	/// Sub-animation; `times` holds the cumulative end time of each frame
	Group {
		frames: Vec<MeshFrame>,
		times: Vec<f32>,
	},
}

/// Animated polygon mesh, sharing one topology across all poses
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
	pub faces: Vec<Face>,
	/// Per-face UVs, one per face corner
	pub uvs: Vec<Vec<Vec2>>,
	pub poses: Vec<Pose>,
}
