//! Compression of normals to the 162-entry precalculated normal table
//!
//! The table is mirrored in every octant, so only first-octant directions are searched and the
//! final index is picked from the signs of the input. Each row lists a direction followed by its
//! index for the octants `+++ ++- +-+ +-- -++ -+- --+ ---`. The search is limited to the group
//! belonging to the dominant axis.

use ultraviolet::vec::Vec3;

const X_GROUP: [([f32; 3], [u8; 8]); 11] = [
	([1.0000, 0.0000, 0.0000], [52, 52, 52, 52, 143, 143, 143, 143]),
	([0.9554, 0.2952, 0.0000], [51, 51, 55, 55, 141, 141, 145, 145]),
	([0.9511, 0.1625, 0.2629], [53, 63, 57, 70, 142, 148, 146, 151]),
	([0.8642, 0.4429, 0.2389], [46, 61, 56, 69, 19, 147, 123, 150]),
	([0.8507, 0.5257, 0.0000], [41, 41, 54, 54, 18, 18, 116, 116]),
	([0.8507, 0.0000, 0.5257], [60, 67, 60, 67, 144, 155, 144, 155]),
	([0.8090, 0.3090, 0.5000], [48, 62, 58, 68, 16, 149, 124, 152]),
	([0.7166, 0.6817, 0.1476], [42, 43, 111, 100, 20, 25, 118, 117]),
	([0.6882, 0.5878, 0.4253], [47, 76, 140, 101, 21, 156, 125, 161]),
	([0.6817, 0.1476, 0.7166], [49, 65, 59, 66, 15, 153, 126, 154]),
	([0.5878, 0.4253, 0.6882], [50, 75, 139, 102, 17, 157, 128, 160]),
];

const Y_GROUP: [([f32; 3], [u8; 8]); 11] = [
	([0.0000, 1.0000, 0.0000], [32, 32, 104, 104, 32, 32, 104, 104]),
	([0.0000, 0.9554, 0.2952], [33, 30, 107, 103, 33, 30, 107, 103]),
	([0.2629, 0.9511, 0.1625], [36, 39, 109, 105, 34, 31, 122, 115]),
	([0.2389, 0.8642, 0.4429], [35, 38, 108, 97, 23, 29, 121, 113]),
	([0.5257, 0.8507, 0.0000], [44, 44, 112, 112, 27, 27, 119, 119]),
	([0.0000, 0.8507, 0.5257], [6, 28, 106, 90, 6, 28, 106, 90]),
	([0.5000, 0.8090, 0.3090], [37, 40, 110, 98, 22, 26, 120, 114]),
	([0.1476, 0.7166, 0.6817], [8, 71, 136, 92, 7, 77, 130, 91]),
	([0.4253, 0.6882, 0.5878], [45, 73, 138, 99, 24, 158, 131, 159]),
	([0.7166, 0.6817, 0.1476], [42, 43, 111, 100, 20, 25, 118, 117]),
	([0.6882, 0.5878, 0.4253], [47, 76, 140, 101, 21, 156, 125, 161]),
];

const Z_GROUP: [([f32; 3], [u8; 8]); 11] = [
	([0.0000, 0.0000, 1.0000], [5, 84, 5, 84, 5, 84, 5, 84]),
	([0.2952, 0.0000, 0.9554], [12, 85, 12, 85, 2, 82, 2, 82]),
	([0.1625, 0.2629, 0.9511], [14, 86, 134, 96, 4, 83, 132, 89]),
	([0.4429, 0.2389, 0.8642], [13, 74, 133, 95, 1, 81, 127, 87]),
	([0.5257, 0.0000, 0.8507], [11, 64, 11, 64, 0, 80, 0, 80]),
	([0.0000, 0.5257, 0.8507], [9, 79, 137, 93, 9, 79, 137, 93]),
	([0.3090, 0.5000, 0.8090], [10, 72, 135, 94, 3, 78, 129, 88]),
	([0.6817, 0.1476, 0.7166], [49, 65, 59, 66, 15, 153, 126, 154]),
	([0.5878, 0.4253, 0.6882], [50, 75, 139, 102, 17, 157, 128, 160]),
	([0.1476, 0.7166, 0.6817], [8, 71, 136, 92, 7, 77, 130, 91]),
	([0.4253, 0.6882, 0.5878], [45, 73, 138, 99, 24, 158, 131, 159]),
];

/// Returns the index of the precalculated normal closest to `n`
pub fn compress_normal(n: Vec3) -> u8 {
	let a = Vec3::new(n.x.abs(), n.y.abs(), n.z.abs());

	let group: &[([f32; 3], [u8; 8])] = if a.y > a.x && a.y > a.z {
		&Y_GROUP
	} else if a.z > a.x && a.z > a.y {
		&Z_GROUP
	} else {
		&X_GROUP
	};

	let mut best = 0;
	let mut best_dot = -1.0;
	for (i, (dir, _)) in group.iter().enumerate() {
		let dot = a.dot(Vec3::new(dir[0], dir[1], dir[2]));
		if dot > best_dot {
			best = i;
			best_dot = dot;
		}
	}

	let mut octant = 0;
	if n.x < 0.0 {
		octant += 4;
	}
	if n.y < 0.0 {
		octant += 2;
	}
	if n.z < 0.0 {
		octant += 1;
	}

	group[best].1[octant]
}
