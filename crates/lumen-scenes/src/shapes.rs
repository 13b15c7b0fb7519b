//! Procedural meshes in `mesh::raw` form.

use serde_json::{json, Value};
use std::f32::consts::PI;

/// Two triangles spanning `[-1, 1]^2` at `z = 0`, facing `+z`.
pub fn quad() -> Value {
    json!({
        "ps": [-1,-1,0, 1,-1,0, 1,1,0, -1,1,0],
        "ns": [0,0,1],
        "ts": [0,0, 1,0, 1,1, 0,1],
        "fs": {
            "p": [0,1,2, 0,2,3],
            "n": [0,0,0, 0,0,0],
            "t": [0,1,2, 0,2,3]
        }
    })
}

/// Cube spanning `[-1, 1]^3` with one normal per face.
pub fn cube() -> Value {
    const QUADS: [([usize; 4], usize); 6] = [
        ([0, 3, 2, 1], 0),
        ([4, 5, 6, 7], 1),
        ([0, 4, 7, 3], 2),
        ([1, 2, 6, 5], 3),
        ([0, 1, 5, 4], 4),
        ([3, 7, 6, 2], 5),
    ];
    let mut p = Vec::new();
    let mut n = Vec::new();
    for (q, normal) in QUADS {
        p.extend_from_slice(&[q[0], q[1], q[2], q[0], q[2], q[3]]);
        n.extend_from_slice(&[normal; 6]);
    }
    json!({
        "ps": [
            -1,-1,-1, 1,-1,-1, 1,1,-1, -1,1,-1,
            -1,-1,1, 1,-1,1, 1,1,1, -1,1,1
        ],
        "ns": [0,0,-1, 0,0,1, -1,0,0, 1,0,0, 0,-1,0, 0,1,0],
        "fs": {"p": p, "n": n}
    })
}

/// Unit UV sphere with smooth normals.
pub fn sphere(rings: usize, segments: usize) -> Value {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let mut ps = Vec::with_capacity((rings + 1) * (segments + 1) * 3);
    for i in 0..=rings {
        let theta = PI * i as f32 / rings as f32;
        for j in 0..=segments {
            let phi = 2.0 * PI * j as f32 / segments as f32;
            ps.extend_from_slice(&[theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()]);
        }
    }

    let row = segments + 1;
    let mut fs = Vec::new();
    for i in 0..rings {
        for j in 0..segments {
            let a = i * row + j;
            let b = a + row;
            // skip the degenerate triangle at each pole
            if i != 0 {
                fs.extend_from_slice(&[a, a + 1, b]);
            }
            if i != rings - 1 {
                fs.extend_from_slice(&[a + 1, b + 1, b]);
            }
        }
    }

    // positions on a unit sphere double as normals
    json!({"ps": ps, "ns": ps, "fs": {"p": fs, "n": fs}})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn len(v: &Value, key: &str) -> usize {
        v[key].as_array().map_or(0, Vec::len)
    }

    #[test]
    fn cube_has_twelve_triangles() {
        let cube = cube();
        assert_eq!(cube["fs"]["p"].as_array().unwrap().len(), 36);
        assert_eq!(len(&cube, "ns"), 18);
    }

    #[test]
    fn sphere_triangle_count_excludes_pole_caps() {
        let sphere = sphere(4, 8);
        assert_eq!(len(&sphere, "ps"), 5 * 9 * 3);
        let faces = sphere["fs"]["p"].as_array().unwrap().len() / 3;
        assert_eq!(faces, 2 * 4 * 8 - 2 * 8);
    }
}
