use lumen_core::accel::Accel;
use lumen_core::comp::{Plugin, Registry};
use lumen_core::geometry::{AccelHit, Aabb, SceneTriangle};
use lumen_core::json::{self, Json};
use lumen_core::math::Ray;
use anyhow::Result;
use std::cmp::Ordering;

const LEAF_SIZE: usize = 4;

pub struct NanortPlugin;

impl Plugin for NanortPlugin {
    fn name(&self) -> &'static str {
        "accel_nanort"
    }

    fn register(&self, registry: &mut Registry) {
        registry.register::<dyn Accel, _>("accel::nanort", || Box::new(AccelNanort::default()));
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    /// The left child follows the node directly.
    Inner { bbox: Aabb, right: usize },
    Leaf { bbox: Aabb, start: usize, end: usize },
}

impl Node {
    fn bbox(&self) -> &Aabb {
        match self {
            Node::Inner { bbox, .. } | Node::Leaf { bbox, .. } => bbox,
        }
    }
}

/// Median-split BVH stored as a flat node array.
pub struct AccelNanort {
    leaf_size: usize,
    triangles: Vec<SceneTriangle>,
    indices: Vec<usize>,
    nodes: Vec<Node>,
}

impl Default for AccelNanort {
    fn default() -> Self {
        Self {
            leaf_size: LEAF_SIZE,
            triangles: Vec::new(),
            indices: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

impl AccelNanort {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let tris = &self.triangles;
        let slice = &mut self.indices[start..end];
        let bbox = slice
            .iter()
            .fold(Aabb::empty(), |b, &i| b.union(tris[i].bound()));

        let index = self.nodes.len();
        if slice.len() <= self.leaf_size {
            self.nodes.push(Node::Leaf { bbox, start, end });
            return index;
        }

        let axis = bbox.longest_axis();
        slice.sort_by(|&a, &b| {
            let ca = tris[a].centroid()[axis];
            let cb = tris[b].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
        });

        // placeholder, patched once the right child's index is known
        self.nodes.push(Node::Inner { bbox, right: 0 });
        let mid = start + (end - start) / 2;
        self.build_node(start, mid);
        let right = self.build_node(mid, end);
        self.nodes[index] = Node::Inner { bbox, right };
        index
    }
}

impl Accel for AccelNanort {
    fn construct(&mut self, prop: &Json) -> Result<()> {
        self.leaf_size = json::value_or(prop, "leaf_size", LEAF_SIZE)?.max(1);
        Ok(())
    }

    fn build(&mut self, triangles: &[SceneTriangle]) -> Result<()> {
        self.triangles = triangles.to_vec();
        self.indices = (0..triangles.len()).collect();
        self.nodes.clear();
        if !self.triangles.is_empty() {
            self.build_node(0, self.triangles.len());
        }
        log::debug!(
            "nanort: {} triangles, {} nodes",
            self.triangles.len(),
            self.nodes.len()
        );
        Ok(())
    }

    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<AccelHit> {
        let mut closest = None;
        let mut closest_t = t_max;
        let mut stack = Vec::with_capacity(64);
        if !self.nodes.is_empty() {
            stack.push(0);
        }

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bbox().hit(ray, t_min, closest_t) {
                continue;
            }
            match *node {
                Node::Inner { right, .. } => {
                    stack.push(right);
                    stack.push(index + 1);
                }
                Node::Leaf { start, end, .. } => {
                    for &i in &self.indices[start..end] {
                        let tri = &self.triangles[i];
                        if let Some((t, uv)) = tri.intersect(ray, t_min, closest_t) {
                            closest_t = t;
                            closest = Some(AccelHit {
                                t,
                                uv,
                                primitive: tri.primitive,
                                face: tri.face,
                            });
                        }
                    }
                }
            }
        }
        closest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::math::Vec3;

    fn grid(n: usize) -> Vec<SceneTriangle> {
        (0..n * n)
            .map(|i| {
                let (x, y) = ((i % n) as f32, (i / n) as f32);
                SceneTriangle {
                    p1: Vec3::new(x, y, 0.0),
                    p2: Vec3::new(x + 1.0, y, 0.0),
                    p3: Vec3::new(x, y + 1.0, 0.0),
                    primitive: 1,
                    face: i,
                }
            })
            .collect()
    }

    #[test]
    fn finds_the_right_cell() {
        let mut accel = AccelNanort::default();
        accel.build(&grid(8)).unwrap();
        assert!(accel.num_nodes() > 1);

        let ray = Ray {
            origin: Vec3::new(3.2, 5.2, 2.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        let hit = accel.intersect(&ray, 0.0, f32::INFINITY).unwrap();
        assert_eq!(hit.face, 5 * 8 + 3);
        assert_eq!(hit.primitive, 1);
        assert!((hit.t - 2.0).abs() < 1e-6);
    }

    #[test]
    fn empty_scene_never_hits() {
        let mut accel = AccelNanort::default();
        accel.build(&[]).unwrap();
        let ray = Ray {
            origin: Vec3::zero(),
            direction: Vec3::new(1.0, 0.0, 0.0),
        };
        assert!(accel.intersect(&ray, 0.0, f32::INFINITY).is_none());
    }
}
