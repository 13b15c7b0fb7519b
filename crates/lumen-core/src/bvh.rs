use crate::accel::Accel;
use crate::geometry::{AccelHit, Aabb, SceneTriangle};
use crate::json::{self, Json};
use crate::math::Ray;
use anyhow::Result;
use std::cmp::Ordering;

const NUM_BINS: usize = 12;
const DEFAULT_MAX_LEAF: usize = 4;

#[derive(Debug)]
struct BvhNode {
    bbox: Aabb,
    left: Option<Box<BvhNode>>,
    right: Option<Box<BvhNode>>,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    bbox: Aabb,
    count: usize,
}

impl BvhNode {
    fn leaf(bbox: Aabb, start: usize, end: usize) -> Self {
        Self {
            bbox,
            left: None,
            right: None,
            start,
            end,
        }
    }

    fn build(indices: &mut [usize], tris: &[SceneTriangle], offset: usize, max_leaf: usize) -> Self {
        let bbox = indices
            .iter()
            .fold(Aabb::empty(), |b, &i| b.union(tris[i].bound()));
        if indices.len() <= max_leaf {
            return Self::leaf(bbox, offset, offset + indices.len());
        }

        let centroids = indices
            .iter()
            .fold(Aabb::empty(), |b, &i| b.grow(tris[i].centroid()));
        let axis = centroids.longest_axis();
        let lo = centroids.min[axis];
        let span = centroids.max[axis] - lo;
        if span <= 0.0 {
            // all centroids coincide; nothing to split on
            return Self::leaf(bbox, offset, offset + indices.len());
        }

        let bin_of = |i: usize| {
            let b = ((tris[i].centroid()[axis] - lo) / span * NUM_BINS as f32) as usize;
            b.min(NUM_BINS - 1)
        };

        let mut bins = [Bin {
            bbox: Aabb::empty(),
            count: 0,
        }; NUM_BINS];
        for &i in indices.iter() {
            let bin = &mut bins[bin_of(i)];
            bin.bbox = bin.bbox.union(tris[i].bound());
            bin.count += 1;
        }

        // cost of splitting after bin `s`, for s in 0..NUM_BINS-1
        let mut best = (f32::INFINITY, 0);
        for s in 0..NUM_BINS - 1 {
            let (l, r) = bins.split_at(s + 1);
            let side = |bins: &[Bin]| {
                bins.iter().fold((Aabb::empty(), 0), |(b, n), bin| {
                    (b.union(bin.bbox), n + bin.count)
                })
            };
            let (lb, ln) = side(l);
            let (rb, rn) = side(r);
            if ln == 0 || rn == 0 {
                continue;
            }
            let cost = lb.surface_area() * ln as f32 + rb.surface_area() * rn as f32;
            if cost < best.0 {
                best = (cost, s);
            }
        }

        let mid = if best.0.is_finite() {
            partition(indices, |i| bin_of(i) <= best.1)
        } else {
            0
        };
        let mid = if mid == 0 || mid == indices.len() {
            // degenerate binning; fall back to a median split
            let mid = indices.len() / 2;
            indices.select_nth_unstable_by(mid, |&a, &b| {
                let ca = tris[a].centroid()[axis];
                let cb = tris[b].centroid()[axis];
                ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
            });
            mid
        } else {
            mid
        };

        let (left_indices, right_indices) = indices.split_at_mut(mid);
        let left = Box::new(BvhNode::build(left_indices, tris, offset, max_leaf));
        let right = Box::new(BvhNode::build(right_indices, tris, offset + mid, max_leaf));
        Self {
            bbox: left.bbox.union(right.bbox),
            left: Some(left),
            right: Some(right),
            start: 0,
            end: 0,
        }
    }

    fn hit(&self, ray: &Ray, t_min: f32, t_max: f32, tris: &[SceneTriangle], indices: &[usize]) -> Option<AccelHit> {
        if !self.bbox.hit(ray, t_min, t_max) {
            return None;
        }

        if self.left.is_none() && self.right.is_none() {
            let mut closest = None;
            let mut closest_t = t_max;
            for &i in &indices[self.start..self.end] {
                let tri = &tris[i];
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
            return closest;
        }

        let mut closest = None;
        let mut closest_t = t_max;
        for child in [&self.left, &self.right].into_iter().flatten() {
            if let Some(hit) = child.hit(ray, t_min, closest_t, tris, indices) {
                closest_t = hit.t;
                closest = Some(hit);
            }
        }
        closest
    }

    fn depth(&self) -> usize {
        let left = self.left.as_ref().map_or(0, |n| n.depth());
        let right = self.right.as_ref().map_or(0, |n| n.depth());
        1 + left.max(right)
    }
}

/// Moves the elements matching `pred` to the front and returns how many
/// there are.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut first = 0;
    for i in 0..indices.len() {
        if pred(indices[i]) {
            indices.swap(first, i);
            first += 1;
        }
    }
    first
}

/// Binned SAH bounding volume hierarchy.
pub struct SahBvh {
    max_leaf: usize,
    triangles: Vec<SceneTriangle>,
    indices: Vec<usize>,
    root: Option<BvhNode>,
}

impl Default for SahBvh {
    fn default() -> Self {
        Self {
            max_leaf: DEFAULT_MAX_LEAF,
            triangles: Vec::new(),
            indices: Vec::new(),
            root: None,
        }
    }
}

impl SahBvh {
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, BvhNode::depth)
    }
}

impl Accel for SahBvh {
    fn construct(&mut self, prop: &Json) -> Result<()> {
        self.max_leaf = json::value_or(prop, "max_leaf", DEFAULT_MAX_LEAF)?.max(1);
        Ok(())
    }

    fn build(&mut self, triangles: &[SceneTriangle]) -> Result<()> {
        self.triangles = triangles.to_vec();
        self.indices = (0..triangles.len()).collect();
        self.root = if self.indices.is_empty() {
            None
        } else {
            Some(BvhNode::build(&mut self.indices, &self.triangles, 0, self.max_leaf))
        };
        log::debug!(
            "sahbvh: {} triangles, depth {}",
            self.triangles.len(),
            self.depth()
        );
        Ok(())
    }

    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<AccelHit> {
        self.root
            .as_ref()?
            .hit(ray, t_min, t_max, &self.triangles, &self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn strip(n: usize) -> Vec<SceneTriangle> {
        (0..n)
            .map(|i| {
                let x = i as f32 * 2.0;
                SceneTriangle {
                    p1: Vec3::new(x, 0.0, 0.0),
                    p2: Vec3::new(x + 1.0, 0.0, 0.0),
                    p3: Vec3::new(x, 1.0, 0.0),
                    primitive: 0,
                    face: i,
                }
            })
            .collect()
    }

    #[test]
    fn partition_moves_matches_to_front() {
        let mut v = [5, 1, 4, 2, 3];
        let n = partition(&mut v, |i| i < 3);
        assert_eq!(n, 2);
        assert!(v[..2].iter().all(|&i| i < 3));
    }

    #[test]
    fn splits_until_leaves_are_small() {
        let mut bvh = SahBvh::default();
        bvh.build(&strip(64)).unwrap();
        assert!(bvh.depth() > 1);

        let ray = Ray {
            origin: Vec3::new(40.2, 0.2, 1.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        let hit = bvh.intersect(&ray, 0.0, f32::INFINITY).unwrap();
        assert_eq!(hit.face, 20);
    }

    #[test]
    fn empty_and_coincident_inputs() {
        let mut bvh = SahBvh::default();
        bvh.build(&[]).unwrap();
        let ray = Ray {
            origin: Vec3::zero(),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(bvh.intersect(&ray, 0.0, f32::INFINITY).is_none());

        let same = vec![strip(1)[0]; 10];
        bvh.build(&same).unwrap();
        assert_eq!(bvh.depth(), 1);
    }
}
