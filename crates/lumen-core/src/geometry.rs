use crate::math::{Ray, Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn grow(self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Inclusive point test.
    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|axis| self.min[axis] <= p[axis] && p[axis] <= self.max[axis])
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn longest_axis(&self) -> usize {
        let extent = self.extent();
        if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        }
    }

    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.extent();
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    /// Slab test against the ray segment `[t_min, t_max]`.
    pub fn hit(&self, ray: &Ray, mut t_min: f32, mut t_max: f32) -> bool {
        for axis in 0..3 {
            if !hit_axis(
                self.min[axis],
                self.max[axis],
                ray.origin[axis],
                ray.direction[axis],
                &mut t_min,
                &mut t_max,
            ) {
                return false;
            }
        }
        true
    }
}

fn hit_axis(min: f32, max: f32, origin: f32, direction: f32, t_min: &mut f32, t_max: &mut f32) -> bool {
    if direction == 0.0 {
        return origin >= min && origin <= max;
    }

    let inv_d = 1.0 / direction;
    let mut t0 = (min - origin) * inv_d;
    let mut t1 = (max - origin) * inv_d;
    if inv_d < 0.0 {
        std::mem::swap(&mut t0, &mut t1);
    }

    *t_min = t0.max(*t_min);
    *t_max = t1.min(*t_max);
    *t_max >= *t_min
}

/// A world-space triangle tagged with where it came from.
#[derive(Debug, Clone, Copy)]
pub struct SceneTriangle {
    pub p1: Vec3,
    pub p2: Vec3,
    pub p3: Vec3,
    pub primitive: usize,
    pub face: usize,
}

impl SceneTriangle {
    pub fn bound(&self) -> Aabb {
        Aabb::empty().grow(self.p1).grow(self.p2).grow(self.p3)
    }

    pub fn centroid(&self) -> Vec3 {
        (self.p1 + self.p2 + self.p3) / 3.0
    }

    /// Möller–Trumbore. Returns the distance and the barycentric
    /// coordinates of the hit relative to `p2` and `p3`.
    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<(f32, Vec2)> {
        let e1 = self.p2 - self.p1;
        let e2 = self.p3 - self.p1;
        let p = ray.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = ray.origin - self.p1;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(e1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = e2.dot(q) * inv_det;
        if t < t_min || t > t_max {
            return None;
        }
        Some((t, Vec2::new(u, v)))
    }
}

/// Closest hit reported by an accelerator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelHit {
    pub t: f32,
    pub uv: Vec2,
    pub primitive: usize,
    pub face: usize,
}

/// Linear scan over `triangles`, used as the reference every accelerator
/// must agree with.
pub fn closest_hit<'a, I>(triangles: I, ray: &Ray, t_min: f32, t_max: f32) -> Option<AccelHit>
where
    I: IntoIterator<Item = &'a SceneTriangle>,
{
    let mut closest = None;
    let mut closest_t = t_max;
    for tri in triangles {
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
    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> SceneTriangle {
        SceneTriangle {
            p1: Vec3::new(-1.0, -1.0, 0.0),
            p2: Vec3::new(1.0, -1.0, 0.0),
            p3: Vec3::new(-1.0, 1.0, 0.0),
            primitive: 2,
            face: 5,
        }
    }

    #[test]
    fn ray_hits_triangle_with_barycentrics() {
        let ray = Ray {
            origin: Vec3::new(0.0, -0.5, 2.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        let (t, uv) = tri().intersect(&ray, 0.0, f32::INFINITY).unwrap();
        assert!((t - 2.0).abs() < 1e-6);
        assert!((uv.x - 0.5).abs() < 1e-6);
        assert!((uv.y - 0.25).abs() < 1e-6);
    }

    #[test]
    fn ray_misses_outside_and_beyond_range() {
        let outside = Ray {
            origin: Vec3::new(0.9, 0.9, 2.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(tri().intersect(&outside, 0.0, f32::INFINITY).is_none());

        let inside = Ray {
            origin: Vec3::new(-0.5, -0.5, 2.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(tri().intersect(&inside, 0.0, 1.0).is_none());
    }

    #[test]
    fn aabb_slab_test_handles_axis_parallel_rays() {
        let bbox = tri().bound();
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(bbox.hit(&ray, 0.0, f32::INFINITY));

        let parallel = Ray {
            origin: Vec3::new(0.0, 2.0, 5.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(!bbox.hit(&parallel, 0.0, f32::INFINITY));
    }

    #[test]
    fn closest_hit_picks_nearest() {
        let mut far = tri();
        far.p1.z = -1.0;
        far.p2.z = -1.0;
        far.p3.z = -1.0;
        far.face = 9;
        let ray = Ray {
            origin: Vec3::new(-0.5, -0.5, 2.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        let hit = closest_hit([far, tri()].iter(), &ray, 0.0, f32::INFINITY).unwrap();
        assert_eq!(hit.face, 5);
        assert_eq!(hit.primitive, 2);
    }
}
