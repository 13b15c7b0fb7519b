use crate::bvh::SahBvh;
use crate::comp::Registry;
use crate::geometry::{closest_hit, AccelHit, SceneTriangle};
use crate::json::Json;
use crate::math::Ray;
use anyhow::Result;

/// Ray-scene intersection structure over world-space triangles.
pub trait Accel: Send + Sync {
    fn construct(&mut self, _prop: &Json) -> Result<()> {
        Ok(())
    }

    fn build(&mut self, triangles: &[SceneTriangle]) -> Result<()>;

    /// Closest hit with `t` in `[t_min, t_max]`.
    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<AccelHit>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Accel, _>("accel::naive", || Box::new(NaiveAccel::default()));
    registry.register::<dyn Accel, _>("accel::sahbvh", || Box::new(SahBvh::default()));
}

#[derive(Default)]
pub struct NaiveAccel {
    triangles: Vec<SceneTriangle>,
}

impl Accel for NaiveAccel {
    fn build(&mut self, triangles: &[SceneTriangle]) -> Result<()> {
        self.triangles = triangles.to_vec();
        Ok(())
    }

    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<AccelHit> {
        closest_hit(&self.triangles, ray, t_min, t_max)
    }
}
