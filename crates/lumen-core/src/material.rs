use crate::assets::AssetContext;
use crate::comp::Registry;
use crate::json::{self, Json};
use crate::math::Vec3;
use crate::scene::PointGeometry;
use anyhow::Result;

pub trait Material: Send + Sync {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()>;

    /// Albedo at the given point, or `None` when the material has no
    /// meaningful reflectance (e.g. pure emitters).
    fn reflectance(&self, geom: &PointGeometry) -> Option<Vec3>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Material, _>("material::diffuse", || {
        Box::new(DiffuseMaterial::new(Vec3::splat(1.0)))
    });
    registry.register::<dyn Material, _>("material::visualize_normal", || {
        Box::new(VisualizeNormalMaterial)
    });
}

#[derive(Debug, Clone)]
pub struct DiffuseMaterial {
    kd: Vec3,
}

impl DiffuseMaterial {
    pub fn new(kd: Vec3) -> Self {
        Self { kd }
    }
}

impl Material for DiffuseMaterial {
    fn construct(&mut self, prop: &Json, _ctx: &AssetContext<'_>) -> Result<()> {
        self.kd = json::value_or(prop, "Kd", self.kd)?;
        Ok(())
    }

    fn reflectance(&self, _geom: &PointGeometry) -> Option<Vec3> {
        Some(self.kd)
    }
}

/// Shows the shading normal as a color.
pub struct VisualizeNormalMaterial;

impl Material for VisualizeNormalMaterial {
    fn construct(&mut self, _prop: &Json, _ctx: &AssetContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reflectance(&self, geom: &PointGeometry) -> Option<Vec3> {
        Some(geom.n.abs())
    }
}
