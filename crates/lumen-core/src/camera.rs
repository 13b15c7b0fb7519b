use crate::assets::AssetContext;
use crate::comp::Registry;
use crate::error::LmError;
use crate::json::{self, Json};
use crate::math::{Ray, Vec2, Vec3};
use anyhow::Result;

pub trait Camera: Send + Sync {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()>;

    /// Primary ray through raster position `rp` in `[0,1]^2`, origin at the
    /// bottom-left of the image.
    fn primary_ray(&self, rp: Vec2) -> Ray;

    fn aspect_ratio(&self) -> f32;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Camera, _>("camera::pinhole", || Box::new(PinholeCamera::default()));
}

#[derive(Debug, Default)]
pub struct PinholeCamera {
    position: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    // half of the screen height one unit in front of the camera
    tf: f32,
    aspect: f32,
}

impl PinholeCamera {
    pub fn new(position: Vec3, center: Vec3, up: Vec3, vfov_deg: f32, aspect: f32) -> Self {
        let w = (position - center).normalized();
        let u = up.cross(w).normalized();
        let v = w.cross(u);
        Self {
            position,
            u,
            v,
            w,
            tf: (vfov_deg.to_radians() * 0.5).tan(),
            aspect,
        }
    }
}

impl Camera for PinholeCamera {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()> {
        let aspect = match json::value_opt::<f32>(prop, "aspect")? {
            Some(aspect) => aspect,
            None => {
                let film: String = json::value(prop, "film").map_err(|_| {
                    LmError::InvalidArgument(
                        "camera::pinhole needs either [film] or [aspect]".to_string(),
                    )
                })?;
                ctx.assets.film(&film)?.aspect_ratio()
            }
        };
        let position: Vec3 = json::value(prop, "position")?;
        let center: Vec3 = json::value(prop, "center")?;
        let up: Vec3 = json::value_or(prop, "up", Vec3::new(0.0, 1.0, 0.0))?;
        let vfov: f32 = json::value(prop, "vfov")?;

        if (position - center).length() == 0.0 {
            return Err(LmError::InvalidArgument("camera position equals center".to_string()).into());
        }

        *self = Self::new(position, center, up, vfov, aspect);
        Ok(())
    }

    fn primary_ray(&self, rp: Vec2) -> Ray {
        let x = 2.0 * rp.x - 1.0;
        let y = 2.0 * rp.y - 1.0;
        let d = Vec3::new(self.aspect * self.tf * x, self.tf * y, -1.0).normalized();
        Ray {
            origin: self.position,
            direction: self.u * d.x + self.v * d.y + self.w * d.z,
        }
    }

    fn aspect_ratio(&self) -> f32 {
        self.aspect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn center_ray_points_at_look_at() {
        let camera = PinholeCamera::new(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zero(),
            Vec3::new(0.0, 1.0, 0.0),
            30.0,
            16.0 / 9.0,
        );
        let ray = camera.primary_ray(Vec2::new(0.5, 0.5));
        assert!(close(ray.origin, Vec3::new(0.0, 0.0, 5.0)));
        assert!(close(ray.direction, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn corner_rays_span_the_field_of_view() {
        let camera = PinholeCamera::new(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zero(),
            Vec3::new(0.0, 1.0, 0.0),
            90.0,
            2.0,
        );
        let top_right = camera.primary_ray(Vec2::new(1.0, 1.0)).direction;
        let expected = Vec3::new(2.0, 1.0, -1.0).normalized();
        assert!(close(top_right, expected));

        let bottom_left = camera.primary_ray(Vec2::new(0.0, 0.0)).direction;
        assert!(bottom_left.x < 0.0 && bottom_left.y < 0.0);
    }
}
