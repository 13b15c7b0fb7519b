use crate::camera::Camera;
use crate::comp::Registry;
use crate::error::LmError;
use crate::film::Film;
use crate::json::{self, Json};
use crate::math::{Vec2, Vec3, EPS};
use crate::parallel::ParallelContext;
use crate::scene::Scene;
use anyhow::Result;
use std::time::Instant;

pub trait Renderer: Send + Sync {
    fn construct(&mut self, prop: &Json) -> Result<()>;

    /// Name or locator of the film asset the renderer writes to.
    fn output(&self) -> &str;

    fn render(&self, scene: &Scene, film: &dyn Film, parallel: &dyn ParallelContext) -> Result<()>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Renderer, _>("renderer::raycast", || {
        Box::new(RaycastRenderer::default())
    });
}

/// One primary ray per pixel, shaded with the material reflectance.
#[derive(Debug, Default)]
pub struct RaycastRenderer {
    output: String,
    bg_color: Vec3,
    use_constant_color: bool,
}

impl RaycastRenderer {
    fn shade(&self, scene: &Scene, camera: &dyn Camera, rp: Vec2) -> Vec3 {
        let ray = camera.primary_ray(rp);
        let Some(hit) = scene.intersect(&ray, EPS, f32::INFINITY) else {
            return self.bg_color;
        };
        let reflectance = scene
            .primitive(hit.primitive)
            .and_then(|p| p.material.as_ref())
            .and_then(|m| m.reflectance(&hit.geom))
            .unwrap_or_default();
        if self.use_constant_color {
            reflectance
        } else {
            reflectance * hit.geom.n.dot(-ray.direction).abs()
        }
    }
}

impl Renderer for RaycastRenderer {
    fn construct(&mut self, prop: &Json) -> Result<()> {
        self.output = json::value(prop, "output")?;
        self.bg_color = json::value_or(prop, "bg_color", Vec3::zero())?;
        self.use_constant_color = json::value_or(prop, "use_constant_color", false)?;
        Ok(())
    }

    fn output(&self) -> &str {
        &self.output
    }

    fn render(&self, scene: &Scene, film: &dyn Film, parallel: &dyn ParallelContext) -> Result<()> {
        if !scene.is_built() {
            return Err(LmError::InvalidArgument(
                "scene must be built before rendering".to_string(),
            )
            .into());
        }
        let camera = scene.camera()?;

        let (w, h) = film.size();
        film.clear();
        let start = Instant::now();
        parallel.foreach(u64::from(w) * u64::from(h), &|index, _thread| {
            let x = (index % u64::from(w)) as u32;
            let y = (index / u64::from(w)) as u32;
            let rp = Vec2::new((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
            film.set_pixel(x, y, self.shade(scene, camera, rp));
        });
        log::info!(
            "Rendered {w}x{h} in {:.2}s on {} threads",
            start.elapsed().as_secs_f32(),
            parallel.num_threads()
        );
        Ok(())
    }
}
