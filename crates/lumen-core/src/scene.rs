use crate::accel::Accel;
use crate::camera::Camera;
use crate::error::LmError;
use crate::geometry::SceneTriangle;
use crate::material::Material;
use crate::math::{orthonormal_basis, Mat3, Mat4, Ray, Vec2, Vec3};
use crate::mesh::Mesh;
use crate::model::Model;
use anyhow::Result;
use std::sync::Arc;

/// World-space surface geometry at a hit point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointGeometry {
    pub p: Vec3,
    /// Shading normal.
    pub n: Vec3,
    /// Geometry normal.
    pub gn: Vec3,
    pub t: Vec2,
    pub u: Vec3,
    pub v: Vec3,
}

impl PointGeometry {
    pub fn on_surface(p: Vec3, n: Vec3, gn: Vec3, t: Vec2) -> Self {
        let (u, v) = orthonormal_basis(n);
        Self { p, n, gn, t, u, v }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SceneInteraction {
    pub primitive: usize,
    pub face: usize,
    pub t: f32,
    pub geom: PointGeometry,
}

#[derive(Clone)]
pub struct Primitive {
    pub transform: Mat4,
    pub normal_matrix: Mat3,
    pub mesh: Option<Arc<dyn Mesh>>,
    pub material: Option<Arc<dyn Material>>,
    pub camera: Option<Arc<dyn Camera>>,
}

impl Primitive {
    pub fn new(transform: Mat4) -> Self {
        Self {
            transform,
            normal_matrix: transform.normal_matrix(),
            mesh: None,
            material: None,
            camera: None,
        }
    }
}

#[derive(Default)]
pub struct Scene {
    primitives: Vec<Primitive>,
    camera: Option<usize>,
    accel: Option<Box<dyn Accel>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_primitive(&mut self, primitive: Primitive) -> usize {
        let index = self.primitives.len();
        if primitive.camera.is_some() {
            if self.camera.is_some() {
                log::warn!("scene already has a camera; primitive {index} replaces it");
            }
            self.camera = Some(index);
        }
        if primitive.mesh.is_some() && self.accel.take().is_some() {
            log::debug!("primitive {index} added after build; accelerator dropped");
        }
        self.primitives.push(primitive);
        index
    }

    /// Adds one primitive per mesh of `model`, all sharing `transform`.
    pub fn add_model(&mut self, transform: Mat4, model: &dyn Model) -> usize {
        let created = model.create_primitives();
        let count = created.len();
        for p in created {
            self.add_primitive(Primitive {
                mesh: Some(p.mesh),
                material: Some(p.material),
                ..Primitive::new(transform)
            });
        }
        count
    }

    pub fn primitive(&self, index: usize) -> Option<&Primitive> {
        self.primitives.get(index)
    }

    pub fn camera(&self) -> Result<&dyn Camera> {
        self.camera
            .and_then(|i| self.primitives[i].camera.as_deref())
            .ok_or_else(|| LmError::InvalidArgument("scene has no camera".to_string()).into())
    }

    /// All mesh triangles in world space.
    pub fn triangles(&self) -> Vec<SceneTriangle> {
        let mut triangles = Vec::new();
        for (index, primitive) in self.primitives.iter().enumerate() {
            let Some(mesh) = &primitive.mesh else { continue };
            let m = &primitive.transform;
            mesh.foreach_triangle(&mut |face, tri| {
                triangles.push(SceneTriangle {
                    p1: m.transform_point(tri.p1.p),
                    p2: m.transform_point(tri.p2.p),
                    p3: m.transform_point(tri.p3.p),
                    primitive: index,
                    face,
                });
            });
        }
        triangles
    }

    pub fn build(&mut self, mut accel: Box<dyn Accel>) -> Result<()> {
        let triangles = self.triangles();
        accel.build(&triangles)?;
        log::info!(
            "Built accelerator over {} triangles in {} primitives",
            triangles.len(),
            self.primitives.len()
        );
        self.accel = Some(accel);
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.accel.is_some()
    }

    /// Closest surface hit. `None` on a miss or before [`Scene::build`].
    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<SceneInteraction> {
        let hit = self.accel.as_ref()?.intersect(ray, t_min, t_max)?;
        let primitive = &self.primitives[hit.primitive];
        let mesh = primitive.mesh.as_ref()?;
        let local = mesh.surface_point(hit.face, hit.uv);
        let nm = &primitive.normal_matrix;
        Some(SceneInteraction {
            primitive: hit.primitive,
            face: hit.face,
            t: hit.t,
            geom: PointGeometry::on_surface(
                primitive.transform.transform_point(local.p),
                nm.apply(local.n).normalized(),
                nm.apply(local.gn).normalized(),
                local.t,
            ),
        })
    }

    pub fn clear(&mut self) {
        self.primitives.clear();
        self.camera = None;
        self.accel = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::NaiveAccel;
    use crate::assets::AssetContext;
    use crate::json::Json;
    use crate::mesh::{IndexedMesh, MeshSource};
    use serde_json::json;

    fn unit_triangle() -> Arc<dyn Mesh> {
        let ctx = AssetContext::detached();
        let mut mesh = IndexedMesh::new(MeshSource::Raw);
        let prop: Json = json!({"ps": [0,0,0, 1,0,0, 0,1,0], "fs": {"p": [0,1,2]}});
        mesh.construct(&prop, &ctx.as_context()).unwrap();
        Arc::new(mesh)
    }

    #[test]
    fn intersect_reports_world_space_geometry() {
        let mut scene = Scene::new();
        let transform = Mat4::translate(Vec3::new(0.0, 0.0, -2.0));
        scene.add_primitive(Primitive {
            mesh: Some(unit_triangle()),
            ..Primitive::new(transform)
        });

        let ray = Ray {
            origin: Vec3::new(0.25, 0.25, 1.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        };
        assert!(scene.intersect(&ray, 0.0, f32::INFINITY).is_none());

        scene.build(Box::new(NaiveAccel::default())).unwrap();
        let hit = scene.intersect(&ray, 0.0, f32::INFINITY).unwrap();
        assert_eq!(hit.primitive, 0);
        assert!((hit.t - 3.0).abs() < 1e-5);
        assert!((hit.geom.p - Vec3::new(0.25, 0.25, -2.0)).length() < 1e-5);
        assert!((hit.geom.n - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn camera_is_required() {
        let scene = Scene::new();
        assert!(scene.camera().is_err());
    }
}
