use crate::assets::AssetContext;
use crate::comp::Registry;
use crate::json::{self, Json};
use crate::material::{DiffuseMaterial, Material};
use crate::math::Vec3;
use crate::mesh::{IndexedMesh, Mesh};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// A mesh/material pair produced by a model.
#[derive(Clone)]
pub struct ModelPrimitive {
    pub mesh: Arc<dyn Mesh>,
    pub material: Arc<dyn Material>,
}

/// An asset that expands into several primitives.
pub trait Model: Send + Sync {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()>;

    fn create_primitives(&self) -> Vec<ModelPrimitive>;
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn Model, _>("model::wavefrontobj", || {
        Box::new(WavefrontObjModel::default())
    });
}

/// One primitive per OBJ group, with a diffuse material built from the MTL
/// `Kd`, unless `base_material` names a material component for every group.
#[derive(Default)]
pub struct WavefrontObjModel {
    primitives: Vec<ModelPrimitive>,
}

impl Model for WavefrontObjModel {
    fn construct(&mut self, prop: &Json, ctx: &AssetContext<'_>) -> Result<()> {
        let path: PathBuf = json::value(prop, "path")?;
        let base_material: Option<String> = json::value_opt(prop, "base_material")?;
        let data = ctx.objloader.load(&path)?;

        let materials: Vec<Arc<dyn Material>> = match &base_material {
            Some(key) => {
                let mut material = ctx.registry.create::<dyn Material>(key)?;
                material.construct(&Json::Null, ctx)?;
                let shared: Arc<dyn Material> = Arc::from(material);
                vec![shared; data.materials.len().max(1)]
            }
            None => data
                .materials
                .iter()
                .map(|m| Arc::new(DiffuseMaterial::new(m.kd)) as Arc<dyn Material>)
                .collect(),
        };

        let geo = Arc::new(data.geo);
        self.primitives = data
            .meshes
            .into_iter()
            .map(|m| {
                let mesh = IndexedMesh::from_parts(Arc::clone(&geo), m.faces)?;
                let material = match materials.get(m.material).or_else(|| materials.first()) {
                    Some(material) => Arc::clone(material),
                    None => Arc::new(DiffuseMaterial::new(Vec3::splat(1.0))),
                };
                Ok(ModelPrimitive {
                    mesh: Arc::new(mesh),
                    material,
                })
            })
            .collect::<Result<_>>()?;

        log::debug!("Model {:?}: {} primitives", path, self.primitives.len());
        Ok(())
    }

    fn create_primitives(&self) -> Vec<ModelPrimitive> {
        self.primitives.clone()
    }
}
