use crate::camera::Camera;
use crate::comp::Registry;
use crate::error::LmError;
use crate::film::Film;
use crate::json::Json;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::model::Model;
use crate::objloader::ObjLoader;
use crate::volume::Volume;
use anyhow::Result;
use lumen_model::AssetRecord;
use std::collections::HashMap;
use std::sync::Arc;

pub const LOCATOR_PREFIX: &str = "$.assets.";

/// What an asset's `construct` may look at: earlier assets, the OBJ loader
/// and the component registry.
pub struct AssetContext<'a> {
    pub assets: &'a Assets,
    pub objloader: &'a dyn ObjLoader,
    pub registry: &'a Registry,
}

pub enum Asset {
    Film(Box<dyn Film>),
    Camera(Arc<dyn Camera>),
    Mesh(Arc<dyn Mesh>),
    Material(Arc<dyn Material>),
    Model(Arc<dyn Model>),
    Volume(Arc<dyn Volume>),
}

impl Asset {
    fn kind(&self) -> &'static str {
        match self {
            Asset::Film(_) => "film",
            Asset::Camera(_) => "camera",
            Asset::Mesh(_) => "mesh",
            Asset::Material(_) => "material",
            Asset::Model(_) => "model",
            Asset::Volume(_) => "volume",
        }
    }
}

struct AssetEntry {
    name: String,
    key: String,
    props: Json,
    asset: Asset,
}

/// Named assets in creation order.
#[derive(Default)]
pub struct Assets {
    entries: Vec<AssetEntry>,
    index: HashMap<String, usize>,
}

pub fn locator(name: &str) -> String {
    format!("{LOCATOR_PREFIX}{name}")
}

/// Accepts either a bare asset name or a full locator.
pub fn asset_name(name_or_locator: &str) -> &str {
    name_or_locator
        .strip_prefix(LOCATOR_PREFIX)
        .unwrap_or(name_or_locator)
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the component `key`, constructs it from `props` and stores it
    /// under `name`. The interface is taken from the key prefix, e.g. `film`
    /// for `film::bitmap`.
    pub fn add(
        &mut self,
        name: &str,
        key: &str,
        props: &Json,
        registry: &Registry,
        objloader: &dyn ObjLoader,
    ) -> Result<String> {
        if name.is_empty() {
            return Err(LmError::InvalidArgument("asset name must not be empty".to_string()).into());
        }
        if self.index.contains_key(name) {
            return Err(LmError::InvalidArgument(format!("asset [{name}] is already registered")).into());
        }

        let ctx = AssetContext {
            assets: self,
            objloader,
            registry,
        };
        let asset = match interface_of(key) {
            "film" => {
                let mut film = registry.create::<dyn Film>(key)?;
                film.construct(props)?;
                Asset::Film(film)
            }
            "camera" => {
                let mut camera = registry.create::<dyn Camera>(key)?;
                camera.construct(props, &ctx)?;
                Asset::Camera(Arc::from(camera))
            }
            "mesh" => {
                let mut mesh = registry.create::<dyn Mesh>(key)?;
                mesh.construct(props, &ctx)?;
                Asset::Mesh(Arc::from(mesh))
            }
            "material" => {
                let mut material = registry.create::<dyn Material>(key)?;
                material.construct(props, &ctx)?;
                Asset::Material(Arc::from(material))
            }
            "model" => {
                let mut model = registry.create::<dyn Model>(key)?;
                model.construct(props, &ctx)?;
                Asset::Model(Arc::from(model))
            }
            "volume" => {
                let mut volume = registry.create::<dyn Volume>(key)?;
                volume.construct(props, &ctx)?;
                Asset::Volume(Arc::from(volume))
            }
            _ => return Err(LmError::Unsupported(format!("asset type [{key}]")).into()),
        };

        log::debug!("Asset [{name}] created from [{key}]");
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(AssetEntry {
            name: name.to_string(),
            key: key.to_string(),
            props: props.clone(),
            asset,
        });
        Ok(locator(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(asset_name(name))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Creation arguments of every asset, for state serialization.
    pub fn records(&self) -> Vec<AssetRecord> {
        self.entries
            .iter()
            .map(|e| AssetRecord {
                name: e.name.clone(),
                key: e.key.clone(),
                props: e.props.clone(),
            })
            .collect()
    }

    fn get(&self, name: &str) -> Result<&Asset> {
        let name = asset_name(name);
        self.index
            .get(name)
            .map(|&i| &self.entries[i].asset)
            .ok_or_else(|| LmError::NotFound(format!("asset [{name}]")).into())
    }

    pub fn film(&self, name: &str) -> Result<&dyn Film> {
        match self.get(name)? {
            Asset::Film(film) => Ok(film.as_ref()),
            other => Err(wrong_kind(name, "film", other)),
        }
    }

    pub fn camera(&self, name: &str) -> Result<Arc<dyn Camera>> {
        match self.get(name)? {
            Asset::Camera(camera) => Ok(Arc::clone(camera)),
            other => Err(wrong_kind(name, "camera", other)),
        }
    }

    pub fn mesh(&self, name: &str) -> Result<Arc<dyn Mesh>> {
        match self.get(name)? {
            Asset::Mesh(mesh) => Ok(Arc::clone(mesh)),
            other => Err(wrong_kind(name, "mesh", other)),
        }
    }

    pub fn material(&self, name: &str) -> Result<Arc<dyn Material>> {
        match self.get(name)? {
            Asset::Material(material) => Ok(Arc::clone(material)),
            other => Err(wrong_kind(name, "material", other)),
        }
    }

    pub fn model(&self, name: &str) -> Result<Arc<dyn Model>> {
        match self.get(name)? {
            Asset::Model(model) => Ok(Arc::clone(model)),
            other => Err(wrong_kind(name, "model", other)),
        }
    }

    pub fn volume(&self, name: &str) -> Result<Arc<dyn Volume>> {
        match self.get(name)? {
            Asset::Volume(volume) => Ok(Arc::clone(volume)),
            other => Err(wrong_kind(name, "volume", other)),
        }
    }
}

fn interface_of(key: &str) -> &str {
    key.split_once("::").map(|(interface, _)| interface).unwrap_or("")
}

fn wrong_kind(name: &str, expected: &str, found: &Asset) -> anyhow::Error {
    LmError::InvalidArgument(format!(
        "asset [{}] is a {}, expected a {expected}",
        asset_name(name),
        found.kind()
    ))
    .into()
}

#[cfg(test)]
pub(crate) struct DetachedContext {
    assets: Assets,
    objloader: crate::objloader::SimpleObjLoader,
    registry: Registry,
}

#[cfg(test)]
impl DetachedContext {
    pub(crate) fn as_context(&self) -> AssetContext<'_> {
        AssetContext {
            assets: &self.assets,
            objloader: &self.objloader,
            registry: &self.registry,
        }
    }
}

#[cfg(test)]
impl AssetContext<'_> {
    /// Empty assets and a registry with the built-in components.
    pub(crate) fn detached() -> DetachedContext {
        let mut registry = Registry::new();
        crate::register_builtins(&mut registry);
        DetachedContext {
            assets: Assets::new(),
            objloader: crate::objloader::SimpleObjLoader,
            registry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use crate::objloader::SimpleObjLoader;
    use serde_json::json;

    fn fixture() -> (Assets, Registry) {
        let mut registry = Registry::new();
        crate::register_builtins(&mut registry);
        (Assets::new(), registry)
    }

    #[test]
    fn add_returns_locator_and_resolves_both_forms() {
        let (mut assets, registry) = fixture();
        let loc = assets
            .add("film1", "film::bitmap", &json!({"w": 4, "h": 2}), &registry, &SimpleObjLoader)
            .unwrap();
        assert_eq!(loc, "$.assets.film1");
        assert_eq!(assets.film("film1").unwrap().size(), (4, 2));
        assert_eq!(assets.film(&loc).unwrap().size(), (4, 2));

        let camera_props = json!({"film": loc, "position": [0,0,5], "center": [0,0,0], "vfov": 30});
        assets
            .add("camera1", "camera::pinhole", &camera_props, &registry, &SimpleObjLoader)
            .unwrap();
        assert_eq!(assets.camera("camera1").unwrap().aspect_ratio(), 2.0);
        assert_eq!(assets.records().len(), 2);
    }

    #[test]
    fn duplicate_names_and_wrong_types_are_rejected() {
        let (mut assets, registry) = fixture();
        let props = json!({"w": 1, "h": 1});
        assets
            .add("a", "film::bitmap", &props, &registry, &SimpleObjLoader)
            .unwrap();

        let err = assets
            .add("a", "film::bitmap", &props, &registry, &SimpleObjLoader)
            .unwrap_err();
        assert!(matches!(error::kind(&err), Some(LmError::InvalidArgument(_))));

        let err = assets.mesh("a").err().unwrap();
        assert!(matches!(error::kind(&err), Some(LmError::InvalidArgument(_))));

        let err = assets.mesh("missing").err().unwrap();
        assert!(matches!(error::kind(&err), Some(LmError::NotFound(_))));
    }

    #[test]
    fn unknown_interface_is_unsupported() {
        let (mut assets, registry) = fixture();
        let err = assets
            .add("l", "light::area", &json!({}), &registry, &SimpleObjLoader)
            .unwrap_err();
        assert!(matches!(error::kind(&err), Some(LmError::Unsupported(_))));
        assert!(assets.is_empty());
    }
}
