//! The engine facade scripts and the functest harness drive.
//!
//! An [`Engine`] owns every subsystem: the component registry, loaded
//! plugins, the parallel context, the OBJ loader, assets and the scene.
//! Calls mirror the scripting API one to one. Everything the caller
//! registers is also recorded in an [`EngineState`] so the engine can be
//! serialized and replayed later.

use crate::accel::Accel;
use crate::assets::{self, Assets};
use crate::comp::{Plugin, PluginHost, Registry};
use crate::error::LmError;
use crate::json::{self, Json};
use crate::logger;
use crate::math::Mat4;
use crate::objloader::{self, ObjLoader, SimpleObjLoader};
use crate::parallel::{self, ParallelContext};
use crate::renderer::Renderer;
use crate::scene::{Primitive, Scene};
use anyhow::{Context, Result};
use lumen_model::{AccelRecord, EngineState, FilmBuffer, PrimitiveRecord, STATE_VERSION};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_TYPE: &str = "user::default";

pub struct Engine {
    initialized: bool,
    registry: Registry,
    plugins: PluginHost,
    parallel: Option<Box<dyn ParallelContext>>,
    objloader: Box<dyn ObjLoader>,
    assets: Assets,
    scene: Scene,
    state: EngineState,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut registry = Registry::new();
        crate::register_builtins(&mut registry);
        Self {
            initialized: false,
            registry,
            plugins: PluginHost::new(),
            parallel: None,
            objloader: Box::new(SimpleObjLoader),
            assets: Assets::new(),
            scene: Scene::new(),
            state: EngineState::default(),
        }
    }

    /// Initializes the engine. Recognized properties: `numThreads`
    /// (default -1), `logger` (a logger type, skipped when absent) and
    /// `objloader` (default `objloader::simple`).
    pub fn init(&mut self, kind: &str, prop: &Json) -> Result<()> {
        if kind != DEFAULT_TYPE {
            return Err(LmError::NotFound(format!("user [{kind}]")).into());
        }
        if self.initialized {
            log::debug!("engine is already initialized; reinitializing");
            self.reset()?;
        }
        if let Some(logger) = json::value_opt::<String>(prop, "logger")? {
            logger::init(&logger, prop)?;
        }

        self.initialized = true;
        let num_threads: i64 = json::value_or(prop, "numThreads", -1)?;
        let objloader: String = json::value_or(prop, "objloader", objloader::DEFAULT_TYPE.to_string())?;
        let setup = self
            .parallel_init(parallel::DEFAULT_TYPE, &json!({ "numThreads": num_threads }))
            .and_then(|_| self.objloader_init(&objloader, &Json::Null));
        if let Err(err) = setup {
            self.initialized = false;
            return Err(err);
        }
        self.info();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drops all state and unloads plugins. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.clear_state();
        self.plugins.unload_all(&mut self.registry);
        self.parallel = None;
        self.objloader = Box::new(SimpleObjLoader);
        self.initialized = false;
        log::info!("Engine shut down");
    }

    pub fn info(&self) {
        log::info!(
            "Lumen {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        if !self.plugins.loaded().is_empty() {
            log::info!("Plugins: {}", self.plugins.loaded().join(", "));
        }
    }

    /// Removes every asset and primitive. Subsystems and plugins stay.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_init()?;
        self.clear_state();
        log::debug!("Engine reset");
        Ok(())
    }

    pub fn parallel_init(&mut self, kind: &str, prop: &Json) -> Result<()> {
        self.ensure_init()?;
        let mut parallel = self.registry.create::<dyn ParallelContext>(kind)?;
        parallel.construct(prop)?;
        self.parallel = Some(parallel);
        Ok(())
    }

    pub fn objloader_init(&mut self, kind: &str, prop: &Json) -> Result<()> {
        self.ensure_init()?;
        let mut loader = self.registry.create::<dyn ObjLoader>(kind)?;
        loader.construct(prop)?;
        self.objloader = loader;
        log::debug!("OBJ loader: {kind}");
        Ok(())
    }

    /// Makes a plugin loadable through [`Engine::load_plugin`].
    pub fn provide_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.provide(plugin);
    }

    pub fn load_plugin(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.plugins.load(path.as_ref(), &mut self.registry)
    }

    pub fn load_plugin_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        self.plugins.load_directory(dir.as_ref(), &mut self.registry)
    }

    pub fn unload_plugins(&mut self) {
        self.plugins.unload_all(&mut self.registry);
    }

    pub fn loaded_plugins(&self) -> &[String] {
        self.plugins.loaded()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Creates an asset and returns its locator.
    pub fn asset(&mut self, name: &str, key: &str, prop: &Json) -> Result<String> {
        self.ensure_init()?;
        self.assets
            .add(name, key, prop, &self.registry, self.objloader.as_ref())
            .with_context(|| format!("failed to create asset [{name}] ({key})"))
    }

    /// Locator of an existing asset.
    pub fn asset_locator(&self, name: &str) -> Result<String> {
        self.ensure_init()?;
        if !self.assets.contains(name) {
            return Err(LmError::NotFound(format!("asset [{name}]")).into());
        }
        Ok(assets::locator(assets::asset_name(name)))
    }

    /// Adds a primitive. `prop` may name a `mesh`, a `material` and a
    /// `camera` asset; at least one is required.
    pub fn primitive(&mut self, transform: Mat4, prop: &Json) -> Result<()> {
        self.ensure_init()?;
        let mesh: Option<String> = json::value_opt(prop, "mesh")?;
        let material: Option<String> = json::value_opt(prop, "material")?;
        let camera: Option<String> = json::value_opt(prop, "camera")?;
        if mesh.is_none() && material.is_none() && camera.is_none() {
            return Err(LmError::InvalidArgument(
                "primitive needs a mesh, material or camera".to_string(),
            )
            .into());
        }

        let primitive = Primitive {
            mesh: mesh.map(|m| self.assets.mesh(&m)).transpose()?,
            material: material.map(|m| self.assets.material(&m)).transpose()?,
            camera: camera.map(|c| self.assets.camera(&c)).transpose()?,
            ..Primitive::new(transform)
        };
        self.scene.add_primitive(primitive);
        self.forget_stale_accel();
        self.state.primitives.push(PrimitiveRecord::Single {
            transform: transform.to_cols_array(),
            props: prop.clone(),
        });
        Ok(())
    }

    /// Adds every primitive of a model asset.
    pub fn primitives(&mut self, transform: Mat4, model: &str) -> Result<usize> {
        self.ensure_init()?;
        let asset = self.assets.model(model)?;
        let count = self.scene.add_model(transform, asset.as_ref());
        self.forget_stale_accel();
        self.state.primitives.push(PrimitiveRecord::Model {
            transform: transform.to_cols_array(),
            model: model.to_string(),
        });
        Ok(count)
    }

    /// Builds the acceleration structure `key` over the current scene.
    pub fn build(&mut self, key: &str, prop: &Json) -> Result<()> {
        self.ensure_init()?;
        let mut accel = self.registry.create::<dyn Accel>(key)?;
        accel.construct(prop)?;
        self.scene.build(accel)?;
        self.state.accel = Some(AccelRecord {
            key: key.to_string(),
            props: prop.clone(),
        });
        Ok(())
    }

    /// Renders into the film named by the renderer's `output` property.
    pub fn render(&mut self, key: &str, prop: &Json) -> Result<()> {
        self.ensure_init()?;
        let mut renderer = self.registry.create::<dyn Renderer>(key)?;
        renderer.construct(prop)?;
        let film = self.assets.film(renderer.output())?;
        let parallel = self
            .parallel
            .as_deref()
            .ok_or(LmError::Uninitialized)?;
        renderer
            .render(&self.scene, film, parallel)
            .with_context(|| format!("render with [{key}] failed"))
    }

    pub fn buffer(&self, film: &str) -> Result<FilmBuffer> {
        self.ensure_init()?;
        Ok(self.assets.film(film)?.buffer())
    }

    pub fn save(&self, film: &str, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_init()?;
        let path = path.as_ref();
        self.assets.film(film)?.save(path)?;
        log::info!("Saved {film} to {path:?}");
        Ok(())
    }

    /// The engine state as JSON.
    pub fn serialize(&self) -> Result<String> {
        self.ensure_init()?;
        let state = EngineState {
            assets: self.assets.records(),
            ..self.state.clone()
        };
        Ok(serde_json::to_string_pretty(&state)?)
    }

    /// Resets the engine and replays a state produced by
    /// [`Engine::serialize`], rebuilding the accelerator if one was built.
    pub fn deserialize(&mut self, text: &str) -> Result<()> {
        self.ensure_init()?;
        let state: EngineState = serde_json::from_str(text)
            .map_err(|err| LmError::InvalidArgument(format!("engine state: {err}")))?;
        if state.version != STATE_VERSION {
            return Err(LmError::Unsupported(format!(
                "engine state version {} (expected {STATE_VERSION})",
                state.version
            ))
            .into());
        }

        self.reset()?;
        for record in &state.assets {
            self.asset(&record.name, &record.key, &record.props)?;
        }
        for record in &state.primitives {
            match record {
                PrimitiveRecord::Single { transform, props } => {
                    self.primitive(Mat4::from_cols_array(*transform), props)?;
                }
                PrimitiveRecord::Model { transform, model } => {
                    self.primitives(Mat4::from_cols_array(*transform), model)?;
                }
            }
        }
        if let Some(accel) = &state.accel {
            self.build(&accel.key, &accel.props)?;
        }
        Ok(())
    }

    /// Adding a mesh after `build` drops the scene's accelerator; the
    /// replay log must not rebuild it either.
    fn forget_stale_accel(&mut self) {
        if !self.scene.is_built() {
            self.state.accel = None;
        }
    }

    fn clear_state(&mut self) {
        self.scene.clear();
        self.assets.clear();
        self.state = EngineState::default();
    }

    fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(LmError::Uninitialized.into())
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
