//! Component registry and plugin host.
//!
//! Every swappable piece of the engine (films, cameras, accelerators,
//! renderers, ...) is created from a string key of the form
//! `<interface>::<implementation>`. The registry maps each key to a factory
//! returning a boxed trait object of the interface, so creation is checked
//! against the interface the caller asks for.
//!
//! Plugins are bundles of registrations. The application makes plugins
//! *available* to a [`PluginHost`]; scripts then *load* them by path, which
//! is resolved to a plugin name through the file stem, the same way a
//! shared-library path would be.

use crate::error::LmError;
use anyhow::Result;
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

struct Entry {
    interface: &'static str,
    factory: Box<dyn Any + Send + Sync>,
    plugin: Option<String>,
}

#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, Entry>,
    installing: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `key` producing `Box<T>`, where `T` is the
    /// interface type, e.g. `dyn Film`. Re-registering a key replaces it.
    pub fn register<T, F>(&mut self, key: &str, factory: F)
    where
        T: ?Sized + 'static,
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        let factory: Factory<T> = Arc::new(factory);
        if self.entries.contains_key(key) {
            log::warn!("component [{key}] is already registered; replacing it");
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                interface: type_name::<T>(),
                factory: Box::new(factory),
                plugin: self.installing.clone(),
            },
        );
    }

    pub fn create<T: ?Sized + 'static>(&self, key: &str) -> Result<Box<T>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| LmError::NotFound(format!("component [{key}] is not registered")))?;
        let factory = entry.factory.downcast_ref::<Factory<T>>().ok_or_else(|| {
            LmError::InvalidArgument(format!(
                "component [{key}] implements {} but {} was requested",
                entry.interface,
                type_name::<T>()
            ))
        })?;
        Ok(factory())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Visits every registered key in sorted order.
    pub fn foreach_registered(&self, mut visit: impl FnMut(&str)) {
        for key in self.entries.keys() {
            visit(key);
        }
    }

    /// Runs the plugin's registrations, tagging them with the plugin name.
    pub fn install(&mut self, plugin: &dyn Plugin) {
        self.installing = Some(plugin.name().to_string());
        plugin.register(self);
        self.installing = None;
    }

    /// Removes every component registered by the named plugin.
    pub fn uninstall(&mut self, plugin: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.plugin.as_deref() != Some(plugin));
        before - self.entries.len()
    }
}

pub trait Plugin: Send + Sync {
    /// Name the plugin is loaded by, e.g. `accel_nanort`.
    fn name(&self) -> &'static str;

    fn register(&self, registry: &mut Registry);
}

#[derive(Default)]
pub struct PluginHost {
    available: BTreeMap<String, Arc<dyn Plugin>>,
    loaded: Vec<String>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a plugin loadable. Does not register anything yet.
    pub fn provide(&mut self, plugin: Arc<dyn Plugin>) {
        self.available.insert(plugin.name().to_string(), plugin);
    }

    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    pub fn load(&mut self, path: &Path, registry: &mut Registry) -> Result<()> {
        let name = plugin_name(path).ok_or_else(|| {
            LmError::InvalidArgument(format!("cannot derive a plugin name from {path:?}"))
        })?;
        if self.loaded.contains(&name) {
            log::debug!("plugin [{name}] is already loaded");
            return Ok(());
        }
        let plugin = self
            .available
            .get(&name)
            .ok_or_else(|| LmError::NotFound(format!("plugin [{name}] ({path:?})")))?;

        log::info!("Loading plugin [{name}]");
        registry.install(plugin.as_ref());
        self.loaded.push(name);
        Ok(())
    }

    /// Loads every available plugin whose name appears as a file in `dir`.
    pub fn load_directory(&mut self, dir: &Path, registry: &mut Registry) -> Result<usize> {
        let entries = fs::read_dir(dir).map_err(|err| LmError::Io {
            path: dir.display().to_string(),
            message: err.to_string(),
        })?;

        let mut count = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = plugin_name(&path) else { continue };
            if !self.available.contains_key(&name) || self.loaded.contains(&name) {
                continue;
            }
            self.load(&path, registry)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn unload_all(&mut self, registry: &mut Registry) {
        for name in self.loaded.drain(..) {
            let removed = registry.uninstall(&name);
            log::info!("Unloaded plugin [{name}] ({removed} components)");
        }
    }
}

/// Plugin name for a path: the file stem without a `lib` prefix, so
/// `bin/libaccel_nanort.so`, `bin/accel_nanort.dll` and `bin/accel_nanort`
/// all name `accel_nanort`.
pub fn plugin_name(path: &Path) -> Option<String> {
    let file = path.file_name()?.to_str()?;
    let stem = match file.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "so" | "dll" | "dylib") => stem,
        _ => file,
    };
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind;

    trait Greeter {
        fn greet(&self) -> String;
    }

    trait Counter {
        fn count(&self) -> u32;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct GreeterPlugin;

    impl Plugin for GreeterPlugin {
        fn name(&self) -> &'static str {
            "greeter"
        }

        fn register(&self, registry: &mut Registry) {
            registry.register::<dyn Greeter, _>("greeter::hello", || Box::new(Hello));
        }
    }

    #[test]
    fn create_checks_interface() {
        let mut registry = Registry::new();
        registry.register::<dyn Greeter, _>("greeter::hello", || Box::new(Hello));

        let greeter = registry.create::<dyn Greeter>("greeter::hello").unwrap();
        assert_eq!(greeter.greet(), "hello");

        let err = registry.create::<dyn Counter>("greeter::hello").err().unwrap();
        assert!(matches!(kind(&err), Some(LmError::InvalidArgument(_))));

        let err = registry.create::<dyn Greeter>("greeter::missing").err().unwrap();
        assert!(matches!(kind(&err), Some(LmError::NotFound(_))));
    }

    #[test]
    fn plugin_components_exist_only_while_loaded() {
        let mut registry = Registry::new();
        let mut host = PluginHost::new();
        host.provide(Arc::new(GreeterPlugin));
        assert!(!registry.contains("greeter::hello"));

        host.load(Path::new("/opt/lumen/bin/libgreeter.so"), &mut registry)
            .unwrap();
        assert!(registry.contains("greeter::hello"));
        assert_eq!(host.loaded(), ["greeter".to_string()]);

        // second load is a no-op
        host.load(Path::new("greeter"), &mut registry).unwrap();
        assert_eq!(host.loaded().len(), 1);

        host.unload_all(&mut registry);
        assert!(!registry.contains("greeter::hello"));
        assert!(host.loaded().is_empty());
    }

    #[test]
    fn unknown_plugin_is_not_found() {
        let mut registry = Registry::new();
        let mut host = PluginHost::new();
        let err = host.load(Path::new("bin/accel_embree"), &mut registry).unwrap_err();
        assert!(matches!(kind(&err), Some(LmError::NotFound(_))));
    }

    #[test]
    fn plugin_name_strips_platform_decoration() {
        assert_eq!(plugin_name(Path::new("bin/libaccel_nanort.so")).as_deref(), Some("accel_nanort"));
        assert_eq!(plugin_name(Path::new("bin/accel_nanort.dll")).as_deref(), Some("accel_nanort"));
        assert_eq!(plugin_name(Path::new("accel_nanort")).as_deref(), Some("accel_nanort"));
        assert_eq!(plugin_name(Path::new("bin/lib.so")), None);
    }

    #[test]
    fn foreach_registered_is_sorted() {
        let mut registry = Registry::new();
        registry.register::<dyn Greeter, _>("b::x", || Box::new(Hello));
        registry.register::<dyn Greeter, _>("a::y", || Box::new(Hello));
        let mut keys = Vec::new();
        registry.foreach_registered(|key| keys.push(key.to_string()));
        assert_eq!(keys, ["a::y", "b::x"]);
    }
}
