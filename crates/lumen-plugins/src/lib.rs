//! Plugins shipped with Lumen.
//!
//! Each plugin is loaded into an engine by name, e.g.
//! `engine.load_plugin("bin/accel_nanort")`, after the application has made
//! it available with [`available`].

pub mod accel_nanort;
pub mod objloader_tinyobjloader;

use lumen_core::comp::Plugin;
use std::sync::Arc;

pub use accel_nanort::{AccelNanort, NanortPlugin};
pub use objloader_tinyobjloader::{TinyObjLoader, TinyObjLoaderPlugin};

pub fn available() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(NanortPlugin), Arc::new(TinyObjLoaderPlugin)]
}
