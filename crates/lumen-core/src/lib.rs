//! Component-based CPU rendering engine.
//!
//! Start from [`Engine`]: initialize it, register assets and primitives,
//! build an accelerator and render into a film.

pub mod accel;
pub mod assets;
pub mod bvh;
pub mod camera;
pub mod comp;
pub mod error;
pub mod film;
pub mod geometry;
pub mod json;
pub mod logger;
pub mod material;
pub mod math;
pub mod mesh;
pub mod model;
pub mod objloader;
pub mod parallel;
pub mod renderer;
pub mod scene;
pub mod user;
pub mod volume;

pub use comp::{Plugin, Registry};
pub use error::LmError;
pub use json::Json;
pub use lumen_model::FilmBuffer;
pub use math::{Mat4, Vec3};
pub use user::Engine;

/// Registers every component built into the engine.
pub fn register_builtins(registry: &mut Registry) {
    parallel::register(registry);
    objloader::register(registry);
    film::register(registry);
    camera::register(registry);
    mesh::register(registry);
    material::register(registry);
    model::register(registry);
    accel::register(registry);
    renderer::register(registry);
    volume::register(registry);
}
