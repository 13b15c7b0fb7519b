//! Catalog of test scenes.
//!
//! Every scene expects the engine to hold a film asset named
//! [`FILM_OUTPUT`] and adds a camera bound to it, plus its own meshes,
//! materials and primitives.

pub mod shapes;

use anyhow::{Context, Result};
use lumen_core::error::LmError;
use lumen_core::math::{Mat4, Vec3};
use lumen_core::Engine;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const FILM_OUTPUT: &str = "film_output";

type SceneFn = fn(&mut Engine, &Path) -> Result<()>;

const SCENES: &[(&str, SceneFn)] = &[
    ("quad", quad),
    ("cube", cube),
    ("sphere", sphere),
    ("cornell_box", cornell_box),
    ("cube_obj", cube_obj),
];

pub fn scenes() -> Vec<&'static str> {
    SCENES.iter().map(|(name, _)| *name).collect()
}

/// The directory holding the bundled OBJ/MTL files.
pub fn default_scene_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Registers scene `name` with the engine. `scene_path` is the directory
/// the OBJ-based scenes read their files from.
pub fn load(engine: &mut Engine, scene_path: &Path, name: &str) -> Result<()> {
    let (_, setup) = SCENES
        .iter()
        .find(|(scene, _)| *scene == name)
        .ok_or_else(|| LmError::NotFound(format!("scene [{name}]")))?;
    log::info!("Loading scene [{name}]");
    setup(engine, scene_path).with_context(|| format!("failed to load scene [{name}]"))
}

fn camera(engine: &mut Engine, position: [f32; 3], center: [f32; 3], vfov: f32) -> Result<()> {
    let film = engine.asset_locator(FILM_OUTPUT)?;
    engine.asset(
        "camera_main",
        "camera::pinhole",
        &json!({
            "film": film,
            "position": position,
            "center": center,
            "up": [0, 1, 0],
            "vfov": vfov
        }),
    )?;
    engine.primitive(Mat4::identity(), &json!({"camera": "camera_main"}))
}

fn mesh_primitive(engine: &mut Engine, transform: Mat4, mesh: &Value, material: &Value) -> Result<()> {
    engine.asset("mesh_main", "mesh::raw", mesh)?;
    engine.asset("material_main", "material::diffuse", material)?;
    engine.primitive(
        transform,
        &json!({"mesh": "mesh_main", "material": "material_main"}),
    )
}

fn path_prop(path: &Path) -> Result<Value> {
    let path = path
        .to_str()
        .ok_or_else(|| LmError::InvalidArgument(format!("scene path {} is not valid UTF-8", path.display())))?;
    Ok(json!({ "path": path }))
}

fn quad(engine: &mut Engine, _: &Path) -> Result<()> {
    camera(engine, [0.0, 0.0, 5.0], [0.0, 0.0, 0.0], 30.0)?;
    mesh_primitive(engine, Mat4::identity(), &shapes::quad(), &json!({"Kd": [1, 0.5, 0]}))
}

fn cube(engine: &mut Engine, _: &Path) -> Result<()> {
    camera(engine, [4.0, 3.0, 5.0], [0.0, 0.0, 0.0], 30.0)?;
    let transform = Mat4::rotate(30.0, Vec3::new(0.0, 1.0, 0.0)) * Mat4::scale(Vec3::splat(0.8));
    mesh_primitive(engine, transform, &shapes::cube(), &json!({"Kd": [0.2, 0.6, 0.9]}))
}

fn sphere(engine: &mut Engine, _: &Path) -> Result<()> {
    camera(engine, [0.0, 0.0, 5.0], [0.0, 0.0, 0.0], 30.0)?;
    mesh_primitive(engine, Mat4::identity(), &shapes::sphere(32, 64), &json!({"Kd": [0.9, 0.9, 0.9]}))
}

fn cornell_box(engine: &mut Engine, scene_path: &Path) -> Result<()> {
    camera(engine, [0.0, 1.0, 5.15], [0.0, 1.0, 0.0], 30.0)?;
    let path = scene_path.join("cornell_box").join("cornell_box.obj");
    engine.asset("model_main", "model::wavefrontobj", &path_prop(&path)?)?;
    engine.primitives(Mat4::identity(), "model_main")?;
    Ok(())
}

fn cube_obj(engine: &mut Engine, scene_path: &Path) -> Result<()> {
    camera(engine, [3.0, 4.0, 5.0], [0.0, 0.0, 0.0], 35.0)?;
    let path = scene_path.join("cube").join("cube.obj");
    engine.asset("mesh_main", "mesh::wavefrontobj", &path_prop(&path)?)?;
    engine.asset("material_main", "material::visualize_normal", &json!({}))?;
    engine.primitive(
        Mat4::identity(),
        &json!({"mesh": "mesh_main", "material": "material_main"}),
    )
}
