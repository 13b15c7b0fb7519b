use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use image::ImageFormat;
use lumen_core::film::to_display_image;
use lumen_core::{logger, Engine};
use lumen_model::FunctestEnv;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const PLUGINS: [&str; 2] = ["accel_nanort", "objloader_tinyobjloader"];

#[derive(Parser)]
#[command(name = "lumen-functest", version, about = "Lumen scene smoke tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the scenes in the catalog.
    List,
    /// Render every catalog scene and write one PNG per scene.
    RenderAll(RenderAllArgs),
}

#[derive(Args)]
struct RenderAllArgs {
    /// JSON file with `bin_path` and `scene_path`.
    #[arg(long)]
    env: Option<PathBuf>,

    #[arg(long)]
    scene_path: Option<PathBuf>,

    #[arg(long)]
    bin_path: Option<PathBuf>,

    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    threads: i64,

    #[arg(long, default_value = "accel::nanort")]
    accel: String,

    #[arg(long, default_value = "renderer::raycast")]
    renderer: String,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Render only these scenes.
    #[arg(long = "scene")]
    scenes: Vec<String>,
}

#[derive(Serialize)]
struct RunArgsSummary {
    scene_path: PathBuf,
    bin_path: PathBuf,
    out_dir: PathBuf,
    width: u32,
    height: u32,
    threads: i64,
    accel: String,
    renderer: String,
}

#[derive(Serialize)]
struct SceneReport {
    name: String,
    image: PathBuf,
    elapsed_ms: u128,
}

#[derive(Serialize)]
struct HostInfo {
    os: String,
    arch: String,
}

#[derive(Serialize)]
struct RunReceipt {
    version: String,
    started_at_utc: String,
    finished_at_utc: String,
    interrupted: bool,
    args: RunArgsSummary,
    scenes: Vec<SceneReport>,
    host: HostInfo,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            for scene in lumen_scenes::scenes() {
                println!("{scene}");
            }
            Ok(())
        }
        Commands::RenderAll(args) => run_render_all(args),
    }
}

fn run_render_all(args: RenderAllArgs) -> Result<()> {
    let started_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    logger::init(logger::DEFAULT_TYPE, &json!({ "level": &args.log_level }))?;

    let env = match &args.env {
        Some(path) => read_env(path)?,
        None => FunctestEnv::default(),
    };
    let bin_path = args.bin_path.clone().unwrap_or(env.bin_path);
    let scene_path = args
        .scene_path
        .clone()
        .or(env.scene_path)
        .unwrap_or_else(lumen_scenes::default_scene_path);
    let out_dir = args.out_dir.clone().unwrap_or_else(default_out_dir);
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(anyhow!(
            "output path {:?} exists and is not a directory",
            out_dir
        ));
    }
    fs::create_dir_all(&out_dir)
        .map_err(|err| anyhow!("failed to create output directory {:?}: {}", out_dir, err))?;

    let scenes = select_scenes(&args.scenes)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("interrupt: stopping after the current scene (press again to abort)");
    })
    .context("failed to install Ctrl-C handler")?;

    let mut engine = Engine::new();
    for plugin in lumen_plugins::available() {
        engine.provide_plugin(plugin);
    }

    let mut reports = Vec::new();
    for scene in &scenes {
        if interrupted.load(Ordering::SeqCst) {
            log::warn!("interrupted; skipping remaining scenes");
            break;
        }
        let start = Instant::now();
        let image = out_dir.join(format!("{scene}.png"));
        render_scene(&mut engine, &args, &bin_path, &scene_path, scene, &image)
            .with_context(|| format!("scene [{scene}] failed"))?;
        let elapsed_ms = start.elapsed().as_millis();
        log::info!("[{scene}] done in {elapsed_ms} ms -> {:?}", image);
        reports.push(SceneReport {
            name: scene.clone(),
            image,
            elapsed_ms,
        });
    }
    engine.shutdown();

    let finished_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let receipt = RunReceipt {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at_utc,
        finished_at_utc,
        interrupted: interrupted.load(Ordering::SeqCst),
        args: RunArgsSummary {
            scene_path,
            bin_path,
            out_dir: out_dir.clone(),
            width: args.width,
            height: args.height,
            threads: args.threads,
            accel: args.accel,
            renderer: args.renderer,
        },
        scenes: reports,
        host: HostInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
    };
    write_json(&out_dir.join("run.json"), &receipt)
}

/// One pass of the smoke-test sequence for a single scene.
fn render_scene(
    engine: &mut Engine,
    args: &RenderAllArgs,
    bin_path: &Path,
    scene_path: &Path,
    scene: &str,
    out: &PathBuf,
) -> Result<()> {
    engine.init("user::default", &json!({ "numThreads": args.threads }))?;
    engine.parallel_init("parallel::openmp", &json!({ "numThreads": args.threads }))?;
    for plugin in PLUGINS {
        if engine.loaded_plugins().iter().any(|loaded| loaded == plugin) {
            continue;
        }
        engine.load_plugin(bin_path.join(plugin))?;
    }
    engine.objloader_init("objloader::tinyobjloader", &json!({}))?;

    let film = engine.asset(
        lumen_scenes::FILM_OUTPUT,
        "film::bitmap",
        &json!({ "w": args.width, "h": args.height }),
    )?;
    lumen_scenes::load(engine, scene_path, scene)?;
    engine.build(&args.accel, &json!({}))?;
    engine.render(&args.renderer, &json!({ "output": film }))?;

    let buffer = engine.buffer(&film)?;
    let expected = args.width as usize * args.height as usize * 3;
    if buffer.data.len() != expected {
        return Err(anyhow!(
            "buffer holds {} values, expected {}",
            buffer.data.len(),
            expected
        ));
    }

    let mut png = Cursor::new(Vec::new());
    to_display_image(&buffer)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|err| anyhow!("failed to encode png: {err}"))?;
    atomic_write(out, png.get_ref())?;

    engine.reset()
}

fn read_env(path: &Path) -> Result<FunctestEnv> {
    let contents = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read env file {:?}: {}", path, err))?;
    serde_json::from_str(&contents)
        .map_err(|err| anyhow!("failed to parse env file {:?}: {}", path, err))
}

fn select_scenes(requested: &[String]) -> Result<Vec<String>> {
    let catalog = lumen_scenes::scenes();
    if requested.is_empty() {
        return Ok(catalog.into_iter().map(str::to_string).collect());
    }
    for name in requested {
        if !catalog.contains(&name.as_str()) {
            return Err(anyhow!(
                "unknown scene [{name}] (available: {})",
                catalog.join(", ")
            ));
        }
    }
    Ok(requested.to_vec())
}

fn default_out_dir() -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    PathBuf::from("output").join(stamp)
}

fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn atomic_write(path: &PathBuf, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .map_err(|err| anyhow!("failed to create output directory {:?}: {}", parent, err))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)
        .map_err(|err| anyhow!("failed to create temp file {:?}: {}", tmp_path, err))?;
    file.write_all(data)
        .map_err(|err| anyhow!("failed to write temp file {:?}: {}", tmp_path, err))?;
    file.sync_all()
        .map_err(|err| anyhow!("failed to sync temp file {:?}: {}", tmp_path, err))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("failed to replace output {:?}: {}", path, err));
    }

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    parent.join(format!(".{file_name}.part-{pid}-{stamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_scenes_defaults_to_catalog() {
        let all = select_scenes(&[]).unwrap();
        assert_eq!(all.len(), lumen_scenes::scenes().len());

        let some = select_scenes(&["cube".to_string()]).unwrap();
        assert_eq!(some, ["cube"]);

        assert!(select_scenes(&["fireplace_room".to_string()]).is_err());
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = std::env::temp_dir().join(format!("lumen-functest-{}", std::process::id()));
        let path = dir.join("run.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    fn small_run() -> RenderAllArgs {
        RenderAllArgs {
            env: None,
            scene_path: None,
            bin_path: None,
            out_dir: None,
            width: 24,
            height: 16,
            threads: 2,
            accel: "accel::nanort".to_string(),
            renderer: "renderer::raycast".to_string(),
            log_level: "warn".to_string(),
            scenes: Vec::new(),
        }
    }

    #[test]
    fn render_scene_runs_consecutive_scenes() {
        let dir = std::env::temp_dir().join(format!("lumen-functest-scenes-{}", std::process::id()));
        let args = small_run();
        let scene_path = lumen_scenes::default_scene_path();
        let mut engine = Engine::new();
        for plugin in lumen_plugins::available() {
            engine.provide_plugin(plugin);
        }

        for scene in ["quad", "cornell_box"] {
            let out = dir.join(format!("{scene}.png"));
            render_scene(&mut engine, &args, Path::new("plugins"), &scene_path, scene, &out).unwrap();
            let png = image::open(&out).unwrap();
            assert_eq!((png.width(), png.height()), (24, 16), "{scene}");
        }
        assert_eq!(engine.loaded_plugins(), PLUGINS);
        engine.shutdown();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn env_file_fills_defaults() {
        let env: FunctestEnv = serde_json::from_str(r#"{"scene_path": "scenes"}"#).unwrap();
        assert_eq!(env.bin_path, PathBuf::from("plugins"));
        assert_eq!(env.scene_path, Some(PathBuf::from("scenes")));
    }
}
