//! Shared data structures for Lumen.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub const STATE_VERSION: u32 = 1;

/// Pixel data read back from a film. RGB triplets, rows bottom-to-top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilmBuffer {
    pub w: u32,
    pub h: u32,
    pub data: Vec<f32>,
}

impl FilmBuffer {
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = ((y * self.w + x) * 3) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    pub name: String,
    pub key: String,
    pub props: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PrimitiveRecord {
    Single { transform: [f32; 16], props: Value },
    Model { transform: [f32; 16], model: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccelRecord {
    pub key: String,
    pub props: Value,
}

/// Replayable description of everything registered with an engine since the
/// last reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineState {
    pub version: u32,
    pub assets: Vec<AssetRecord>,
    pub primitives: Vec<PrimitiveRecord>,
    #[serde(default)]
    pub accel: Option<AccelRecord>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            assets: Vec::new(),
            primitives: Vec::new(),
            accel: None,
        }
    }
}

/// Locations the functional tests read binaries and scenes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctestEnv {
    #[serde(default = "default_bin_path")]
    pub bin_path: PathBuf,
    #[serde(default)]
    pub scene_path: Option<PathBuf>,
}

fn default_bin_path() -> PathBuf {
    PathBuf::from("plugins")
}

impl Default for FunctestEnv {
    fn default() -> Self {
        Self {
            bin_path: default_bin_path(),
            scene_path: None,
        }
    }
}
