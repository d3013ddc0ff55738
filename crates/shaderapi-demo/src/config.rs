// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use shaderapi_device::{CullMode, FrontFace, PresentPreference, ShaderDeviceInfo};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CullCfg {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrontFaceCfg {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_true")]
    pub wireframe: bool,
    #[serde(default)]
    pub cull: CullCfg,
    #[serde(default)]
    pub front_face: FrontFaceCfg,
    #[serde(default = "default_shader_root")]
    pub shader_root: PathBuf,
    /// Unset keeps the build default (on in debug builds).
    #[serde(default)]
    pub validation: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SceneCfg {
    #[serde(default = "default_meshes")]
    pub meshes: u32,
    /// Radians per second.
    #[serde(default = "default_spin")]
    pub spin: f32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub device: DeviceCfg,
    #[serde(default)]
    pub scene: SceneCfg,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        DeviceCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            wireframe: true,
            cull: CullCfg::Back,
            front_face: FrontFaceCfg::Clockwise,
            shader_root: default_shader_root(),
            validation: None,
        }
    }
}

impl Default for SceneCfg {
    fn default() -> Self {
        SceneCfg {
            meshes: default_meshes(),
            spin: default_spin(),
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_true() -> bool {
    true
}
fn default_shader_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_meshes() -> u32 {
    16
}
fn default_spin() -> f32 {
    0.8
}

impl DeviceCfg {
    pub fn apply(&self, info: &mut ShaderDeviceInfo) {
        info.clear_color = self.clear_color;
        info.present = match self.present_mode {
            PresentModeCfg::Fifo => PresentPreference::Fifo,
            PresentModeCfg::Mailbox => PresentPreference::Mailbox,
        };
        info.wireframe = self.wireframe;
        info.cull_mode = match self.cull {
            CullCfg::None => CullMode::None,
            CullCfg::Front => CullMode::Front,
            CullCfg::Back => CullMode::Back,
        };
        info.front_face = match self.front_face {
            FrontFaceCfg::Clockwise => FrontFace::Clockwise,
            FrontFaceCfg::CounterClockwise => FrontFace::CounterClockwise,
        };
        info.shader_root = self.shader_root.clone();
        if let Some(v) = self.validation {
            info.validation = v;
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// A missing file gives the defaults; a malformed one is reported and
/// ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("config: {} ignored: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}
