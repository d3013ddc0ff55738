// SPDX-License-Identifier: CEPL-1.0
//! Device settings: the host's creation info plus environment overrides.
use std::path::PathBuf;

use shaderapi_device::{BatchLimits, PresentPreference, ShaderDeviceInfo};
use tracing::{info, warn};

use crate::pipeline::RasterState;

pub const ENV_SHADER_DIR: &str = "SHADERAPI_SHADER_DIR";
pub const ENV_VALIDATION: &str = "SHADERAPI_VALIDATION";
pub const ENV_PRESENT_MODE: &str = "SHADERAPI_PRESENT_MODE";

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSettings {
    pub shader_root: PathBuf,
    pub validation: bool,
    pub present: PresentPreference,
    pub raster: RasterState,
    pub limits: BatchLimits,
}

impl DeviceSettings {
    pub fn from_info(info: &ShaderDeviceInfo) -> Self {
        Self {
            shader_root: info.shader_root.clone(),
            validation: info.validation,
            present: info.present,
            raster: RasterState {
                cull: info.cull_mode,
                front: info.front_face,
                wireframe: info.wireframe,
            },
            limits: info.limits,
        }
    }

    /// Reads the process environment once (`SHADERAPI_SHADER_DIR`,
    /// `SHADERAPI_VALIDATION`, `SHADERAPI_PRESENT_MODE`).
    pub fn from_env(info: &ShaderDeviceInfo) -> Self {
        Self::from_info(info).apply_env(|k| std::env::var(k).ok())
    }

    /// Unrecognised values are logged and ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_SHADER_DIR).filter(|d| !d.is_empty()) {
            info!("vk: shader root from {ENV_SHADER_DIR}: {dir}");
            self.shader_root = PathBuf::from(dir);
        }
        match lookup(ENV_VALIDATION).as_deref() {
            None => {}
            Some("1") => self.validation = true,
            Some("0") => self.validation = false,
            Some(other) => warn!("vk: ignoring {ENV_VALIDATION}={other:?} (want 0 or 1)"),
        }
        match lookup(ENV_PRESENT_MODE).as_deref() {
            None => {}
            Some(s) if s.eq_ignore_ascii_case("fifo") => self.present = PresentPreference::Fifo,
            Some(s) if s.eq_ignore_ascii_case("mailbox") => {
                self.present = PresentPreference::Mailbox
            }
            Some(other) => warn!("vk: ignoring {ENV_PRESENT_MODE}={other:?} (want fifo or mailbox)"),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_device::{CullMode, RenderSize, ViewHandle};
    use std::collections::HashMap;

    use raw_window_handle::{
        RawDisplayHandle, RawWindowHandle, WebDisplayHandle, WebWindowHandle,
    };

    fn info() -> ShaderDeviceInfo {
        let view = ViewHandle {
            window: RawWindowHandle::Web(WebWindowHandle::new(1)),
            display: RawDisplayHandle::Web(WebDisplayHandle::new()),
            size: RenderSize::new(800, 600),
        };
        let mut info = ShaderDeviceInfo::new(view);
        info.validation = false;
        info
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_come_from_creation_info() {
        let s = DeviceSettings::from_info(&info());
        assert_eq!(s.shader_root, PathBuf::from("."));
        assert_eq!(s.present, PresentPreference::Mailbox);
        assert_eq!(s.raster.cull, CullMode::Back);
        assert!(s.raster.wireframe);
        assert_eq!(s.limits.max_meshes, 1024);
        assert_eq!(s, DeviceSettings::from_info(&info()).apply_env(env(&[])));
    }

    #[test]
    fn environment_overrides() {
        let s = DeviceSettings::from_info(&info()).apply_env(env(&[
            (ENV_SHADER_DIR, "/opt/game"),
            (ENV_VALIDATION, "1"),
            (ENV_PRESENT_MODE, "FIFO"),
        ]));
        assert_eq!(s.shader_root, PathBuf::from("/opt/game"));
        assert!(s.validation);
        assert_eq!(s.present, PresentPreference::Fifo);
    }

    #[test]
    fn bad_values_are_ignored() {
        let base = DeviceSettings::from_info(&info());
        let s = base.clone().apply_env(env(&[
            (ENV_SHADER_DIR, ""),
            (ENV_VALIDATION, "yes"),
            (ENV_PRESENT_MODE, "immediate"),
        ]));
        assert_eq!(s, base);
    }
}
