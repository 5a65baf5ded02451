// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use flyby_math::CameraParams;
use flyby_vk::{RendererConfig, VkVsyncMode};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    #[default]
    Fifo,
    Mailbox,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CameraCfg {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub move_speed: f32,
    pub look_sensitivity: f32,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub camera: CameraCfg,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.1, 0.1, 0.1, 1.0],
            vsync: true,
            vsync_mode: VsyncMode::Fifo,
        }
    }
}

impl Default for CameraCfg {
    fn default() -> Self {
        let p = CameraParams::default();
        CameraCfg {
            fov_deg: 60.0,
            near: p.near,
            far: p.far,
            move_speed: p.move_speed,
            look_sensitivity: p.look_sensitivity,
        }
    }
}

impl AppCfg {
    pub fn renderer(&self, verify_uploads: bool) -> RendererConfig {
        RendererConfig {
            clear_color: self.render.clear_color,
            vsync: self.render.vsync,
            vsync_mode: match self.render.vsync_mode {
                VsyncMode::Fifo => VkVsyncMode::Fifo,
                VsyncMode::Mailbox => VkVsyncMode::Mailbox,
            },
            verify_uploads,
        }
    }

    pub fn camera_params(&self) -> CameraParams {
        CameraParams {
            fov_y_radians: self.camera.fov_deg.to_radians(),
            near: self.camera.near,
            far: self.camera.far,
            move_speed: self.camera.move_speed,
            look_sensitivity: self.camera.look_sensitivity,
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Missing file: defaults. Unreadable or malformed file: warning, defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            return AppCfg::default();
        }
        Err(e) => {
            warn!("reading {}: {e}; using defaults", path.display());
            return AppCfg::default();
        }
    };
    match parse_cfg(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("malformed config {}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse_cfg("").unwrap(), AppCfg::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [render]
            vsync_mode = "mailbox"

            [camera]
            move_speed = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert!(cfg.render.vsync);
        assert_eq!(cfg.render.clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(cfg.camera.move_speed, 10.0);
        assert_eq!(cfg.camera.far, 100.0);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse_cfg("[render]\nvsync_mode = \"sometimes\"").is_err());
        assert!(parse_cfg("[render\n").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/flyby.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn camera_degrees_become_radians() {
        let mut cfg = AppCfg::default();
        cfg.camera.fov_deg = 90.0;
        let p = cfg.camera_params();
        assert!((p.fov_y_radians - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(cfg.renderer(true).vsync_mode, VkVsyncMode::Fifo);
        assert!(cfg.renderer(true).verify_uploads);
    }
}
