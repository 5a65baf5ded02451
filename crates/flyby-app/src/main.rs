// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use flyby_core::init_tracing;
use flyby_math::{CameraParams, FlyCamera, InputState, SceneMatrices};
use flyby_scene::{classify_meshes, load_obj_model, CpuMesh};
use flyby_vk::{FrameOutcome, RenderSize, RendererConfig, SceneUniform, VkRenderer};
use tracing::{error, info, warn};

use flyby_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{CursorGrabMode, Window, WindowId},
};
use flyby_platform::{apply_key, apply_mouse_button, KeyOutcome};

mod config;

use config::load_cfg;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fly through a car and city scene", long_about = None)]
struct Args {
    /// OBJ file for the car model
    #[arg(long, default_value = "assets/cw1/scenes/car.obj")]
    car: PathBuf,
    /// OBJ file for the city model
    #[arg(long, default_value = "assets/cw1/scenes/city.obj")]
    city: PathBuf,
    /// TOML config; defaults apply when it is missing
    #[arg(long, default_value = "flyby.toml")]
    config: PathBuf,
    /// Read every vertex buffer back after upload and compare with the source
    #[arg(long)]
    verify_uploads: bool,
}

/// `(meshes, textured meshes)` after classification.
fn draw_counts(meshes: &[CpuMesh]) -> (usize, usize) {
    let textured = meshes.iter().filter(|m| m.is_textured()).count();
    (meshes.len(), textured)
}

fn load_scene(paths: &[&PathBuf]) -> Result<Vec<CpuMesh>> {
    let mut meshes = Vec::new();
    for path in paths {
        let model = load_obj_model(path)?;
        let classified =
            classify_meshes(&model).with_context(|| format!("classifying {}", path.display()))?;
        let (draws, textured) = draw_counts(&classified);
        info!("{}: {draws} draw meshes, {textured} textured", path.display());
        meshes.extend(classified);
    }
    Ok(meshes)
}

fn scene_uniform(m: &SceneMatrices) -> SceneUniform {
    SceneUniform {
        camera: m.camera.to_cols_array_2d(),
        projection: m.projection.to_cols_array_2d(),
        proj_cam: m.proj_cam.to_cols_array_2d(),
    }
}

fn set_mouse_look(window: &Window, on: bool) {
    if on {
        let grabbed = window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
        if let Err(e) = grabbed {
            warn!("cursor grab unavailable: {e}");
        }
    } else if let Err(e) = window.set_cursor_grab(CursorGrabMode::None) {
        warn!("cursor release failed: {e}");
    }
    window.set_cursor_visible(!on);
}

struct App {
    meshes: Vec<CpuMesh>,
    renderer_cfg: RendererConfig,
    params: CameraParams,

    // Field order: the renderer must drop before its window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    camera: FlyCamera,
    input: InputState,
    last_frame: Instant,
    frames: u32,
    last_fps_instant: Instant,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.fatal = Some(e);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("flyby")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let size = window.inner_size();
        let renderer = VkRenderer::new(
            &window,
            &window,
            RenderSize {
                width: size.width,
                height: size.height,
            },
            &self.meshes,
            self.renderer_cfg,
        )
        .context("Vulkan renderer init")?;
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.camera.update(&mut self.input, dt, &self.params);
        let extent = renderer.extent();
        let m = self.camera.matrices(&self.params, extent.width, extent.height);

        if renderer.render_frame(&scene_uniform(&m))? == FrameOutcome::Presented {
            self.frames = self.frames.saturating_add(1);
        }

        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                info!("Resized → {}x{}", new_size.width, new_size.height);
                if let Some(r) = &mut self.renderer {
                    r.notify_resized(RenderSize {
                        width: new_size.width,
                        height: new_size.height,
                    });
                }
            }

            WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
                if apply_key(&mut self.input, event.physical_key, event.state)
                    == KeyOutcome::CloseRequested
                {
                    info!("Escape pressed");
                    self.shutdown(event_loop);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(on) = apply_mouse_button(&mut self.input, button, state) {
                    if let Some(w) = &self.window {
                        set_mouse_look(w, on);
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.add_look_delta(delta.0 as f32, delta.1 as f32);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match (&self.window, &self.renderer) {
            (Some(w), Some(r)) if !r.is_paused() => {
                event_loop.set_control_flow(ControlFlow::Poll);
                w.request_redraw();
            }
            // Minimised: sleep until the next resize.
            _ => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    info!("config: {:?}", cfg);

    let meshes = load_scene(&[&args.car, &args.city])?;
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        meshes,
        renderer_cfg: cfg.renderer(args.verify_uploads),
        params: cfg.camera_params(),
        renderer: None,
        window: None,
        camera: FlyCamera::default(),
        input: InputState::default(),
        last_frame: Instant::now(),
        frames: 0,
        last_fps_instant: Instant::now(),
        fatal: None,
    };

    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyby_math::glam::Mat4;
    use flyby_scene::CpuMeshKind;

    #[test]
    fn uniform_matches_matrix_columns() {
        let m = SceneMatrices {
            camera: Mat4::from_translation([1.0, 2.0, 3.0].into()),
            projection: Mat4::IDENTITY,
            proj_cam: Mat4::from_scale([2.0, 2.0, 2.0].into()),
        };
        let u = scene_uniform(&m);
        assert_eq!(u.camera[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(u.projection, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(u.proj_cam[1][1], 2.0);
    }

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["flyby"]);
        assert_eq!(args.car, PathBuf::from("assets/cw1/scenes/car.obj"));
        assert_eq!(args.config, PathBuf::from("flyby.toml"));
        assert!(!args.verify_uploads);
        let args = Args::parse_from(["flyby", "--city", "x.obj", "--verify-uploads"]);
        assert_eq!(args.city, PathBuf::from("x.obj"));
        assert!(args.verify_uploads);
    }

    #[test]
    fn draw_counts_split_textured_meshes() {
        let mesh = |kind| CpuMesh {
            name: "m".into(),
            positions: vec![0.0; 9],
            vertex_count: 3,
            kind,
        };
        let meshes = [
            mesh(CpuMeshKind::Colored { colors: vec![1.0; 9] }),
            mesh(CpuMeshKind::Textured {
                texcoords: vec![0.0; 6],
                texture: PathBuf::from("asphalt.png"),
            }),
            mesh(CpuMeshKind::Colored { colors: vec![0.5; 9] }),
        ];
        assert_eq!(draw_counts(&meshes), (3, 1));
        assert_eq!(draw_counts(&[]), (0, 0));
    }
}
