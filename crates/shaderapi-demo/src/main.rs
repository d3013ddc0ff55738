// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use shaderapi_core::init_tracing;
use shaderapi_device::{AdapterInfo, ShaderDevice, ShaderDeviceInfo};
use shaderapi_platform::{render_size, view_from_window};
use shaderapi_vk::VkShaderDevice;
use tracing::{error, info};

use shaderapi_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;
mod scene;

use config::{load_cfg, AppCfg};
use scene::Scene;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file
    #[arg(long, default_value = "shaderapi.toml")]
    config: PathBuf,
    /// Physical adapter index; the first usable one when omitted
    #[arg(long)]
    adapter: Option<usize>,
    /// Meshes drawn per frame (overrides the config file)
    #[arg(long)]
    meshes: Option<u32>,
}

/// `device` is declared before `window` so the surface goes before the
/// window it was created from.
struct App {
    args: Args,
    cfg: AppCfg,
    device: VkShaderDevice,
    scene: Option<Scene>,
    window: Option<Window>,

    exiting: bool,
    paused: bool,
    started: Instant,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn start(&mut self, window: &Window) -> Result<()> {
        let view = view_from_window(window)?;
        let mut info = ShaderDeviceInfo::new(view);
        self.cfg.device.apply(&mut info);
        self.device.init_device(
            &AdapterInfo {
                ordinal: self.args.adapter,
            },
            &info,
        );
        let meshes = self.args.meshes.unwrap_or(self.cfg.scene.meshes);
        self.scene = Some(Scene::new(&mut self.device, meshes, self.cfg.scene.spin));
        self.paused = view.size.is_empty();
        info!("demo: {meshes} meshes, paused={}", self.paused);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(scene) = self.scene.take() {
            scene.destroy(&mut self.device);
        }
        self.device.shutdown_device();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("shaderapi"))
            {
                Ok(w) => w,
                Err(e) => {
                    error!("create_window: {e}");
                    event_loop.exit();
                    return;
                }
            };
            if let Err(e) = self.start(&window) {
                error!("demo start: {e:#}");
                event_loop.exit();
                return;
            }
            window.request_redraw();
            self.window = Some(window);
        }
        event_loop.set_control_flow(ControlFlow::Wait);
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
                self.exiting = true;
                self.stop();
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                let size = render_size(new_size);
                self.device.resize(size);
                let now_paused = size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Resized → {}x{} (paused={})", size.width, size.height, self.paused);
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                if let Some(scene) = &mut self.scene {
                    let t = self.started.elapsed().as_secs_f32();
                    scene.draw(&mut self.device, t);
                    self.device.present();
                    self.frames = self.frames.saturating_add(1);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let now = Instant::now();
    let mut app = App {
        args,
        cfg,
        device: VkShaderDevice::new(),
        scene: None,
        window: None,
        exiting: false,
        paused: false,
        started: now,
        frames: 0,
        last_fps_instant: now,
    };

    event_loop.run_app(&mut app)?;
    app.stop();
    Ok(())
}
