//! # Viewer Application Logic
//!
//! Creates the window and the wgpu backend, builds the demo scene and drives
//! it from the winit event loop. Window events are buffered as
//! [`FrameEvent`]s and handed to the scene at the start of every redraw, so
//! all scene mutation happens in one place per frame.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::Vec3;
use raymarch::raymarcher::proxy_model_matrix;
use raymarch::{FrameEvent, Key, MaterialId, RenderError, RenderStats, RendererConfig, Scene, WgpuBackend};
use tracing::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::overlay::FrameTimer;
use crate::params::DemoParams;
use crate::watcher;

const VERTEX_SHADER: &str = "raymarcher.vert.wgsl";
const PROXY_VERTEX_SHADER: &str = "proxy.vert.wgsl";
const LIT_SPHERE_SHADER: &str = "sphere_lit.frag.wgsl";
const TEST_TEXTURE: &str = "test.png";
const TEXTURE_SAMPLER: &str = "texture_sampler";

pub struct Options {
    pub config: RendererConfig,
    pub fragment: String,
    pub lit_sphere: bool,
}

struct Demo {
    material: MaterialId,
    params: DemoParams,
}

impl Demo {
    fn build(scene: &mut Scene<WgpuBackend>, options: &Options) -> Result<Self> {
        let shader = scene.add_shader(VERTEX_SHADER, &options.fragment)?;
        let material = scene.add_material(shader)?;
        scene.add_object(scene.quad(), material)?;

        let texture = scene.load_texture(TEST_TEXTURE, true);
        scene
            .material_mut(material)
            .context("demo material vanished")?
            .add_texture(TEXTURE_SAMPLER, texture);

        if options.lit_sphere {
            let shader = scene.add_shader(PROXY_VERTEX_SHADER, LIT_SPHERE_SHADER)?;
            let lit = scene.add_material(shader)?;
            let object = scene.add_object(scene.cube(), lit)?;
            if let Some(object) = scene.object_mut(object) {
                object.set_model_matrix(proxy_model_matrix(Vec3::new(0.0, 1.5, 0.0), Vec3::splat(0.75)));
            }
            if let Some(lit) = scene.material_mut(lit) {
                lit.set_property("sphere_color", Vec3::new(1.0, 0.8, 0.2));
                lit.set_property("ambient", 0.1f32);
            }
        }

        Ok(Self {
            material,
            params: DemoParams::default(),
        })
    }

    fn update(&self, scene: &mut Scene<WgpuBackend>, time: f32) {
        let Ok(camera) = scene.camera().copied() else {
            return;
        };
        if let Some(material) = scene.material_mut(self.material) {
            self.params.apply(material, &camera, time);
        }
    }
}

fn map_key(code: KeyCode) -> Key {
    match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::Space => Key::Space,
        KeyCode::KeyR => Key::R,
        _ => Key::Other,
    }
}

/// Logs a frame's outcome. False when the error leaves nothing to render with.
fn keep_running(frame: raymarch::Result<RenderStats>) -> bool {
    match frame {
        Ok(_) => true,
        Err(RenderError::Surface(e)) => {
            warn!("Skipped frame: {e}");
            true
        }
        Err(e) if e.is_fatal() => {
            error!("Render failed, closing: {e}");
            false
        }
        Err(e) => {
            error!("Render failed: {e}");
            true
        }
    }
}

/// Runs the viewer until the window closes.
///
/// # Errors
///
/// Fails if the window or graphics device cannot be created, or the demo
/// shaders do not load.
pub fn run(options: Options) -> Result<()> {
    let config = options.config.clone();
    let event_loop = EventLoop::new().map_err(|e| RenderError::WindowCreationFailed(e.to_string()))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(&event_loop)
            .map_err(|e| RenderError::WindowCreationFailed(e.to_string()))?,
    );

    let size = window.inner_size();
    let backend = WgpuBackend::new(window.clone(), size.width, size.height)?;
    let mut scene = Scene::init(
        backend,
        RendererConfig {
            width: size.width,
            height: size.height,
            ..config.clone()
        },
    )?;
    let demo = Demo::build(&mut scene, &options).context("failed to build demo scene")?;

    let shader_watcher = if config.watch_shaders {
        match watcher::start(&config.shader_root) {
            Ok(w) => Some(w),
            Err(e) => {
                error!("Failed to start shader watcher: {e:?}");
                None
            }
        }
    } else {
        None
    };

    let start = Instant::now();
    let mut timer = FrameTimer::new(start);
    let mut overlay = false;
    let mut pending = Vec::new();
    info!("Starting render loop");

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => pending.push(FrameEvent::CloseRequested),
                WindowEvent::Resized(size) => pending.push(FrameEvent::Resized {
                    width: size.width,
                    height: size.height,
                }),
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(code),
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => pending.push(FrameEvent::KeyPressed(map_key(code))),
                WindowEvent::RedrawRequested => {
                    let control = scene.process_events(pending.drain(..));
                    if control.should_close {
                        elwt.exit();
                        return;
                    }
                    if control.toggle_overlay {
                        overlay = !overlay;
                        if !overlay {
                            window.set_title(&config.title);
                        }
                    }
                    let changed = shader_watcher.as_ref().is_some_and(watcher::ShaderWatcher::take_changes);
                    if changed && !control.reloaded {
                        scene.reload_shaders();
                    }

                    demo.update(&mut scene, start.elapsed().as_secs_f32());
                    if !keep_running(scene.render_frame()) {
                        elwt.exit();
                        return;
                    }

                    timer.tick(Instant::now());
                    if overlay {
                        window.set_title(&timer.status(&config.title));
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        })
        .context("event loop failed")?;
    Ok(())
}
