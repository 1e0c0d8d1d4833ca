// =============================================================================
// VULKAN TRIANGLE - indexed meshes through a fixed Vulkan pipeline
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler, input, FPS, hot reload)         │
// │    └── Renderer (swapchain, pipeline, per-frame resources)      │
// │          └── VulkanDevice (instance, surface, queues, memory)   │
// └─────────────────────────────────────────────────────────────────┘
//
// Meshes are uploaded once through the renderer's MeshFactory and drawn
// every frame with a per-frame MVP uniform.
//
// =============================================================================

mod backend;
mod config;
mod fps;
mod hot_reload;
mod renderer;
mod scene;

use anyhow::Result;
use backend::mesh::Mesh;
use config::Config;
use fps::FpsCounter;
use hot_reload::ShaderWatcher;
use renderer::Renderer;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_error) = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan triangle");
    match config_error {
        Some(e) => log::warn!("Failed to load {}: {:#}. Using defaults.", config::CONFIG_PATH, e),
        None => log::debug!("Config: {:?}", config),
    }
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, optionally into `debug.log_file` instead of stderr
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    // RUST_LOG wins over the default level
    builder.parse_default_env();

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Vulkan Triangle Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: meshes go before the renderer that owns the
/// device they were allocated from.
struct App {
    config: Config,
    meshes: Vec<Mesh>,
    renderer: Option<Renderer>,
    shader_watcher: Option<ShaderWatcher>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // Key bindings, resolved once from the config
    quit_key: KeyCode,
    fullscreen_key: KeyCode,
    reload_key: KeyCode,

    fps: FpsCounter,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            is_fullscreen: config.window.fullscreen,
            quit_key: config.controls.quit_key(),
            fullscreen_key: config.controls.fullscreen_key(),
            reload_key: config.controls.reload_key(),
            config,
            meshes: Vec::new(),
            renderer: None,
            shader_watcher: None,
            window: None,
            fps: FpsCounter::new(Instant::now()),
        }
    }

    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        let renderer = Renderer::new(window, &self.config)?;

        let factory = renderer.mesh_factory();
        let meshes = scene::default_scene()
            .iter()
            .map(|data| factory.create_mesh(data))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Uploaded {} meshes ({} vertices)",
            meshes.len(),
            meshes.iter().map(Mesh::vertex_count).sum::<u32>()
        );

        if self.config.debug.hot_reload_shaders {
            self.shader_watcher = ShaderWatcher::new(&self.config.graphics.shader_dir);
        }

        self.meshes = meshes;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match renderer.draw_frame(&self.meshes) {
            Ok(true) => self.update_fps(),
            Ok(false) => {}
            Err(e) => log::error!("Render error: {:?}", e),
        }
    }

    fn reload_shaders(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = renderer.reload_pipeline() {
                log::error!("Shader reload failed, keeping previous pipeline: {:?}", e);
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        self.is_fullscreen = !self.is_fullscreen;
        window.set_fullscreen(self.is_fullscreen.then_some(Fullscreen::Borderless(None)));
        log::info!("Fullscreen: {}", self.is_fullscreen);

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.request_recreate();
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }
        let Some(sample) = self.fps.tick(Instant::now()) else {
            return;
        };
        if let Some(ref window) = self.window {
            window.set_title(&fps::window_title(
                &self.config.window.title,
                &sample,
                self.is_fullscreen,
            ));
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(ref renderer) = self.renderer {
            if let Err(e) = renderer.wait_idle() {
                log::error!("wait_idle during shutdown failed: {:?}", e);
            }
        }
        self.meshes.clear();
        self.shader_watcher = None;
        self.renderer = None;
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(window.clone()) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::error!("wait_idle on close failed: {:?}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.notify_resized(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => self.render(),

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                self.handle_key(event_loop, key);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let changed = self
            .shader_watcher
            .as_ref()
            .is_some_and(|watcher| watcher.poll_changed());
        if changed {
            log::info!("Shader binaries changed on disk");
            self.reload_shaders();
        }

        // Continuous rendering; a Resized event wakes the loop after a minimize
        if self.renderer.as_ref().is_some_and(Renderer::is_minimized) {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl App {
    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        if key == self.quit_key {
            log::info!("{:?} pressed, exiting...", key);
            event_loop.exit();
        } else if key == self.fullscreen_key {
            self.toggle_fullscreen();
        } else if key == self.reload_key {
            log::info!("Reloading shaders");
            self.reload_shaders();
        }
    }
}
