// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is optional; missing keys take the defaults below.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

pub const CONFIG_PATH: &str = "config.toml";
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub camera: CameraConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 800,
            height: 600,
            resizable: false,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    pub shader_dir: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.6, 0.65, 0.6, 1.0],
            max_frames_in_flight: 2,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Fixed camera used to build the view/projection matrices
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds
    pub validation_layers: bool,
    pub profiles_layer: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    pub hot_reload_shaders: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            profiles_layer: false,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
            hot_reload_shaders: true,
        }
    }
}

/// Control key bindings, by winit `KeyCode` name
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
    pub reload_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
            reload_key: "F5".to_string(),
        }
    }
}

impl ControlsConfig {
    pub fn fullscreen_key(&self) -> KeyCode {
        resolve_key(&self.fullscreen_key, KeyCode::F11)
    }

    pub fn quit_key(&self) -> KeyCode {
        resolve_key(&self.quit_key, KeyCode::Escape)
    }

    pub fn reload_key(&self) -> KeyCode {
        resolve_key(&self.reload_key, KeyCode::F5)
    }
}

fn resolve_key(name: &str, fallback: KeyCode) -> KeyCode {
    parse_key_code(name).unwrap_or_else(|| {
        log::warn!("Unknown key '{}', using {:?}", name, fallback);
        fallback
    })
}

/// Map a key name ("F11", "Escape", "Q", "5") to a winit key code
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    let upper = name.trim().to_ascii_uppercase();
    let key = match upper.as_str() {
        "ESCAPE" | "ESC" => KeyCode::Escape,
        "SPACE" => KeyCode::Space,
        "ENTER" | "RETURN" => KeyCode::Enter,
        "TAB" => KeyCode::Tab,
        "BACKSPACE" => KeyCode::Backspace,
        "F1" => KeyCode::F1,
        "F2" => KeyCode::F2,
        "F3" => KeyCode::F3,
        "F4" => KeyCode::F4,
        "F5" => KeyCode::F5,
        "F6" => KeyCode::F6,
        "F7" => KeyCode::F7,
        "F8" => KeyCode::F8,
        "F9" => KeyCode::F9,
        "F10" => KeyCode::F10,
        "F11" => KeyCode::F11,
        "F12" => KeyCode::F12,
        other => return parse_character_key(other),
    };
    Some(key)
}

fn parse_character_key(name: &str) -> Option<KeyCode> {
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let key = match c {
        'A' => KeyCode::KeyA,
        'B' => KeyCode::KeyB,
        'C' => KeyCode::KeyC,
        'D' => KeyCode::KeyD,
        'E' => KeyCode::KeyE,
        'F' => KeyCode::KeyF,
        'G' => KeyCode::KeyG,
        'H' => KeyCode::KeyH,
        'I' => KeyCode::KeyI,
        'J' => KeyCode::KeyJ,
        'K' => KeyCode::KeyK,
        'L' => KeyCode::KeyL,
        'M' => KeyCode::KeyM,
        'N' => KeyCode::KeyN,
        'O' => KeyCode::KeyO,
        'P' => KeyCode::KeyP,
        'Q' => KeyCode::KeyQ,
        'R' => KeyCode::KeyR,
        'S' => KeyCode::KeyS,
        'T' => KeyCode::KeyT,
        'U' => KeyCode::KeyU,
        'V' => KeyCode::KeyV,
        'W' => KeyCode::KeyW,
        'X' => KeyCode::KeyX,
        'Y' => KeyCode::KeyY,
        'Z' => KeyCode::KeyZ,
        '0' => KeyCode::Digit0,
        '1' => KeyCode::Digit1,
        '2' => KeyCode::Digit2,
        '3' => KeyCode::Digit3,
        '4' => KeyCode::Digit4,
        '5' => KeyCode::Digit5,
        '6' => KeyCode::Digit6,
        '7' => KeyCode::Digit7,
        '8' => KeyCode::Digit8,
        '9' => KeyCode::Digit9,
        _ => return None,
    };
    Some(key)
}

impl Config {
    /// Load `config.toml`, falling back to defaults on any error.
    ///
    /// Runs before logging is configured, so the error is handed back for
    /// the caller to report.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path; a missing file gives defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics
            .max_frames_in_flight
            .clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT)
    }

    /// Validation is compiled out of release builds regardless of the file
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.title, "Vulkan Triangle");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert!(!config.window.resizable);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.graphics.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.camera.up, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            width = 1024
            resizable = true

            [graphics]
            present_mode = "FIFO"
            clear_color = [0.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert!(config.window.resizable);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let zero = Config::parse("[graphics]\nmax_frames_in_flight = 0").unwrap();
        assert_eq!(zero.frames_in_flight(), 1);
        let many = Config::parse("[graphics]\nmax_frames_in_flight = 16").unwrap();
        assert_eq!(many.frames_in_flight(), MAX_FRAMES_IN_FLIGHT_LIMIT);
    }

    #[test]
    fn camera_section_parses() {
        let config = Config::parse(
            "[camera]\neye = [0.0, -3.0, 1.0]\nfov_y_degrees = 60.0\nfar = 100.0",
        )
        .unwrap();
        assert_eq!(config.camera.eye, [0.0, -3.0, 1.0]);
        assert_eq!(config.camera.fov_y_degrees, 60.0);
        assert_eq!(config.camera.far, 100.0);
        assert_eq!(config.camera.near, 0.1);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.controls.quit_key, "Escape");
    }

    #[test]
    fn broken_file_falls_back_with_error() {
        let path = std::env::temp_dir().join(format!("vk-triangle-broken-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();

        assert!(Config::load_from_path(&path).is_err());
        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        let error = error.expect("broken file should report an error");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_falls_back_silently() {
        let (config, error) = Config::load_or_default("does/not/exist.toml");
        assert!(error.is_none());
        assert_eq!(config.window.title, "Vulkan Triangle");
    }

    #[test]
    fn key_names_parse() {
        assert_eq!(parse_key_code("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key_code("escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key_code("q"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key_code(" 7 "), Some(KeyCode::Digit7));
        assert_eq!(parse_key_code("Hyper"), None);
        assert_eq!(parse_key_code(""), None);
    }

    #[test]
    fn unknown_keys_fall_back_to_defaults() {
        let config = Config::parse(
            "[controls]\nquit_key = \"Q\"\nfullscreen_key = \"NotAKey\"",
        )
        .unwrap();
        assert_eq!(config.controls.quit_key(), KeyCode::KeyQ);
        assert_eq!(config.controls.fullscreen_key(), KeyCode::F11);
        assert_eq!(config.controls.reload_key(), KeyCode::F5);
    }
}
