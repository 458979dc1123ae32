//! Application configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an empty file (or none at all) is valid:
//!
//! ```toml
//! [classifier]
//! still_threshold = 0.25
//! still_window_ms = 120
//! pour_pitch_deg  = 60
//! debounce_ms     = 1000
//!
//! [audio]
//! pour_sound = "assets/pour.wav"
//!
//! [model]
//! path = "assets/bottle.obj.gz"
//!
//! [sensor]
//! stream = "-"        # read "x y z" lines from stdin
//! replay_rate_hz = 50  # rate of a recording that has no time column
//! ```

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use tilt_motion::ClassifierConfig;

use crate::error::{PourError, PourResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub audio:      AudioConfig,
    pub model:      ModelConfig,
    pub sensor:     SensorConfig,
    pub ui:         UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// WAV file played on every pour.  `None` goes straight to the
    /// synthesized tone.
    pub pour_sound: Option<PathBuf>,
    /// Frequency of the synthesized fallback tone.
    pub tone_hz:    f32,
    /// Peak gain of the fallback tone (0.0–1.0).
    pub tone_gain:  f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            pour_sound: None,
            tone_hz:    660.0,
            tone_gain:  0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// External `.obj` / `.obj.gz` model.  `None` builds the bottle
    /// procedurally.
    pub path:     Option<PathBuf>,
    /// Radial segments of the procedural bottle.
    pub segments: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig { path: None, segments: 32 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Line stream of `x y z` (or `t_ms x y z`) samples: a file path, or
    /// `-` for stdin.  `None` uses the keyboard tilt simulator.
    pub stream:         Option<String>,
    /// Sample rate assumed for a recorded file whose lines carry no time
    /// column.  Files are replayed at this rate.
    pub replay_rate_hz: f64,
    /// Gravity magnitude used by the simulator.
    pub gravity:        f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig { stream: None, replay_rate_hz: 50.0, gravity: 9.81 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// How long the "tilt to pour" hint stays up after start.
    pub hint_ms:        u64,
    /// Ask for motion access on the terminal when start is pressed.
    pub ask_permission: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig { hint_ms: 1200, ask_permission: false }
    }
}

/// Parse a config from TOML text.
pub fn parse_config(text: &str) -> PourResult<AppConfig> {
    toml::from_str(text).map_err(|e| PourError::Config(e.to_string()))
}

/// Load config from `path`, or return defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> PourResult<AppConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let cfg = parse_config(&text)?;
            info!("Loaded config from {}", path.display());
            Ok(cfg)
        }
        None => {
            info!("No config file given, using defaults");
            Ok(AppConfig::default())
        }
    }
}
