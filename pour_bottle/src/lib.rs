//! # pour_bottle
//!
//! A tilt-to-pour bottle toy.  A 3D bottle turns slowly and bobs while the
//! device is held still; tip it past the pour angle and a pour sound plays
//! (at most once a second, for as long as it stays tipped).
//!
//! Motion classification lives in the `tilt_motion` crate.  This crate wires
//! it to a window, a sample source and an audio device.
//!
//! ## Start gating
//!
//! Nothing listens to sensors and no audio device opens until the start
//! action.  On start: motion permission, orientation permission (outcome
//! ignored), audio, and only then sensors, so a pour on the first sample is
//! audible.
//!
//! ## Sensor sources
//!
//! * (default): **Simulation mode**, the keyboard drives a virtual attitude.
//! * `--sensor-stream FILE` / `-`: lines of `x y z` gravity-inclusive
//!   acceleration (m/s²) from a file or stdin, optionally led by a `t_ms`
//!   column.  Files replay in real time, at `[sensor] replay_rate_hz` when
//!   lines carry no time.
//!
//! ### Simulation keyboard shortcuts
//!
//! | Key | Action |
//! |---|---|
//! | `Space` / `Enter` / click | Start |
//! | `Up` / `Down` | Tip forward / back (pitch) |
//! | `Left` / `Right` | Roll |
//! | `J` | Shake |
//! | `R` | Level |
//! | `Q` / `Escape` | Quit |
//!
//! ## Sound
//!
//! The configured WAV is played on every pour.  If it is missing or
//! unreadable a short synthesized tone stands in; if there is no output
//! device at all, pours are silent.

pub mod error;
pub mod config;
pub mod model;
pub mod scene;
pub mod audio;
pub mod sensor;
pub mod permission;
pub mod visualizer;
pub mod app;
