//! # tilt_motion
//!
//! Classifies a handheld device's gravity-inclusive accelerometer stream into
//! two signals:
//!
//! * **stillness**: whether the device has been resting over the last
//!   classification window, read by a render loop through a zero-argument
//!   accessor;
//! * **pouring**: whether the device is tipped forward past the pour angle,
//!   which fires a debounced playback trigger.
//!
//! No graphics or audio dependencies: the sound is whatever [`PourSink`] the
//! caller attaches after its audio subsystem is up.
//!
//! ## Quick start
//!
//! ```rust
//! use tilt_motion::{ClassifierConfig, GravityVector, ManualClock, MotionClassifier};
//!
//! let clock = ManualClock::new();
//! let mut classifier = MotionClassifier::with_clock(ClassifierConfig::default(), clock.clone());
//! classifier.attach_sink(Box::new(|| println!("glug")));
//!
//! let still = classifier.stillness_accessor();
//! clock.advance(100.0);
//! classifier.on_motion_sample(Some(GravityVector::new(0.0, 0.0, 9.81)));
//! assert!(still());
//!
//! clock.advance(100.0);
//! let out = classifier.on_motion_sample(Some(GravityVector::new(-9.8, 0.0, 0.5))).unwrap();
//! assert!(out.pouring);
//! ```

pub mod access;
pub mod classifier;
pub mod clock;
pub mod vector;

pub use access::{FixedAccess, MotionAccess, MotionPermission, Ungated};
pub use classifier::{
    ClassifierConfig, MotionClassifier, PlaybackOutcome, PourSink, SampleOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use vector::GravityVector;
