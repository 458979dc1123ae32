//! The motion classifier: turns a stream of gravity samples into a stillness
//! flag and level-triggered pour events.
//!
//! # Algorithm
//!
//! For each sample:
//!
//! * **Stillness**: L1 distance to the previous sample.  The flag is only
//!   recomputed once the still-window (default 120 ms) has elapsed since the
//!   last recomputation, which damps sensor jitter without a moving-average
//!   buffer.
//! * **Pour**: pitch of the normalised vector above `pour_pitch_deg` (default
//!   60°).  Fires on every such sample; the playback trigger's debounce keeps
//!   the sound from retriggering more than once per `debounce_ms`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::vector::GravityVector;

// ════════════════════════════════════════════════════════════════════════════
// ClassifierConfig
// ════════════════════════════════════════════════════════════════════════════

/// Tunable thresholds.  The defaults are empirical, not derived.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// L1 delta below which a sample counts as still.
    pub still_threshold: f64,
    /// Minimum monotonic time between stillness recomputations.
    pub still_window_ms: f64,
    /// Pitch above which the device counts as pouring.
    pub pour_pitch_deg:  f64,
    /// Minimum wall-clock gap between playback attempts.
    pub debounce_ms:     f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            still_threshold: 0.25,
            still_window_ms: 120.0,
            pour_pitch_deg:  60.0,
            debounce_ms:     1000.0,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// StillnessFlag: the read side handed to the render loop
// ════════════════════════════════════════════════════════════════════════════

/// Shared stillness boolean.  Written only by the classifier.
#[derive(Clone, Debug)]
struct StillnessFlag(Arc<AtomicBool>);

impl StillnessFlag {
    fn new(initial: bool) -> Self {
        StillnessFlag(Arc::new(AtomicBool::new(initial)))
    }

    fn get(&self) -> bool { self.0.load(Ordering::Relaxed) }

    fn set(&self, still: bool) { self.0.store(still, Ordering::Relaxed); }
}

// ════════════════════════════════════════════════════════════════════════════
// PourSink: where a debounced pour ends up
// ════════════════════════════════════════════════════════════════════════════

/// Receiver of debounced pour triggers, normally the audio engine.
///
/// Implementations must not panic; playback failures are theirs to swallow.
pub trait PourSink {
    fn play_pour(&mut self);
}

impl<F: FnMut()> PourSink for F {
    fn play_pour(&mut self) { self() }
}

// ════════════════════════════════════════════════════════════════════════════
// Outcomes
// ════════════════════════════════════════════════════════════════════════════

/// What [`MotionClassifier::trigger_playback`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The sink was asked to play.
    Triggered,
    /// Inside the debounce interval; nothing happened.
    Debounced,
    /// No sink attached yet; nothing happened.
    AudioUnavailable,
}

/// Derived signals for one accepted sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleOutcome {
    /// L1 distance to the previous sample.
    pub delta:     f64,
    pub pitch_deg: f64,
    /// Stillness after this sample (may be unchanged from the prior window).
    pub still:     bool,
    pub pouring:   bool,
    /// `None` when not pouring.
    pub playback:  Option<PlaybackOutcome>,
}

// ════════════════════════════════════════════════════════════════════════════
// MotionClassifier
// ════════════════════════════════════════════════════════════════════════════

pub struct MotionClassifier<C: Clock = SystemClock> {
    config:              ClassifierConfig,
    clock:               C,
    last_vector:         GravityVector,
    last_still_check_ms: f64,
    still:               StillnessFlag,
    /// `None` until the first playback; equivalent to the epoch.
    last_play_ms:        Option<f64>,
    sink:                Option<Box<dyn PourSink>>,
}

impl MotionClassifier<SystemClock> {
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> MotionClassifier<C> {
    pub fn with_clock(config: ClassifierConfig, clock: C) -> Self {
        MotionClassifier {
            config,
            clock,
            last_vector:         GravityVector::ZERO,
            last_still_check_ms: 0.0,
            still:               StillnessFlag::new(true),
            last_play_ms:        None,
            sink:                None,
        }
    }

    /// Enable playback.  Call only once audio has been initialised behind a
    /// user action.
    pub fn attach_sink(&mut self, sink: Box<dyn PourSink>) {
        self.sink = Some(sink);
    }

    /// Disable playback and hand the sink back.
    pub fn detach_sink(&mut self) -> Option<Box<dyn PourSink>> {
        self.sink.take()
    }

    // ── sensor input ─────────────────────────────────────────────────────

    /// Feed one live sensor sample, timed by the classifier's clock.
    ///
    /// `None` (the sensor did not report gravity-inclusive acceleration) and
    /// non-finite vectors are discarded without touching any state.
    pub fn on_motion_sample(&mut self, sample: Option<GravityVector>) -> Option<SampleOutcome> {
        self.classify(sample, None)
    }

    /// Feed one sample that carries its own time, e.g. from a recording.
    ///
    /// `t_ms` stands in for both the monotonic and the wall reading, so a
    /// replayed stream is windowed and debounced on its own timeline no
    /// matter how fast it is delivered.  A stream should be either timed or
    /// live throughout.
    pub fn on_motion_sample_at(&mut self, sample: Option<GravityVector>, t_ms: f64) -> Option<SampleOutcome> {
        self.classify(sample, Some(t_ms))
    }

    fn classify(&mut self, sample: Option<GravityVector>, at_ms: Option<f64>) -> Option<SampleOutcome> {
        let v = match sample {
            Some(v) if v.is_finite() => v,
            _ => {
                trace!("discarding missing or malformed motion sample");
                return None;
            }
        };

        let delta = v.l1_distance(&self.last_vector);
        self.last_vector = v;

        let now = at_ms.unwrap_or_else(|| self.clock.monotonic_ms());
        if now - self.last_still_check_ms > self.config.still_window_ms {
            let still = delta < self.config.still_threshold;
            if still != self.still.get() {
                debug!("stillness -> {} (delta={:.3})", still, delta);
            }
            self.still.set(still);
            self.last_still_check_ms = now;
        }

        let pitch_deg = v.pitch_degrees();
        let pouring   = pitch_deg > self.config.pour_pitch_deg;
        let playback  = if pouring {
            let wall = at_ms.unwrap_or_else(|| self.clock.wall_ms());
            Some(self.playback_at(wall))
        } else {
            None
        };

        Some(SampleOutcome {
            delta,
            pitch_deg,
            still: self.still.get(),
            pouring,
            playback,
        })
    }

    // ── stillness readers ────────────────────────────────────────────────

    pub fn is_currently_still(&self) -> bool { self.still.get() }

    /// Zero-argument accessor for the render loop; reads the live flag on
    /// every call.
    pub fn stillness_accessor(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let flag = self.still.clone();
        move || flag.get()
    }

    // ── playback ─────────────────────────────────────────────────────────

    /// Debounced playback trigger.
    pub fn trigger_playback(&mut self) -> PlaybackOutcome {
        let now = self.clock.wall_ms();
        self.playback_at(now)
    }

    fn playback_at(&mut self, now: f64) -> PlaybackOutcome {
        let sink = match self.sink.as_mut() {
            Some(s) => s,
            None    => return PlaybackOutcome::AudioUnavailable,
        };

        if let Some(last) = self.last_play_ms {
            if now - last < self.config.debounce_ms {
                return PlaybackOutcome::Debounced;
            }
        }

        self.last_play_ms = Some(now);
        debug!("pour triggered");
        sink.play_pour();
        PlaybackOutcome::Triggered
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;
    use std::rc::Rc;

    const FLAT: GravityVector = GravityVector { x: 0.0, y: 0.0, z: 1.0 };

    fn make() -> (MotionClassifier<ManualClock>, ManualClock, Rc<Cell<u32>>) {
        let clock = ManualClock::new();
        let mut c = MotionClassifier::with_clock(ClassifierConfig::default(), clock.clone());
        let plays = Rc::new(Cell::new(0u32));
        let counter = plays.clone();
        c.attach_sink(Box::new(move || counter.set(counter.get() + 1)));
        (c, clock, plays)
    }

    #[test]
    fn starts_still_with_zero_vector() {
        let (c, _, _) = make();
        assert!(c.is_currently_still());
        assert_eq!(c.last_vector, GravityVector::ZERO);
    }

    #[test]
    fn missing_sample_changes_nothing() {
        let (mut c, clock, _) = make();
        clock.set(500.0);
        assert!(c.on_motion_sample(None).is_none());
        assert_eq!(c.last_vector, GravityVector::ZERO);
        assert_eq!(c.last_still_check_ms, 0.0);
        assert!(c.is_currently_still());
    }

    #[test]
    fn nan_sample_is_discarded() {
        let (mut c, clock, plays) = make();
        clock.set(500.0);
        assert!(c.on_motion_sample(Some(GravityVector::new(f64::NAN, 0.0, 1.0))).is_none());
        assert_eq!(c.last_vector, GravityVector::ZERO);
        assert_eq!(plays.get(), 0);
    }

    #[test]
    fn last_vector_updates_inside_window() {
        let (mut c, clock, _) = make();
        clock.set(10.0);
        c.on_motion_sample(Some(FLAT));
        assert_eq!(c.last_vector, FLAT);
        assert_eq!(c.last_still_check_ms, 0.0);
    }

    #[test]
    fn motion_sustained_over_window_clears_stillness() {
        let (mut c, clock, _) = make();
        let mut flip = false;
        for _ in 0..20 {
            clock.advance(20.0);
            flip = !flip;
            let x = if flip { 0.3 } else { -0.3 };
            c.on_motion_sample(Some(GravityVector::new(x, 0.0, 1.0)));
        }
        assert!(!c.is_currently_still());
    }

    #[test]
    fn stillness_held_between_windows() {
        let (mut c, clock, _) = make();
        clock.set(200.0);
        c.on_motion_sample(Some(GravityVector::new(2.0, 0.0, 0.0)));
        assert!(!c.is_currently_still());
        // Quiet samples inside the window do not re-evaluate.
        clock.advance(50.0);
        c.on_motion_sample(Some(GravityVector::new(2.0, 0.0, 0.0)));
        assert!(!c.is_currently_still());
        clock.advance(100.0);
        c.on_motion_sample(Some(GravityVector::new(2.0, 0.0, 0.0)));
        assert!(c.is_currently_still());
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let (mut c, clock, _) = make();
        clock.set(120.0);
        c.on_motion_sample(Some(GravityVector::new(5.0, 0.0, 0.0)));
        assert!(c.is_currently_still(), "exactly 120 ms must not re-evaluate");
        clock.set(120.5);
        c.on_motion_sample(Some(GravityVector::new(0.0, 0.0, 0.0)));
        assert!(!c.is_currently_still());
    }

    #[test]
    fn quiet_samples_restore_stillness() {
        let (mut c, clock, _) = make();
        clock.set(200.0);
        c.on_motion_sample(Some(GravityVector::new(1.0, 1.0, 1.0)));
        assert!(!c.is_currently_still());
        for _ in 0..10 {
            clock.advance(50.0);
            c.on_motion_sample(Some(GravityVector::new(1.0, 1.0, 1.05)));
        }
        assert!(c.is_currently_still());
    }

    #[test]
    fn pour_threshold_is_strict() {
        let (mut c, clock, plays) = make();
        clock.set(10.0);
        let out = c.on_motion_sample(Some(GravityVector::from_tilt(59.9, 0.0, 1.0))).unwrap();
        assert!(!out.pouring);
        assert_eq!(out.playback, None);
        assert_eq!(plays.get(), 0);
        let out = c.on_motion_sample(Some(GravityVector::from_tilt(60.1, 0.0, 1.0))).unwrap();
        assert!(out.pouring);
        assert_eq!(out.playback, Some(PlaybackOutcome::Triggered));
    }

    #[test]
    fn debounce_window() {
        let (mut c, clock, plays) = make();
        let pour = Some(GravityVector::new(-1.0, 0.0, 0.0));

        clock.set(0.0);
        assert_eq!(c.on_motion_sample(pour).unwrap().playback, Some(PlaybackOutcome::Triggered));
        clock.set(500.0);
        assert_eq!(c.on_motion_sample(pour).unwrap().playback, Some(PlaybackOutcome::Debounced));
        clock.set(1001.0);
        assert_eq!(c.on_motion_sample(pour).unwrap().playback, Some(PlaybackOutcome::Triggered));
        assert_eq!(plays.get(), 2);
    }

    #[test]
    fn pouring_is_level_triggered() {
        let (mut c, clock, plays) = make();
        let pour = Some(GravityVector::new(-1.0, 0.0, 0.1));
        for _ in 0..35 {
            clock.advance(100.0);
            assert!(c.on_motion_sample(pour).unwrap().pouring);
        }
        // 3.5 s of continuous pouring → attempts at 0.1, 1.1, 2.1, 3.1 s.
        assert_eq!(plays.get(), 4);
    }

    #[test]
    fn playback_without_sink_is_noop() {
        let clock = ManualClock::new();
        let mut c = MotionClassifier::with_clock(ClassifierConfig::default(), clock.clone());
        clock.set(50.0);
        assert_eq!(c.trigger_playback(), PlaybackOutcome::AudioUnavailable);
        assert_eq!(c.last_play_ms, None);

        let plays = Rc::new(Cell::new(0u32));
        let counter = plays.clone();
        c.attach_sink(Box::new(move || counter.set(counter.get() + 1)));
        assert_eq!(c.trigger_playback(), PlaybackOutcome::Triggered);
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn detach_sink_disables_playback() {
        let (mut c, clock, plays) = make();
        assert!(c.detach_sink().is_some());
        clock.set(5000.0);
        assert_eq!(c.trigger_playback(), PlaybackOutcome::AudioUnavailable);
        assert_eq!(plays.get(), 0);
    }

    #[test]
    fn accessor_reads_live_value() {
        let (mut c, clock, _) = make();
        let still = c.stillness_accessor();
        assert!(still());
        clock.set(300.0);
        c.on_motion_sample(Some(GravityVector::new(3.0, 0.0, 0.0)));
        assert!(!still());
    }

    #[test]
    fn end_to_end_rest_then_pour() {
        let (mut c, clock, plays) = make();
        for i in 0..20 {
            clock.set(i as f64 * 100.0);
            c.on_motion_sample(Some(FLAT));
            assert!(c.is_currently_still(), "sample {} broke stillness", i);
        }
        assert_eq!(plays.get(), 0);

        clock.advance(100.0);
        let out = c.on_motion_sample(Some(GravityVector::new(-1.0, 0.0, 0.1))).unwrap();
        assert!(out.pitch_deg > 60.0);
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let clock = ManualClock::new();
        let cfg = ClassifierConfig {
            still_threshold: 5.0,
            still_window_ms: 10.0,
            pour_pitch_deg:  20.0,
            debounce_ms:     100.0,
        };
        let mut c = MotionClassifier::with_clock(cfg, clock.clone());
        let plays = Rc::new(Cell::new(0u32));
        let counter = plays.clone();
        c.attach_sink(Box::new(move || counter.set(counter.get() + 1)));

        clock.set(20.0);
        let out = c.on_motion_sample(Some(GravityVector::from_tilt(30.0, 0.0, 1.0))).unwrap();
        assert!(out.still);
        assert!(out.pouring);
        clock.set(130.0);
        c.on_motion_sample(Some(GravityVector::from_tilt(30.0, 0.0, 1.0)));
        assert_eq!(plays.get(), 2);
    }

    fn counting_sink(c: &mut MotionClassifier<SystemClock>) -> Rc<Cell<u32>> {
        let plays = Rc::new(Cell::new(0u32));
        let counter = plays.clone();
        c.attach_sink(Box::new(move || counter.set(counter.get() + 1)));
        plays
    }

    #[test]
    fn timed_samples_debounce_on_their_own_timeline() {
        // Delivered back to back, as a drained replay batch would be.
        let mut c = MotionClassifier::new(ClassifierConfig::default());
        let plays = counting_sink(&mut c);
        let pour = Some(GravityVector::new(-9.8, 0.0, 0.5));
        for i in 0..30 {
            let out = c.on_motion_sample_at(pour, i as f64 * 100.0).unwrap();
            assert!(out.pouring);
        }
        assert_eq!(plays.get(), 3);
    }

    #[test]
    fn timed_samples_window_stillness() {
        let mut c = MotionClassifier::new(ClassifierConfig::default());
        for i in 1..=10 {
            let x = if i % 2 == 0 { 0.3 } else { -0.3 };
            c.on_motion_sample_at(Some(GravityVector::new(x, 0.0, 1.0)), i as f64 * 20.0);
        }
        assert!(!c.is_currently_still());
        for i in 11..=30 {
            c.on_motion_sample_at(Some(GravityVector::new(0.3, 0.0, 1.0)), i as f64 * 20.0);
        }
        assert!(c.is_currently_still());
    }

    #[test]
    fn timed_missing_sample_is_discarded() {
        let mut c = MotionClassifier::new(ClassifierConfig::default());
        assert!(c.on_motion_sample_at(None, 500.0).is_none());
        assert_eq!(c.last_still_check_ms, 0.0);
    }
}
