//! Top-level application state machine.
//!
//! `AppState` owns the `MotionClassifier` and the attached sensor listener.
//! Nothing sensor- or audio-related starts until the start action; the
//! [`Host`] brings those up in a fixed order so that a pour arriving on the
//! very first sample finds audio ready.

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::mpsc::{self, Sender};
use std::time::Instant;

use log::{info, warn};
use tilt_motion::{
    Clock, MotionAccess, MotionClassifier, MotionPermission, PlaybackOutcome, PourSink,
    SampleOutcome, SystemClock, Ungated,
};

use crate::audio::AudioEngine;
use crate::config::{AppConfig, AudioConfig, ModelConfig, SensorConfig};
use crate::error::{PourError, PourResult};
use crate::model::{spawn_model_load, Mesh};
use crate::permission::PromptPermission;
use crate::scene::Scene;
use crate::sensor::{
    attach_sensor_source, SensorListener, SensorReading, SimInput, SimSensorSource,
    StreamSensorSource,
};
use crate::visualizer::{Overlay, UiAction, Visualizer};

const START_PROMPT: &str = "PRESS SPACE TO START";
const HINT_TEXT:    &str = "TILT TO POUR";

// ════════════════════════════════════════════════════════════════════════════
// Host: what the start action needs from the platform
// ════════════════════════════════════════════════════════════════════════════

pub trait Host {
    fn request_motion_access(&mut self) -> MotionAccess;
    /// Best effort; the outcome is ignored.
    fn request_orientation_access(&mut self);
    /// Bring audio up and return once it is ready (or has failed quietly).
    fn init_audio(&mut self) -> Box<dyn PourSink>;
    fn attach_sensors(&mut self) -> SensorListener;
    /// Release everything `init_audio` created.
    fn release(&mut self);
}

/// The desktop host: `cpal` audio, and either the keyboard simulator or a
/// line stream for sensors.
pub struct DesktopHost {
    /// Dropped after the orientation request, so a terminal prompt never
    /// holds stdin while a sample stream is reading it.
    permission: Option<Box<dyn MotionPermission>>,
    audio_cfg:  AudioConfig,
    sensor_cfg: SensorConfig,
    engine:     Option<AudioEngine>,
    sim_tx:     Option<Sender<SimInput>>,
}

impl DesktopHost {
    pub fn new(cfg: &AppConfig) -> Self {
        let permission: Box<dyn MotionPermission> = if cfg.ui.ask_permission {
            Box::new(PromptPermission::stdio())
        } else {
            Box::new(Ungated)
        };
        DesktopHost {
            permission: Some(permission),
            audio_cfg:  cfg.audio.clone(),
            sensor_cfg: cfg.sensor.clone(),
            engine:     None,
            sim_tx:     None,
        }
    }

    /// The simulator's input sender, once sensors are attached in sim mode.
    pub fn take_sim_sender(&mut self) -> Option<Sender<SimInput>> {
        self.sim_tx.take()
    }

    fn attach_simulator(&mut self) -> SensorListener {
        let (tx, rx) = mpsc::channel();
        self.sim_tx = Some(tx);
        info!("Using keyboard tilt simulator");
        attach_sensor_source(SimSensorSource { rx, gravity: self.sensor_cfg.gravity })
    }
}

impl Host for DesktopHost {
    fn request_motion_access(&mut self) -> MotionAccess {
        match self.permission.as_mut() {
            Some(p) => p.request_motion_access(),
            None    => MotionAccess::Unavailable,
        }
    }

    fn request_orientation_access(&mut self) {
        if let Some(mut p) = self.permission.take() {
            p.request_orientation_access();
        }
    }

    fn init_audio(&mut self) -> Box<dyn PourSink> {
        let engine = AudioEngine::start(self.audio_cfg.clone());
        let handle = engine.handle();
        self.engine = Some(engine);
        Box::new(handle)
    }

    fn attach_sensors(&mut self) -> SensorListener {
        match self.sensor_cfg.stream.clone().as_deref() {
            Some("-") => {
                info!("Reading motion samples from stdin");
                attach_sensor_source(StreamSensorSource::new(BufReader::new(io::stdin())))
            }
            Some(path) => match File::open(path) {
                Ok(f) => {
                    info!("Replaying motion samples from {}", path);
                    let source = StreamSensorSource::new(BufReader::new(f))
                        .timed_at(self.sensor_cfg.replay_rate_hz)
                        .paced(true);
                    attach_sensor_source(source)
                }
                Err(e) => {
                    warn!("sensor stream {}: {}; falling back to simulator", path, e);
                    self.attach_simulator()
                }
            },
            None => self.attach_simulator(),
        }
    }

    fn release(&mut self) {
        self.permission = None;
        self.sim_tx = None;
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AppState
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingStart,
    Running,
    /// Terminal for the session; holds the message shown to the user.
    Denied(String),
}

pub struct AppState<C: Clock = SystemClock> {
    classifier: MotionClassifier<C>,
    listener:   Option<SensorListener>,
    phase:      Phase,
    hint_ms:    u64,
    hint_until: Option<f64>,

    // ── last reading, for the status bar ─────────────────────────────────
    last:       Option<SampleOutcome>,
    last_roll:  f64,
    pours:      u32,
    discarded:  u64,
}

impl AppState<SystemClock> {
    pub fn new(cfg: &AppConfig) -> Self {
        Self::with_clock(cfg, SystemClock::new())
    }
}

impl<C: Clock> AppState<C> {
    pub fn with_clock(cfg: &AppConfig, clock: C) -> Self {
        AppState {
            classifier: MotionClassifier::with_clock(cfg.classifier, clock),
            listener:   None,
            phase:      Phase::AwaitingStart,
            hint_ms:    cfg.ui.hint_ms,
            hint_until: None,
            last:       None,
            last_roll:  0.0,
            pours:      0,
            discarded:  0,
        }
    }

    /// The render loop's view of the classifier.
    pub fn stillness_accessor(&self) -> Box<dyn Fn() -> bool> {
        Box::new(self.classifier.stillness_accessor())
    }

    // ── start action ─────────────────────────────────────────────────────

    /// Handle the start action.  Ignored unless still awaiting start.
    ///
    /// Order: motion permission, orientation permission (ignored), audio,
    /// then sensors, since the first sample may already be a pour.
    pub fn start(&mut self, host: &mut dyn Host, now_secs: f64) {
        if self.phase != Phase::AwaitingStart { return; }

        let access = host.request_motion_access();
        if !access.may_proceed() {
            warn!("motion access denied; sensors stay off");
            self.phase = Phase::Denied(PourError::PermissionDenied.to_string());
            return;
        }
        host.request_orientation_access();

        self.classifier.attach_sink(host.init_audio());
        self.listener = Some(host.attach_sensors());

        self.phase = Phase::Running;
        self.hint_until = Some(now_secs + self.hint_ms as f64 / 1000.0);
        info!("Started ({:?})", access);
    }

    // ── per frame ────────────────────────────────────────────────────────

    /// Feed every reading that arrived since the last frame to the
    /// classifier.  Timed readings are classified at their own time.
    pub fn tick(&mut self) {
        let readings = match self.listener.as_mut() {
            Some(l) => l.drain(),
            None    => return,
        };
        for SensorReading { sample, t_ms } in readings {
            let roll = sample.map(|v| v.roll_degrees());
            let outcome = match t_ms {
                Some(t) => self.classifier.on_motion_sample_at(sample, t),
                None    => self.classifier.on_motion_sample(sample),
            };
            match outcome {
                Some(out) => {
                    if out.playback == Some(PlaybackOutcome::Triggered) {
                        self.pours += 1;
                    }
                    self.last = Some(out);
                    self.last_roll = roll.unwrap_or(self.last_roll);
                }
                None => self.discarded += 1,
            }
        }
    }

    pub fn hint_visible(&self, now_secs: f64) -> bool {
        self.hint_until.map_or(false, |until| now_secs < until)
    }

    pub fn overlay(&self, now_secs: f64) -> Overlay {
        match &self.phase {
            Phase::AwaitingStart => Overlay {
                prompt: Some(START_PROMPT.to_string()),
                status: "waiting for start".to_string(),
                ..Overlay::default()
            },
            Phase::Denied(msg) => Overlay {
                message: Some(msg.to_uppercase()),
                status:  "sensors off".to_string(),
                ..Overlay::default()
            },
            Phase::Running => Overlay {
                hint:    self.hint_visible(now_secs).then(|| HINT_TEXT.to_string()),
                status:  self.status_line(),
                pouring: self.last.map_or(false, |o| o.pouring),
                ..Overlay::default()
            },
        }
    }

    fn status_line(&self) -> String {
        match &self.last {
            Some(o) => format!(
                "pitch {:+.0} roll {:+.0} {} pours {}",
                o.pitch_deg,
                self.last_roll,
                if o.still { "still" } else { "moving" },
                self.pours,
            ),
            None => "no motion data".to_string(),
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────

    /// Remove the listener, disable playback, and let the host release audio.
    pub fn shutdown(&mut self, host: &mut dyn Host) {
        if let Some(mut l) = self.listener.take() {
            l.detach();
        }
        self.classifier.detach_sink();
        host.release();
    }

    // ── accessors ────────────────────────────────────────────────────────

    pub fn phase(&self)       -> &Phase { &self.phase }
    pub fn pours(&self)       -> u32    { self.pours }
    pub fn discarded(&self)   -> u64    { self.discarded }
    pub fn is_still(&self)    -> bool   { self.classifier.is_currently_still() }
    pub fn is_listening(&self) -> bool  { self.listener.is_some() }
}

// ════════════════════════════════════════════════════════════════════════════
// run(): the main application loop
// ════════════════════════════════════════════════════════════════════════════

/// Procedural bottle, or the placeholder while `cfg.path` loads.
pub fn build_scene(cfg: &ModelConfig, still: Box<dyn Fn() -> bool>) -> Scene {
    match &cfg.path {
        Some(path) => Scene::loading(path.clone(), spawn_model_load(path.clone()), still),
        None       => Scene::new(Mesh::bottle(cfg.segments), still),
    }
}

/// Run the full application.
///
/// This is the entry point called from `main.rs`.  It opens the window,
/// builds the scene, and drives the input/tick/render loop at ~60 fps until
/// the window closes, then tears everything down.
pub fn run(cfg: AppConfig) -> PourResult<()> {
    let mut vis   = Visualizer::new()?;
    let mut host  = DesktopHost::new(&cfg);
    let mut app   = AppState::new(&cfg);
    let mut scene = build_scene(&cfg.model, app.stillness_accessor());

    let started = Instant::now();
    while vis.is_open() {
        let now = started.elapsed().as_secs_f64();

        match vis.poll_input() {
            UiAction::Quit  => break,
            UiAction::Start => {
                app.start(&mut host, now);
                if let Some(tx) = host.take_sim_sender() {
                    vis.attach_sim(tx);
                }
            }
            UiAction::None  => {}
        }

        app.tick();
        scene.frame(now as f32);
        vis.render(&scene, &app.overlay(now));
    }

    app.shutdown(&mut host);
    vis.release();
    scene.release();
    info!("Shut down after {} pours", app.pours());
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::MotionSample;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tilt_motion::{GravityVector, ManualClock};

    const FLAT: GravityVector = GravityVector { x: 0.0, y: 0.0, z: 9.81 };
    const POUR: GravityVector = GravityVector { x: -9.81, y: 0.0, z: 0.98 };

    struct TestHost {
        access:   MotionAccess,
        calls:    Rc<RefCell<Vec<&'static str>>>,
        plays:    Rc<Cell<u32>>,
        sample_tx: Option<Sender<SensorReading>>,
    }

    impl TestHost {
        fn new(access: MotionAccess) -> Self {
            TestHost {
                access,
                calls:     Rc::new(RefCell::new(Vec::new())),
                plays:     Rc::new(Cell::new(0)),
                sample_tx: None,
            }
        }

        fn send(&self, v: MotionSample) {
            self.send_reading(SensorReading::live(v));
        }

        fn send_at(&self, v: MotionSample, t_ms: f64) {
            self.send_reading(SensorReading::at(v, t_ms));
        }

        fn send_reading(&self, r: SensorReading) {
            self.sample_tx.as_ref().expect("sensors attached").send(r).unwrap();
        }
    }

    impl Host for TestHost {
        fn request_motion_access(&mut self) -> MotionAccess {
            self.calls.borrow_mut().push("motion");
            self.access
        }
        fn request_orientation_access(&mut self) {
            self.calls.borrow_mut().push("orientation");
        }
        fn init_audio(&mut self) -> Box<dyn PourSink> {
            self.calls.borrow_mut().push("audio");
            let plays = self.plays.clone();
            Box::new(move || plays.set(plays.get() + 1))
        }
        fn attach_sensors(&mut self) -> SensorListener {
            self.calls.borrow_mut().push("sensors");
            let (tx, listener) = SensorListener::channel();
            self.sample_tx = Some(tx);
            listener
        }
        fn release(&mut self) {
            self.calls.borrow_mut().push("release");
        }
    }

    fn make() -> (AppState<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (AppState::with_clock(&AppConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn start_brings_audio_up_before_sensors() {
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        assert_eq!(*host.calls.borrow(), vec!["motion", "orientation", "audio", "sensors"]);
        assert_eq!(app.phase(), &Phase::Running);
        assert!(app.is_listening());
    }

    #[test]
    fn unavailable_access_still_starts() {
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Unavailable);
        app.start(&mut host, 0.0);
        assert_eq!(app.phase(), &Phase::Running);
    }

    #[test]
    fn denied_access_is_terminal() {
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Denied);
        app.start(&mut host, 0.0);
        assert!(matches!(app.phase(), Phase::Denied(_)));
        assert_eq!(*host.calls.borrow(), vec!["motion"]);
        assert!(!app.is_listening());

        // A second press does not retry.
        app.start(&mut host, 1.0);
        assert_eq!(host.calls.borrow().len(), 1);
        assert!(app.overlay(1.0).message.is_some());
    }

    #[test]
    fn start_is_ignored_once_running() {
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        app.start(&mut host, 0.5);
        assert_eq!(host.calls.borrow().len(), 4);
    }

    #[test]
    fn tick_before_start_is_harmless() {
        let (mut app, _) = make();
        app.tick();
        assert!(app.is_still());
        assert!(app.overlay(0.0).prompt.is_some());
    }

    #[test]
    fn hint_dismisses_after_delay() {
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 10.0);
        assert!(app.hint_visible(10.0));
        assert!(app.overlay(11.1).hint.is_some());
        assert!(!app.hint_visible(11.2));
        assert!(app.overlay(11.3).hint.is_none());
    }

    #[test]
    fn rest_then_pour_plays_once() {
        let (mut app, clock) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);

        for i in 0..20 {
            clock.set(i as f64 * 100.0);
            host.send(Some(FLAT));
            app.tick();
            assert!(app.is_still());
        }
        assert_eq!(host.plays.get(), 0);

        clock.advance(100.0);
        host.send(Some(POUR));
        app.tick();
        assert_eq!(host.plays.get(), 1);
        assert_eq!(app.pours(), 1);
        assert!(app.overlay(2.0).pouring);
    }

    #[test]
    fn missing_samples_are_counted_not_classified() {
        let (mut app, clock) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        clock.set(500.0);
        host.send(None);
        host.send(Some(GravityVector::new(f64::NAN, 0.0, 0.0)));
        app.tick();
        assert_eq!(app.discarded(), 2);
        assert!(app.is_still());
        assert_eq!(app.overlay(0.5).status, "no motion data");
    }

    #[test]
    fn status_line_reports_attitude() {
        let (mut app, clock) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        clock.set(50.0);
        host.send(Some(GravityVector::from_tilt(30.0, 10.0, 9.81)));
        app.tick();
        assert_eq!(app.overlay(5.0).status, "pitch +30 roll +10 still pours 0");
    }

    #[test]
    fn shutdown_detaches_everything() {
        let (mut app, clock) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        app.shutdown(&mut host);

        assert!(!app.is_listening());
        assert_eq!(host.calls.borrow().last(), Some(&"release"));
        // The listener is gone, so the sender sees a closed channel.
        let tx = host.sample_tx.take().unwrap();
        clock.set(5000.0);
        assert!(tx.send(SensorReading::live(Some(POUR))).is_err());
        app.tick();
        assert_eq!(host.plays.get(), 0);
    }

    #[test]
    fn recorded_readings_keep_their_own_time() {
        // 3 s of pouring at 10 Hz arrives in a single frame; the frame
        // clock never moves.
        let (mut app, _) = make();
        let mut host = TestHost::new(MotionAccess::Granted);
        app.start(&mut host, 0.0);
        for i in 0..30 {
            host.send_at(Some(POUR), i as f64 * 100.0);
        }
        app.tick();
        assert_eq!(host.plays.get(), 3);
        assert_eq!(app.pours(), 3);
        assert!(app.overlay(5.0).pouring);
    }
}
