//! Motion sample sources: a keyboard tilt simulator and a line stream
//! (stdin or a file, e.g. piped from a phone sensor logger).
//!
//! Either way the consumer sees [`SensorReading`]s on a `mpsc` channel.  A
//! `None` sample means the source produced something it could not read as
//! gravity-inclusive acceleration.  Recordings stamp each reading with the
//! time it was taken so it can be classified on the recording's timeline.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use tilt_motion::GravityVector;

pub type MotionSample = Option<GravityVector>;

/// Longest single sleep while pacing a replay, so `stop` is noticed promptly.
const PACING_SLICE: Duration = Duration::from_millis(50);

/// One reading off a source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub sample: MotionSample,
    /// When the sample was taken, in ms on the source's own timeline.
    /// `None` for live sources; the classifier's clock times those.
    pub t_ms:   Option<f64>,
}

impl SensorReading {
    pub fn live(sample: MotionSample) -> Self {
        SensorReading { sample, t_ms: None }
    }

    pub fn at(sample: MotionSample, t_ms: f64) -> Self {
        SensorReading { sample, t_ms: Some(t_ms) }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SensorSource trait: unified interface for sim and stream
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can deliver motion samples over a channel.
///
/// Implementations must return once `stop` is set or the channel closes.
pub trait SensorSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<SensorReading>, stop: Arc<AtomicBool>);
}

// ════════════════════════════════════════════════════════════════════════════
// SensorListener: the attached end
// ════════════════════════════════════════════════════════════════════════════

/// The attached side of a running source.  Dropping it (or calling
/// [`detach`](Self::detach)) removes the listener.
pub struct SensorListener {
    rx:   Option<Receiver<SensorReading>>,
    stop: Arc<AtomicBool>,
}

impl SensorListener {
    /// A listener fed directly by the returned sender, with no source thread.
    pub fn channel() -> (Sender<SensorReading>, SensorListener) {
        let (tx, rx) = mpsc::channel();
        let listener = SensorListener { rx: Some(rx), stop: Arc::new(AtomicBool::new(false)) };
        (tx, listener)
    }

    /// Every sample that has arrived since the last drain (non-blocking).
    pub fn drain(&mut self) -> Vec<SensorReading> {
        let mut out = Vec::new();
        let rx = match &self.rx {
            Some(rx) => rx,
            None     => return out,
        };
        let finished = loop {
            match rx.try_recv() {
                Ok(s) => out.push(s),
                Err(TryRecvError::Empty)        => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if finished {
            debug!("sensor source finished");
            self.rx = None;
        }
        out
    }

    pub fn is_attached(&self) -> bool { self.rx.is_some() }

    /// Stop the source and stop receiving.
    pub fn detach(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.rx.take().is_some() {
            info!("motion listener removed");
        }
    }
}

impl Drop for SensorListener {
    fn drop(&mut self) { self.detach(); }
}

/// Spawn a source on its own thread and return the listening end.
pub fn attach_sensor_source<S: SensorSource>(source: S) -> SensorListener {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    thread::spawn(move || Box::new(source).run(tx, flag));
    SensorListener { rx: Some(rx), stop }
}

// ════════════════════════════════════════════════════════════════════════════
// StreamSensorSource: "x y z" or "t_ms x y z" lines
// ════════════════════════════════════════════════════════════════════════════

/// Parse one sample line.
///
/// Accepts `x y z`, or `t_ms x y z` from a sensor logger, separated by
/// whitespace and/or commas.  Blank lines and `#` comments yield `Err(())`
/// (skip); anything else unreadable yields a reading with no sample.
pub fn parse_sample_line(line: &str) -> Result<SensorReading, ()> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(());
    }
    let nums: Vec<f64> = match line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
    {
        Ok(n)  => n,
        Err(_) => return Ok(SensorReading::live(None)),
    };
    match nums.as_slice() {
        &[x, y, z] => Ok(SensorReading::live(Some(GravityVector::new(x, y, z)))),
        &[t, x, y, z] if t.is_finite() => {
            Ok(SensorReading::at(Some(GravityVector::new(x, y, z)), t))
        }
        _ => Ok(SensorReading::live(None)),
    }
}

/// Reads samples from any line-oriented reader.
///
/// By default lines are forwarded as fast as they arrive, which suits a live
/// pipe.  A recording should be [`timed_at`](Self::timed_at) its sample rate
/// (lines with their own `t_ms` keep it) and [`paced`](Self::paced), so it
/// plays back at the speed it was captured.
pub struct StreamSensorSource<R> {
    reader:  R,
    rate_hz: Option<f64>,
    paced:   bool,
}

impl<R: BufRead + Send + 'static> StreamSensorSource<R> {
    pub fn new(reader: R) -> Self {
        StreamSensorSource { reader, rate_hz: None, paced: false }
    }

    /// Stamp lines without a time column as sampled at `rate_hz`, starting
    /// at 0 ms.  Non-positive rates leave them unstamped.
    pub fn timed_at(mut self, rate_hz: f64) -> Self {
        self.rate_hz = Some(rate_hz).filter(|hz| hz.is_finite() && *hz > 0.0);
        self
    }

    /// Hold each timed reading back until its offset from the first one has
    /// elapsed.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
}

/// Sleep until `due`, in slices, unless `stop` is raised first.  Returns
/// false when stopped.
fn sleep_until(due: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) { return false; }
        let left = due.saturating_duration_since(Instant::now());
        if left.is_zero() { return true; }
        thread::sleep(left.min(PACING_SLICE));
    }
}

impl<R: BufRead + Send + 'static> SensorSource for StreamSensorSource<R> {
    fn run(self: Box<Self>, tx: Sender<SensorReading>, stop: Arc<AtomicBool>) {
        let StreamSensorSource { reader, rate_hz, paced } = *self;
        let period_ms = rate_hz.map(|hz| 1000.0 / hz);
        let mut origin: Option<(f64, Instant)> = None;
        let mut count = 0u64;

        for line in reader.lines() {
            if stop.load(Ordering::Relaxed) { return; }
            let line = match line {
                Ok(l)  => l,
                Err(e) => {
                    debug!("sensor stream read error: {}", e);
                    return;
                }
            };
            let mut reading = match parse_sample_line(&line) {
                Ok(r)   => r,
                Err(()) => continue,
            };
            if reading.t_ms.is_none() {
                reading.t_ms = period_ms.map(|p| count as f64 * p);
            }

            if let (true, Some(t)) = (paced, reading.t_ms) {
                let (t0, start) = *origin.get_or_insert((t, Instant::now()));
                let offset = Duration::from_secs_f64(((t - t0) / 1000.0).clamp(0.0, 1.0e9));
                if !sleep_until(start + offset, &stop) { return; }
            }

            if tx.send(reading).is_err() { return; }
            count += 1;
            if count % 1000 == 0 {
                debug!("{} samples streamed", count);
            }
        }
        info!("sensor stream ended after {} samples", count);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SimSensorSource: keyboard simulation
// ════════════════════════════════════════════════════════════════════════════

/// Raw tilt input from the simulation window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimInput {
    /// Current simulated attitude in degrees.
    Tilt { pitch_deg: f64, roll_deg: f64 },
    /// A jolt added on top of the current attitude.
    Shake,
}

/// Turns [`SimInput`]s into gravity samples, as a device at that attitude
/// would report them.
pub struct SimSensorSource {
    pub rx:      Receiver<SimInput>,
    pub gravity: f64,
}

/// Jolt amplitude, as a fraction of g.
const SHAKE_FRACTION: f64 = 0.15;

impl SimSensorSource {
    fn sample_for(&self, input: SimInput, attitude: &mut (f64, f64), shake_sign: &mut f64) -> GravityVector {
        match input {
            SimInput::Tilt { pitch_deg, roll_deg } => {
                *attitude = (pitch_deg, roll_deg);
                GravityVector::from_tilt(pitch_deg, roll_deg, self.gravity)
            }
            SimInput::Shake => {
                *shake_sign = -*shake_sign;
                let mut v = GravityVector::from_tilt(attitude.0, attitude.1, self.gravity);
                let j = *shake_sign * SHAKE_FRACTION * self.gravity;
                v.x += j;
                v.y -= j;
                v
            }
        }
    }
}

impl SensorSource for SimSensorSource {
    fn run(self: Box<Self>, tx: Sender<SensorReading>, stop: Arc<AtomicBool>) {
        let mut attitude = (0.0, 0.0);
        let mut shake_sign = 1.0;
        for input in self.rx.iter() {
            if stop.load(Ordering::Relaxed) { return; }
            let v = self.sample_for(input, &mut attitude, &mut shake_sign);
            if tx.send(SensorReading::live(Some(v))).is_err() { return; }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
