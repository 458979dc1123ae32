//! Pour-sound playback thread.
//!
//! The engine owns the audio output device on its own thread and is driven
//! over a command channel.  Each pour restarts the pre-loaded WAV clip from
//! its first sample; if there is no clip, or the device refuses it, a short
//! synthesized sine "blip" is played instead.  With no device at all the
//! engine quietly does nothing.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn};
use tilt_motion::PourSink;

use crate::config::AudioConfig;
use crate::error::{PourError, PourResult};

/// Sample rate assumed when no device is open.
const NULL_SAMPLE_RATE: u32 = 44_100;

// ════════════════════════════════════════════════════════════════════════════
// AudioCommand: sent to the audio thread
// ════════════════════════════════════════════════════════════════════════════

pub enum AudioCommand {
    /// Play the pour sound from the top.
    PlayPour,
    /// Release the device and end the thread.
    Quit,
}

/// Which path a pour took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PourPath {
    Asset,
    Tone,
    Silent,
}

// ════════════════════════════════════════════════════════════════════════════
// SoundClip
// ════════════════════════════════════════════════════════════════════════════

/// Mono PCM in `[-1, 1]`.
#[derive(Clone, Debug)]
pub struct SoundClip {
    pub samples:     Arc<[f32]>,
    pub sample_rate: u32,
}

impl SoundClip {
    pub fn duration_ms(&self) -> f32 {
        self.samples.len() as f32 * 1000.0 / self.sample_rate.max(1) as f32
    }

    /// Linear-interpolated copy at `rate`.
    pub fn resampled(&self, rate: u32) -> SoundClip {
        if rate == self.sample_rate || self.samples.is_empty() || rate == 0 {
            return SoundClip { samples: self.samples.clone(), sample_rate: rate.max(1) };
        }
        let ratio = self.sample_rate as f64 / rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).floor() as usize;
        let last = self.samples.len() - 1;
        let samples: Vec<f32> = (0..out_len)
            .map(|i| {
                let src = i as f64 * ratio;
                let i0 = (src.floor() as usize).min(last);
                let i1 = (i0 + 1).min(last);
                let t = (src - i0 as f64) as f32;
                self.samples[i0] * (1.0 - t) + self.samples[i1] * t
            })
            .collect();
        SoundClip { samples: samples.into(), sample_rate: rate }
    }
}

/// Decode a WAV file into a mono clip (channels are averaged).
pub fn load_wav(path: &Path) -> PourResult<SoundClip> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| PourError::Audio(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PourError::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PourError::Audio(e.to_string()))?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    if mono.is_empty() {
        return Err(PourError::Audio(format!("{}: no samples", path.display())));
    }
    Ok(SoundClip { samples: mono.into(), sample_rate: spec.sample_rate })
}

// ════════════════════════════════════════════════════════════════════════════
// Synthesized fallback tone
// ════════════════════════════════════════════════════════════════════════════

pub const TONE_ATTACK_MS: f32 = 10.0;
/// By this point the envelope is down to 0.001 of peak.
pub const TONE_DECAY_MS:  f32 = 260.0;
pub const TONE_TOTAL_MS:  f32 = 280.0;

/// Sine blip: linear ramp to `gain` over the attack, then exponential decay.
pub fn synth_tone(sample_rate: u32, hz: f32, gain: f32) -> SoundClip {
    let rate = sample_rate.max(1) as f32;
    let len = (TONE_TOTAL_MS / 1000.0 * rate) as usize;
    let attack = TONE_ATTACK_MS / 1000.0;
    let k = 1000.0f32.ln() / ((TONE_DECAY_MS - TONE_ATTACK_MS) / 1000.0);

    let samples: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let env = if t < attack {
                gain * t / attack
            } else {
                gain * (-k * (t - attack)).exp()
            };
            env * (std::f32::consts::TAU * hz * t).sin()
        })
        .collect();
    SoundClip { samples: samples.into(), sample_rate: sample_rate.max(1) }
}

// ════════════════════════════════════════════════════════════════════════════
// AudioOut: abstraction over cpal / null (for testing)
// ════════════════════════════════════════════════════════════════════════════

pub trait AudioOut {
    fn sample_rate(&self) -> u32;
    /// Replace whatever is playing with `samples`, starting at sample 0.
    fn start_voice(&mut self, samples: Arc<[f32]>) -> PourResult<()>;
}

// ── cpal backend ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Voice {
    samples: Option<Arc<[f32]>>,
    pos:     usize,
}

impl Voice {
    fn next(&mut self) -> f32 {
        let s = match &self.samples {
            Some(buf) if self.pos < buf.len() => buf[self.pos],
            _ => return 0.0,
        };
        self.pos += 1;
        s
    }
}

struct CpalOut {
    _stream:     cpal::Stream,
    voice:       Arc<Mutex<Voice>>,
    sample_rate: u32,
}

impl AudioOut for CpalOut {
    fn sample_rate(&self) -> u32 { self.sample_rate }

    fn start_voice(&mut self, samples: Arc<[f32]>) -> PourResult<()> {
        let mut voice = self.voice.lock()
            .map_err(|_| PourError::Audio("voice lock poisoned".to_string()))?;
        voice.samples = Some(samples);
        voice.pos = 0;
        Ok(())
    }
}

fn fill<T>(data: &mut [T], channels: usize, voice: &Mutex<Voice>, convert: impl Fn(f32) -> T) {
    let mut voice = match voice.lock() {
        Ok(v)  => v,
        Err(_) => {
            for s in data.iter_mut() { *s = convert(0.0); }
            return;
        }
    };
    for frame in data.chunks_mut(channels.max(1)) {
        let s = voice.next();
        for out in frame.iter_mut() { *out = convert(s); }
    }
}

fn stream_error(e: cpal::StreamError) {
    warn!("audio stream error: {}", e);
}

fn open_cpal_output() -> PourResult<CpalOut> {
    let host = cpal::default_host();
    let device = host.default_output_device()
        .ok_or_else(|| PourError::Audio("no default output device".to_string()))?;
    let supported = device.default_output_config()
        .map_err(|e| PourError::Audio(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.config();

    let voice = Arc::new(Mutex::new(Voice::default()));
    let v = voice.clone();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| fill(data, channels, &v, |s| s),
            stream_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                fill(data, channels, &v, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            },
            stream_error,
            None,
        ),
        other => return Err(PourError::Audio(format!("unsupported sample format {:?}", other))),
    }
    .map_err(|e| PourError::Audio(e.to_string()))?;
    stream.play().map_err(|e| PourError::Audio(e.to_string()))?;

    if let Ok(name) = device.name() {
        info!("Audio output: {} ({} Hz, {} ch)", name, sample_rate, channels);
    }
    Ok(CpalOut { _stream: stream, voice, sample_rate })
}

// ── null backend (used when no device is available) ───────────────────────

pub struct NullOut;

impl AudioOut for NullOut {
    fn sample_rate(&self) -> u32 { NULL_SAMPLE_RATE }
    fn start_voice(&mut self, _samples: Arc<[f32]>) -> PourResult<()> { Ok(()) }
}

/// Open the default device, or fall back to `NullOut` with a warning.
pub fn open_default_output() -> Box<dyn AudioOut> {
    match open_cpal_output() {
        Ok(out) => Box::new(out),
        Err(e) => {
            warn!("{}; pour sounds disabled", e);
            Box::new(NullOut)
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Pour playback: primary clip, then tone, then silence
// ════════════════════════════════════════════════════════════════════════════

pub fn play_pour(out: &mut dyn AudioOut, clip: Option<&SoundClip>, tone: &SoundClip) -> PourPath {
    if let Some(clip) = clip {
        match out.start_voice(clip.samples.clone()) {
            Ok(())  => return PourPath::Asset,
            Err(e)  => debug!("pour clip failed ({}), using tone", e),
        }
    }
    match out.start_voice(tone.samples.clone()) {
        Ok(())  => PourPath::Tone,
        Err(e)  => {
            debug!("pour tone failed: {}", e);
            PourPath::Silent
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AudioEngine: the playback thread
// ════════════════════════════════════════════════════════════════════════════

/// Handle to the audio thread.
pub struct AudioEngine {
    cmd_tx: Sender<AudioCommand>,
    thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Open the default output device and pre-load the pour clip.
    ///
    /// Blocks until the audio thread has finished setting up, so a pour
    /// arriving right after this returns finds the device ready.
    pub fn start(cfg: AudioConfig) -> Self {
        Self::start_with(cfg, open_default_output)
    }

    /// Like [`start`](Self::start) with a caller-supplied output, built on the
    /// audio thread.
    pub fn start_with<F>(cfg: AudioConfig, open: F) -> Self
    where
        F: FnOnce() -> Box<dyn AudioOut> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<()>();

        let thread = thread::spawn(move || audio_thread(cfg, open, cmd_rx, ready_tx));
        if ready_rx.recv().is_err() {
            warn!("audio thread exited during setup");
        }

        AudioEngine { cmd_tx, thread: Some(thread) }
    }

    /// A [`PourSink`] feeding this engine.
    pub fn handle(&self) -> AudioHandle {
        AudioHandle { cmd_tx: self.cmd_tx.clone() }
    }

    /// Stop the thread and release the device.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Quit);
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("audio thread panicked");
            }
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) { self.stop(); }
}

/// Cheap sender-side handle; one pour per call.
#[derive(Clone)]
pub struct AudioHandle {
    cmd_tx: Sender<AudioCommand>,
}

impl PourSink for AudioHandle {
    fn play_pour(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::PlayPour);
    }
}

fn audio_thread<F>(cfg: AudioConfig, open: F, cmd_rx: Receiver<AudioCommand>, ready_tx: Sender<()>)
where
    F: FnOnce() -> Box<dyn AudioOut>,
{
    let mut out = open();
    let rate = out.sample_rate();

    let clip = cfg.pour_sound.as_deref().and_then(|path| match load_wav(path) {
        Ok(c) => {
            info!("Loaded pour sound {} ({:.0} ms)", path.display(), c.duration_ms());
            Some(c.resampled(rate))
        }
        Err(e) => {
            warn!("{}; falling back to synthesized tone", e);
            None
        }
    });
    let tone = synth_tone(rate, cfg.tone_hz, cfg.tone_gain);
    let _ = ready_tx.send(());

    for cmd in cmd_rx {
        match cmd {
            AudioCommand::PlayPour => {
                let path = play_pour(out.as_mut(), clip.as_ref(), &tone);
                debug!("pour played via {:?}", path);
            }
            AudioCommand::Quit => break,
        }
    }
    debug!("audio thread done");
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
