// src/metronome/click.rs

use std::sync::{Arc, Mutex};

/// A rendered one-shot click (mono).
#[derive(Debug, Clone)]
pub struct ClickSound {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ClickSound {
    /// Membrane-style hit: a sine that falls `octaves` octaves onto `base_hz`
    /// within `pitch_decay` seconds, under a fast exponential amplitude decay.
    pub fn membrane(
        sample_rate: u32,
        base_hz: f32,
        octaves: f32,
        pitch_decay: f32,
        duration: f32,
        gain: f32,
    ) -> Self {
        let sample_rate = sample_rate.max(1);
        let n = (sample_rate as f32 * duration).max(1.0) as usize;
        let sweep = 2f32.powf(octaves) - 1.0;
        let mut phase = 0.0f32;
        let mut samples = Vec::with_capacity(n);

        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let freq = base_hz * (1.0 + sweep * (-t / pitch_decay.max(1e-5)).exp());
            phase += freq / sample_rate as f32;
            phase = phase.fract();
            let envelope = (-t * 60.0).exp();
            samples.push((phase * std::f32::consts::TAU).sin() * envelope * gain);
        }

        Self {
            samples,
            sample_rate,
        }
    }

    /// The metronome's quarter-note click: C4, 50 ms.
    pub fn default_click(sample_rate: u32) -> Self {
        Self::membrane(sample_rate, 261.63, 10.0, 0.001, 0.05, 0.6)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Where metronome clicks are sounded. Has no notion of the transport.
pub trait ClickOutput: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn play(&self, sound: Arc<ClickSound>);
}

#[derive(Default)]
struct VoiceState {
    sound: Option<Arc<ClickSound>>,
    cursor: usize,
}

/// Single click voice mixed into an output stream by the device callback.
/// A new click restarts the voice.
pub struct ClickVoice {
    sample_rate: u32,
    state: Mutex<VoiceState>,
}

impl ClickVoice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(VoiceState::default()),
        }
    }

    /// Add the voice to interleaved `frames`; the same sample goes to every channel.
    /// Skips a block rather than wait on the lock.
    pub fn mix_into(&self, frames: &mut [f32], channels: usize) {
        let Ok(mut state) = self.state.try_lock() else { return };
        let Some(sound) = state.sound.clone() else { return };
        let channels = channels.max(1);

        let mut cursor = state.cursor;
        for frame in frames.chunks_mut(channels) {
            let Some(&s) = sound.samples.get(cursor) else { break };
            for out in frame.iter_mut() {
                *out += s;
            }
            cursor += 1;
        }

        if cursor >= sound.samples.len() {
            state.sound = None;
            state.cursor = 0;
        } else {
            state.cursor = cursor;
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.state.lock().map(|s| s.sound.is_some()).unwrap_or(false)
    }
}

impl ClickOutput for ClickVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&self, sound: Arc<ClickSound>) {
        if let Ok(mut state) = self.state.lock() {
            state.sound = Some(sound);
            state.cursor = 0;
        }
    }
}
