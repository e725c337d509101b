// src/engine/output.rs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::HeapCons;
use ringbuf::traits::{Consumer, Observer};

use crate::error::EngineError;
use crate::metronome::ClickVoice;

/// Decoded track samples, interleaved at the output rate and channel count.
/// Swapped out whenever a new decoder starts.
pub type SharedConsumer = Arc<Mutex<Option<HeapCons<f32>>>>;

pub struct OutputDevice {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub channels: usize,
    pub sample_rate: u32,
}

/// Default output device and its preferred config. Nothing is opened yet.
pub fn default_output() -> Result<OutputDevice, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Unavailable("no output device".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    log::info!("output device: {channels} channels @ {sample_rate} Hz");

    Ok(OutputDevice {
        device,
        config,
        sample_format,
        channels,
        sample_rate,
    })
}

/// Playback state shared by the engine, the decoder thread and the device
/// callback.
///
/// Seeks are a three-step handshake: the engine bumps `seek_requested`, the
/// decoder repositions and publishes `seek_ready`, and the callback throws
/// away whatever pre-seek audio is still buffered before acknowledging with
/// `seek_flushed`. The decoder only pushes again after that.
pub struct Transport {
    pub playing: AtomicBool,
    /// Set by the decoder once the last sample of the file is buffered.
    pub eof: AtomicBool,
    pub seek_requested: AtomicU64,
    pub seek_ready: AtomicU64,
    pub seek_flushed: AtomicU64,
    position: AtomicU64,
    duration: AtomicU64,
    sample_rate: u32,
}

impl Transport {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            playing: AtomicBool::new(false),
            eof: AtomicBool::new(false),
            seek_requested: AtomicU64::new(0),
            seek_ready: AtomicU64::new(0),
            seek_flushed: AtomicU64::new(0),
            position: AtomicU64::new(0f64.to_bits()),
            duration: AtomicU64::new(0f64.to_bits()),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    pub fn set_position(&self, seconds: f64) {
        self.position.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration.load(Ordering::Relaxed))
    }

    pub fn set_duration(&self, seconds: f64) {
        self.duration.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn seek_pending(&self) -> bool {
        self.seek_requested.load(Ordering::Acquire) != self.seek_ready.load(Ordering::Acquire)
    }

    /// Forget any seek bookkeeping; used when a fresh decoder starts.
    pub fn reset_seeks(&self) {
        let current = self.seek_requested.load(Ordering::Acquire);
        self.seek_ready.store(current, Ordering::Release);
        self.seek_flushed.store(current, Ordering::Release);
    }

    fn advance(&self, seconds: f64) {
        let end = self.duration();
        let _ = self
            .position
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let next = f64::from_bits(bits) + seconds;
                Some(if end > 0.0 { next.min(end) } else { next }.to_bits())
            });
    }

    /// Fill `block` with track audio. Silence while paused or mid-seek.
    fn render(&self, block: &mut [f32], channels: usize, consumer: &SharedConsumer) {
        if self.seek_pending() {
            return;
        }
        let Ok(mut slot) = consumer.try_lock() else { return };
        let Some(ring) = slot.as_mut() else { return };

        let ready = self.seek_ready.load(Ordering::Acquire);
        if self.seek_flushed.load(Ordering::Acquire) != ready {
            ring.clear();
            self.seek_flushed.store(ready, Ordering::Release);
        }
        if !self.is_playing() {
            return;
        }

        let mut frames = 0usize;
        for frame in block.chunks_mut(channels) {
            let got = ring.pop_slice(frame);
            if got < frame.len() {
                if self.eof.load(Ordering::Acquire) && ring.is_empty() {
                    self.playing.store(false, Ordering::Relaxed);
                    self.set_position(self.duration());
                    return;
                }
                break;
            }
            frames += 1;
        }
        self.advance(frames as f64 / self.sample_rate as f64);
    }
}

/// Open and start the device stream: track audio from the ring plus the
/// metronome voice, which sounds whether or not the track is playing.
pub fn open_stream(
    output: &OutputDevice,
    transport: Arc<Transport>,
    consumer: SharedConsumer,
    clicks: Arc<ClickVoice>,
) -> Result<Stream, EngineError> {
    match output.sample_format {
        SampleFormat::F32 => build_stream::<f32>(output, transport, consumer, clicks),
        SampleFormat::I16 => build_stream::<i16>(output, transport, consumer, clicks),
        SampleFormat::U16 => build_stream::<u16>(output, transport, consumer, clicks),
        other => Err(EngineError::Device(format!(
            "unsupported sample format {other:?}"
        ))),
    }
}

fn build_stream<T>(
    output: &OutputDevice,
    transport: Arc<Transport>,
    consumer: SharedConsumer,
    clicks: Arc<ClickVoice>,
) -> Result<Stream, EngineError>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
{
    let channels = output.channels.max(1);
    let mut mix: Vec<f32> = Vec::new();

    let stream = output
        .device
        .build_output_stream(
            &output.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if mix.len() < data.len() {
                    mix.resize(data.len(), 0.0);
                }
                let block = &mut mix[..data.len()];
                block.fill(0.0);

                transport.render(block, channels, &consumer);
                clicks.mix_into(block, channels);

                for (out, s) in data.iter_mut().zip(block.iter()) {
                    *out = T::from_sample(s.clamp(-1.0, 1.0));
                }
            },
            |err| log::error!("output stream error: {err}"),
            None,
        )
        .map_err(|e| EngineError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    Ok(stream)
}
