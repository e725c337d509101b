// src/engine/player.rs

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::Stream;
use ringbuf::HeapRb;
use ringbuf::traits::Split;

use crate::engine::decode::{self, DecoderHandle, TrackInfo};
use crate::engine::output::{self, OutputDevice, SharedConsumer, Transport};
use crate::engine::{AudioEngine, ReadyHandler, SubscriptionId, TickHandler};
use crate::error::EngineError;
use crate::metronome::ClickVoice;

/// About a third of a second of stereo at 48 kHz: small enough that a seek
/// never has much stale audio to throw away.
const RING_CAPACITY: usize = 32_768;

type Handlers = Arc<Mutex<Vec<(SubscriptionId, TickHandler)>>>;

/// The real engine: symphonia decoding into a ring buffer, played by cpal.
///
/// `load` probes the file on a worker thread and reports the duration.
/// The device stream is only opened by `unlock`, and decoding starts once
/// both have happened. A ticker thread reports the playhead to subscribers
/// while playing.
pub struct PlaybackEngine {
    output: OutputDevice,
    transport: Arc<Transport>,
    consumer: SharedConsumer,
    clicks: Arc<ClickVoice>,
    stream: Option<Stream>,

    source: Option<String>,
    track: Arc<Mutex<Option<TrackInfo>>>,
    load_epoch: Arc<AtomicU64>,
    decoder: Option<DecoderHandle>,

    handlers: Handlers,
    next_subscription: u64,
    ticker_stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    disposed: bool,
}

impl PlaybackEngine {
    pub fn new(tick_interval: Duration) -> Result<Self, EngineError> {
        let output = output::default_output()?;
        let transport = Arc::new(Transport::new(output.sample_rate));
        let clicks = Arc::new(ClickVoice::new(output.sample_rate));
        let handlers: Handlers = Arc::new(Mutex::new(Vec::new()));
        let ticker_stop = Arc::new(AtomicBool::new(false));

        let ticker = spawn_ticker(
            tick_interval,
            transport.clone(),
            handlers.clone(),
            ticker_stop.clone(),
        );

        Ok(Self {
            output,
            transport,
            consumer: Arc::new(Mutex::new(None)),
            clicks,
            stream: None,
            source: None,
            track: Arc::new(Mutex::new(None)),
            load_epoch: Arc::new(AtomicU64::new(0)),
            decoder: None,
            handlers,
            next_subscription: 0,
            ticker_stop,
            ticker,
            disposed: false,
        })
    }

    /// The metronome sounds through this engine's output stream.
    pub fn click_output(&self) -> Arc<ClickVoice> {
        self.clicks.clone()
    }

    fn track_info(&self) -> Option<TrackInfo> {
        self.track.lock().ok().and_then(|t| *t)
    }

    fn stop_decoder(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.shutdown();
        }
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = None;
        }
    }

    /// Start decoding from the current position once loaded and unlocked.
    fn ensure_decoder(&mut self) {
        if self.decoder.is_some() || self.stream.is_none() || self.track_info().is_none() {
            return;
        }
        let Some(path) = self.source.clone() else { return };

        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = Some(consumer);
        }
        self.transport.eof.store(false, Ordering::Release);
        self.transport.reset_seeks();

        self.decoder = Some(decode::spawn_decoder(
            path,
            self.transport.position(),
            producer,
            self.transport.clone(),
            self.output.channels,
        ));
    }
}

impl AudioEngine for PlaybackEngine {
    fn load(&mut self, source: &str, on_ready: ReadyHandler) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Unavailable("engine disposed".into()));
        }
        if !Path::new(source).is_file() {
            return Err(EngineError::Decode(format!("no such file: {source}")));
        }

        self.stop_decoder();
        self.transport.playing.store(false, Ordering::Relaxed);
        self.transport.set_position(0.0);
        self.transport.set_duration(0.0);
        if let Ok(mut track) = self.track.lock() {
            *track = None;
        }
        self.source = Some(source.to_string());

        // A later load makes this probe's answer irrelevant.
        let epoch = self.load_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let load_epoch = self.load_epoch.clone();
        let track = self.track.clone();
        let transport = self.transport.clone();
        let path = source.to_string();

        thread::Builder::new()
            .name("practice-probe".into())
            .spawn(move || match decode::probe(&path) {
                Ok(info) => {
                    if load_epoch.load(Ordering::Acquire) != epoch {
                        return;
                    }
                    log::info!(
                        "loaded {path}: {:.2}s, {} ch @ {} Hz",
                        info.duration,
                        info.channels,
                        info.sample_rate
                    );
                    transport.set_duration(info.duration);
                    if let Ok(mut slot) = track.lock() {
                        *slot = Some(info);
                    }
                    on_ready(info.duration);
                }
                Err(e) => log::error!("could not load {path}: {e}"),
            })
            .map_err(|e| EngineError::Device(e.to_string()))?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.disposed && self.track_info().is_some()
    }

    fn unlock(&mut self) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Unavailable("engine disposed".into()));
        }
        if self.stream.is_none() {
            let stream = output::open_stream(
                &self.output,
                self.transport.clone(),
                self.consumer.clone(),
                self.clicks.clone(),
            )?;
            self.stream = Some(stream);
        }
        self.ensure_decoder();
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.stream.is_some()
    }

    fn play(&mut self) {
        if self.disposed || !self.is_ready() || !self.is_unlocked() {
            return;
        }
        self.ensure_decoder();
        let duration = self.transport.duration();
        if duration > 0.0 && self.transport.position() >= duration {
            self.set_time(0.0);
        }
        self.transport.playing.store(true, Ordering::Relaxed);
    }

    fn pause(&mut self) {
        self.transport.playing.store(false, Ordering::Relaxed);
    }

    fn is_playing(&self) -> bool {
        !self.disposed && self.transport.is_playing()
    }

    fn duration(&self) -> Option<f64> {
        self.track_info().map(|t| t.duration)
    }

    fn current_time(&self) -> f64 {
        self.transport.position()
    }

    fn set_time(&mut self, seconds: f64) {
        if self.disposed || !seconds.is_finite() {
            return;
        }
        let duration = self.transport.duration();
        let target = if duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };
        self.transport.set_position(target);
        if let Some(decoder) = &self.decoder {
            let epoch = self.transport.seek_requested.fetch_add(1, Ordering::AcqRel) + 1;
            decoder.seek(epoch, target);
        }
    }

    fn subscribe(&mut self, on_tick: TickHandler) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        if !self.disposed {
            if let Ok(mut handlers) = self.handlers.lock() {
                handlers.push((id, on_tick));
            }
        }
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.retain(|(sid, _)| *sid != id);
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.transport.playing.store(false, Ordering::Relaxed);
        self.load_epoch.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.clear();
        }
        self.ticker_stop.store(true, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
        self.stop_decoder();
        self.stream = None;
        log::debug!("playback engine disposed");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_ticker(
    interval: Duration,
    transport: Arc<Transport>,
    handlers: Handlers,
    stop: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    let interval = interval.max(Duration::from_millis(1));
    thread::Builder::new()
        .name("practice-ticker".into())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                thread::sleep(interval);
                if !transport.is_playing() {
                    continue;
                }
                let position = transport.position();
                if let Ok(mut handlers) = handlers.lock() {
                    for (_, handler) in handlers.iter_mut() {
                        handler(position);
                    }
                }
            }
        })
        .map_err(|e| log::error!("could not start tick thread: {e}"))
        .ok()
}
