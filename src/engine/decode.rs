// src/engine/decode.rs

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, anyhow};
use ringbuf::HeapProd;
use ringbuf::traits::Producer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as _, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use symphonia::default::{get_codecs, get_probe};

use crate::engine::output::Transport;
use crate::error::EngineError;

const RESAMPLE_CHUNK: usize = 1024;
const SEEK_FADE_MS: u32 = 10;

/// What `load` learns about a file before anything is decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

pub enum DecodeCmd {
    /// Reposition to `seconds`; `epoch` is the transport's `seek_requested`.
    Seek { epoch: u64, seconds: f64 },
    Shutdown,
}

pub struct DecoderHandle {
    cmd_tx: Sender<DecodeCmd>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DecoderHandle {
    pub fn seek(&self, epoch: u64, seconds: f64) {
        let _ = self.cmd_tx.send(DecodeCmd::Seek { epoch, seconds });
    }

    /// Stops the thread without waiting for a full ring to drain.
    pub fn shutdown(mut self) {
        self.cancel.store(true, Ordering::Release);
        let _ = self.cmd_tx.send(DecodeCmd::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn open_format(path: &str) -> anyhow::Result<Box<dyn FormatReader>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

/// Read container headers for duration and layout. Falls back to summing
/// packet durations when the header has no frame count.
pub fn probe(path: &str) -> Result<TrackInfo, EngineError> {
    let mut format = open_format(path).map_err(|e| EngineError::Decode(format!("{e:#}")))?;
    let track = format
        .default_track()
        .ok_or_else(|| EngineError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EngineError::Decode("missing sample rate".into()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let n_frames = track.codec_params.n_frames;

    let frames = match n_frames {
        Some(n) => n,
        None => {
            let mut total = 0u64;
            while let Ok(packet) = format.next_packet() {
                if packet.track_id() == track_id {
                    total += packet.dur();
                }
            }
            total
        }
    };

    Ok(TrackInfo {
        duration: frames as f64 / sample_rate as f64,
        sample_rate,
        channels,
    })
}

/// Start decoding `path` into `producer` from `start_at` seconds.
pub fn spawn_decoder(
    path: String,
    start_at: f64,
    producer: HeapProd<f32>,
    transport: Arc<Transport>,
    output_channels: usize,
) -> DecoderHandle {
    let (cmd_tx, cmd_rx) = channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let job = DecodeJob {
        path,
        producer,
        transport,
        output_channels: output_channels.max(1),
        cmd_rx,
        cancel: cancel.clone(),
        epoch: 0,
        fade_total: 0,
        fade_remaining: 0,
    };
    let thread = thread::Builder::new()
        .name("practice-decoder".into())
        .spawn(move || {
            if let Err(e) = job.run(start_at) {
                log::error!("decoder stopped: {e:#}");
            }
        })
        .map_err(|e| log::error!("could not start decoder thread: {e}"))
        .ok();

    DecoderHandle {
        cmd_tx,
        cancel,
        thread,
    }
}

enum Flow {
    Continue,
    /// A newer seek or a shutdown arrived; drop what is being pushed.
    Interrupted,
}

struct DecodeJob {
    path: String,
    producer: HeapProd<f32>,
    transport: Arc<Transport>,
    output_channels: usize,
    cmd_rx: Receiver<DecodeCmd>,
    cancel: Arc<AtomicBool>,
    /// Last seek epoch this thread has applied.
    epoch: u64,
    fade_total: usize,
    fade_remaining: usize,
}

impl DecodeJob {
    fn run(mut self, start_at: f64) -> anyhow::Result<()> {
        let mut format = open_format(&self.path)?;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track"))?;
        let track_id = track.id;
        let source_rate = track.codec_params.sample_rate.context("missing sample rate")?;
        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let output_rate = self.transport.sample_rate();
        let mut stage = Stage::new(self.output_channels, source_rate, output_rate)?;
        // Sized to the largest packet seen so far, in frames.
        let mut sample_buf: Option<(usize, SampleBuffer<f32>)> = None;
        self.epoch = self.transport.seek_requested.load(Ordering::Acquire);

        if start_at > 0.0 {
            reposition(format.as_mut(), track_id, start_at)?;
        }

        loop {
            // Apply only the newest seek if several queued up.
            let mut seek = None;
            loop {
                match self.cmd_rx.try_recv() {
                    Ok(DecodeCmd::Seek { epoch, seconds }) => seek = Some((epoch, seconds)),
                    Ok(DecodeCmd::Shutdown) | Err(TryRecvError::Disconnected) => return Ok(()),
                    Err(TryRecvError::Empty) => break,
                }
            }
            if let Some((epoch, seconds)) = seek {
                self.apply_seek(format.as_mut(), decoder.as_mut(), track_id, &mut stage, epoch, seconds)?;
                if !self.wait_for_flush() {
                    return Ok(());
                }
            }
            if self.cancel.load(Ordering::Acquire) {
                return Ok(());
            }

            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if let Flow::Interrupted = self.finish(&mut stage) {
                        continue;
                    }
                    // Parked at the end until a seek brings us back.
                    match self.cmd_rx.recv() {
                        Ok(DecodeCmd::Seek { epoch, seconds }) => {
                            self.apply_seek(format.as_mut(), decoder.as_mut(), track_id, &mut stage, epoch, seconds)?;
                                        if !self.wait_for_flush() {
                                return Ok(());
                            }
                            continue;
                        }
                        Ok(DecodeCmd::Shutdown) | Err(_) => return Ok(()),
                    }
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("skipping undecodable packet: {e}");
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let source_channels = decoded.spec().channels.count();
            if sample_buf
                .as_ref()
                .is_none_or(|(frames, _)| *frames < decoded.capacity())
            {
                let buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                sample_buf = Some((decoded.capacity(), buf));
            }
            let Some((_, buf)) = sample_buf.as_mut() else { continue };
            buf.copy_interleaved_ref(decoded);
            let remixed = remix(buf.samples(), source_channels, self.output_channels);

            let blocks = stage.feed(&remixed)?;
            for block in blocks {
                if let Flow::Interrupted = self.push(&block) {
                    break;
                }
            }
        }
    }

    fn apply_seek(
        &mut self,
        format: &mut dyn FormatReader,
        decoder: &mut dyn symphonia::core::codecs::Decoder,
        track_id: u32,
        stage: &mut Stage,
        epoch: u64,
        seconds: f64,
    ) -> anyhow::Result<()> {
        reposition(format, track_id, seconds)?;
        decoder.reset();
        stage.reset();
        self.epoch = epoch;
        self.fade_total =
            (self.transport.sample_rate() as usize * SEEK_FADE_MS as usize / 1000) * self.output_channels;
        self.fade_remaining = self.fade_total;
        self.transport.eof.store(false, Ordering::Release);
        self.transport.seek_ready.store(epoch, Ordering::Release);
        Ok(())
    }

    /// Wait for the callback to drop pre-seek audio. False on shutdown.
    fn wait_for_flush(&self) -> bool {
        loop {
            if self.cancel.load(Ordering::Acquire) {
                return false;
            }
            let flushed = self.transport.seek_flushed.load(Ordering::Acquire);
            if flushed >= self.epoch || self.superseded() {
                return true;
            }
            thread::park_timeout(Duration::from_millis(1));
        }
    }

    fn superseded(&self) -> bool {
        self.transport.seek_requested.load(Ordering::Acquire) != self.epoch
    }

    /// Push with a short fade-in after a seek. Blocks while the ring is full.
    fn push(&mut self, data: &[f32]) -> Flow {
        for &sample in data {
            let s = if self.fade_remaining > 0 {
                let gain = 1.0 - self.fade_remaining as f32 / self.fade_total.max(1) as f32;
                self.fade_remaining -= 1;
                sample * gain
            } else {
                sample
            };
            while self.producer.try_push(s).is_err() {
                if self.cancel.load(Ordering::Acquire) || self.superseded() {
                    return Flow::Interrupted;
                }
                thread::park_timeout(Duration::from_millis(2));
            }
        }
        Flow::Continue
    }

    /// Flush the resampler tail and mark the end of the file.
    fn finish(&mut self, stage: &mut Stage) -> Flow {
        match stage.drain() {
            Ok(tail) => {
                if let Flow::Interrupted = self.push(&tail) {
                    return Flow::Interrupted;
                }
            }
            Err(e) => log::warn!("dropping resampler tail: {e:#}"),
        }
        self.transport.eof.store(true, Ordering::Release);
        Flow::Continue
    }
}

fn reposition(format: &mut dyn FormatReader, track_id: u32, seconds: f64) -> anyhow::Result<()> {
    let seconds = seconds.max(0.0);
    let time = Time::new(seconds.trunc() as u64, seconds.fract());
    format.seek(
        SeekMode::Accurate,
        SeekTo::Time {
            time,
            track_id: Some(track_id),
        },
    )?;
    Ok(())
}

/// Fit interleaved `input` to `out_ch` channels: mono folds by averaging,
/// everything else maps channel-by-channel, wrapping when upmixing.
fn remix(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);
    for frame in input.chunks_exact(in_ch) {
        if out_ch == 1 {
            out.push(frame.iter().sum::<f32>() / in_ch as f32);
        } else {
            out.extend((0..out_ch).map(|oc| frame[oc % in_ch]));
        }
    }
    out
}

/// Rate conversion to the device rate, in planar chunks as rubato wants.
/// A pass-through when the rates already match.
struct Stage {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    planar: Vec<Vec<f32>>,
}

impl Stage {
    fn new(channels: usize, source_rate: u32, output_rate: u32) -> anyhow::Result<Self> {
        let resampler = if source_rate == output_rate {
            None
        } else {
            let sinc_len = 128;
            let window = WindowFunction::BlackmanHarris2;
            let params = SincInterpolationParameters {
                sinc_len,
                f_cutoff: calculate_cutoff(sinc_len, window),
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window,
            };
            let ratio = output_rate as f64 / source_rate as f64;
            log::debug!("resampling {source_rate} Hz -> {output_rate} Hz");
            Some(SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, channels)?)
        };
        Ok(Self {
            channels,
            resampler,
            planar: vec![Vec::with_capacity(RESAMPLE_CHUNK * 2); channels],
        })
    }

    fn reset(&mut self) {
        for ch in &mut self.planar {
            ch.clear();
        }
        if let Some(r) = &mut self.resampler {
            r.reset();
        }
    }

    fn buffered(&self) -> usize {
        self.planar.iter().map(Vec::len).min().unwrap_or(0)
    }

    fn take(&mut self, frames: usize) -> Vec<Vec<f32>> {
        self.planar
            .iter_mut()
            .map(|ch| {
                let rest = ch.split_off(frames.min(ch.len()));
                std::mem::replace(ch, rest)
            })
            .collect()
    }

    fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
        let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut out = Vec::with_capacity(frames * planar.len());
        for f in 0..frames {
            out.extend(planar.iter().map(|ch| ch[f]));
        }
        out
    }

    /// Interleaved in, zero or more interleaved blocks out.
    fn feed(&mut self, interleaved: &[f32]) -> anyhow::Result<Vec<Vec<f32>>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(vec![interleaved.to_vec()]);
        };
        for frame in interleaved.chunks_exact(self.channels) {
            for (ch, s) in self.planar.iter_mut().zip(frame) {
                ch.push(*s);
            }
        }

        let mut blocks = Vec::new();
        loop {
            let need = resampler.input_frames_next();
            if self.planar.iter().map(Vec::len).min().unwrap_or(0) < need {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .planar
                .iter_mut()
                .map(|ch| {
                    let rest = ch.split_off(need);
                    std::mem::replace(ch, rest)
                })
                .collect();
            let out = resampler.process(&chunk, None)?;
            blocks.push(Self::interleave(&out));
        }
        Ok(blocks)
    }

    /// Whatever is left at end of file, resampled.
    fn drain(&mut self) -> anyhow::Result<Vec<f32>> {
        if self.resampler.is_none() {
            return Ok(Vec::new());
        }
        let leftover = if self.buffered() > 0 {
            let frames = self.buffered();
            Some(self.take(frames))
        } else {
            None
        };
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        if let Some(block) = leftover {
            out.extend(Self::interleave(
                &resampler.process_partial(Some(block.as_slice()), None)?,
            ));
        }
        let flushed = resampler.process_partial::<Vec<f32>>(None, None)?;
        out.extend(Self::interleave(&flushed));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remix_folds_and_spreads() {
        let mono = remix(&[0.2, 0.4, 0.6, 0.8], 2, 1);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6 && (mono[1] - 0.7).abs() < 1e-6);
        assert_eq!(remix(&[0.5, -0.5], 1, 2), vec![0.5, 0.5, -0.5, -0.5]);
        assert_eq!(remix(&[0.1, 0.2], 2, 2), vec![0.1, 0.2]);
    }

    #[test]
    fn stage_passes_through_at_equal_rates() {
        let mut stage = Stage::new(2, 48_000, 48_000).unwrap();
        let blocks = stage.feed(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(blocks, vec![vec![0.1, 0.2, 0.3, 0.4]]);
        assert!(stage.drain().unwrap().is_empty());
    }

    #[test]
    fn stage_resamples_in_chunks() {
        let mut stage = Stage::new(1, 24_000, 48_000).unwrap();
        let input = vec![0.0f32; RESAMPLE_CHUNK / 2];
        assert!(stage.feed(&input).unwrap().is_empty());

        let blocks = stage.feed(&input).unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].len() > RESAMPLE_CHUNK);
    }

    #[test]
    fn probe_rejects_missing_files() {
        assert!(matches!(
            probe("/definitely/not/here.wav"),
            Err(EngineError::Decode(_))
        ));
    }
}
