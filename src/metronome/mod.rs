// src/metronome/mod.rs

pub mod click;

pub use click::{ClickOutput, ClickSound, ClickVoice};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PracticeError, PracticeResult};

pub const MIN_BPM: u16 = 20;
pub const MAX_BPM: u16 = 280;
pub const DEFAULT_BPM: u16 = 100;

/// Tempo in quarter notes per minute, always within `[MIN_BPM, MAX_BPM]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bpm(u16);

impl Bpm {
    pub fn new(bpm: i64) -> Self {
        Bpm(bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u16)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Seconds per quarter note (120 BPM -> 0.5 s).
    pub fn interval(self) -> Duration {
        Duration::from_secs_f64(60.0 / self.0 as f64)
    }
}

impl Default for Bpm {
    fn default() -> Self {
        Bpm(DEFAULT_BPM)
    }
}

/// Periodic click generator on its own clock.
///
/// Runs on a tokio timer, never on the playback transport: tempo here has no
/// effect on how fast the track plays, and seeking the track does not move
/// the click phase.
pub struct MetronomeClock {
    bpm: Bpm,
    output: Arc<dyn ClickOutput>,
    bpm_tx: watch::Sender<Bpm>,
    task: Option<JoinHandle<()>>,
}

impl MetronomeClock {
    pub fn new(bpm: Bpm, output: Arc<dyn ClickOutput>) -> Self {
        let (bpm_tx, _) = watch::channel(bpm);
        Self {
            bpm,
            output,
            bpm_tx,
            task: None,
        }
    }

    pub fn bpm(&self) -> Bpm {
        self.bpm
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start or stop; returns the new running state.
    pub fn toggle(&mut self) -> PracticeResult<bool> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    pub fn start(&mut self) -> PracticeResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| PracticeError::EngineUnavailable("no scheduler for the metronome".into()))?;

        let sound = Arc::new(ClickSound::default_click(self.output.sample_rate()));
        let output = self.output.clone();
        let bpm_rx = self.bpm_tx.subscribe();
        self.task = Some(handle.spawn(run_clicks(sound, output, bpm_rx)));
        log::info!("metronome on at {} bpm", self.bpm.value());
        Ok(())
    }

    /// Cancels every pending click.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("metronome off");
        }
    }

    /// Clamp and apply. A running schedule keeps its phase: the click already
    /// scheduled fires on time and the new interval starts from it.
    pub fn set_bpm(&mut self, bpm: i64) -> Bpm {
        self.bpm = Bpm::new(bpm);
        self.bpm_tx.send_replace(self.bpm);
        self.bpm
    }

    pub fn adjust_bpm(&mut self, delta: i64) -> Bpm {
        self.set_bpm(self.bpm.value() as i64 + delta)
    }
}

impl Drop for MetronomeClock {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_clicks(
    sound: Arc<ClickSound>,
    output: Arc<dyn ClickOutput>,
    bpm_rx: watch::Receiver<Bpm>,
) {
    let mut next = Instant::now();
    loop {
        tokio::time::sleep_until(next).await;
        output.play(sound.clone());

        let interval = bpm_rx.borrow().interval();
        next += interval;
        // After a stall, resume on the grid from now instead of bursting.
        let now = Instant::now();
        if next <= now {
            next = now + interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpm_is_clamped() {
        assert_eq!(Bpm::new(10).value(), MIN_BPM);
        assert_eq!(Bpm::new(1000).value(), MAX_BPM);
        assert_eq!(Bpm::new(-5).value(), MIN_BPM);
        assert_eq!(Bpm::new(120).value(), 120);
    }

    #[test]
    fn interval_is_one_quarter_note() {
        assert_eq!(Bpm::new(120).interval(), Duration::from_millis(500));
        let ninety = Bpm::new(90).interval().as_secs_f64();
        assert!((ninety - 0.6667).abs() < 1e-3);
    }
}
