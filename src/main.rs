// src/main.rs

use std::fmt::Write as FmtWrite;
use std::io::{Write, stdout};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate, disable_raw_mode,
        enable_raw_mode,
    },
};

use practice_modules::input::Flow;
use practice_modules::region::format_clock;
use practice_modules::store::{HttpRegionApi, RegionApi};
use practice_modules::{
    AudioEngine, InputDispatcher, LoopState, PlaybackEngine, PracticeConfig, RegionController,
    TrackSource,
};

struct Args {
    audio_path: String,
    track_id: Option<String>,
    config_path: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut audio_path = None;
    let mut track_id = None;
    let mut config_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--track" => track_id = Some(args.next().context("--track needs a value")?),
            "--config" => config_path = Some(args.next().context("--config needs a value")?),
            other if other.starts_with("--") => bail!("unknown option {other}"),
            other => audio_path = Some(other.to_string()),
        }
    }

    let Some(audio_path) = audio_path else {
        bail!("usage: practice <audio-file> [--track <id>] [--config <path>]");
    };
    Ok(Args {
        audio_path,
        track_id,
        config_path,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut config = match &args.config_path {
        Some(path) => PracticeConfig::load_from_disk(path)?,
        None => PracticeConfig::default(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    config.apply_env();

    let api: Option<Arc<dyn RegionApi>> = match &config.api_base_url {
        Some(url) => {
            log::info!("region store at {url}");
            Some(Arc::new(HttpRegionApi::new(url).context("region store client")?))
        }
        None => {
            log::info!("no region store configured; regions stay local");
            None
        }
    };

    let engine = PlaybackEngine::new(Duration::from_millis(config.tick_interval_ms))
        .context("opening audio output")?;
    let clicks = engine.click_output();
    let engine: Box<dyn AudioEngine> = Box::new(engine);
    let mut controller = RegionController::new(engine, clicks, api, &config);

    // Stored regions are scoped per track; default to the file name.
    let track_id = args.track_id.clone().or_else(|| {
        Path::new(&args.audio_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
    });
    controller.open_track(TrackSource {
        source: args.audio_path.clone(),
        track_id,
    })?;

    let mut dispatcher = InputDispatcher::new();
    let mut screen = Screen::default();

    enable_raw_mode()?;
    let result = run_loop(&mut controller, &mut dispatcher, &mut screen);
    controller.dispose();
    disable_raw_mode()?;
    println!("\r\nBye.");
    result
}

fn run_loop(
    controller: &mut RegionController,
    dispatcher: &mut InputDispatcher,
    screen: &mut Screen,
) -> anyhow::Result<()> {
    // 20 fps
    let frame = Duration::from_millis(50);

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        return Ok(());
                    }
                    match dispatcher.handle_key(ev.code, ev.modifiers, controller) {
                        Ok(Flow::Quit) => return Ok(()),
                        Ok(Flow::Continue) => {}
                        Err(e) => controller.report(&e),
                    }
                }
            }
        }

        controller.pump();
        screen.draw(controller, dispatcher)?;
    }
}

/// Redraws only when the text changes.
#[derive(Default)]
struct Screen {
    buffer: String,
    last: String,
    message: Option<String>,
}

impl Screen {
    fn draw(
        &mut self,
        controller: &mut RegionController,
        dispatcher: &InputDispatcher,
    ) -> anyhow::Result<()> {
        if let Some(status) = controller.take_status() {
            self.message = Some(status);
        }

        self.buffer.clear();
        let b = &mut self.buffer;
        let _ = write!(
            b,
            "[SPACE] play  [R] region  [L] loop  [DEL] delete  [M] metronome  [N] rename  [TAB] select  [Q] quit\r\n\r\n"
        );

        let state = if !controller.is_ready() {
            "loading"
        } else if controller.is_playing() {
            "playing"
        } else {
            "paused"
        };
        let duration = controller.duration().unwrap_or(0.0);
        let metronome = if controller.metronome_running() { "on" } else { "off" };
        let _ = write!(
            b,
            "{} / {}  {state}  |  metronome {metronome} @ {} bpm\r\n",
            format_clock(controller.current_time()),
            format_clock(duration),
            controller.bpm().value()
        );

        let looping = match controller.loop_state() {
            LoopState::Looping(id) => Some(id),
            LoopState::Idle => None,
        };
        let playhead = controller.playhead_region();
        for region in controller.regions() {
            let mark = if region.selected { '>' } else { ' ' };
            let loop_mark = if looping == Some(region.id) { " [loop]" } else { "" };
            let here = if playhead == Some(region.id) { " *" } else { "" };
            let _ = write!(
                b,
                "{mark} {:<16} {}{loop_mark}{here}\r\n",
                region.label,
                region.span_label()
            );
        }
        if controller.regions().is_empty() {
            let _ = write!(b, "  (no regions)\r\n");
        }

        if let Some(text) = dispatcher.edit_buffer() {
            let _ = write!(b, "\r\nrename: {text}_  [ENTER] save  [ESC] cancel\r\n");
        }
        if let Some(message) = &self.message {
            let _ = write!(b, "\r\n{message}\r\n");
        }

        if self.buffer == self.last {
            return Ok(());
        }

        let mut out = stdout();
        execute!(
            out,
            BeginSynchronizedUpdate,
            MoveTo(0, 0),
            Clear(ClearType::FromCursorDown)
        )?;
        out.write_all(self.buffer.as_bytes())?;
        execute!(out, EndSynchronizedUpdate)?;
        out.flush()?;
        std::mem::swap(&mut self.buffer, &mut self.last);
        Ok(())
    }
}
