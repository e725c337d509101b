// src/input.rs

use crossterm::event::{KeyCode, KeyModifiers};

use crate::error::{PracticeResult, ValidationError};
use crate::region::{RegionController, RegionId};

const SEEK_STEP_SECS: f64 = 5.0;
const BPM_FINE: i64 = 1;
const BPM_COARSE: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TogglePlay,
    CreateRegion,
    ToggleLoop,
    DeleteSelected,
    ToggleMetronome,
    ClearRegions,
    SelectNext,
    SelectPrevious,
    BeginRename,
    Rename { id: RegionId, label: String },
    AdjustBpm(i64),
    SeekBy(f64),
    Select(Option<RegionId>),
    Resize { id: RegionId, start: f64, end: f64 },
    HoverEnter(RegionId),
    HoverLeave(RegionId),
    Quit,
}

/// Result of feeding one raw event in.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Command(Command),
    /// Swallowed by the text editor.
    Consumed,
    Ignored,
}

/// Pointer gestures, already hit-tested against regions by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Press on a region, or on empty space with `None`.
    Down(Option<RegionId>),
    Enter(RegionId),
    Leave(RegionId),
    /// End of a drag or resize. Intermediate frames are not reported.
    DragEnd { id: RegionId, start: f64, end: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
struct TextEdit {
    target: RegionId,
    buffer: String,
}

/// Turns raw key and pointer events into controller commands.
///
/// While an in-place rename is open every key belongs to the edit buffer,
/// so typing a label can never trigger play, delete or anything else.
#[derive(Debug, Default)]
pub struct InputDispatcher {
    edit: Option<TextEdit>,
}

impl InputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_editing(&self) -> bool {
        self.edit.is_some()
    }

    /// Current rename buffer, for display.
    pub fn edit_buffer(&self) -> Option<&str> {
        self.edit.as_ref().map(|e| e.buffer.as_str())
    }

    pub fn begin_edit(&mut self, target: RegionId, initial: &str) {
        self.edit = Some(TextEdit {
            target,
            buffer: initial.to_string(),
        });
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    pub fn map_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Dispatch {
        if let Some(edit) = self.edit.as_mut() {
            return match code {
                KeyCode::Enter => {
                    let Some(edit) = self.edit.take() else {
                        return Dispatch::Consumed;
                    };
                    Dispatch::Command(Command::Rename {
                        id: edit.target,
                        label: edit.buffer,
                    })
                }
                KeyCode::Esc => {
                    self.edit = None;
                    Dispatch::Consumed
                }
                KeyCode::Backspace => {
                    edit.buffer.pop();
                    Dispatch::Consumed
                }
                KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                    edit.buffer.push(c);
                    Dispatch::Consumed
                }
                _ => Dispatch::Consumed,
            };
        }

        let command = match code {
            KeyCode::Char(' ') => Command::TogglePlay,
            KeyCode::Char('r') => Command::CreateRegion,
            KeyCode::Char('l') => Command::ToggleLoop,
            KeyCode::Char('m') => Command::ToggleMetronome,
            KeyCode::Char('c') if !modifiers.contains(KeyModifiers::CONTROL) => {
                Command::ClearRegions
            }
            KeyCode::Char('n') => Command::BeginRename,
            KeyCode::Char('q') => Command::Quit,
            KeyCode::Backspace | KeyCode::Delete => Command::DeleteSelected,
            KeyCode::BackTab => Command::SelectPrevious,
            KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => Command::SelectPrevious,
            KeyCode::Tab => Command::SelectNext,
            KeyCode::Up => Command::AdjustBpm(BPM_FINE),
            KeyCode::Down => Command::AdjustBpm(-BPM_FINE),
            KeyCode::PageUp => Command::AdjustBpm(BPM_COARSE),
            KeyCode::PageDown => Command::AdjustBpm(-BPM_COARSE),
            KeyCode::Left => Command::SeekBy(-SEEK_STEP_SECS),
            KeyCode::Right => Command::SeekBy(SEEK_STEP_SECS),
            _ => return Dispatch::Ignored,
        };
        Dispatch::Command(command)
    }

    pub fn map_pointer(&mut self, event: PointerEvent) -> Dispatch {
        let command = match event {
            PointerEvent::Down(target) => Command::Select(target),
            PointerEvent::Enter(id) => Command::HoverEnter(id),
            PointerEvent::Leave(id) => Command::HoverLeave(id),
            PointerEvent::DragEnd { id, start, end } => Command::Resize { id, start, end },
        };
        Dispatch::Command(command)
    }

    /// Map and run one key press. The first gesture also unlocks audio.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        controller: &mut RegionController,
    ) -> PracticeResult<Flow> {
        match self.map_key(code, modifiers) {
            Dispatch::Command(command) => {
                try_unlock(controller);
                self.execute(command, controller)
            }
            Dispatch::Consumed | Dispatch::Ignored => Ok(Flow::Continue),
        }
    }

    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        controller: &mut RegionController,
    ) -> PracticeResult<Flow> {
        if matches!(event, PointerEvent::Down(_)) {
            try_unlock(controller);
        }
        match self.map_pointer(event) {
            Dispatch::Command(command) => self.execute(command, controller),
            Dispatch::Consumed | Dispatch::Ignored => Ok(Flow::Continue),
        }
    }

    pub fn execute(
        &mut self,
        command: Command,
        controller: &mut RegionController,
    ) -> PracticeResult<Flow> {
        match command {
            Command::TogglePlay => controller.toggle_play(),
            Command::CreateRegion => {
                controller.create_region_at_playhead()?;
            }
            Command::ToggleLoop => controller.toggle_loop_selected()?,
            Command::DeleteSelected => controller.delete_selected()?,
            Command::ToggleMetronome => {
                controller.toggle_metronome()?;
            }
            Command::ClearRegions => controller.clear_regions(),
            Command::SelectNext => {
                controller.select_next();
            }
            Command::SelectPrevious => {
                controller.select_previous();
            }
            Command::BeginRename => {
                let id = controller
                    .selected()
                    .ok_or(ValidationError::NoSelection)?;
                let label = controller
                    .region(id)
                    .map(|r| r.label.clone())
                    .unwrap_or_default();
                self.begin_edit(id, &label);
            }
            Command::Rename { id, label } => controller.rename_region(id, &label)?,
            Command::AdjustBpm(delta) => {
                controller.adjust_bpm(delta);
            }
            Command::SeekBy(delta) => {
                controller.seek_by(delta)?;
            }
            Command::Select(target) => controller.set_selected(target)?,
            Command::Resize { id, start, end } => controller.resize_region(id, start, end)?,
            Command::HoverEnter(id) => controller.hover_enter(id),
            Command::HoverLeave(id) => controller.hover_leave(id),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

fn try_unlock(controller: &mut RegionController) {
    if controller.is_unlocked() {
        return;
    }
    if let Err(e) = controller.unlock() {
        log::debug!("unlock on gesture failed: {e}");
    }
}
