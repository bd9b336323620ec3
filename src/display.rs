use std::time::{Duration, Instant};

use crate::game::Phase;

/// Identifies one rendered letter element on a display surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LetterHandle(pub usize);

/// Surface the game controller renders to
pub trait Display {
    /// Render one element per letter, in order, and hand back their handles.
    fn render_letter_set(&mut self, letters: &[char]) -> Vec<LetterHandle>;
    fn mark_letter_consumed(&mut self, handle: LetterHandle);
    fn set_status_text(&mut self, text: &str);
    fn set_best_time_text(&mut self, text: &str);
    /// Whether the element can show the wrong-key flash at all.
    fn can_animate(&self, _handle: LetterHandle) -> bool {
        true
    }
    /// Start the wrong-key flash. Must not block; the flash resolves on its own.
    fn flash_error(&mut self, handle: LetterHandle);
    fn set_phase_attribute(&mut self, phase: Phase);
    fn clear_all_letters(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterState {
    Pending,
    Consumed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetterTile {
    pub letter: char,
    pub state: LetterState,
    pub flash_until: Option<Instant>,
}

/// Display model the terminal UI draws from
#[derive(Debug, Clone)]
pub struct BoardView {
    pub tiles: Vec<LetterTile>,
    pub status: String,
    pub best_time: Option<String>,
    pub phase: Phase,
    flash_duration: Duration,
}

impl BoardView {
    pub fn new(flash_duration: Duration) -> Self {
        Self {
            tiles: Vec::new(),
            status: String::new(),
            best_time: None,
            phase: Phase::NotStarted,
            flash_duration,
        }
    }

    pub fn is_flashing(&self, handle: LetterHandle, now: Instant) -> bool {
        self.tiles
            .get(handle.0)
            .and_then(|t| t.flash_until)
            .is_some_and(|until| now < until)
    }

    pub fn has_active_flash(&self) -> bool {
        self.tiles.iter().any(|t| t.flash_until.is_some())
    }

    /// Drop flashes that have run their course. Returns true if any ended,
    /// so the caller knows to redraw.
    pub fn expire_flashes(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for tile in &mut self.tiles {
            if tile.flash_until.is_some_and(|until| now >= until) {
                tile.flash_until = None;
                changed = true;
            }
        }
        changed
    }

    pub fn consumed_count(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.state == LetterState::Consumed)
            .count()
    }
}

impl Default for BoardView {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl Display for BoardView {
    fn render_letter_set(&mut self, letters: &[char]) -> Vec<LetterHandle> {
        let offset = self.tiles.len();
        self.tiles.extend(letters.iter().map(|&letter| LetterTile {
            letter,
            state: LetterState::Pending,
            flash_until: None,
        }));
        (offset..self.tiles.len()).map(LetterHandle).collect()
    }

    fn mark_letter_consumed(&mut self, handle: LetterHandle) {
        if let Some(tile) = self.tiles.get_mut(handle.0) {
            tile.state = LetterState::Consumed;
            tile.flash_until = None;
        }
    }

    fn set_status_text(&mut self, text: &str) {
        self.status = text.to_string();
    }

    fn set_best_time_text(&mut self, text: &str) {
        self.best_time = Some(text.to_string());
    }

    fn can_animate(&self, handle: LetterHandle) -> bool {
        !self.flash_duration.is_zero() && handle.0 < self.tiles.len()
    }

    fn flash_error(&mut self, handle: LetterHandle) {
        let until = Instant::now() + self.flash_duration;
        if let Some(tile) = self.tiles.get_mut(handle.0) {
            tile.flash_until = Some(until);
        }
    }

    fn set_phase_attribute(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn clear_all_letters(&mut self) {
        self.tiles.clear();
    }
}
