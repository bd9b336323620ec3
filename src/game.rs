use std::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::display::{Display, LetterHandle};
use crate::highscore::{encode_best_time, load_best_time, HighscoreStore, HIGHSCORE_KEY};
use crate::letters::{select_letter_set, LetterSet, AVAILABLE_LOCALES};

pub const RESTART_KEY: &str = " ";

pub const PROMPT_TEXT: &str = "Press A on your keyboard to start, and space bar to restart";
pub const RUNNING_TEXT: &str = "GO GO GO";
pub const HALFWAY_TEXT: &str = "Half-way there!";
pub const ALMOST_DONE_TEXT: &str = "Only a few left, keep it up!";
pub const NEW_RECORD_TEXT: &str = " That's a new record!";

/// Coarse state of a run. The display names double as the phase attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    #[strum(serialize = "pre-game")]
    NotStarted,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "post-game")]
    Finished,
}

/// What a single key press did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyOutcome {
    Restarted,
    Accepted,
    /// The last letter was typed; carries the elapsed seconds
    Finished(f64),
    Rejected,
}

/// Seconds with exactly two decimals
pub fn format_time(secs: f64) -> String {
    format!("{secs:.2}")
}

pub fn finished_text(secs: f64) -> String {
    format!("You made it! ✨ It took {} seconds!", format_time(secs))
}

pub fn best_time_text(secs: f64) -> String {
    format!("Personal best: {} seconds", format_time(secs))
}

fn key_matches(expected: char, key: &str) -> bool {
    key.to_uppercase() == expected.to_uppercase().collect::<String>()
}

/// The game controller. Owns the run state and drives the display.
pub struct SpeedTest<D: Display, C: Clock> {
    display: D,
    clock: C,
    store: Option<Box<dyn HighscoreStore>>,
    preferences: Vec<String>,
    letters: LetterSet,
    // handles[i] is the element rendered for letters[i]
    handles: Vec<LetterHandle>,
    cursor: usize,
    phase: Phase,
    started_at: Option<Instant>,
    elapsed_secs: Option<f64>,
    best_time: Option<f64>,
}

impl<D: Display, C: Clock> SpeedTest<D, C> {
    /// Build a controller and run the first initialization.
    /// `preferences` is the ordered locale preference list.
    pub fn new(
        display: D,
        clock: C,
        store: Option<Box<dyn HighscoreStore>>,
        preferences: Vec<String>,
    ) -> Self {
        if store.is_none() {
            info!("no highscore store available, best times will not be saved");
        }

        let mut game = Self {
            display,
            clock,
            store,
            preferences,
            letters: LetterSet::default(),
            handles: Vec::new(),
            cursor: 0,
            phase: Phase::NotStarted,
            started_at: None,
            elapsed_secs: None,
            best_time: None,
        };
        game.initialize();
        game
    }

    fn initialize(&mut self) {
        self.letters = select_letter_set(&self.preferences, &AVAILABLE_LOCALES);
        self.cursor = 0;
        self.phase = Phase::NotStarted;
        self.started_at = None;
        self.elapsed_secs = None;

        // A faster in-session best wins over the stored one, which may be
        // missing or stale when the last save failed.
        if self.store.is_some() {
            let stored = load_best_time(self.store.as_deref());
            self.best_time = match (stored, self.best_time) {
                (Some(stored), Some(session)) => Some(stored.min(session)),
                (stored, session) => stored.or(session),
            };
        }
        if let Some(best) = self.best_time {
            self.display.set_best_time_text(&best_time_text(best));
        }

        self.display.set_phase_attribute(self.phase);
        self.display.set_status_text(PROMPT_TEXT);
        self.handles = self.display.render_letter_set(self.letters.letters());

        debug!(
            "initialized {} letters for locale {}",
            self.letters.len(),
            self.letters.locale
        );
    }

    pub fn handle_key(&mut self, key: &str) -> KeyOutcome {
        if key == RESTART_KEY {
            self.restart();
            return KeyOutcome::Restarted;
        }

        let Some(expected) = self.letters.get(self.cursor) else {
            // Finished: there is no next letter to flash
            return KeyOutcome::Rejected;
        };

        if !key_matches(expected, key) {
            self.flash_next_letter();
            return KeyOutcome::Rejected;
        }

        if self.phase == Phase::NotStarted {
            self.start();
        }

        if let Some(&handle) = self.handles.get(self.cursor) {
            self.display.mark_letter_consumed(handle);
        }
        self.cursor += 1;

        let remaining = self.remaining_len() as f64;
        let total = self.letters.len() as f64;

        if self.remaining_len() == 0 {
            return KeyOutcome::Finished(self.finish());
        } else if remaining < total / 5.0 {
            self.display.set_status_text(ALMOST_DONE_TEXT);
        } else if remaining < total / 2.0 {
            self.display.set_status_text(HALFWAY_TEXT);
        }

        KeyOutcome::Accepted
    }

    fn start(&mut self) {
        self.phase = Phase::Running;
        self.display.set_phase_attribute(self.phase);
        self.display.set_status_text(RUNNING_TEXT);
        self.started_at = Some(self.clock.now());
        info!("run started with {} letters", self.letters.len());
    }

    fn finish(&mut self) -> f64 {
        let stop = self.clock.now();
        let start = self.started_at.unwrap_or(stop);
        let elapsed = stop.saturating_duration_since(start).as_secs_f64();

        self.elapsed_secs = Some(elapsed);
        self.phase = Phase::Finished;
        self.display.set_phase_attribute(self.phase);

        let mut status = finished_text(elapsed);
        let is_record = self.best_time.map_or(true, |best| elapsed < best);

        if is_record {
            status.push_str(NEW_RECORD_TEXT);
            self.best_time = Some(elapsed);
            self.display.set_best_time_text(&best_time_text(elapsed));
            self.persist_best_time(elapsed);
        }

        self.display.set_status_text(&status);
        info!(
            "run finished in {}s{}",
            format_time(elapsed),
            if is_record { " (new record)" } else { "" }
        );

        elapsed
    }

    fn persist_best_time(&mut self, secs: f64) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.set(HIGHSCORE_KEY, &encode_best_time(secs)) {
                warn!("failed to save best time: {e}");
            }
        }
    }

    fn flash_next_letter(&mut self) {
        let Some(&handle) = self.handles.get(self.cursor) else {
            return;
        };
        if self.display.can_animate(handle) {
            self.display.flash_error(handle);
        }
    }

    /// Reset to a fresh pre-game state. Safe in any phase.
    pub fn restart(&mut self) {
        debug!("restarting from phase {}", self.phase);
        self.phase = Phase::NotStarted;
        self.display.set_phase_attribute(self.phase);
        self.display.clear_all_letters();
        self.handles.clear();
        self.initialize();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn letters(&self) -> &LetterSet {
        &self.letters
    }

    pub fn remaining(&self) -> &[char] {
        &self.letters.letters()[self.cursor..]
    }

    pub fn remaining_len(&self) -> usize {
        self.letters.len() - self.cursor
    }

    pub fn handle_for(&self, idx: usize) -> Option<LetterHandle> {
        self.handles.get(idx).copied()
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.elapsed_secs
    }

    pub fn best_time(&self) -> Option<f64> {
        self.best_time
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{SprintError, SprintResult};
    use crate::highscore::MemoryHighscoreStore;
    use assert_matches::assert_matches;
    use std::rc::Rc;
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Render(Vec<char>),
        Consumed(LetterHandle),
        Status(String),
        Best(String),
        Flash(LetterHandle),
        Phase(Phase),
        Clear,
    }

    /// Records every call so tests can assert on the exact command stream
    #[derive(Default, Clone)]
    struct RecordingDisplay {
        calls: Rc<RefCell<Vec<Call>>>,
        animates: bool,
        rendered: usize,
    }

    impl RecordingDisplay {
        fn new() -> Self {
            Self {
                animates: true,
                ..Default::default()
            }
        }

        fn static_only() -> Self {
            Self::default()
        }

        fn last_status(&self) -> Option<String> {
            self.calls.borrow().iter().rev().find_map(|c| match c {
                Call::Status(s) => Some(s.clone()),
                _ => None,
            })
        }

        fn last_best(&self) -> Option<String> {
            self.calls.borrow().iter().rev().find_map(|c| match c {
                Call::Best(s) => Some(s.clone()),
                _ => None,
            })
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.borrow().iter().filter(|c| pred(c)).count()
        }
    }

    impl Display for RecordingDisplay {
        fn render_letter_set(&mut self, letters: &[char]) -> Vec<LetterHandle> {
            self.calls.borrow_mut().push(Call::Render(letters.to_vec()));
            let handles = (self.rendered..self.rendered + letters.len())
                .map(LetterHandle)
                .collect();
            self.rendered += letters.len();
            handles
        }
        fn mark_letter_consumed(&mut self, handle: LetterHandle) {
            self.calls.borrow_mut().push(Call::Consumed(handle));
        }
        fn set_status_text(&mut self, text: &str) {
            self.calls.borrow_mut().push(Call::Status(text.to_string()));
        }
        fn set_best_time_text(&mut self, text: &str) {
            self.calls.borrow_mut().push(Call::Best(text.to_string()));
        }
        fn can_animate(&self, _handle: LetterHandle) -> bool {
            self.animates
        }
        fn flash_error(&mut self, handle: LetterHandle) {
            self.calls.borrow_mut().push(Call::Flash(handle));
        }
        fn set_phase_attribute(&mut self, phase: Phase) {
            self.calls.borrow_mut().push(Call::Phase(phase));
        }
        fn clear_all_letters(&mut self) {
            self.calls.borrow_mut().push(Call::Clear);
        }
    }

    fn english_game(
        store: Option<Box<dyn HighscoreStore>>,
    ) -> (SpeedTest<RecordingDisplay, Rc<ManualClock>>, RecordingDisplay, Rc<ManualClock>) {
        let display = RecordingDisplay::new();
        let clock = Rc::new(ManualClock::new());
        let game = SpeedTest::new(display.clone(), clock.clone(), store, vec!["en".into()]);
        (game, display, clock)
    }

    /// Reads like a normal store but refuses every write
    struct ReadOnlyStore(Option<String>);

    impl HighscoreStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Option<String> {
            self.0.clone()
        }
        fn set(&mut self, _key: &str, _value: &str) -> SprintResult<()> {
            Err(SprintError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only database",
            )))
        }
        fn remove(&mut self, _key: &str) -> SprintResult<()> {
            Ok(())
        }
    }

    fn type_all(game: &mut SpeedTest<RecordingDisplay, Rc<ManualClock>>) -> KeyOutcome {
        let letters: Vec<char> = game.remaining().to_vec();
        let mut last = KeyOutcome::Rejected;
        for c in letters {
            last = game.handle_key(&c.to_string());
        }
        last
    }

    #[test]
    fn test_phase_attribute_names() {
        assert_eq!(Phase::NotStarted.to_string(), "pre-game");
        assert_eq!(Phase::Running.to_string(), "running");
        assert_eq!(Phase::Finished.to_string(), "post-game");
    }

    #[test]
    fn test_format_time_two_decimals() {
        assert_eq!(format_time(3.0), "3.00");
        assert_eq!(format_time(12.3456), "12.35");
        assert_eq!(format_time(0.004), "0.00");
    }

    #[test]
    fn test_key_matches_case_insensitive() {
        assert!(key_matches('a', "a"));
        assert!(key_matches('a', "A"));
        assert!(key_matches('æ', "Æ"));
        assert!(!key_matches('a', "b"));
        assert!(!key_matches('a', "Shift"));
        assert!(!key_matches('a', ""));
    }

    #[test]
    fn test_initialize_renders_letters_and_prompt() {
        let (game, display, _clock) = english_game(None);

        assert_eq!(game.phase(), Phase::NotStarted);
        assert_eq!(game.remaining_len(), 26);
        assert_eq!(display.last_status().as_deref(), Some(PROMPT_TEXT));
        assert_eq!(
            display.count(|c| matches!(c, Call::Render(l) if l.len() == 26)),
            1
        );
        assert_eq!(display.last_best(), None);
    }

    #[test]
    fn test_norwegian_preferences_give_29_letters() {
        let display = RecordingDisplay::new();
        let game = SpeedTest::new(
            display,
            ManualClock::new(),
            None,
            vec!["sv".into(), "nb".into()],
        );
        assert_eq!(game.remaining_len(), 29);
        assert_eq!(game.remaining().last(), Some(&'å'));
    }

    #[test]
    fn test_first_correct_key_starts_run() {
        let (mut game, display, _clock) = english_game(None);

        assert_eq!(game.handle_key("A"), KeyOutcome::Accepted);
        assert_eq!(game.phase(), Phase::Running);
        assert_eq!(game.remaining_len(), 25);
        assert_eq!(display.last_status().as_deref(), Some(RUNNING_TEXT));
        assert_eq!(display.count(|c| *c == Call::Phase(Phase::Running)), 1);
        assert_eq!(display.count(|c| *c == Call::Consumed(LetterHandle(0))), 1);
    }

    #[test]
    fn test_wrong_key_before_start_does_not_start() {
        let (mut game, display, _clock) = english_game(None);

        assert_eq!(game.handle_key("b"), KeyOutcome::Rejected);
        assert_eq!(game.phase(), Phase::NotStarted);
        assert_eq!(game.remaining_len(), 26);
        assert_eq!(display.count(|c| *c == Call::Flash(LetterHandle(0))), 1);
    }

    #[test]
    fn test_wrong_key_flashes_next_letter_only() {
        let (mut game, display, _clock) = english_game(None);
        game.handle_key("a");
        game.handle_key("b");

        assert_eq!(game.handle_key("x"), KeyOutcome::Rejected);
        assert_eq!(game.remaining_len(), 24);
        assert_eq!(game.phase(), Phase::Running);
        assert_eq!(display.count(|c| *c == Call::Flash(LetterHandle(2))), 1);
    }

    #[test]
    fn test_wrong_key_without_animation_is_noop() {
        let clock = ManualClock::new();
        let display = RecordingDisplay::static_only();
        let mut game = SpeedTest::new(display.clone(), clock, None, vec![]);

        game.handle_key("q");
        assert_eq!(display.count(|c| matches!(c, Call::Flash(_))), 0);
        assert_eq!(game.remaining_len(), 26);
    }

    #[test]
    fn test_progress_messages_are_proportional() {
        let (mut game, display, _clock) = english_game(None);
        let letters: Vec<char> = game.remaining().to_vec();

        // 26 letters: halfway once fewer than 13 remain, almost done below 5.2
        for (i, c) in letters.iter().take(13).enumerate() {
            game.handle_key(&c.to_string());
            if i < 12 {
                assert_eq!(display.last_status().as_deref(), Some(RUNNING_TEXT));
            }
        }
        assert_eq!(game.remaining_len(), 13);
        assert_eq!(display.last_status().as_deref(), Some(RUNNING_TEXT));

        game.handle_key(&letters[13].to_string());
        assert_eq!(display.last_status().as_deref(), Some(HALFWAY_TEXT));

        for c in &letters[14..21] {
            game.handle_key(&c.to_string());
        }
        assert_eq!(game.remaining_len(), 5);
        assert_eq!(display.last_status().as_deref(), Some(ALMOST_DONE_TEXT));
    }

    #[test]
    fn test_progress_messages_scale_to_29_letters() {
        let display = RecordingDisplay::new();
        let mut game = SpeedTest::new(display.clone(), ManualClock::new(), None, vec!["nb".into()]);
        let letters: Vec<char> = game.remaining().to_vec();
        assert_eq!(letters.len(), 29);

        // 29 letters: halfway below 14.5 remaining, almost done below 5.8
        for c in &letters[..14] {
            game.handle_key(&c.to_string());
        }
        assert_eq!(game.remaining_len(), 15);
        assert_eq!(display.last_status().as_deref(), Some(RUNNING_TEXT));

        game.handle_key(&letters[14].to_string());
        assert_eq!(game.remaining_len(), 14);
        assert_eq!(display.last_status().as_deref(), Some(HALFWAY_TEXT));

        for c in &letters[15..23] {
            game.handle_key(&c.to_string());
        }
        assert_eq!(game.remaining_len(), 6);
        assert_eq!(display.last_status().as_deref(), Some(HALFWAY_TEXT));

        game.handle_key(&letters[23].to_string());
        assert_eq!(game.remaining_len(), 5);
        assert_eq!(display.last_status().as_deref(), Some(ALMOST_DONE_TEXT));
    }

    #[test]
    fn test_full_run_finishes_with_two_decimals() {
        let (mut game, display, clock) = english_game(None);

        for c in "abcdefghijklmnopqrstuvwxy".chars() {
            game.handle_key(&c.to_string());
            clock.advance(Duration::from_millis(100));
        }
        assert_eq!(game.phase(), Phase::Running);

        assert_matches!(game.handle_key("z"), KeyOutcome::Finished(t) if (t - 2.5).abs() < 1e-9);
        assert_eq!(game.phase(), Phase::Finished);
        assert_eq!(game.remaining_len(), 0);
        assert_eq!(
            display.last_status().as_deref(),
            Some("You made it! ✨ It took 2.50 seconds! That's a new record!")
        );
        assert_eq!(
            display.last_best().as_deref(),
            Some("Personal best: 2.50 seconds")
        );
    }

    #[test]
    fn test_keys_after_finish_are_ignored() {
        let (mut game, display, _clock) = english_game(None);
        type_all(&mut game);
        let flashes = display.count(|c| matches!(c, Call::Flash(_)));

        assert_eq!(game.handle_key("a"), KeyOutcome::Rejected);
        assert_eq!(game.phase(), Phase::Finished);
        assert_eq!(display.count(|c| matches!(c, Call::Flash(_))), flashes);
    }

    #[test]
    fn test_space_restarts_from_every_phase() {
        let (mut game, display, _clock) = english_game(None);

        assert_eq!(game.handle_key(" "), KeyOutcome::Restarted);
        assert_eq!(game.phase(), Phase::NotStarted);
        assert_eq!(game.remaining_len(), 26);

        game.handle_key("a");
        game.handle_key("b");
        game.handle_key(" ");
        assert_eq!(game.phase(), Phase::NotStarted);
        assert_eq!(game.remaining_len(), 26);

        type_all(&mut game);
        assert_eq!(game.phase(), Phase::Finished);
        game.handle_key(" ");
        assert_eq!(game.phase(), Phase::NotStarted);
        assert_eq!(game.remaining_len(), 26);
        assert_eq!(game.elapsed_secs(), None);

        assert_eq!(display.count(|c| *c == Call::Clear), 3);
        assert_eq!(display.last_status().as_deref(), Some(PROMPT_TEXT));
    }

    #[test]
    fn test_restart_renders_fresh_handles() {
        let (mut game, _display, _clock) = english_game(None);
        game.restart();
        assert_eq!(game.handle_for(0), Some(LetterHandle(26)));
        assert_eq!(game.handle_for(25), Some(LetterHandle(51)));
    }

    #[test]
    fn test_best_time_rules() {
        let store = MemoryHighscoreStore::new();
        let (mut game, display, clock) = english_game(Some(Box::new(store.clone())));

        let run = |game: &mut SpeedTest<RecordingDisplay, Rc<ManualClock>>, ms: u64| {
            game.handle_key(" ");
            game.handle_key("a");
            clock.advance(Duration::from_millis(ms));
            let rest: Vec<char> = game.remaining().to_vec();
            let mut outcome = KeyOutcome::Rejected;
            for c in rest {
                outcome = game.handle_key(&c.to_string());
            }
            outcome
        };

        assert_eq!(run(&mut game, 5000), KeyOutcome::Finished(5.0));
        assert_eq!(game.best_time(), Some(5.0));
        assert_eq!(store.peek(HIGHSCORE_KEY).as_deref(), Some("5"));

        assert_eq!(run(&mut game, 6000), KeyOutcome::Finished(6.0));
        assert_eq!(game.best_time(), Some(5.0));
        assert_eq!(store.peek(HIGHSCORE_KEY).as_deref(), Some("5"));
        assert!(!display.last_status().unwrap().contains("new record"));

        assert_eq!(run(&mut game, 4000), KeyOutcome::Finished(4.0));
        assert_eq!(game.best_time(), Some(4.0));
        assert_eq!(store.peek(HIGHSCORE_KEY).as_deref(), Some("4"));
        assert_eq!(
            display.last_best().as_deref(),
            Some("Personal best: 4.00 seconds")
        );
    }

    #[test]
    fn test_equal_time_is_not_a_record() {
        let store = MemoryHighscoreStore::with_value(HIGHSCORE_KEY, "0");
        let (mut game, display, _clock) = english_game(Some(Box::new(store)));

        assert_eq!(type_all(&mut game), KeyOutcome::Finished(0.0));
        assert!(!display.last_status().unwrap().contains("new record"));
    }

    #[test]
    fn test_stored_best_is_loaded_and_shown() {
        let store = MemoryHighscoreStore::with_value(HIGHSCORE_KEY, "8.125");
        let (game, display, _clock) = english_game(Some(Box::new(store)));

        assert_eq!(game.best_time(), Some(8.125));
        assert_eq!(
            display.last_best().as_deref(),
            Some("Personal best: 8.13 seconds")
        );
    }

    #[test]
    fn test_malformed_stored_best_is_absent() {
        let store = MemoryHighscoreStore::with_value(HIGHSCORE_KEY, "not-a-number");
        let (mut game, display, _clock) = english_game(Some(Box::new(store.clone())));

        assert_eq!(game.best_time(), None);
        assert_eq!(display.last_best(), None);

        type_all(&mut game);
        assert!(display.last_status().unwrap().ends_with(NEW_RECORD_TEXT));
        assert_eq!(store.peek(HIGHSCORE_KEY).as_deref(), Some("0"));
    }

    #[test]
    fn test_without_store_best_survives_restart() {
        let (mut game, _display, clock) = english_game(None);

        game.handle_key("a");
        clock.advance(Duration::from_secs(3));
        type_all(&mut game);
        assert_eq!(game.best_time(), Some(3.0));

        game.restart();
        assert_eq!(game.best_time(), Some(3.0));
    }

    #[test]
    fn test_failed_save_keeps_session_best_across_restart() {
        let display = RecordingDisplay::new();
        let clock = Rc::new(ManualClock::new());
        let mut game = SpeedTest::new(
            display.clone(),
            clock.clone(),
            Some(Box::new(ReadOnlyStore(None))),
            vec!["en".into()],
        );

        game.handle_key("a");
        clock.advance(Duration::from_secs(3));
        type_all(&mut game);
        assert_eq!(game.best_time(), Some(3.0));

        game.restart();
        assert_eq!(game.best_time(), Some(3.0));
        assert_eq!(
            display.last_best().as_deref(),
            Some("Personal best: 3.00 seconds")
        );

        game.handle_key("a");
        clock.advance(Duration::from_secs(9));
        assert_eq!(type_all(&mut game), KeyOutcome::Finished(9.0));
        assert_eq!(game.best_time(), Some(3.0));
        assert!(!display.last_status().unwrap().contains("new record"));
    }

    #[test]
    fn test_stale_stored_best_does_not_override_faster_session() {
        let display = RecordingDisplay::new();
        let clock = Rc::new(ManualClock::new());
        let mut game = SpeedTest::new(
            display,
            clock.clone(),
            Some(Box::new(ReadOnlyStore(Some("7.5".into())))),
            vec!["en".into()],
        );
        assert_eq!(game.best_time(), Some(7.5));

        game.handle_key("a");
        clock.advance(Duration::from_secs(4));
        type_all(&mut game);
        game.restart();
        assert_eq!(game.best_time(), Some(4.0));
    }
}
