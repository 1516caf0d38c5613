//! Interaction core for the question widget: a single mutable state root
//! driven by key events and lookup results. The key router mutates it, the
//! renderer projects it, and lookup jobs resolve into it between events; no
//! component reaches around it.

use std::{
    env, fs,
    io::Write,
    path::PathBuf,
    sync::mpsc::TryRecvError,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crate::config::WidgetConfig;
use crate::lookup::{AnswerBody, EntityHit, LookupJob, LookupOutcome, RemoteLookup};
use crate::pattern::{parse_pattern, Segment};
use crate::textwin::byte_index;
use crate::types::{EntityType, TypeRegistry};
use crate::ui::Theme;
use anyhow::Result;
use std::collections::HashMap;

/// Spinner frames shown while a lookup request is inflight.
pub const SPINNER_FRAMES: &[char] = &['-', '\\', '|', '/'];
/// Spinner cadence between frame advances.
const SPINNER_INTERVAL: Duration = Duration::from_millis(150);

/// Path to the temp log file we rotate between runs.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("pattern_prompt_tui.log")
}

/// Write debug messages to a temp file so diagnostics never corrupt the
/// raw-mode terminal.
pub fn log_debug(msg: &str) {
    use std::fs::OpenOptions;

    let log_path = log_file_path();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
        let _ = writeln!(file, "[{timestamp}] {msg}");
    }
}

/// Remove the log file if it grows past 5 MB between runs.
pub fn init_debug_log_file() {
    let log_path = log_file_path();
    if let Ok(metadata) = fs::metadata(&log_path) {
        const MAX_BYTES: u64 = 5 * 1024 * 1024;
        if metadata.len() > MAX_BYTES {
            let _ = fs::remove_file(&log_path);
        }
    }
}

/// Which sub-mode of the widget is active. `Searching` is `Free` with a
/// result list present; once a pattern is locked, results are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Free,
    Searching,
    Locked,
}

/// The widget's state machine. One instance per mount; discarded with the
/// terminal session, never persisted.
pub struct Composer {
    registry: TypeRegistry,
    lookup: RemoteLookup,
    theme: Theme,

    raw_text: String,
    pattern_results: Option<Vec<String>>,
    highlighted: Option<usize>,
    locked_pattern: Option<String>,
    segments: Vec<Segment>,
    active_entity: Option<usize>,
    entity_cursor: usize,
    entity_results: Option<Vec<EntityHit>>,
    last_answer: Option<AnswerBody>,

    pending_types: Option<LookupJob<HashMap<String, EntityType>>>,
    pending_patterns: Option<LookupJob<Vec<String>>>,
    pending_entities: Option<LookupJob<Vec<EntityHit>>>,
    pending_answer: Option<LookupJob<AnswerBody>>,
    pending_theme: Option<LookupJob<Theme>>,
    latest_type_seq: u64,
    latest_pattern_seq: u64,
    latest_entity_seq: u64,
    latest_answer_seq: u64,
    latest_theme_seq: u64,

    spinner_index: usize,
    spinner_last_tick: Option<Instant>,
    needs_redraw: bool,
}

impl Composer {
    pub fn new(config: &WidgetConfig) -> Result<Self> {
        Ok(Self {
            registry: TypeRegistry::new(),
            lookup: RemoteLookup::new(config)?,
            theme: Theme::default(),
            raw_text: String::new(),
            pattern_results: None,
            highlighted: None,
            locked_pattern: None,
            segments: Vec::new(),
            active_entity: None,
            entity_cursor: 0,
            entity_results: None,
            last_answer: None,
            pending_types: None,
            pending_patterns: None,
            pending_entities: None,
            pending_answer: None,
            pending_theme: None,
            latest_type_seq: 0,
            latest_pattern_seq: 0,
            latest_entity_seq: 0,
            latest_answer_seq: 0,
            latest_theme_seq: 0,
            spinner_index: 0,
            spinner_last_tick: None,
            needs_redraw: true,
        })
    }

    /// Issue the one-shot mount lookups: the type registry and the theme.
    /// Failures degrade silently (empty registry, default theme).
    pub fn mount(&mut self) {
        let types = self.lookup.fetch_types();
        self.latest_type_seq = types.seq;
        self.pending_types = Some(types);

        let theme = self.lookup.fetch_theme();
        self.latest_theme_seq = theme.seq;
        self.pending_theme = Some(theme);

        self.request_redraw();
    }

    /// Replace the type registry wholesale; useful for embedders that ship
    /// static types instead of a type endpoint.
    pub fn set_registry(&mut self, registry: TypeRegistry) {
        self.registry = registry;
        self.request_redraw();
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn mode(&self) -> Mode {
        if self.locked_pattern.is_some() {
            Mode::Locked
        } else if self.pattern_results.is_some() {
            Mode::Searching
        } else {
            Mode::Free
        }
    }

    /// True while the user has a result list but no locked pattern.
    pub fn is_pattern_list(&self) -> bool {
        !self.is_pattern_locked() && self.pattern_results.is_some()
    }

    pub fn is_pattern_locked(&self) -> bool {
        self.locked_pattern.is_some()
    }

    /// True when the (stubbed) entity autocomplete has results to show.
    pub fn is_entity_list(&self) -> bool {
        self.active_entity.is_some() && self.entity_results.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_types.is_some()
            || self.pending_patterns.is_some()
            || self.pending_entities.is_some()
            || self.pending_answer.is_some()
            || self.pending_theme.is_some()
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn pattern_results(&self) -> Option<&[String]> {
        self.pattern_results.as_deref()
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn locked_pattern(&self) -> Option<&str> {
        self.locked_pattern.as_deref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn active_entity(&self) -> Option<usize> {
        self.active_entity
    }

    pub fn entity_cursor(&self) -> usize {
        self.entity_cursor
    }

    pub fn entity_results(&self) -> Option<&[EntityHit]> {
        self.entity_results.as_deref()
    }

    pub fn last_answer(&self) -> Option<&AnswerBody> {
        self.last_answer.as_ref()
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    // ---- base input ------------------------------------------------------

    pub fn push_input_char(&mut self, ch: char) {
        if self.is_pattern_locked() {
            return;
        }
        self.raw_text.push(ch);
        self.request_redraw();
    }

    pub fn backspace_input(&mut self) {
        if self.is_pattern_locked() {
            return;
        }
        self.raw_text.pop();
        self.request_redraw();
    }

    /// Re-issue the pattern search against the current text. Empty text
    /// clears the list (back to Free) and logically cancels any outstanding
    /// search; non-empty text supersedes the previous search.
    pub fn refresh_patterns(&mut self) {
        if self.is_pattern_locked() {
            return;
        }
        if self.raw_text.is_empty() {
            self.pattern_results = None;
            self.highlighted = None;
            self.pending_patterns = None;
        } else {
            let job = self.lookup.fetch_patterns(&self.raw_text);
            self.latest_pattern_seq = job.seq;
            self.pending_patterns = Some(job);
        }
        self.request_redraw();
    }

    // ---- highlight -------------------------------------------------------

    pub fn highlight_next(&mut self) {
        let Some(results) = self.pattern_results.as_ref() else {
            return;
        };
        if results.is_empty() {
            return;
        }
        self.highlighted = Some(match self.highlighted {
            None => 0,
            Some(index) => (index + 1).min(results.len() - 1),
        });
        self.request_redraw();
    }

    pub fn highlight_prev(&mut self) {
        self.highlighted = match self.highlighted {
            None | Some(0) => None,
            Some(index) => Some(index - 1),
        };
        self.request_redraw();
    }

    pub fn unhighlight(&mut self) {
        self.highlighted = None;
        self.request_redraw();
    }

    /// Highlight a specific row (mouse hover); out-of-bounds indexes are
    /// ignored.
    pub fn highlight_index(&mut self, index: usize) {
        let Some(results) = self.pattern_results.as_ref() else {
            return;
        };
        if index < results.len() && self.highlighted != Some(index) {
            self.highlighted = Some(index);
            self.request_redraw();
        }
    }

    // ---- locking ---------------------------------------------------------

    /// Commit the highlighted pattern, or the only pattern when the list
    /// shows exactly one row. Returns whether a lock happened.
    pub fn lock_highlighted(&mut self) -> bool {
        let Some(results) = self.pattern_results.as_ref() else {
            return false;
        };
        let index = match self.highlighted {
            Some(index) => index,
            None if results.len() == 1 => 0,
            None => return false,
        };
        let Some(pattern) = results.get(index).cloned() else {
            return false;
        };
        self.lock_pattern(&pattern);
        true
    }

    /// Commit a specific row of the result list (mouse click).
    pub fn lock_index(&mut self, index: usize) -> bool {
        let Some(pattern) = self
            .pattern_results
            .as_ref()
            .and_then(|results| results.get(index))
            .cloned()
        else {
            return false;
        };
        self.lock_pattern(&pattern);
        true
    }

    /// Enter segment-editing mode for one pattern. Segments are rebuilt from
    /// scratch on every lock; the result list becomes irrelevant and any
    /// outstanding search is dropped.
    pub fn lock_pattern(&mut self, pattern: &str) {
        self.segments = parse_pattern(pattern, &self.registry);
        self.locked_pattern = Some(pattern.to_string());
        self.pattern_results = None;
        self.highlighted = None;
        self.pending_patterns = None;
        self.entity_results = None;
        self.active_entity = self.segments.iter().position(Segment::is_entity);
        self.entity_cursor = 0;
        self.request_redraw();
    }

    /// Discard the locked pattern and every segment value. A cancel, not an
    /// edit: the free text the user searched with is left as it was.
    pub fn cancel_pattern(&mut self) {
        self.locked_pattern = None;
        self.segments.clear();
        self.active_entity = None;
        self.entity_cursor = 0;
        self.entity_results = None;
        self.request_redraw();
    }

    // ---- segment editing -------------------------------------------------

    pub fn active_entity_value(&self) -> Option<&str> {
        match self.segments.get(self.active_entity?) {
            Some(Segment::Entity { value, .. }) => Some(value),
            _ => None,
        }
    }

    fn active_entity_value_mut(&mut self) -> Option<&mut String> {
        let index = self.active_entity?;
        match self.segments.get_mut(index) {
            Some(Segment::Entity { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn insert_entity_char(&mut self, ch: char) {
        let cursor = self.entity_cursor;
        let Some(value) = self.active_entity_value_mut() else {
            return;
        };
        let at = byte_index(value, cursor);
        value.insert(at, ch);
        self.entity_cursor = cursor + 1;
        self.request_redraw();
    }

    pub fn backspace_entity(&mut self) {
        let cursor = self.entity_cursor;
        if cursor == 0 {
            return;
        }
        let Some(value) = self.active_entity_value_mut() else {
            return;
        };
        let at = byte_index(value, cursor - 1);
        value.remove(at);
        self.entity_cursor = cursor - 1;
        self.request_redraw();
    }

    pub fn move_entity_cursor_left(&mut self) {
        if self.entity_cursor > 0 {
            self.entity_cursor -= 1;
            self.request_redraw();
        }
    }

    pub fn move_entity_cursor_right(&mut self) {
        let len = self
            .active_entity_value()
            .map(|value| value.chars().count())
            .unwrap_or(0);
        if self.entity_cursor < len {
            self.entity_cursor += 1;
            self.request_redraw();
        }
    }

    pub fn entity_cursor_at_start(&self) -> bool {
        self.entity_cursor == 0
    }

    /// Whether the focused input is the first entity segment. A locked
    /// pattern with no entity segments counts as first so Backspace can
    /// still cancel it.
    pub fn active_is_first_entity(&self) -> bool {
        match (self.active_entity, self.entity_indices().first()) {
            (Some(active), Some(&first)) => active == first,
            _ => true,
        }
    }

    fn entity_indices(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.is_entity())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn focus_next_entity(&mut self) {
        let indices = self.entity_indices();
        let Some(&first) = indices.first() else {
            return;
        };
        let next = match self.active_entity {
            Some(current) => indices
                .iter()
                .copied()
                .find(|&index| index > current)
                .unwrap_or(first),
            None => first,
        };
        self.activate_entity(next);
    }

    pub fn focus_prev_entity(&mut self) {
        let indices = self.entity_indices();
        let Some(&last) = indices.last() else {
            return;
        };
        let prev = match self.active_entity {
            Some(current) => indices
                .iter()
                .rev()
                .copied()
                .find(|&index| index < current)
                .unwrap_or(last),
            None => last,
        };
        self.activate_entity(prev);
    }

    /// Move entity focus to the given segment, caret after its value. Part
    /// of the entity-autocomplete extension point: focus is tracked, but no
    /// entity search is issued yet.
    pub fn activate_entity(&mut self, index: usize) {
        if !matches!(self.segments.get(index), Some(Segment::Entity { .. })) {
            return;
        }
        self.active_entity = Some(index);
        self.entity_cursor = self.segments[index].composed_text().chars().count();
        self.request_redraw();
    }

    /// Accept the current entity suggestion. Extension point; no observable
    /// behavior in this core.
    pub fn complete_entity(&mut self) {}

    /// Dismiss the entity suggestion list. Extension point.
    pub fn cancel_entity(&mut self) {
        self.entity_results = None;
        self.request_redraw();
    }

    /// The question as currently composed: text segments plus the values
    /// typed into entity segments.
    pub fn compose_question(&self) -> String {
        self.segments
            .iter()
            .map(Segment::composed_text)
            .collect::<Vec<_>>()
            .concat()
    }

    /// Submit the composed question to the answer service. Only meaningful
    /// while a pattern is locked.
    pub fn submit_question(&mut self) {
        if !self.is_pattern_locked() {
            return;
        }
        let question = self.compose_question();
        let job = self.lookup.fetch_answer(&question);
        self.latest_answer_seq = job.seq;
        self.pending_answer = Some(job);
        self.request_redraw();
    }

    // ---- lookup plumbing -------------------------------------------------

    /// Drain every pending lookup channel without blocking the UI thread.
    pub fn poll_jobs(&mut self) {
        self.poll_types_job();
        self.poll_patterns_job();
        self.poll_entities_job();
        self.poll_answer_job();
        self.poll_theme_job();
    }

    fn poll_types_job(&mut self) {
        let mut finished = false;
        let mut message: Option<(u64, LookupOutcome<HashMap<String, EntityType>>)> = None;
        if let Some(job) = self.pending_types.as_mut() {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    message = Some((job.seq, outcome));
                    finished = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = true,
            }
            if finished {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        if finished {
            self.pending_types = None;
            self.request_redraw();
        }
        if let Some((seq, outcome)) = message {
            self.apply_types_outcome(seq, outcome);
        }
    }

    fn poll_patterns_job(&mut self) {
        let mut finished = false;
        let mut message: Option<(u64, LookupOutcome<Vec<String>>)> = None;
        if let Some(job) = self.pending_patterns.as_mut() {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    message = Some((job.seq, outcome));
                    finished = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = true,
            }
            if finished {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        if finished {
            self.pending_patterns = None;
            self.request_redraw();
        }
        if let Some((seq, outcome)) = message {
            self.apply_pattern_outcome(seq, outcome);
        }
    }

    fn poll_entities_job(&mut self) {
        let mut finished = false;
        let mut message: Option<(u64, LookupOutcome<Vec<EntityHit>>)> = None;
        if let Some(job) = self.pending_entities.as_mut() {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    message = Some((job.seq, outcome));
                    finished = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = true,
            }
            if finished {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        if finished {
            self.pending_entities = None;
            self.request_redraw();
        }
        if let Some((seq, outcome)) = message {
            self.apply_entities_outcome(seq, outcome);
        }
    }

    fn poll_answer_job(&mut self) {
        let mut finished = false;
        let mut message: Option<(u64, LookupOutcome<AnswerBody>)> = None;
        if let Some(job) = self.pending_answer.as_mut() {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    message = Some((job.seq, outcome));
                    finished = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = true,
            }
            if finished {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        if finished {
            self.pending_answer = None;
            self.request_redraw();
        }
        if let Some((seq, outcome)) = message {
            self.apply_answer_outcome(seq, outcome);
        }
    }

    fn poll_theme_job(&mut self) {
        let mut finished = false;
        let mut message: Option<(u64, LookupOutcome<Theme>)> = None;
        if let Some(job) = self.pending_theme.as_mut() {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    message = Some((job.seq, outcome));
                    finished = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => finished = true,
            }
            if finished {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        if finished {
            self.pending_theme = None;
            self.request_redraw();
        }
        if let Some((seq, outcome)) = message {
            self.apply_theme_outcome(seq, outcome);
        }
    }

    /// Apply a pattern-search outcome. Stale responses (a newer search was
    /// issued since) are dropped, never applied; so are responses landing
    /// after a lock. Failures clear the cached list.
    pub fn apply_pattern_outcome(&mut self, seq: u64, outcome: LookupOutcome<Vec<String>>) {
        if seq != self.latest_pattern_seq {
            log_debug(&format!(
                "dropping stale pattern response (seq {seq}, latest {})",
                self.latest_pattern_seq
            ));
            return;
        }
        if self.is_pattern_locked() {
            return;
        }
        match outcome {
            Ok(patterns) => {
                self.pattern_results = Some(patterns);
            }
            Err(err) => {
                log_debug(&format!("pattern search failed: {err}"));
                self.pattern_results = None;
            }
        }
        // The list changed, so any previous highlight is out of bounds.
        self.highlighted = None;
        self.request_redraw();
    }

    fn apply_types_outcome(
        &mut self,
        seq: u64,
        outcome: LookupOutcome<HashMap<String, EntityType>>,
    ) {
        if seq != self.latest_type_seq {
            return;
        }
        match outcome {
            Ok(map) => {
                self.registry = TypeRegistry::from_map(map);
                self.request_redraw();
            }
            Err(err) => {
                // Unknown codes already fall back to permissive types, so an
                // empty registry keeps the widget fully usable.
                log_debug(&format!("type load failed: {err}"));
            }
        }
    }

    fn apply_entities_outcome(&mut self, seq: u64, outcome: LookupOutcome<Vec<EntityHit>>) {
        if seq != self.latest_entity_seq {
            return;
        }
        match outcome {
            Ok(hits) => {
                self.entity_results = Some(hits);
            }
            Err(err) => {
                log_debug(&format!("entity search failed: {err}"));
                self.entity_results = None;
            }
        }
        self.request_redraw();
    }

    fn apply_answer_outcome(&mut self, seq: u64, outcome: LookupOutcome<AnswerBody>) {
        if seq != self.latest_answer_seq {
            return;
        }
        match outcome {
            Ok(answer) => {
                self.last_answer = Some(answer);
            }
            Err(err) => {
                log_debug(&format!("answer request failed: {err}"));
                self.last_answer = None;
            }
        }
        self.request_redraw();
    }

    fn apply_theme_outcome(&mut self, seq: u64, outcome: LookupOutcome<Theme>) {
        if seq != self.latest_theme_seq {
            return;
        }
        match outcome {
            Ok(theme) => {
                self.theme = theme;
                self.request_redraw();
            }
            Err(err) => {
                log_debug(&format!("theme load failed, keeping defaults: {err}"));
            }
        }
    }

    // ---- spinner ---------------------------------------------------------

    pub fn update_spinner(&mut self) {
        if !self.is_loading() {
            self.spinner_last_tick = None;
            return;
        }
        let now = Instant::now();
        let last_tick = self.spinner_last_tick.get_or_insert_with(Instant::now);
        if now.duration_since(*last_tick) < SPINNER_INTERVAL {
            return;
        }
        self.spinner_last_tick = Some(now);
        self.spinner_index = (self.spinner_index + 1) % SPINNER_FRAMES.len();
        self.request_redraw();
    }

    pub fn spinner_frame(&self) -> char {
        SPINNER_FRAMES[self.spinner_index]
    }
}
