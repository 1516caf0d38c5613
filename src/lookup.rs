//! Worker-thread lookups against the remote pattern/type/entity/answer
//! services. Each request becomes a job: a spawned thread performing one
//! blocking GET, a channel carrying exactly one outcome message, and a
//! per-channel sequence number so the composer can drop responses that were
//! superseded before they arrived. Workers never touch the terminal; the UI
//! thread polls jobs between events.

use crate::config::WidgetConfig;
use crate::log_debug;
use crate::types::EntityType;
use crate::ui::Theme;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// User-Agent sent with every lookup request.
pub const USER_AGENT: &str = concat!("pattern-prompt/", env!("CARGO_PKG_VERSION"));

/// Identifies which endpoint a job belongs to. Sequence numbers are tracked
/// per channel: a new pattern search supersedes earlier pattern searches but
/// says nothing about, say, an in-flight entity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupChannel {
    Types,
    Patterns,
    Entities,
    Answers,
    Theme,
}

impl LookupChannel {
    pub fn label(self) -> &'static str {
        match self {
            LookupChannel::Types => "types",
            LookupChannel::Patterns => "patterns",
            LookupChannel::Entities => "entities",
            LookupChannel::Answers => "answers",
            LookupChannel::Theme => "theme",
        }
    }
}

/// Failure reported by a worker. Both kinds are recovered the same way by
/// the composer (clear the cached field, hide the status row); the split
/// exists so the debug log can tell a dead endpoint from a bad payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    Transport(String),
    Malformed(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Transport(detail) => write!(f, "transport failure: {detail}"),
            LookupError::Malformed(detail) => write!(f, "malformed response: {detail}"),
        }
    }
}

pub type LookupOutcome<T> = Result<T, LookupError>;

/// Handle the composer polls for one in-flight request. The worker sends
/// exactly one message and exits; dropping the job drops the channel, so a
/// superseded worker's result has nowhere to land.
pub struct LookupJob<T> {
    pub channel: LookupChannel,
    pub seq: u64,
    pub receiver: Receiver<LookupOutcome<T>>,
    pub handle: Option<JoinHandle<()>>,
}

/// One entity suggestion from the entity endpoint. Consumed but not rendered
/// in this core; the decode path is the extension point.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EntityHit {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Answer payload for a composed question. Shape is owned by the answer
/// service; the widget only carries it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AnswerBody {
    #[serde(default)]
    pub answer: serde_json::Value,
}

/// Blocking HTTP client plus per-channel sequence counters. Built once per
/// widget instance; cloned handles of the inner client are moved into worker
/// threads.
pub struct RemoteLookup {
    client: reqwest::blocking::Client,
    pattern_url: String,
    type_url: String,
    entity_url: String,
    answer_url: String,
    style_url: String,
    type_seq: AtomicU64,
    pattern_seq: AtomicU64,
    entity_seq: AtomicU64,
    answer_seq: AtomicU64,
    theme_seq: AtomicU64,
}

impl RemoteLookup {
    pub fn new(config: &WidgetConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build lookup HTTP client")?;
        Ok(Self {
            client,
            pattern_url: config.pattern_url.clone(),
            type_url: config.type_url.clone(),
            entity_url: config.entity_url.clone(),
            answer_url: config.answer_url.clone(),
            style_url: config.style_url.clone(),
            type_seq: AtomicU64::new(0),
            pattern_seq: AtomicU64::new(0),
            entity_seq: AtomicU64::new(0),
            answer_seq: AtomicU64::new(0),
            theme_seq: AtomicU64::new(0),
        })
    }

    /// Load the registered entity types; issued once at mount.
    pub fn fetch_types(&self) -> LookupJob<HashMap<String, EntityType>> {
        let seq = self.type_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client.clone();
        let url = self.type_url.clone();
        self.spawn(LookupChannel::Types, seq, move || {
            let body = http_get(&client, &url, &[])?;
            parse_types_body(&body)
        })
    }

    /// Search patterns matching the user's free text. At most one of these is
    /// current; the caller tracks the returned sequence number.
    pub fn fetch_patterns(&self, text: &str) -> LookupJob<Vec<String>> {
        let seq = self.pattern_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client.clone();
        let url = self.pattern_url.clone();
        let text = text.to_string();
        self.spawn(LookupChannel::Patterns, seq, move || {
            #[cfg(test)]
            {
                if let Some(outcome) = pattern_hook_outcome(&text) {
                    return outcome;
                }
            }
            let body = http_get(&client, &url, &[("text", &text)])?;
            parse_patterns_body(&body)
        })
    }

    /// Search entities of one type matching a partial value.
    pub fn fetch_entities(&self, type_code: &str, text: &str) -> LookupJob<Vec<EntityHit>> {
        let seq = self.entity_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client.clone();
        let url = self.entity_url.clone();
        let type_code = type_code.to_string();
        let text = text.to_string();
        self.spawn(LookupChannel::Entities, seq, move || {
            let body = http_get(&client, &url, &[("type", &type_code), ("text", &text)])?;
            parse_entities_body(&body)
        })
    }

    /// Submit a composed question to the answer service.
    pub fn fetch_answer(&self, question: &str) -> LookupJob<AnswerBody> {
        let seq = self.answer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client.clone();
        let url = self.answer_url.clone();
        let question = question.to_string();
        self.spawn(LookupChannel::Answers, seq, move || {
            let body = http_get(&client, &url, &[("question", &question)])?;
            parse_answer_body(&body)
        })
    }

    /// Load the cosmetic theme overrides from the style endpoint.
    pub fn fetch_theme(&self) -> LookupJob<Theme> {
        let seq = self.theme_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.client.clone();
        let url = self.style_url.clone();
        self.spawn(LookupChannel::Theme, seq, move || {
            let body = http_get(&client, &url, &[])?;
            parse_theme_body(&body)
        })
    }

    fn spawn<T, F>(&self, channel: LookupChannel, seq: u64, work: F) -> LookupJob<T>
    where
        T: Send + 'static,
        F: FnOnce() -> LookupOutcome<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let outcome = work();
            if let Err(err) = &outcome {
                log_debug(&format!("lookup {} failed: {err}", channel.label()));
            }
            // The receiver may already be gone if a newer request superseded
            // this one; that is the cancellation path, not an error.
            let _ = tx.send(outcome);
        });
        LookupJob {
            channel,
            seq,
            receiver: rx,
            handle: Some(handle),
        }
    }
}

fn http_get(
    client: &reqwest::blocking::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<String, LookupError> {
    let mut request = client.get(url);
    if !query.is_empty() {
        request = request.query(query);
    }
    let response = request
        .send()
        .map_err(|err| LookupError::Transport(err.to_string()))?
        .error_for_status()
        .map_err(|err| LookupError::Transport(err.to_string()))?;
    response
        .text()
        .map_err(|err| LookupError::Transport(err.to_string()))
}

#[derive(Deserialize)]
struct PatternsBody {
    patterns: Vec<String>,
}

pub(crate) fn parse_patterns_body(body: &str) -> LookupOutcome<Vec<String>> {
    serde_json::from_str::<PatternsBody>(body)
        .map(|decoded| decoded.patterns)
        .map_err(|err| LookupError::Malformed(err.to_string()))
}

#[derive(Deserialize)]
struct TypesBody {
    types: HashMap<String, EntityType>,
}

pub(crate) fn parse_types_body(body: &str) -> LookupOutcome<HashMap<String, EntityType>> {
    serde_json::from_str::<TypesBody>(body)
        .map(|decoded| decoded.types)
        .map_err(|err| LookupError::Malformed(err.to_string()))
}

#[derive(Deserialize)]
struct EntitiesBody {
    entities: Vec<EntityHit>,
}

pub(crate) fn parse_entities_body(body: &str) -> LookupOutcome<Vec<EntityHit>> {
    serde_json::from_str::<EntitiesBody>(body)
        .map(|decoded| decoded.entities)
        .map_err(|err| LookupError::Malformed(err.to_string()))
}

pub(crate) fn parse_answer_body(body: &str) -> LookupOutcome<AnswerBody> {
    serde_json::from_str::<AnswerBody>(body).map_err(|err| LookupError::Malformed(err.to_string()))
}

pub(crate) fn parse_theme_body(body: &str) -> LookupOutcome<Theme> {
    serde_json::from_str::<Theme>(body).map_err(|err| LookupError::Malformed(err.to_string()))
}

#[cfg(test)]
pub(crate) type PatternFetchHook = Box<dyn Fn(&str) -> LookupOutcome<Vec<String>> + Send + 'static>;

#[cfg(test)]
static PATTERN_FETCH_HOOK: OnceLock<Mutex<Option<PatternFetchHook>>> = OnceLock::new();

#[cfg(test)]
pub(crate) fn set_pattern_fetch_hook(hook: Option<PatternFetchHook>) {
    let storage = PATTERN_FETCH_HOOK.get_or_init(|| Mutex::new(None));
    *storage.lock().unwrap_or_else(|e| e.into_inner()) = hook;
}

#[cfg(test)]
fn pattern_hook_outcome(text: &str) -> Option<LookupOutcome<Vec<String>>> {
    let storage = PATTERN_FETCH_HOOK.get()?;
    let guard = storage.lock().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map(|hook| hook(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use clap::Parser;
    use std::time::Duration;

    fn test_lookup() -> RemoteLookup {
        let config = WidgetConfig::parse_from(["test-widget"]);
        RemoteLookup::new(&config).expect("client builds")
    }

    fn wait_for<T>(job: &mut LookupJob<T>) -> LookupOutcome<T> {
        let outcome = job
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("worker sends one outcome");
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        outcome
    }

    #[test]
    fn patterns_body_decodes() {
        let outcome = parse_patterns_body(r#"{"patterns": ["when is {date}", "who is {person}"]}"#);
        assert_eq!(
            outcome,
            Ok(vec!["when is {date}".to_string(), "who is {person}".to_string()])
        );
    }

    #[test]
    fn missing_field_is_malformed() {
        let outcome = parse_patterns_body(r#"{"results": []}"#);
        assert!(matches!(outcome, Err(LookupError::Malformed(_))));

        let outcome = parse_types_body("not json");
        assert!(matches!(outcome, Err(LookupError::Malformed(_))));
    }

    #[test]
    fn types_body_decodes_with_defaults() {
        let outcome = parse_types_body(
            r#"{"types": {"date": {"display_name": "Date", "description": "a calendar day"}}}"#,
        );
        let map = outcome.expect("decodes");
        let date = map.get("date").expect("date entry");
        assert_eq!(date.display_name, "Date");
        assert_eq!(date.validation, crate::types::PERMISSIVE_VALIDATION);
    }

    #[test]
    fn entities_body_decodes() {
        let outcome = parse_entities_body(r#"{"entities": [{"value": "2014-06-01"}]}"#);
        let hits = outcome.expect("decodes");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, "2014-06-01");
    }

    #[test]
    fn answer_body_tolerates_any_payload() {
        let outcome = parse_answer_body(r#"{"answer": {"text": "42"}}"#);
        assert!(outcome.is_ok());
        let outcome = parse_answer_body(r#"{}"#);
        assert!(outcome.is_ok());
    }

    #[test]
    fn unconfigured_endpoint_resolves_to_transport_failure() {
        // An empty URL is a caller misconfiguration; the job must still
        // resolve instead of leaving the pending slot set forever.
        let lookup = test_lookup();
        let mut job = lookup.fetch_entities("date", "20");
        let outcome = wait_for(&mut job);
        assert!(matches!(outcome, Err(LookupError::Transport(_))));
    }

    #[test]
    fn pattern_sequence_numbers_increase_monotonically() {
        let lookup = test_lookup();
        let mut first = lookup.fetch_patterns("a");
        let mut second = lookup.fetch_patterns("ab");
        assert!(second.seq > first.seq);
        assert_eq!(first.channel, LookupChannel::Patterns);
        let _ = wait_for(&mut first);
        let _ = wait_for(&mut second);
    }

    #[test]
    fn channels_count_sequences_independently() {
        let lookup = test_lookup();
        let mut pattern_job = lookup.fetch_patterns("a");
        let mut entity_job = lookup.fetch_entities("date", "a");
        assert_eq!(pattern_job.seq, 1);
        assert_eq!(entity_job.seq, 1);
        let _ = wait_for(&mut pattern_job);
        let _ = wait_for(&mut entity_job);
    }
}
