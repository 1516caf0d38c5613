//! Widget configuration: the five recognized endpoint URLs plus ambient
//! knobs, parsed from the command line and validated up front. Absent URLs
//! default to the empty string; a request to an empty URL is a caller
//! misconfiguration that degrades to permanently empty results rather than a
//! handled error case.

use anyhow::{bail, Result};
use clap::Parser;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Endpoint and runtime options for the question widget.
#[derive(Debug, Parser, Clone)]
#[command(about = "Structured question prompt", author, version)]
pub struct WidgetConfig {
    /// URL returning patterns matching free text
    #[arg(long, default_value = "")]
    pub pattern_url: String,

    /// URL returning the registered entity types
    #[arg(long, default_value = "")]
    pub type_url: String,

    /// URL returning entities matching a typed prefix
    #[arg(long, default_value = "")]
    pub entity_url: String,

    /// URL taking a composed question and returning an answer
    #[arg(long, default_value = "")]
    pub answer_url: String,

    /// URL returning cosmetic theme overrides
    #[arg(long, default_value = "")]
    pub style_url: String,

    /// HTTP timeout applied to every lookup request (milliseconds)
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Print a configuration report and exit without entering the TUI
    #[arg(long)]
    pub doctor: bool,
}

impl WidgetConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check option values and normalize the URLs.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            bail!(
                "--request-timeout-ms must be between {MIN_REQUEST_TIMEOUT_MS} and {MAX_REQUEST_TIMEOUT_MS}, got {}",
                self.request_timeout_ms
            );
        }

        for (flag, url) in [
            ("--pattern-url", &mut self.pattern_url),
            ("--type-url", &mut self.type_url),
            ("--entity-url", &mut self.entity_url),
            ("--answer-url", &mut self.answer_url),
            ("--style-url", &mut self.style_url),
        ] {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && !trimmed.starts_with("http://")
                && !trimmed.starts_with("https://")
            {
                bail!("{flag} must be an http(s) URL, got '{trimmed}'");
            }
            *url = trimmed.to_string();
        }

        Ok(())
    }

    /// Named (key, value) pairs for the endpoint report.
    pub fn endpoints(&self) -> [(&'static str, &str); 5] {
        [
            ("pattern_url", self.pattern_url.as_str()),
            ("type_url", self.type_url.as_str()),
            ("entity_url", self.entity_url.as_str()),
            ("answer_url", self.answer_url.as_str()),
            ("style_url", self.style_url.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_are_empty_urls() {
        let mut cfg = WidgetConfig::parse_from(["test-widget"]);
        assert!(cfg.validate().is_ok());
        assert!(cfg.endpoints().iter().all(|(_, url)| url.is_empty()));
        assert_eq!(cfg.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn rejects_non_http_url() {
        let mut cfg = WidgetConfig::parse_from(["test-widget", "--pattern-url", "ftp://nope"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_and_trims_http_urls() {
        let mut cfg = WidgetConfig::parse_from([
            "test-widget",
            "--pattern-url",
            " http://localhost:9000/patterns ",
        ]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pattern_url, "http://localhost:9000/patterns");
    }

    #[test]
    fn rejects_timeout_out_of_bounds() {
        let mut cfg = WidgetConfig::parse_from(["test-widget", "--request-timeout-ms", "10"]);
        assert!(cfg.validate().is_err());

        let mut cfg = WidgetConfig::parse_from(["test-widget", "--request-timeout-ms", "900000"]);
        assert!(cfg.validate().is_err());
    }
}
