//! `--doctor` report: version, terminal, and endpoint configuration, printed
//! without entering the TUI so it is scriptable and safe over SSH.

use crate::{config::WidgetConfig, log_file_path};
use crossterm::terminal::size as terminal_size;
use std::{env, fmt::Display};

pub struct DoctorReport {
    lines: Vec<String>,
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string()],
        }
    }

    pub fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("{title}:"));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("  {key}: {value}"));
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn base_doctor_report(config: &WidgetConfig, binary_name: &str) -> DoctorReport {
    let mut report = DoctorReport::new("Pattern Prompt Doctor");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("binary", binary_name);
    report.push_kv("os", format!("{}/{}", env::consts::OS, env::consts::ARCH));

    let mut validated = config.clone();
    let validation_result = validated.validate();
    let resolved = validation_result
        .as_ref()
        .map(|_| &validated)
        .unwrap_or(config);

    report.section("Terminal");
    match terminal_size() {
        Ok((cols, rows)) => report.push_kv("size", format!("{cols}x{rows}")),
        Err(err) => report.push_kv("size", format!("error: {err}")),
    }
    if let Ok(term) = env::var("TERM") {
        report.push_kv("term", term);
    }
    if env::var("NO_COLOR").is_ok() {
        report.push_kv("no_color", "set");
    }

    report.section("Config");
    match validation_result {
        Ok(()) => report.push_kv("validation", "ok"),
        Err(err) => report.push_kv("validation", format!("error: {err}")),
    }
    report.push_kv("request_timeout_ms", resolved.request_timeout_ms);
    report.push_kv("log_file", log_file_path().display());

    report.section("Endpoints");
    for (key, url) in resolved.endpoints() {
        if url.is_empty() {
            report.push_kv(key, "unset");
        } else {
            report.push_kv(key, url);
        }
    }

    report
}
