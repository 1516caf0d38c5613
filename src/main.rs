use anyhow::Result;
use clap::Parser;
use pattern_prompt::{
    config::WidgetConfig, doctor::base_doctor_report, init_debug_log_file, log_debug,
    log_file_path, ui, Composer,
};
use std::env;

#[cfg(not(test))]
fn main() -> Result<()> {
    run_with_args(env::args_os())
}

#[cfg_attr(test, allow(dead_code))]
fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut config = WidgetConfig::parse_from(args);
    if config.doctor {
        let report = base_doctor_report(&config, "pattern-prompt");
        println!("{}", report.render());
        return Ok(());
    }

    config.validate()?;
    init_debug_log_file();
    log_debug("=== pattern-prompt started ===");
    log_debug(&format!("log file: {:?}", log_file_path()));

    let mut composer = Composer::new(&config)?;
    let result = ui::run_app(&mut composer);

    log_debug("=== pattern-prompt exiting ===");
    if let Err(ref err) = result {
        log_debug(&format!("exit with error: {err:#}"));
    }

    result
}
