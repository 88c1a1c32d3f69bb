use anyhow::Result;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

const DEBUG_LOG_FILE: &str = "clipsqueeze.log";

/// Append a timestamped line to clipsqueeze.log in the working directory.
/// Callers ignore the result; a missing log is never worth failing an export over.
pub fn write_debug_log(message: &str) -> Result<()> {
    let log_path = std::env::current_dir()?.join(DEBUG_LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    writeln!(file, "[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)?;
    Ok(())
}
