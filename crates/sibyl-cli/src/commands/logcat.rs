//! Logcat command - print request logs in human-readable form.

use std::fmt::Write as _;
use std::path::PathBuf;

use sibyl_core::{DelimReader, LogEntry};

pub async fn run(files: &[PathBuf], short: bool) -> miette::Result<()> {
    let format = if short { format_short } else { format_long };

    for path in files {
        let mut reader = DelimReader::open(path)
            .await
            .map_err(|e| miette::miette!("Failed to open {}: {}", path.display(), e))?;
        while let Some(entry) = reader
            .read::<LogEntry>()
            .await
            .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?
        {
            print!("{}", format(&entry));
        }
    }

    Ok(())
}

/// One line per request.
pub fn format_short(e: &LogEntry) -> String {
    let mut out = format!("{}: {}: {}", timestamp(e.time_usec), e.request, e.question);
    if !e.search_terms.is_empty() {
        let _ = write!(out, " | terms: {}", e.search_terms.join("; "));
    }
    if !e.search_results.is_empty() {
        let _ = write!(out, " | results: {}", e.search_results.join("; "));
    }
    if !e.used_results.is_empty() {
        let _ = write!(out, " | used: {}", e.used_results.join("; "));
    }
    if let Some(error) = &e.error {
        let _ = write!(out, " => ERR: {}", error);
    }
    out.push('\n');
    out
}

/// The request summary followed by every model exchange.
pub fn format_long(e: &LogEntry) -> String {
    let mut out = format!("{}: {}: {}\n", timestamp(e.time_usec), e.request, e.question);
    if !e.search_terms.is_empty() {
        let _ = writeln!(out, "- search terms: {}", e.search_terms.join("; "));
    }
    if !e.search_results.is_empty() {
        let _ = writeln!(out, "- result pages: {}", e.search_results.join("; "));
    }
    if !e.used_results.is_empty() {
        let _ = writeln!(out, "- used pages: {}", e.used_results.join("; "));
    }
    if let Some(error) = &e.error {
        let _ = writeln!(out, "- ERROR: {}", error);
    }
    for (i, g) in e.generations.iter().enumerate() {
        let _ = writeln!(out, "===== model prompt {}:\n{}", i + 1, g.prompt.trim());
        let _ = writeln!(out, "===== model response {}:\n{}", i + 1, g.response.trim());
        out.push_str("=====\n");
    }
    out.push('\n');
    out
}

fn timestamp(time_usec: i64) -> String {
    match chrono::DateTime::from_timestamp_micros(time_usec) {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("@{time_usec}"),
    }
}
