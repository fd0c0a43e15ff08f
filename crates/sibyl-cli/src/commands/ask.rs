//! Ask command - run one question through the flow without the HTTP layer.

use std::path::Path;

use sibyl_cli::IdGenerator;
use sibyl_core::{Context, LogEntry};
use sibyl_flow::Flow;

use super::logcat;

pub async fn run(config_path: &Path, question: &str, show_log: bool) -> miette::Result<()> {
    let (config, host, wiki) = super::open_backends(config_path)?;

    let mut entry = LogEntry::new(IdGenerator::default().next(), "ask");
    entry.question = question.to_string();

    let ctx = Context::background().with_timeout(config.limits.request_timeout());
    let result = Flow::new(&host, &wiki, &config.flow, question)
        .respond(&ctx, &mut entry)
        .await;
    host.shutdown().await;

    if let Err(e) = &result {
        entry.error = Some(e.to_string());
    }
    if show_log {
        print!("{}", logcat::format_long(&entry));
    }

    let answer = result.map_err(|e| miette::miette!("{}", e))?;
    println!("{}", answer);
    Ok(())
}
