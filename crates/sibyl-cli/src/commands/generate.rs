//! Generate command - test-drive a model host binary.
//!
//! Each prompt is wrapped in the instruction turn markers. Output is kept to
//! one line per generation by replacing newlines with ` / `.

use std::path::PathBuf;

use sibyl_core::{Context, LogEntry};
use sibyl_flow::prompt;
use sibyl_model_host::{ModelConfig, ModelHost};

pub async fn run(bin: PathBuf, model: PathBuf, n: usize, prompts: &[String]) -> miette::Result<()> {
    let host = ModelHost::new(ModelConfig::new(bin, model)).map_err(|e| miette::miette!("{}", e))?;

    let ctx = Context::background();
    let mut entry = LogEntry::default();
    let mut result = Ok(());
    'prompts: for user_prompt in prompts {
        let wrapped = prompt::user_turn(user_prompt);
        for _ in 0..n {
            match host.generate(&ctx, &wrapped, &mut entry).await {
                Ok(generated) => println!("{}", one_line(&generated)),
                Err(e) => {
                    result = Err(miette::miette!("{}", e));
                    break 'prompts;
                }
            }
        }
    }

    host.shutdown().await;
    result
}

fn one_line(text: &str) -> String {
    text.replace('\n', " / ")
}
