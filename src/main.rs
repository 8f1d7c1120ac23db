//! Hive 命令行
//!
//! 入口：初始化日志、加载配置、组装回合引擎，逐行读取标准输入并把每个回合的 SSE 帧打印到标准输出。
//! 线程挂起等待审批时，下一行输入即为审批决策表 JSON。

use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use hive::agent::create_engine;
use hive::config::load_config;
use hive::stream::stream_turn;
use hive::workflow::TurnInput;

const CLI_THREAD_ID: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let engine = Arc::new(create_engine(&cfg).context("Failed to create engine")?);
    let options = cfg.stream.options();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" {
            break;
        }

        let cancel = CancellationToken::new();
        let mut frames = stream_turn(
            Arc::clone(&engine),
            TurnInput::new(CLI_THREAD_ID, message),
            options,
            cancel.clone(),
        );
        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(frame) => print!("{}", frame.to_sse()),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Cancelling turn");
                    cancel.cancel();
                }
            }
        }
    }

    Ok(())
}
