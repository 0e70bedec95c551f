//! 分诊引擎控制台
//!
//! 加载配置、注册资源清单、启动周期性调度，并从标准输入逐行执行运维命令。

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use triage_core::{CaseId, ResourceId, Specialty, TriageConfig};
use triage_engine::TriageEngine;

/// 控制台命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage-server")]
#[command(about = "Triage queue and resource allocation engine console")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// 控制台命令
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Admit { score: f64, specialty: String },
    Cancel(CaseId),
    Complete(CaseId),
    Release(ResourceId),
    Register(Specialty),
    Deregister(ResourceId),
    Case(CaseId),
    Waiting(Specialty),
    Estimate(CaseId),
    Pool(Specialty),
    Stats(Specialty),
    Overview,
    Metrics,
    Tick,
    Quit,
}

fn parse_id(arg: Option<&str>, prefix: char) -> Result<u64> {
    let raw = arg.ok_or_else(|| anyhow!("missing identifier"))?;
    let digits = raw.trim_start_matches(prefix);
    digits
        .parse::<u64>()
        .with_context(|| format!("invalid identifier '{}'", raw))
}

fn parse_specialty(arg: Option<&str>) -> Result<Specialty> {
    let raw = arg.ok_or_else(|| anyhow!("missing specialty"))?;
    Ok(raw.parse::<Specialty>()?)
}

/// 解析一行命令
fn parse_command(line: &str) -> Result<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;

    let command = match verb {
        "admit" => {
            let score = parts
                .next()
                .ok_or_else(|| anyhow!("missing severity score"))?
                .parse::<f64>()
                .context("invalid severity score")?;
            let specialty = parts.collect::<Vec<_>>().join(" ");
            if specialty.is_empty() {
                bail!("missing specialty");
            }
            Command::Admit { score, specialty }
        }
        "cancel" => Command::Cancel(CaseId(parse_id(parts.next(), 'C')?)),
        "complete" => Command::Complete(CaseId(parse_id(parts.next(), 'C')?)),
        "release" => Command::Release(ResourceId(parse_id(parts.next(), 'R')?)),
        "register" => Command::Register(parse_specialty(parts.next())?),
        "deregister" => Command::Deregister(ResourceId(parse_id(parts.next(), 'R')?)),
        "case" => Command::Case(CaseId(parse_id(parts.next(), 'C')?)),
        "waiting" => Command::Waiting(parse_specialty(parts.next())?),
        "estimate" => Command::Estimate(CaseId(parse_id(parts.next(), 'C')?)),
        "pool" => Command::Pool(parse_specialty(parts.next())?),
        "stats" => Command::Stats(parse_specialty(parts.next())?),
        "overview" => Command::Overview,
        "metrics" => Command::Metrics,
        "tick" => Command::Tick,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}'", other),
    };
    Ok(command)
}

/// 执行命令并返回输出
async fn execute(engine: &TriageEngine, command: Command) -> Result<String> {
    let output = match command {
        Command::Admit { score, specialty } => {
            let case_id = engine.submit_case(score, &specialty).await?;
            format!("admitted {}", case_id)
        }
        Command::Cancel(case_id) => {
            engine.cancel(case_id).await?;
            format!("cancelled {}", case_id)
        }
        Command::Complete(case_id) => {
            engine.complete(case_id).await?;
            format!("completed {}", case_id)
        }
        Command::Release(resource_id) => {
            engine.release(resource_id).await?;
            format!("released {}", resource_id)
        }
        Command::Register(specialty) => {
            let resource_id = engine.register_resource(specialty).await;
            format!("registered {} for {}", resource_id, specialty)
        }
        Command::Deregister(resource_id) => {
            engine.deregister_resource(resource_id).await?;
            format!("deregistered {}", resource_id)
        }
        Command::Case(case_id) => serde_json::to_string_pretty(&engine.get_case(case_id).await?)?,
        Command::Waiting(specialty) => {
            serde_json::to_string_pretty(&engine.list_waiting(specialty).await)?
        }
        Command::Estimate(case_id) => serde_json::to_string(&engine.estimate(case_id).await?)?,
        Command::Pool(specialty) => {
            let status = engine.pool_status(specialty).await;
            format!("{}: {} free / {} total", specialty, status.free, status.total)
        }
        Command::Stats(specialty) => {
            serde_json::to_string_pretty(&engine.queue_stats(specialty).await)?
        }
        Command::Overview => serde_json::to_string_pretty(&engine.overview().await)?,
        Command::Metrics => engine.metrics().render()?,
        Command::Tick => format!("allocated {}", engine.run_cycle().await),
        Command::Quit => String::new(),
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    info!("启动分诊引擎...");

    let config = TriageConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    info!("分诊引擎配置:");
    info!("  老化速率: {}", config.aging_rate);
    info!("  滚动平均窗口: {}", config.rolling_average_window);
    info!("  调度间隔: {}s", config.tick_interval_secs);

    let inventory = config.resource_inventory()?;
    let engine = Arc::new(TriageEngine::new(config)?);
    for (specialty, count) in inventory {
        for _ in 0..count {
            engine.register_resource(specialty).await;
        }
    }

    let ticker = engine.spawn_ticker();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("error: {:#}", e);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        match execute(&engine, command).await {
            Ok(output) => println!("{}", output),
            Err(e) => {
                error!("Command '{}' failed: {:#}", line.trim(), e);
                println!("error: {:#}", e);
            }
        }
    }

    ticker.abort();
    info!("分诊引擎已停止");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admit_with_multi_word_specialty() {
        let command = parse_command("admit 42.5 general practice").unwrap();
        assert_eq!(
            command,
            Command::Admit {
                score: 42.5,
                specialty: "general practice".to_string()
            }
        );
    }

    #[test]
    fn test_parse_identifiers_accept_display_prefix() {
        assert_eq!(parse_command("cancel C7").unwrap(), Command::Cancel(CaseId(7)));
        assert_eq!(parse_command("release 3").unwrap(), Command::Release(ResourceId(3)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("admit abc cardiology").is_err());
        assert!(parse_command("register oncology").is_err());
        assert!(parse_command("fly").is_err());
    }

    #[tokio::test]
    async fn test_execute_admit_and_pool() {
        let engine = TriageEngine::new(TriageConfig::default()).unwrap();
        execute(&engine, Command::Register(Specialty::Cardiology)).await.unwrap();

        let output = execute(
            &engine,
            Command::Admit {
                score: 70.0,
                specialty: "cardiology".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(output, "admitted C1");

        let pool = execute(&engine, Command::Pool(Specialty::Cardiology)).await.unwrap();
        assert_eq!(pool, "cardiology: 0 free / 1 total");
    }
}
