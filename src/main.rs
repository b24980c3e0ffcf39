use clap::Parser;
use colored::*;
use sheetguard::config::{ConfigHandle, SafetyConfig};
use sheetguard::error::Result;
use sheetguard::operation::OperationRequest;
use sheetguard::safety::{AuditRecord, SafetyDecision, SafetyManager, Verdict};
use sheetguard::sheet::SheetSnapshot;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

/// 입력 파일 또는 설정 오류
const EXIT_INPUT_ERROR: i32 = 4;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(EXIT_INPUT_ERROR);
        }
    }
}

/// stderr로 로그 출력 (stdout은 판정 결과 전용)
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("sheetguard=debug")
    } else {
        EnvFilter::try_from_env("SHEETGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => SafetyConfig::load(path)?,
        None => SafetyConfig::load_default()?,
    };
    let handle = ConfigHandle::new(config)?;
    let manager = SafetyManager::from_handle(&handle)?;

    let sheet = SheetSnapshot::from_json_str(&fs::read_to_string(&cli.sheet)?)?;
    let mut requests = load_requests(&fs::read_to_string(&cli.request)?)?;
    if cli.yes {
        for request in requests.iter_mut() {
            request.confirmed = true;
        }
    }

    let decisions = if requests.len() == 1 {
        vec![manager.evaluate(&requests[0], &sheet)]
    } else {
        manager.evaluate_batch(&requests, &sheet)
    };

    if cli.json {
        let output = if decisions.len() == 1 {
            serde_json::to_string_pretty(&decisions[0])?
        } else {
            serde_json::to_string_pretty(&decisions)?
        };
        println!("{}", output);
    } else {
        for (i, decision) in decisions.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print_decision(decision);
        }
    }

    if cli.audit {
        for (request, decision) in requests.iter().zip(&decisions) {
            println!("{}", AuditRecord::from_decision(request, decision)?.to_json_line()?);
        }
    }

    Ok(decisions
        .iter()
        .map(|d| d.verdict().exit_code())
        .max()
        .unwrap_or(0))
}

/// 요청 파일: 객체 하나 또는 객체 배열
fn load_requests(json: &str) -> Result<Vec<OperationRequest>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

fn print_decision(decision: &SafetyDecision) {
    let header = format!("{} on '{}'", decision.operation, decision.sheet);
    match decision.verdict() {
        Verdict::Allow => println!("{} {}", "✅ ALLOWED".green().bold(), header),
        Verdict::Confirm => println!("{} {}", "⚠️  CONFIRMATION REQUIRED".yellow().bold(), header),
        Verdict::Block => println!("{} {}", "🚫 BLOCKED".red().bold(), header),
        Verdict::Reject => println!("{} {}", "❌ REJECTED".red(), header),
    }

    // 첫 줄(판정)은 위에서 이미 출력
    for line in decision.report().lines().skip(1) {
        println!("{}", line.dimmed());
    }

    if let Some(prompt) = &decision.confirmation_prompt {
        println!();
        println!("{}", prompt.yellow());
    }
}
