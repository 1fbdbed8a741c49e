//! Frontdesk: shared, versioned state for cooperating receptionist agents.
//!
//! Independent agent processes (lead scrapers, enrichers, mail runners,
//! webhook loggers) read and update one JSON state document. Frontdesk makes
//! that safe without a server:
//!
//! - **Lock**: every read-modify-write holds an exclusive advisory file lock.
//! - **Atomic writes**: temp file, fsync, rename. Readers see old or new, never half.
//! - **Versions**: each write bumps `version`; callers may pass the version they
//!   read and get a conflict instead of clobbering newer work.
//! - **History**: the superseded document is snapshotted before each write,
//!   keeping at most `max_versions` snapshots.
//! - **Rollback**: a corrupt or incomplete live document is never returned; the
//!   newest valid snapshot is restored instead.
//! - **Handoffs**: write-once records passing work between agents, anchored to
//!   the state version.
//!
//! # Layout
//!
//! ```text
//! .frontdesk/
//!   state.json                      live document
//!   .state.lock                     advisory lock (empty)
//!   state.prev.<stamp>.json         snapshots
//!   handoffs/handoff_<from>_<to>_<stamp>.json
//!   state.events.jsonl              mutation audit log
//!   store.toml                      optional config
//! ```
//!
//! # Examples
//!
//! ```bash
//! frontdesk init
//! frontdesk show --format json
//! frontdesk write --file next.json --by scraper --expect 4
//! frontdesk handoff --from scraper --to mailer --summary handoff.json
//! frontdesk check --agent mailer
//! ```

mod cli;
pub mod core;

use crate::cli::{Cli, Command};
use crate::core::config::{self, StoreConfig};
use crate::core::document;
use crate::core::error::{FrontdeskError, Result};
use crate::core::handoff;
use crate::core::store::{InitOutcome, ReadOutcome, SanityReport, StateStore, WriteOutcome};
use crate::core::time::command_envelope;
use clap::Parser;
use colored::Colorize;
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

/// Exit status of `write` when the expected version did not match.
pub const EXIT_CONFLICT: u8 = 2;

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(path)?)
    }
}

fn parse_json_input(path: &Path) -> Result<JsonValue> {
    let bytes = read_input(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        FrontdeskError::ValidationError(format!("{} is not valid JSON: {}", path.display(), e))
    })
}

fn print_json(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_outcome(outcome: &ReadOutcome) {
    match outcome {
        ReadOutcome::Current => {}
        ReadOutcome::Default => println!(
            "  {} no valid state found, using fresh defaults",
            "▸".bright_yellow()
        ),
        ReadOutcome::Restored { snapshot } => println!(
            "  {} state was invalid, restored from {}",
            "▸".bright_yellow(),
            snapshot.bright_white()
        ),
    }
}

fn print_sanity_report(report: &SanityReport) {
    if report.passed() {
        println!(
            "{} sanity check passed (v{})",
            "✓".bright_green(),
            report.document.version
        );
    } else {
        println!(
            "{} sanity check failed: {}",
            "✗".bright_red(),
            report.issues.join(", ")
        );
        println!(
            "  {} now at v{}",
            "▸".bright_yellow(),
            report.document.version
        );
    }
    describe_outcome(&report.outcome);
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let json = match cli.format.as_str() {
        "json" => true,
        "text" => false,
        other => {
            return Err(FrontdeskError::ValidationError(format!(
                "unknown format '{}': expected 'text' or 'json'",
                other
            )));
        }
    };

    let current_dir = std::env::current_dir()?;
    let root = config::resolve_root(cli.root, &current_dir)?;
    let store = StateStore::open(&StoreConfig::load(root)?)?;

    match cli.command {
        Command::Init => match store.init()? {
            InitOutcome::Initialized { version } => {
                if json {
                    print_json(&command_envelope(
                        "init",
                        "ok",
                        serde_json::json!({ "initialized": true, "version": version }),
                    ))?;
                } else {
                    println!("{} state initialized (v{})", "●".bright_green(), version);
                }
            }
            InitOutcome::Existing { report } => {
                if json {
                    print_json(&command_envelope(
                        "init",
                        if report.passed() { "ok" } else { "repaired" },
                        serde_json::json!({ "initialized": false, "report": report }),
                    ))?;
                } else {
                    print_sanity_report(&report);
                }
            }
        },
        Command::Show => {
            let (doc, outcome) = store.read_state_with_outcome()?;
            if json {
                print_json(&command_envelope(
                    "show",
                    "ok",
                    serde_json::json!({ "read": outcome, "state": doc }),
                ))?;
            } else {
                println!(
                    "{} {} v{}",
                    "◆".bright_cyan(),
                    doc.project.bright_white().bold(),
                    doc.version
                );
                if let (Some(by), Some(at)) = (&doc.updated_by, &doc.last_updated) {
                    println!("  updated by {} at {}", by, at);
                }
                println!(
                    "  status: {} / phase: {}",
                    doc.text_field("status").unwrap_or("-"),
                    doc.text_field("phase").unwrap_or("-")
                );
                for (name, value) in &doc.metrics {
                    println!("  {:<20} {}", name, value);
                }
                let blockers = doc.blocker_lines();
                if !blockers.is_empty() {
                    println!("  blockers: {}", blockers.join("; "));
                }
                describe_outcome(&outcome);
            }
        }
        Command::Write { file, by, expect } => {
            let value = parse_json_input(&file)?;
            let doc = document::validate_value(value).map_err(|reason| {
                FrontdeskError::ValidationError(format!("document rejected: {}", reason))
            })?;
            let outcome = store.write_state(doc, &by, expect)?;
            if json {
                let status = if outcome.is_written() { "ok" } else { "conflict" };
                print_json(&command_envelope(
                    "write",
                    status,
                    serde_json::json!({ "write": outcome }),
                ))?;
            }
            match outcome {
                WriteOutcome::Written { version } => {
                    if !json {
                        println!("{} written v{} by {}", "✓".bright_green(), version, by);
                    }
                }
                WriteOutcome::Conflict { expected, found } => {
                    if !json {
                        println!(
                            "{} version conflict: expected v{}, found v{}; re-read and retry",
                            "✗".bright_red(),
                            expected,
                            found
                        );
                    }
                    return Ok(ExitCode::from(EXIT_CONFLICT));
                }
            }
        }
        Command::Check { agent } => {
            let report = store.sanity_check_report(&agent)?;
            if json {
                print_json(&command_envelope(
                    "check",
                    if report.passed() { "ok" } else { "repaired" },
                    serde_json::json!({ "report": report }),
                ))?;
            } else {
                print_sanity_report(&report);
            }
        }
        Command::Handoff { from, to, summary } => {
            let summary = handoff::summary_from_value(parse_json_input(&summary)?)?;
            let record = store.create_handoff(&from, &to, summary)?;
            if json {
                print_json(&command_envelope(
                    "handoff",
                    "ok",
                    serde_json::json!({ "handoff": record }),
                ))?;
            } else {
                println!(
                    "{} handoff {} -> {} recorded at v{} ({})",
                    "✓".bright_green(),
                    record.from,
                    record.to,
                    record.version,
                    record.id
                );
            }
        }
        Command::History => {
            let history = store.history()?;
            if json {
                print_json(&command_envelope(
                    "history",
                    "ok",
                    serde_json::json!({ "snapshots": history }),
                ))?;
            } else if history.is_empty() {
                println!("No snapshots retained yet.");
            } else {
                for info in &history {
                    let version = info
                        .version
                        .map(|v| format!("v{}", v))
                        .unwrap_or_else(|| "invalid".to_string());
                    let marker = if info.valid {
                        "●".bright_green()
                    } else {
                        "●".bright_red()
                    };
                    println!(
                        "  {} {} {:>8} {} {}",
                        marker,
                        info.name,
                        version,
                        info.created_at.as_deref().unwrap_or("-"),
                        info.sha256[..12].bright_black()
                    );
                }
            }
        }
        Command::Rollback { by } => {
            let (doc, outcome) = store.rollback_to_previous(&by)?;
            if json {
                print_json(&command_envelope(
                    "rollback",
                    "ok",
                    serde_json::json!({ "read": outcome, "state": doc }),
                ))?;
            } else {
                match &outcome {
                    ReadOutcome::Restored { snapshot } => println!(
                        "{} restored v{} from {}",
                        "✓".bright_green(),
                        doc.version,
                        snapshot
                    ),
                    _ => println!(
                        "{} no valid snapshot to restore; live state left unchanged",
                        "✗".bright_red()
                    ),
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
