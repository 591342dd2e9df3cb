// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `proxylog status` command implementation.
//!
//! Recovers today's spend the same way startup does (last line of today's
//! log file) and reports it against the daily cap.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use proxylog_config::ProxylogConfig;
use proxylog_core::{Cost, ProxylogError};
use proxylog_cost::{CapDecision, CostLedger};
use proxylog_recorder::{LogLayout, last_record_for_date};
use serde::Serialize;

/// Spend report, serialized for `--json`.
#[derive(Debug, Serialize)]
struct StatusReport {
    identity: String,
    date: String,
    log_file: String,
    spent_eur: f64,
    cap_eur: f64,
    remaining_eur: f64,
    percent_used: f64,
    blocked: bool,
    resets_in_secs: u64,
}

/// Run the `proxylog status` command.
///
/// With `--json`, prints a machine-readable report. With `--plain`, disables
/// colored output.
pub async fn run_status(config: &ProxylogConfig, json: bool, plain: bool) -> Result<(), ProxylogError> {
    let report = build_report(config, Utc::now()).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    print_report(&report, use_color);
    Ok(())
}

async fn build_report(config: &ProxylogConfig, now: DateTime<Utc>) -> Result<StatusReport, ProxylogError> {
    let identity = config.agent.resolved_identity();
    let layout = LogLayout::new(&config.logging.directory);
    let today = now.date_naive();

    let ledger = CostLedger::from_config(&config.limits)?;
    let snapshot = last_record_for_date(&layout, &identity, today);
    let spent = ledger.restore_on(snapshot, today).await;
    let decision = ledger.check_cap_at(now).await;

    let cap = ledger.cap();
    let remaining = Cost::from_micros(cap.micros().saturating_sub(spent.micros()));
    let percent_used = if cap.is_zero() {
        100.0
    } else {
        spent.micros() as f64 * 100.0 / cap.micros() as f64
    };

    Ok(StatusReport {
        log_file: layout.path_for(&identity, today).display().to_string(),
        identity,
        date: today.to_string(),
        spent_eur: spent.to_decimal(),
        cap_eur: cap.to_decimal(),
        remaining_eur: remaining.to_decimal(),
        percent_used,
        blocked: matches!(decision, CapDecision::Blocked { .. }),
        resets_in_secs: proxylog_cost::seconds_until_reset(now),
    })
}

fn print_report(report: &StatusReport, use_color: bool) {
    println!();
    println!("  proxylog status");
    println!("  {}", "-".repeat(35));
    println!("    Identity:  {}", report.identity);
    println!("    Date:      {} (UTC)", report.date);

    let spend = format!(
        "€{:.4} of €{:.2} ({:.1}%)",
        report.spent_eur, report.cap_eur, report.percent_used
    );
    if use_color {
        use colored::Colorize;
        if report.blocked {
            println!("    Spend:     {} {}", "✗".red(), spend.red());
        } else if report.percent_used >= 80.0 {
            println!("    Spend:     {} {}", "!".yellow(), spend.yellow());
        } else {
            println!("    Spend:     {} {}", "✓".green(), spend);
        }
    } else if report.blocked {
        println!("    Spend:     [BLOCKED] {spend}");
    } else {
        println!("    Spend:     [OK] {spend}");
    }

    println!("    Remaining: €{:.4}", report.remaining_eur);
    println!("    Resets in: {}", format_duration(report.resets_in_secs));
    println!("    Log file:  {}", report.log_file);
    println!();
}

/// Format seconds as `Xh Ym` (or `Ym` under an hour).
fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
