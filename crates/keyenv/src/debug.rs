// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyenv debug` command implementation.
//!
//! Inspects the store directory, key file and credential file and reports
//! what it finds. Never prints key material or credential values.

use std::io::IsTerminal;

use keyenv_vault::{Diagnostics, FileStatus};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Print the diagnostic report. Returns the number of failed checks.
pub fn run_debug(diag: &Diagnostics) -> usize {
    let use_color = std::io::stdout().is_terminal();
    let results = checks(diag);

    println!();
    println!("  keyenv debug");
    println!("  {}", "-".repeat(50));

    for result in &results {
        println!("{}", render_line(result, use_color));
    }

    println!();
    println!("    cipher: {}", diag.cipher);
    println!(
        "    locking: {}",
        if diag.locking { "enabled" } else { "disabled" }
    );
    println!();

    let fail_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .count();
    let warn_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Warn)
        .count();
    if fail_count + warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    fail_count
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<16} {message}", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<16} {}", result.name, result.message)
    }
}

/// Turn raw diagnostics into pass/warn/fail checks.
pub fn checks(diag: &Diagnostics) -> Vec<CheckResult> {
    vec![
        check_file("Store directory", &diag.dir, 0o700, "created on first add"),
        check_file("Master key", &diag.key, 0o600, "created on first add"),
        check_file("Credential file", &diag.store, 0o600, "created on first add"),
        check_decrypt(diag),
    ]
}

fn check_file(name: &str, status: &FileStatus, want_mode: u32, absent: &str) -> CheckResult {
    let path = status.path.display();
    if !status.exists {
        return CheckResult::new(name, CheckStatus::Warn, format!("{path} missing ({absent})"));
    }
    let size = status
        .size
        .filter(|_| !status.path.is_dir())
        .map(|s| format!(", {s} bytes"))
        .unwrap_or_default();
    match status.mode {
        Some(mode) if mode & 0o077 != 0 => CheckResult::new(
            name,
            CheckStatus::Warn,
            format!("{path} mode {mode:o}, expected {want_mode:o}{size}"),
        ),
        Some(mode) => CheckResult::new(name, CheckStatus::Pass, format!("{path} ({mode:o}{size})")),
        None => CheckResult::new(name, CheckStatus::Pass, format!("{path}{size}")),
    }
}

fn check_decrypt(diag: &Diagnostics) -> CheckResult {
    match &diag.records {
        Ok(0) if !diag.store.exists => {
            CheckResult::new("Decryption", CheckStatus::Pass, "empty store")
        }
        Ok(n) => {
            let word = if *n == 1 { "credential" } else { "credentials" };
            CheckResult::new("Decryption", CheckStatus::Pass, format!("{n} {word}"))
        }
        Err(e) => CheckResult::new("Decryption", CheckStatus::Fail, e.clone()),
    }
}
