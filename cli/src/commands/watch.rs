//! WATCH command - Heartbeat a shared notebook and report other editors.
//!
//! A failed heartbeat carries no information about who is editing, so the
//! last editor list stays on screen marked stale. Only a definite answer
//! from the server (the notebook is no longer shared, or the caller was
//! removed from it) ends the watch.

use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::share::ActiveEditor;
use super::{CliError, HumanReadable, encode_path, format_timestamp, make_request, output};

const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Owner-qualified path, e.g. alice/analysis.ipynb
    pub qualified_path: String,

    /// Seconds between heartbeats (default: the server's suggested interval)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Send one heartbeat and exit
    #[arg(long)]
    pub once: bool,
}

/// Response from the heartbeat endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatReport {
    pub editors: Vec<ActiveEditor>,
    pub window_secs: i64,
    pub interval_secs: u64,
}

/// What the watcher believes about a notebook's other editors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchState {
    pub editors: Vec<String>,
    /// Set when the latest heartbeat failed; `editors` is then the last answer seen.
    pub stale: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// How the watch loop should continue after a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Continue,
    Stop,
}

impl WatchState {
    pub fn record_success(&mut self, report: &HeartbeatReport, at: DateTime<Utc>) {
        self.editors = report.editors.iter().map(|e| e.user.clone()).collect();
        self.stale = false;
        self.consecutive_failures = 0;
        self.last_success = Some(at);
        self.last_error = None;
    }

    /// Record a failed heartbeat. `NotFound` and `Forbidden` are answers,
    /// not outages: the share is gone for this caller and nobody is editing it
    /// with them any more.
    pub fn record_failure(&mut self, status: Option<u16>, message: String) -> Next {
        self.consecutive_failures += 1;
        self.last_error = Some(message);
        match status {
            Some(403) | Some(404) => {
                self.editors.clear();
                self.stale = false;
                Next::Stop
            }
            _ => {
                self.stale = true;
                Next::Continue
            }
        }
    }

    pub fn someone_else_editing(&self) -> bool {
        !self.editors.is_empty()
    }
}

impl HumanReadable for WatchState {
    fn print_human(&self) {
        let stamp = format_timestamp(&Utc::now());
        if self.editors.is_empty() {
            if self.stale {
                println!("{} {}", stamp.dimmed(), "no editors (stale)".yellow());
            } else {
                println!("{} {}", stamp.dimmed(), "no one else is editing".green());
            }
        } else {
            let line = format!("also editing: {}", self.editors.join(", "));
            if self.stale {
                println!("{} {} {}", stamp.dimmed(), line.red(), "(stale)".yellow());
            } else {
                println!("{} {}", stamp.dimmed(), line.red().bold());
            }
        }
        if self.stale
            && let Some(error) = &self.last_error
        {
            println!(
                "  {} {} (failures: {})",
                "Heartbeat failed:".yellow(),
                error,
                self.consecutive_failures
            );
        }
    }
}

async fn beat(
    client: &reqwest::Client,
    url: &str,
) -> Result<HeartbeatReport, CliError> {
    make_request(client.put(url)).await
}

/// Execute the watch command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: WatchArgs,
) -> Result<()> {
    let qualified = args.qualified_path.trim_matches('/');
    if !qualified.contains('/') {
        bail!("Expected <owner>/<path>, got '{}'", args.qualified_path);
    }
    let url = format!("{}/sharing/heartbeat/{}", base_url, encode_path(qualified));

    let mut state = WatchState::default();
    let mut interval = Duration::from_secs(args.interval.unwrap_or(DEFAULT_INTERVAL_SECS));

    loop {
        let next = match beat(client, &url).await {
            Ok(report) => {
                state.record_success(&report, Utc::now());
                if args.interval.is_none() && report.interval_secs > 0 {
                    interval = Duration::from_secs(report.interval_secs);
                }
                Next::Continue
            }
            Err(e) => state.record_failure(e.status(), e.to_string()),
        };

        output(&state, human)?;

        if next == Next::Stop {
            bail!(
                "{}",
                state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "Notebook is no longer shared".to_string())
            );
        }
        if args.once {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(users: &[&str]) -> HeartbeatReport {
        HeartbeatReport {
            editors: users
                .iter()
                .map(|u| ActiveEditor {
                    user: u.to_string(),
                    last_seen: Utc::now(),
                })
                .collect(),
            window_secs: 120,
            interval_secs: 60,
        }
    }

    #[test]
    fn test_success_replaces_editors() {
        let mut state = WatchState::default();
        state.record_success(&report(&["bob"]), Utc::now());
        assert_eq!(state.editors, vec!["bob".to_string()]);
        assert!(state.someone_else_editing());

        state.record_success(&report(&[]), Utc::now());
        assert!(!state.someone_else_editing());
        assert!(!state.stale);
    }

    #[test]
    fn test_transient_failure_keeps_last_known_editors() {
        let mut state = WatchState::default();
        state.record_success(&report(&["bob", "carol"]), Utc::now());

        let next = state.record_failure(None, "connection refused".into());
        assert_eq!(next, Next::Continue);
        assert!(state.stale);
        assert_eq!(state.editors, vec!["bob".to_string(), "carol".to_string()]);

        let next = state.record_failure(Some(503), "unavailable".into());
        assert_eq!(next, Next::Continue);
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.someone_else_editing());
    }

    #[test]
    fn test_recovery_clears_stale_flag() {
        let mut state = WatchState::default();
        state.record_success(&report(&["bob"]), Utc::now());
        state.record_failure(Some(500), "boom".into());
        state.record_success(&report(&["bob"]), Utc::now());
        assert!(!state.stale);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_unshared_notebook_stops_watch() {
        let mut state = WatchState::default();
        state.record_success(&report(&["bob"]), Utc::now());
        let next = state.record_failure(Some(404), "notebook is not shared".into());
        assert_eq!(next, Next::Stop);
        assert!(state.editors.is_empty());
        assert!(!state.stale);
    }

    #[test]
    fn test_removed_collaborator_stops_watch() {
        let mut state = WatchState::default();
        assert_eq!(
            state.record_failure(Some(403), "forbidden".into()),
            Next::Stop
        );
    }
}
