//! SHARE command - Invite collaborators and answer invites.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::{HumanReadable, encode_path, format_timestamp, make_request, output};

/// Arguments for the share command.
#[derive(Args)]
pub struct ShareArgs {
    #[command(subcommand)]
    pub action: ShareAction,
}

#[derive(Subcommand)]
pub enum ShareAction {
    /// Share a notebook, replacing its collaborator list
    Begin {
        /// Workspace path of the notebook
        notebook: String,

        /// Usernames to invite (repeat or comma-separate)
        #[arg(required = true, value_delimiter = ',')]
        users: Vec<String>,
    },

    /// Shares you own and shares you are invited to
    List,

    /// Current collaborators and active editors of a notebook
    Current {
        /// Owner-qualified path, e.g. alice/analysis.ipynb
        qualified_path: String,
    },

    /// Accept an invite
    Accept { invite_id: i64 },

    /// Decline a pending invite
    Decline { invite_id: i64 },

    /// Stop sharing a notebook
    Remove { share_id: i64 },

    /// Pull the owner's current copy of a shared notebook
    Pull {
        share_id: i64,

        /// Destination directory (default: named after the notebook)
        #[arg(long)]
        dir: Option<String>,
    },
}

#[derive(Serialize)]
struct ShareRequest<'a> {
    notebook: &'a str,
    share_with: &'a [String],
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Invite {
    pub id: i64,
    pub user: String,
    pub accepted: bool,
    pub invited_at: DateTime<Utc>,
}

/// A share as the server returns it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Share {
    pub id: i64,
    pub owner: String,
    pub notebook_path: String,
    pub created: DateTime<Utc>,
    pub collaborators: Vec<Invite>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ShareEntry {
    pub share: Share,
    pub role: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<i64>,
}

/// Response from listing shares.
#[derive(Debug, Deserialize, Serialize)]
pub struct SharingOverview {
    pub shared_by_me: Vec<ShareEntry>,
    pub shared_with_me: Vec<ShareEntry>,
    pub pending_invites: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActiveEditor {
    pub user: String,
    pub last_seen: DateTime<Utc>,
}

/// Response from the current-sharing endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct CurrentSharing {
    pub owner: String,
    pub notebook_path: String,
    pub share_id: Option<i64>,
    pub users: Vec<String>,
    pub editors: Vec<ActiveEditor>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeclineResult {
    pub share_id: i64,
    pub share_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<Share>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RunShared {
    pub share_id: i64,
    pub location: String,
}

impl HumanReadable for Share {
    fn print_human(&self) {
        println!(
            "{} {}/{}",
            "Share".green().bold(),
            self.owner,
            self.notebook_path
        );
        println!();
        println!("  {} {}", "ID:".cyan(), self.id);
        println!("  {} {}", "Created:".cyan(), format_timestamp(&self.created));
        if self.collaborators.is_empty() {
            println!("  {}", "(No collaborators)".dimmed());
            return;
        }
        println!("  {}", "Collaborators:".cyan());
        for invite in &self.collaborators {
            let status = if invite.accepted {
                "accepted".green()
            } else {
                "pending".yellow()
            };
            println!("    {:<20} {} (invite {})", invite.user, status, invite.id);
        }
    }
}

impl HumanReadable for ShareEntry {
    fn print_human(&self) {
        self.share.print_human();
    }
}

impl HumanReadable for SharingOverview {
    fn print_human(&self) {
        println!("{}", "Shared by me".green().bold());
        println!("{}", "=".repeat(60));
        if self.shared_by_me.is_empty() {
            println!("  {}", "(Nothing shared)".dimmed());
        }
        for entry in &self.shared_by_me {
            let users: Vec<&str> = entry
                .share
                .collaborators
                .iter()
                .map(|i| i.user.as_str())
                .collect();
            println!(
                "  [{}] {}  {}",
                entry.share.id,
                entry.share.notebook_path,
                users.join(", ").dimmed()
            );
        }

        println!();
        println!("{}", "Shared with me".green().bold());
        println!("{}", "=".repeat(60));
        if self.shared_with_me.is_empty() {
            println!("  {}", "(No invites)".dimmed());
        }
        for entry in &self.shared_with_me {
            let status = if entry.accepted {
                "accepted".green()
            } else {
                "pending".yellow()
            };
            println!(
                "  [{}] {}/{}  {} (invite {})",
                entry.share.id,
                entry.share.owner,
                entry.share.notebook_path,
                status,
                entry.invite_id.map(|id| id.to_string()).unwrap_or_default()
            );
        }

        if self.pending_invites > 0 {
            println!();
            println!(
                "  {} {}",
                "Pending invites:".yellow(),
                self.pending_invites
            );
        }
    }
}

impl HumanReadable for CurrentSharing {
    fn print_human(&self) {
        println!(
            "{} {}/{}",
            "Sharing".green().bold(),
            self.owner,
            self.notebook_path
        );
        println!();
        match self.share_id {
            Some(id) => println!("  {} {}", "Share:".cyan(), id),
            None => println!("  {}", "(Not shared)".dimmed()),
        }
        if !self.users.is_empty() {
            println!("  {} {}", "Users:".cyan(), self.users.join(", "));
        }
        if !self.editors.is_empty() {
            println!("  {}", "Editing now:".cyan());
            for editor in &self.editors {
                println!(
                    "    {:<20} {}",
                    editor.user,
                    format_timestamp(&editor.last_seen).dimmed()
                );
            }
        }
    }
}

impl HumanReadable for DeclineResult {
    fn print_human(&self) {
        println!("{}", "Invite declined".green().bold());
        if self.share_deleted {
            println!(
                "  {} share {} had no collaborators left and was removed",
                "Note:".cyan(),
                self.share_id
            );
        }
    }
}

impl HumanReadable for RunShared {
    fn print_human(&self) {
        println!("{}", "Pulled shared notebook".green().bold());
        println!("  {} {}", "Location:".cyan(), self.location);
    }
}

/// Execute the share command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: ShareArgs,
) -> Result<()> {
    match args.action {
        ShareAction::Begin { notebook, users } => {
            let url = format!("{}/sharing/begin/", base_url);
            let request = ShareRequest {
                notebook: &notebook,
                share_with: &users,
            };
            let share: Share = make_request(client.post(&url).json(&request)).await?;
            output(&share, human)
        }
        ShareAction::List => {
            let url = format!("{}/sharing/list/", base_url);
            let overview: SharingOverview = make_request(client.get(&url)).await?;
            output(&overview, human)
        }
        ShareAction::Current { qualified_path } => {
            let url = format!(
                "{}/sharing/current/{}",
                base_url,
                encode_path(qualified_path.trim_matches('/'))
            );
            let current: CurrentSharing = make_request(client.get(&url)).await?;
            output(&current, human)
        }
        ShareAction::Accept { invite_id } => {
            let url = format!("{}/sharing/{}/accept/", base_url, invite_id);
            let entry: ShareEntry = make_request(client.put(&url)).await?;
            output(&entry, human)
        }
        ShareAction::Decline { invite_id } => {
            let url = format!("{}/sharing/{}/decline/", base_url, invite_id);
            let result: DeclineResult = make_request(client.put(&url)).await?;
            output(&result, human)
        }
        ShareAction::Remove { share_id } => {
            let url = format!("{}/sharing/{}/remove/", base_url, share_id);
            let share: Share = make_request(client.delete(&url)).await?;
            output(&share, human)
        }
        ShareAction::Pull { share_id, dir } => {
            let url = match dir.as_deref().map(|d| d.trim_matches('/')) {
                Some(dir) if !dir.is_empty() => {
                    format!("{}/sharing/{}/copy/{}", base_url, share_id, encode_path(dir))
                }
                _ => format!("{}/sharing/{}/copy", base_url, share_id),
            };
            let pulled: RunShared = make_request(client.put(&url)).await?;
            output(&pulled, human)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_deserializes() {
        let body = serde_json::json!({
            "shared_by_me": [],
            "shared_with_me": [{
                "share": {
                    "id": 3,
                    "owner": "alice",
                    "notebook_path": "work/a.ipynb",
                    "created": "2026-03-01T10:00:00Z",
                    "collaborators": [
                        {"id": 9, "user": "bob", "accepted": false, "invited_at": "2026-03-01T10:00:00Z"}
                    ]
                },
                "role": "collaborator",
                "accepted": false,
                "invite_id": 9
            }],
            "pending_invites": 1
        });
        let overview: SharingOverview = serde_json::from_value(body).unwrap();
        assert_eq!(overview.pending_invites, 1);
        assert_eq!(overview.shared_with_me[0].invite_id, Some(9));
        assert_eq!(overview.shared_with_me[0].share.collaborators[0].user, "bob");
    }

    #[test]
    fn test_decline_without_share() {
        let body = serde_json::json!({"share_id": 3, "share_deleted": true});
        let result: DeclineResult = serde_json::from_value(body).unwrap();
        assert!(result.share_deleted);
        assert!(result.share.is_none());
    }
}
