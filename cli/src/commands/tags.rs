//! TAGS command - List tags and change their flags.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::{HumanReadable, encode_path, make_request, output};

/// Arguments for the tags command.
#[derive(Args)]
pub struct TagsArgs {
    #[command(subcommand)]
    pub action: TagsAction,
}

#[derive(Subcommand)]
pub enum TagsAction {
    /// List all tags
    List,

    /// Change a tag's flags (admin only); creates the tag if unseen
    Set {
        /// Tag label
        label: String,

        /// Pin or unpin the tag
        #[arg(long)]
        pinned: Option<bool>,

        /// Protect or unprotect the tag
        #[arg(long)]
        protected: Option<bool>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Serialize)]
struct TagChanges<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// A tag as the server returns it.
#[derive(Debug, Deserialize, Serialize)]
pub struct Tag {
    pub id: i64,
    pub label: String,
    pub description: String,
    pub pinned: bool,
    pub protected: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TagList(pub Vec<Tag>);

fn flags(tag: &Tag) -> String {
    format!(
        "{}{}",
        if tag.pinned { "P" } else { "-" },
        if tag.protected { "L" } else { "-" }
    )
}

impl HumanReadable for Tag {
    fn print_human(&self) {
        println!("{} {}", "Tag".green().bold(), self.label);
        println!("  {} {}", "ID:".cyan(), self.id);
        println!("  {} {}", "Pinned:".cyan(), self.pinned);
        println!("  {} {}", "Protected:".cyan(), self.protected);
        if !self.description.is_empty() {
            println!("  {} {}", "Description:".cyan(), self.description);
        }
    }
}

impl HumanReadable for TagList {
    fn print_human(&self) {
        println!("{}", "Tags".green().bold());
        println!("{}", "=".repeat(60));

        if self.0.is_empty() {
            println!("  {}", "(No tags)".dimmed());
            return;
        }

        println!(
            "  {:<24} {:<6} {}",
            "Label".cyan(),
            "Flags".cyan(),
            "Description".cyan()
        );
        println!("  {}", "-".repeat(58));
        for tag in &self.0 {
            println!(
                "  {:<24} {:<6} {}",
                tag.label,
                flags(tag),
                tag.description.dimmed()
            );
        }
        println!();
        println!("  {}", "P = pinned, L = protected".dimmed());
    }
}

/// Execute the tags command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: TagsArgs,
) -> Result<()> {
    match args.action {
        TagsAction::List => {
            let url = format!("{}/tags/", base_url);
            let tags: TagList = make_request(client.get(&url)).await?;
            output(&tags, human)
        }
        TagsAction::Set {
            label,
            pinned,
            protected,
            description,
        } => {
            let changes = TagChanges {
                pinned,
                protected,
                description: description.as_deref(),
            };
            if changes.pinned.is_none() && changes.protected.is_none() && changes.description.is_none()
            {
                bail!("Nothing to change: pass --pinned, --protected, or --description");
            }
            let url = format!("{}/tags/label/{}/", base_url, encode_path(label.trim()));
            let tag: Tag = make_request(client.put(&url).json(&changes)).await?;
            output(&tag, human)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let tag = Tag {
            id: 1,
            label: "featured".into(),
            description: String::new(),
            pinned: true,
            protected: false,
        };
        assert_eq!(flags(&tag), "P-");
    }

    #[test]
    fn test_changes_skip_unset_fields() {
        let changes = TagChanges {
            pinned: None,
            protected: Some(true),
            description: None,
        };
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            serde_json::json!({"protected": true})
        );
    }
}
