//! LIBRARY command - Browse, publish, and copy public notebooks.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::{HumanReadable, encode_path, format_timestamp, make_request, output, truncate};

/// Arguments for the library command.
#[derive(Args)]
pub struct LibraryArgs {
    #[command(subcommand)]
    pub action: LibraryAction,
}

/// Metadata flags shared by publish and update.
#[derive(Args)]
pub struct MetadataArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Author shown in the library
    #[arg(long)]
    pub author: String,

    /// Development, Beta, or Release
    #[arg(long)]
    pub quality: String,

    /// Short description
    #[arg(long, default_value = "")]
    pub description: String,

    /// How to cite the notebook
    #[arg(long)]
    pub citation: Option<String>,

    /// Tag labels (repeat or comma-separate)
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[derive(Subcommand)]
pub enum LibraryAction {
    /// List every publication, with pinned and protected tags
    List {
        /// Only show publications carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show one publication
    Show { id: i64 },

    /// Publish a notebook from your workspace
    Publish {
        /// Workspace path of the notebook
        path: String,

        /// Path of the file to serve, when it differs from the notebook path
        #[arg(long)]
        file_path: Option<String>,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Replace a publication's metadata
    Update {
        id: i64,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Remove a publication from the library
    Unpublish { id: i64 },

    /// Copy a publication into your workspace
    Copy {
        id: i64,

        /// Destination directory (default: named after the notebook)
        #[arg(long)]
        dir: Option<String>,
    },

    /// Get the read-only rendering link
    Preview { id: i64 },

    /// Record a launch of the publication
    Launched { id: i64 },
}

#[derive(Serialize)]
struct PublicationForm<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<&'a str>,
    name: &'a str,
    description: &'a str,
    author: &'a str,
    quality: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    citation: Option<&'a str>,
    tags: &'a [String],
}

impl<'a> PublicationForm<'a> {
    fn new(metadata: &'a MetadataArgs) -> Self {
        Self {
            api_path: None,
            file_path: None,
            name: &metadata.name,
            description: &metadata.description,
            author: &metadata.author,
            quality: &metadata.quality,
            citation: metadata.citation.as_deref(),
            tags: &metadata.tags,
        }
    }
}

/// A publication as the server returns it.
#[derive(Debug, Deserialize, Serialize)]
pub struct Publication {
    pub id: i64,
    pub owner: String,
    pub api_path: String,
    pub file_path: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub quality: String,
    pub citation: Option<String>,
    pub tags: Vec<String>,
    pub copied: u64,
    pub launched: u64,
    pub publication_date: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub url: String,
}

/// Response from listing the library.
#[derive(Debug, Deserialize, Serialize)]
pub struct LibraryListing {
    pub publications: Vec<Publication>,
    pub pinned: Vec<String>,
    pub protected: Vec<String>,
}

impl LibraryListing {
    fn retain_tag(&mut self, tag: &str) {
        let tag = tag.trim().to_lowercase();
        self.publications.retain(|p| p.tags.iter().any(|t| *t == tag));
    }
}

/// Response from copying a publication.
#[derive(Debug, Deserialize, Serialize)]
pub struct CopyOutcome {
    pub publication_id: i64,
    pub filename: String,
}

/// Response from the preview endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct Preview {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub description: String,
    pub quality: String,
    pub tags: Vec<String>,
    pub render_url: String,
}

impl HumanReadable for Publication {
    fn print_human(&self) {
        println!("{}", self.name.green().bold());
        println!();
        println!("  {} {}", "ID:".cyan(), self.id);
        println!("  {} {}/{}", "Notebook:".cyan(), self.owner, self.api_path);
        println!("  {} {}", "Author:".cyan(), self.author);
        println!("  {} {}", "Quality:".cyan(), self.quality);
        if !self.description.is_empty() {
            println!("  {} {}", "Description:".cyan(), self.description);
        }
        if let Some(citation) = &self.citation {
            println!("  {} {}", "Citation:".cyan(), citation);
        }
        if !self.tags.is_empty() {
            println!("  {} {}", "Tags:".cyan(), self.tags.join(", "));
        }
        println!(
            "  {} copied {} / launched {}",
            "Usage:".cyan(),
            self.copied,
            self.launched
        );
        println!(
            "  {} {}",
            "Published:".cyan(),
            format_timestamp(&self.publication_date)
        );
        println!("  {} {}", "Updated:".cyan(), format_timestamp(&self.updated));
    }
}

impl HumanReadable for LibraryListing {
    fn print_human(&self) {
        println!("{}", "Public Library".green().bold());
        println!("{}", "=".repeat(78));
        println!();

        if !self.pinned.is_empty() {
            println!("  {} {}", "Pinned:".cyan(), self.pinned.join(", "));
        }
        if !self.protected.is_empty() {
            println!("  {} {}", "Protected:".cyan(), self.protected.join(", "));
        }
        if !self.pinned.is_empty() || !self.protected.is_empty() {
            println!();
        }

        if self.publications.is_empty() {
            println!("  {}", "(No publications)".dimmed());
            return;
        }

        println!(
            "  {:<6} {:<30} {:<16} {:<12} {}",
            "ID".cyan(),
            "Name".cyan(),
            "Owner".cyan(),
            "Quality".cyan(),
            "Tags".cyan()
        );
        println!("  {}", "-".repeat(76));

        for p in &self.publications {
            println!(
                "  {:<6} {:<30} {:<16} {:<12} {}",
                p.id,
                truncate(&p.name, 30),
                truncate(&p.owner, 16),
                p.quality,
                p.tags.join(",").dimmed()
            );
        }

        println!();
        println!("  {} {}", "Total:".cyan(), self.publications.len());
    }
}

impl HumanReadable for CopyOutcome {
    fn print_human(&self) {
        println!("{}", "Copied into your workspace".green().bold());
        println!();
        println!("  {} {}", "Publication:".cyan(), self.publication_id);
        println!("  {} {}", "File:".cyan(), self.filename);
    }
}

impl HumanReadable for Preview {
    fn print_human(&self) {
        println!("{}", self.name.green().bold());
        println!("  {} {}", "Author:".cyan(), self.author);
        println!("  {} {}", "Quality:".cyan(), self.quality);
        println!("  {} {}", "Render:".cyan(), self.render_url);
    }
}

/// Execute the library command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: LibraryArgs,
) -> Result<()> {
    match args.action {
        LibraryAction::List { tag } => {
            let url = format!("{}/notebooks/", base_url);
            let mut listing: LibraryListing = make_request(client.get(&url)).await?;
            if let Some(tag) = tag {
                listing.retain_tag(&tag);
            }
            output(&listing, human)
        }
        LibraryAction::Show { id } => {
            let url = format!("{}/notebooks/{}/", base_url, id);
            let publication: Publication = make_request(client.get(&url)).await?;
            output(&publication, human)
        }
        LibraryAction::Publish {
            path,
            file_path,
            metadata,
        } => {
            let url = format!("{}/notebooks/", base_url);
            let mut form = PublicationForm::new(&metadata);
            form.api_path = Some(&path);
            form.file_path = file_path.as_deref();
            let publication: Publication = make_request(client.post(&url).json(&form)).await?;
            output(&publication, human)
        }
        LibraryAction::Update { id, metadata } => {
            let url = format!("{}/notebooks/{}/", base_url, id);
            let form = PublicationForm::new(&metadata);
            let publication: Publication = make_request(client.put(&url).json(&form)).await?;
            output(&publication, human)
        }
        LibraryAction::Unpublish { id } => {
            let url = format!("{}/notebooks/{}/", base_url, id);
            let publication: Publication = make_request(client.delete(&url)).await?;
            if human {
                println!("{} {}", "Unpublished".green().bold(), publication.name);
                Ok(())
            } else {
                output(&publication, human)
            }
        }
        LibraryAction::Copy { id, dir } => {
            let url = match dir.as_deref().map(|d| d.trim_matches('/')) {
                Some(dir) if !dir.is_empty() => {
                    format!("{}/notebooks/{}/copy/{}", base_url, id, encode_path(dir))
                }
                _ => format!("{}/notebooks/{}/copy", base_url, id),
            };
            let outcome: CopyOutcome = make_request(client.post(&url)).await?;
            output(&outcome, human)
        }
        LibraryAction::Preview { id } => {
            let url = format!("{}/notebooks/{}/preview/", base_url, id);
            let preview: Preview = make_request(client.get(&url)).await?;
            output(&preview, human)
        }
        LibraryAction::Launched { id } => {
            let url = format!("{}/notebooks/{}/launched/", base_url, id);
            let publication: Publication = make_request(client.put(&url)).await?;
            output(&publication, human)
        }
    }
}
