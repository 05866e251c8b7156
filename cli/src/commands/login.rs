//! LOGIN command - Exchange a username for a bearer token.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::{HumanReadable, make_request, output};

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Username to obtain a token for
    pub username: String,

    /// Token exchange secret, when the server requires one
    #[arg(long, env = "NBREPO_EXCHANGE_SECRET")]
    pub password: Option<String>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

/// Response from the token exchange.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub username: String,
    pub admin: bool,
    pub expires_in_hours: u64,
}

impl HumanReadable for TokenResponse {
    fn print_human(&self) {
        println!("{}", "Logged in".green().bold());
        println!();
        println!("  {} {}", "User:".cyan(), self.username);
        if self.admin {
            println!("  {} {}", "Role:".cyan(), "admin".yellow());
        }
        println!("  {} {}h", "Expires in:".cyan(), self.expires_in_hours);
        println!();
        println!("  export NBREPO_TOKEN={}", self.token);
    }
}

/// Execute the login command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: LoginArgs,
) -> Result<()> {
    let url = format!("{}/api-token-auth/", base_url);
    let request = TokenRequest {
        username: &args.username,
        password: args.password.as_deref(),
    };

    let response: TokenResponse = make_request(client.post(&url).json(&request)).await?;
    output(&response, human)
}
