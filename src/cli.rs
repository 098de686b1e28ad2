//! CLI argument definitions for bbx.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::api::Auth;
use crate::{Error, Result};

/// bbx - export a Bitbucket Cloud repository into a migration archive.
///
/// Exactly one authentication mode must be supplied: a workspace access
/// token, an email + API token pair, or a username + app password pair.
#[derive(Parser, Debug)]
#[command(name = "bbx")]
#[command(author, version, about = "Export a Bitbucket Cloud repository into a migration archive", long_about = None)]
pub struct Cli {
    /// Source workspace (the tenant/namespace owning the repository)
    #[arg(short = 'w', long)]
    pub workspace: String,

    /// Repository slug within the workspace
    #[arg(short = 'r', long = "repo")]
    pub repo: String,

    /// Directory the export is written into
    #[arg(short = 'o', long, default_value = "export")]
    pub output: PathBuf,

    /// Export only open pull requests
    #[arg(long)]
    pub open_only: bool,

    /// Export only pull requests created at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Pack the finished export directory into <output>.tar.gz
    #[arg(long)]
    pub archive: bool,

    /// Workspace access token (bearer auth)
    #[arg(long, env = "BBX_TOKEN")]
    pub token: Option<String>,

    /// Account email, paired with --api-token
    #[arg(long, env = "BBX_EMAIL")]
    pub email: Option<String>,

    /// Atlassian API token, paired with --email
    #[arg(long, env = "BBX_API_TOKEN")]
    pub api_token: Option<String>,

    /// Username, paired with --app-password
    #[arg(long, env = "BBX_USERNAME")]
    pub username: Option<String>,

    /// App password, paired with --username
    #[arg(long, env = "BBX_APP_PASSWORD")]
    pub app_password: Option<String>,

    /// Clone the git repository from this URL instead of the canonical one
    #[arg(long)]
    pub clone_url: Option<String>,
}

impl Cli {
    /// Resolve the authentication mode. Supplying more than one mode (or a
    /// half of a pair) is a configuration error caught here, before any
    /// request is made.
    pub fn auth(&self) -> Result<Auth> {
        let mut modes = Vec::new();
        if let Some(token) = &self.token {
            modes.push(Auth::WorkspaceToken(token.clone()));
        }
        match (&self.email, &self.api_token) {
            (Some(email), Some(token)) => modes.push(Auth::ApiToken {
                email: email.clone(),
                token: token.clone(),
            }),
            (None, None) => {}
            _ => {
                return Err(Error::InvalidInput(
                    "--email and --api-token must be supplied together".to_string(),
                ));
            }
        }
        match (&self.username, &self.app_password) {
            (Some(username), Some(password)) => modes.push(Auth::AppPassword {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None) => {}
            _ => {
                return Err(Error::InvalidInput(
                    "--username and --app-password must be supplied together".to_string(),
                ));
            }
        }

        match modes.len() {
            0 => Err(Error::InvalidInput(
                "no credentials supplied; set exactly one of --token, --email/--api-token, or --username/--app-password".to_string(),
            )),
            1 => Ok(modes.remove(0)),
            _ => Err(Error::InvalidInput(
                "multiple auth modes supplied; set exactly one of --token, --email/--api-token, or --username/--app-password".to_string(),
            )),
        }
    }
}
