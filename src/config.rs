//! Configuration management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compositor::GridLayout;

/// Mirror process configuration
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    // =========================================================================
    // Instagram
    // =========================================================================
    /// Session cookie used by the feed client
    pub session_id: String,

    // =========================================================================
    // Local State
    // =========================================================================
    /// JSON options file with the mirrored accounts
    pub options_path: PathBuf,

    /// SQLite file of the watermark store
    pub database_path: PathBuf,

    /// Parent of the per-item scratch directories (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,

    // =========================================================================
    // Runtime
    // =========================================================================
    /// Timeout for every outbound request
    pub http_timeout_secs: u64,

    /// Accounts planned in parallel
    pub account_concurrency: usize,

    /// Parsed options file
    pub options: MirrorOptions,
}

/// Contents of the options file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorOptions {
    pub accounts: Vec<AccountOptions>,

    /// Grid width in cells
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,

    /// Gap between grid cells in pixels
    #[serde(default = "default_grid_padding")]
    pub grid_padding: u32,
}

/// One mirrored account and its destination webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccountOptions {
    /// Instagram username
    pub igaccount: String,
    /// Discord webhook URL
    pub webhook: String,
}

fn default_options_path() -> PathBuf {
    PathBuf::from("options.json")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_http_timeout() -> u64 {
    30
}

fn default_account_concurrency() -> usize {
    4
}

fn default_grid_width() -> u32 {
    2
}

fn default_grid_padding() -> u32 {
    20
}

impl MirrorConfig {
    /// Load configuration from environment variables and the options file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self::from_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration using `var` to look up each variable
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_id = var("INSTAGRAM_SESSIONID")
            .filter(|s| !s.trim().is_empty())
            .context("INSTAGRAM_SESSIONID is required")?;

        let options_path = var("OPTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_options_path);
        let options = MirrorOptions::from_file(&options_path)?;

        Ok(Self {
            session_id,
            options_path,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_database_path),
            scratch_dir: var("SCRATCH_DIR").map(PathBuf::from),
            http_timeout_secs: var("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_http_timeout),
            account_concurrency: var("ACCOUNT_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(default_account_concurrency),
            options,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn grid_layout(&self) -> Result<GridLayout> {
        self.options.grid_layout()
    }
}

impl MirrorOptions {
    /// Read and validate an options file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Invalid options file {:?}", path))
    }

    /// Parse and validate options JSON
    pub fn parse(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            bail!("at least one account is required");
        }
        self.grid_layout()?;

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.igaccount.trim().is_empty() || account.webhook.trim().is_empty() {
                bail!("accounts need both igaccount and webhook");
            }
            if !seen.insert(account) {
                bail!(
                    "account {} is mirrored to the same webhook twice",
                    account.igaccount
                );
            }
        }
        Ok(())
    }

    pub fn grid_layout(&self) -> Result<GridLayout> {
        Ok(GridLayout::new(self.grid_width, self.grid_padding)?)
    }
}
