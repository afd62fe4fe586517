//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Parser;

/// Triage a mailbox snapshot with TTL and filter rules.
#[derive(Debug, Parser)]
#[command(name = "mailtriage", version, about)]
pub struct Cli {
    /// Rule file [default: $XDG_CONFIG_HOME/mailtriage/config.toml]
    #[arg(short, long, env = "MAILTRIAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Mailbox snapshot (JSON) to triage
    #[arg(short, long)]
    pub mailbox: PathBuf,

    /// Evaluate as of this instant (RFC 3339) instead of the wall clock
    #[arg(long, value_parser = parse_instant)]
    pub now: Option<DateTime<Utc>>,

    /// Report what would happen without changing the mailbox
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Write the resulting mailbox to this file
    #[arg(short, long)]
    pub write_back: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config file to load: `--config`, or the per-user default.
    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }
        default_config_path().ok_or_else(|| anyhow!("No config directory; pass --config"))
    }
}

/// `$XDG_CONFIG_HOME/mailtriage/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mailtriage").join("config.toml"))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "mailtriage",
            "--config",
            "rules.toml",
            "--mailbox",
            "box.json",
            "--now",
            "2024-06-01T09:00:00Z",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("rules.toml"));
        assert_eq!(cli.mailbox, PathBuf::from("box.json"));
        assert_eq!(
            cli.now.unwrap(),
            DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z").unwrap()
        );
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert!(cli.write_back.is_none());
    }

    #[test]
    fn test_mailbox_is_required() {
        assert!(Cli::try_parse_from(["mailtriage"]).is_err());
    }

    #[test]
    fn test_bad_instant_rejected() {
        assert!(Cli::try_parse_from(["mailtriage", "-m", "b.json", "--now", "yesterday"]).is_err());
    }

    #[test]
    fn test_default_config_path_shape() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("mailtriage/config.toml"));
        }
    }
}
