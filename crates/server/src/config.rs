//! Server configuration.
//!
//! Settings come from an optional TOML file, overridden by environment
//! variables and CLI flags (clap handles both).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text (development).
    Text,
    /// JSON structured logging (production).
    Json,
    /// JSON when stdout is not a terminal, text otherwise.
    Auto,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Address handed to clients asking for a game server.
    #[serde(default = "default_game_server_address")]
    pub game_server_address: String,
    /// Start with logins restricted to admin and beta-tester accounts.
    #[serde(default)]
    pub restrict_logins: bool,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_game_server_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Auto
}

/// Command-line interface. Flags override the config file.
#[derive(Debug, Parser)]
#[command(name = "relto-auth", about = "Relto shard auth daemon", version)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "RELTO_CONFIG")]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "RELTO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address handed to clients asking for a game server.
    #[arg(long, env = "RELTO_GAME_SERVER")]
    pub game_server_address: Option<String>,

    /// Start with logins restricted to admin and beta-tester accounts.
    #[arg(long)]
    pub restrict_logins: bool,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Resolves the effective configuration: file first, then overrides.
    pub fn resolve(self) -> Result<Config, String> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
                toml::from_str(&text)
                    .map_err(|err| format!("cannot parse {}: {err}", path.display()))?
            }
            None => Config {
                database_url: String::new(),
                game_server_address: default_game_server_address(),
                restrict_logins: false,
                log_format: default_log_format(),
            },
        };

        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }
        if let Some(game_server_address) = self.game_server_address {
            config.game_server_address = game_server_address;
        }
        if self.restrict_logins {
            config.restrict_logins = true;
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }

        if config.database_url.is_empty() {
            return Err(
                "no database URL; set --database-url, RELTO_DATABASE_URL, or the config file"
                    .to_string(),
            );
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> Cli {
        Cli {
            config: None,
            database_url: None,
            game_server_address: None,
            restrict_logins: false,
            log_format: None,
        }
    }

    #[test]
    fn test_database_url_is_required() {
        assert!(bare_cli().resolve().is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli {
            database_url: Some("postgres://relto@localhost/relto".to_string()),
            restrict_logins: true,
            log_format: Some(LogFormat::Json),
            ..bare_cli()
        };
        let config = cli.resolve().expect("config resolves");
        assert_eq!(config.database_url, "postgres://relto@localhost/relto");
        assert!(config.restrict_logins);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.game_server_address, "127.0.0.1");
    }

    #[test]
    fn test_config_file_parse() {
        let config: Config = toml::from_str(
            r#"
            database_url = "postgres://relto@db/relto"
            game_server_address = "10.0.0.7"
            log_format = "text"
            "#,
        )
        .expect("toml parses");
        assert_eq!(config.game_server_address, "10.0.0.7");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.restrict_logins);
    }
}
