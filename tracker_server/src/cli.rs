use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tracker", version, about = "Knowledge tracker web app")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default if no subcommand given).
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value = "3000")]
        port: u16,

        /// Local data directory (SQLite db when DATABASE_URL is unset).
        #[arg(long, env = "TRACKER_DATA_DIR", default_value = ".tracker_dev")]
        data_dir: PathBuf,
    },

    /// Apply the schema to the configured database.
    Migrate {
        /// Postgres URL override (else DATABASE_URL, else the local SQLite db).
        #[arg(long)]
        database_url: Option<String>,

        #[arg(long, env = "TRACKER_DATA_DIR", default_value = ".tracker_dev")]
        data_dir: PathBuf,
    },

    /// Print current configuration (redacted secrets).
    Config {
        #[arg(long, env = "TRACKER_DATA_DIR", default_value = ".tracker_dev")]
        data_dir: PathBuf,
    },

    /// Health check the configured database.
    Check {
        #[arg(long, env = "TRACKER_DATA_DIR", default_value = ".tracker_dev")]
        data_dir: PathBuf,
    },
}

impl Cli {
    /// The requested subcommand. A bare `tracker` is parsed again as `tracker
    /// serve` so `HOST`, `PORT` and `TRACKER_DATA_DIR` still apply.
    pub fn into_command(self) -> Result<Commands, clap::Error> {
        match self.command {
            Some(cmd) => Ok(cmd),
            None => Self::try_parse_from(["tracker", "serve"])?
                .command
                .ok_or_else(|| clap::Error::new(clap::error::ErrorKind::MissingSubcommand)),
        }
    }
}

/// Keep the first and last four characters of long secrets.
pub fn redact(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_optional() {
        let cli = Cli::try_parse_from(["tracker"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["tracker", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: 8080, .. })));
    }

    #[test]
    fn bare_invocation_becomes_serve() {
        let cmd = Cli::try_parse_from(["tracker"])
            .unwrap()
            .into_command()
            .unwrap();
        assert!(matches!(cmd, Commands::Serve { .. }));

        let cmd = Cli::try_parse_from(["tracker", "check"])
            .unwrap()
            .into_command()
            .unwrap();
        assert!(matches!(cmd, Commands::Check { .. }));
    }

    #[test]
    fn short_secrets_are_fully_hidden() {
        assert_eq!(redact("jus-sth"), "***");
        assert_eq!(redact("postgres://user:pw@db/x"), "post***db/x");
    }
}
