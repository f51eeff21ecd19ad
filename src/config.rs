use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Market Auth - sealing market appliance credentials
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// The URL to query the market on
    #[arg(long, env = "MARKET_URI", default_value = "http://localhost:3000", global = true)]
    pub market_uri: String,

    /// Worker repo path; the token file is stored here
    #[arg(
        long,
        env = "LOTUS_WORKER_PATH",
        default_value = "~/.lotusworker",
        global = true
    )]
    pub worker_repo: String,

    /// Seconds between two token checks
    #[arg(long, env = "TOKEN_POLL_INTERVAL", default_value = "600", global = true)]
    pub poll_interval: u64,

    /// Refresh tokens this many seconds before they expire
    #[arg(long, env = "TOKEN_REFRESH_THRESHOLD", default_value = "1800", global = true)]
    pub refresh_threshold: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30", global = true)]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Register this worker using the sealing market's OTP
    Register {
        /// Arguments to search for the OTP (prompted for when empty)
        args: Vec<String>,
    },

    /// Keep the market tokens fresh until interrupted
    Run,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Market
    pub market_uri: String,
    pub working_dir: PathBuf,

    // Token lifecycle
    pub poll_interval: u64,
    pub refresh_threshold: u64,

    // HTTP client
    pub http_timeout: u64,

    // Logging
    pub log_level: String,

    pub command: Command,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self::from_args(CliArgs::parse()))
    }

    pub fn from_args(args: CliArgs) -> Self {
        Config {
            market_uri: args.market_uri,
            working_dir: expand_tilde(&args.worker_repo),
            poll_interval: args.poll_interval,
            refresh_threshold: args.refresh_threshold,
            http_timeout: args.http_timeout,
            log_level: args.log_level,
            command: args.command,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.working_dir.is_dir() {
            anyhow::bail!(
                "Worker repo does not exist: {}",
                self.working_dir.display()
            );
        }

        if self.poll_interval == 0 {
            anyhow::bail!("TOKEN_POLL_INTERVAL must be greater than zero");
        }

        if self.http_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        if self.refresh_threshold < self.poll_interval {
            tracing::warn!(
                "Refresh threshold ({}s) is shorter than the poll interval ({}s); tokens may expire between checks",
                self.refresh_threshold,
                self.poll_interval
            );
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn refresh_threshold(&self) -> chrono::Duration {
        // chrono panics above i64::MAX milliseconds
        let secs = self.refresh_threshold.min((i64::MAX / 1000) as u64) as i64;
        chrono::Duration::seconds(secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// First argument that parses as a UUID
pub fn find_otp(args: &[String]) -> Option<Uuid> {
    args.iter().find_map(|arg| Uuid::parse_str(arg).ok())
}

/// OTP for the register command, prompting when no arguments were given
pub fn resolve_otp(args: &[String]) -> Result<String> {
    if args.is_empty() {
        let input: String = dialoguer::Input::new()
            .with_prompt("Enter the OTP from the Sealing Market")
            .interact_text()
            .context("Failed to read OTP")?;
        let otp = input.trim();
        return Uuid::parse_str(otp)
            .map(|uuid| uuid.to_string())
            .with_context(|| format!("Not a valid OTP: {}", otp));
    }

    find_otp(args).map(|uuid| uuid.to_string()).context(
        "could not find OTP in command line arguments. Please try again with a valid OTP",
    )
}
