use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Csv,
    Json,
}

/// The two mutually exclusive validation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Iterative per-record queries against every authoritative server.
    Query,
    /// Whole-zone transfers, one authoritative server per zone.
    Transfer,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "dns-drift",
    about = "Detects drift between a DNS record inventory and live authoritative answers"
)]
pub struct Config {
    /// Inventory API base URL
    #[arg(long, env = "NETBOX_URL")]
    pub api_url: String,

    /// Inventory API token
    #[arg(long, env = "NETBOX_TOKEN", hide_env_values = true)]
    pub api_token: String,

    #[arg(long, value_enum, default_value_t = RunMode::Query)]
    pub mode: RunMode,

    /// Only validate records in this zone
    #[arg(long)]
    pub zone: Option<String>,

    /// Only validate records in this view
    #[arg(long)]
    pub view: Option<String>,

    /// Only use nameservers matching this name
    #[arg(long)]
    pub nameserver: Option<String>,

    #[arg(long, default_value = "discrepancies.txt")]
    pub report_file: PathBuf,

    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub report_format: ReportFormat,

    /// File for DNS-only (orphan) records found in transfer mode
    #[arg(long, default_value = "orphans.txt")]
    pub missing_file: PathBuf,

    /// Directory for generated nsupdate scripts
    #[arg(long, default_value = "nsupdate")]
    pub nsupdate_dir: PathBuf,

    /// Ignore serial numbers when comparing SOA records
    #[arg(long)]
    pub ignore_serial_numbers: bool,

    /// Also record successful validations
    #[arg(long)]
    pub record_successful: bool,

    /// Where to write successful validations (JSON); needs --record-successful
    #[arg(long)]
    pub success_file: Option<PathBuf>,

    /// BIND-style TSIG key file for authenticated zone transfers
    #[arg(long, env = "TSIG_KEY_FILE")]
    pub tsig_key_file: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from([
            "dns-drift",
            "--api-url",
            "https://netbox.example.com",
            "--api-token",
            "sekrit",
        ]);
        assert_eq!(config.mode, RunMode::Query);
        assert_eq!(config.report_format, ReportFormat::Table);
        assert_eq!(config.report_file, PathBuf::from("discrepancies.txt"));
        assert!(!config.ignore_serial_numbers);
        assert!(config.tsig_key_file.is_none());
    }

    #[test]
    fn test_transfer_mode_flags() {
        let config = Config::parse_from([
            "dns-drift",
            "--api-url",
            "https://netbox.example.com",
            "--api-token",
            "sekrit",
            "--mode",
            "transfer",
            "--zone",
            "example.com",
            "--tsig-key-file",
            "/etc/transfer.key",
            "--report-format",
            "json",
        ]);
        assert_eq!(config.mode, RunMode::Transfer);
        assert_eq!(config.zone.as_deref(), Some("example.com"));
        assert_eq!(config.report_format, ReportFormat::Json);
    }
}
