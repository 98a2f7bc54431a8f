//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and maintain persisted HTTP sessions.
///
/// Persession keeps cookies and default headers for HTTP sessions in a cache
/// file. This tool lists, shows, clears, and probes the sessions in that file.
#[derive(Parser, Debug)]
#[command(name = "persession")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Cache file (default: $PERSESSION_CACHE_PATH, then the per-user cache directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Maintenance commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List session keys in the cache file
    Keys,

    /// Show one session's saved time, headers and cookies (values redacted)
    Show {
        /// Session key
        key: String,
    },

    /// Delete one session from the cache file
    Clear {
        /// Session key
        key: String,
    },

    /// Probe a URL with a cached session and print its login state
    Probe(ProbeArgs),
}

/// Arguments for `probe`.
#[derive(clap::Args, Debug)]
pub struct ProbeArgs {
    /// URL to GET
    pub url: String,

    /// Session key (default: $PERSESSION_KEY, then "default")
    #[arg(long)]
    pub key: Option<String>,

    /// Status code meaning logged in (repeatable)
    #[arg(long = "success-status", value_name = "CODE", value_parser = clap::value_parser!(u16).range(100..=599))]
    pub success_status: Vec<u16>,

    /// Status code meaning logged out (repeatable)
    #[arg(long = "failure-status", value_name = "CODE", value_parser = clap::value_parser!(u16).range(100..=599))]
    pub failure_status: Vec<u16>,

    /// Body regex meaning logged in
    #[arg(long = "success-body", value_name = "REGEX")]
    pub success_body: Option<String>,

    /// Body regex meaning logged out
    #[arg(long = "failure-body", value_name = "REGEX")]
    pub failure_body: Option<String>,

    /// Final-URL regex meaning logged in
    #[arg(long = "success-url", value_name = "REGEX")]
    pub success_url: Option<String>,

    /// Do not follow redirects (use with --success-status 302)
    #[arg(long)]
    pub no_redirects: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_keys_parses_with_defaults() {
        let args = Args::try_parse_from(["persession", "keys"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.cache.is_none());
        assert!(matches!(args.command, Command::Keys));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["persession", "-vv", "keys"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["persession", "keys", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Args::try_parse_from(["persession", "-q", "-v", "keys"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_cache_path_is_global() {
        let args = Args::try_parse_from(["persession", "show", "alice", "--cache", "/tmp/s.json"])
            .unwrap();
        assert_eq!(args.cache, Some(PathBuf::from("/tmp/s.json")));
        assert!(matches!(args.command, Command::Show { ref key } if key == "alice"));
    }

    #[test]
    fn test_cli_probe_collects_repeated_statuses() {
        let args = Args::try_parse_from([
            "persession",
            "probe",
            "https://example.com/account",
            "--key",
            "alice",
            "--success-status",
            "200",
            "--success-status",
            "204",
            "--failure-status",
            "401",
            "--success-body",
            "Sign out",
        ])
        .unwrap();
        let Command::Probe(probe) = args.command else {
            panic!("expected probe command");
        };
        assert_eq!(probe.url, "https://example.com/account");
        assert_eq!(probe.key.as_deref(), Some("alice"));
        assert_eq!(probe.success_status, vec![200, 204]);
        assert_eq!(probe.failure_status, vec![401]);
        assert_eq!(probe.success_body.as_deref(), Some("Sign out"));
        assert!(!probe.no_redirects);
    }

    #[test]
    fn test_cli_probe_rejects_out_of_range_status() {
        let result =
            Args::try_parse_from(["persession", "probe", "https://x", "--success-status", "42"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["persession"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["persession", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
