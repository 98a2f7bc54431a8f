//! CLI entry point for the persession maintenance tool.

use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::Parser;
use persession::{
    ClassificationRules, CredentialStore, EncryptionKey, Session, SessionConfig, StoredCookie,
};
use tracing::debug;

mod cli;

use cli::{Args, Command, ProbeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = SessionConfig::from_env();
    if let Some(cache) = args.cache {
        config.cache_path = cache;
    }

    match args.command {
        Command::Keys => run_keys(&config),
        Command::Show { key } => run_show(&config, &key),
        Command::Clear { key } => run_clear(&config, &key),
        Command::Probe(probe) => run_probe(config, probe).await,
    }
}

fn open_store(config: &SessionConfig) -> CredentialStore {
    let store = CredentialStore::new(&config.cache_path);
    match &config.encryption_key {
        Some(material) => store.with_encryption_key(EncryptionKey::from_material(material)),
        None => store,
    }
}

fn run_keys(config: &SessionConfig) -> Result<()> {
    let store = open_store(config);
    let keys = store
        .keys()
        .with_context(|| format!("failed to list sessions in {}", store.path().display()))?;
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

fn run_show(config: &SessionConfig, key: &str) -> Result<()> {
    let store = open_store(config);
    let Some(blob) = store
        .load(key)
        .with_context(|| format!("failed to read {}", store.path().display()))?
    else {
        bail!("no session '{key}' in {}", store.path().display());
    };

    println!("session: {key}");
    println!("saved:   {}", format_unix(blob.saved_at));
    println!("headers:");
    for (name, value) in &blob.headers {
        println!("  {name}: {value}");
    }
    println!("cookies:");
    for cookie in &blob.cookies {
        println!("  {}", describe_cookie(cookie));
    }
    Ok(())
}

fn run_clear(config: &SessionConfig, key: &str) -> Result<()> {
    let store = open_store(config);
    let removed = store
        .delete(key)
        .with_context(|| format!("failed to update {}", store.path().display()))?;
    if removed {
        println!("removed session '{key}'");
    } else {
        println!("session '{key}' not found");
    }
    Ok(())
}

async fn run_probe(mut config: SessionConfig, probe: ProbeArgs) -> Result<()> {
    if let Some(key) = probe.key {
        config.key = key;
    }
    if probe.no_redirects {
        config.max_redirects = 0;
    }

    let mut rules = ClassificationRules::new()
        .success_statuses(probe.success_status)
        .failure_statuses(probe.failure_status);
    if let Some(pattern) = &probe.success_body {
        rules = rules.success_body(pattern)?;
    }
    if let Some(pattern) = &probe.failure_body {
        rules = rules.failure_body(pattern)?;
    }
    if let Some(pattern) = &probe.success_url {
        rules = rules.success_url(pattern)?;
    }

    let session = Session::open(config).context("failed to open session")?;
    let state = session
        .probe(&probe.url, &rules)
        .await
        .with_context(|| format!("probe of {} failed", probe.url))?;
    println!("{state}");
    Ok(())
}

fn describe_cookie(cookie: &StoredCookie) -> String {
    let mut line = format!(
        "{}=<redacted> domain={}{} path={}",
        cookie.name,
        if cookie.host_only { "" } else { "." },
        cookie.domain,
        cookie.path
    );
    match cookie.expires {
        Some(expires) => line.push_str(&format!(" expires={}", format_unix(expires))),
        None => line.push_str(" session"),
    }
    if cookie.secure {
        line.push_str(" secure");
    }
    if cookie.http_only {
        line.push_str(" httponly");
    }
    line
}

fn format_unix(secs: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs))
}
