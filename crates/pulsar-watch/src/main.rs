//! # pulsar-watch
//!
//! Tails the Pulsar dashboard event stream: connects with the layered
//! settings, prints every envelope of the selected categories and reports
//! connection changes on stderr.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use pulsar_realtime::{
    ClientEvent, Envelope, EventCategory, RealtimeClient, StaticToken, TokenFile,
};
use pulsar_settings::{PulsarSettings, load_settings, load_settings_from_path};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Watch Pulsar dashboard events.
#[derive(Parser, Debug)]
#[command(name = "pulsar-watch", about = "Watch Pulsar dashboard events")]
struct Cli {
    /// Settings file (defaults to `~/.pulsar/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Base WebSocket address, e.g. `ws://localhost:8080`.
    #[arg(long)]
    url: Option<String>,

    /// Path appended to the base address.
    #[arg(long)]
    path: Option<String>,

    /// Session token.
    #[arg(long, conflicts_with = "token_file")]
    token: Option<String>,

    /// File holding the session token, re-read on every connection attempt.
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Category to print; repeat for several. Defaults to every known category.
    #[arg(long = "category", value_name = "CATEGORY")]
    categories: Vec<String>,

    /// Print raw envelopes as JSON lines.
    #[arg(long)]
    json: bool,

    /// Log level (overrides settings and `PULSAR_LOG_LEVEL`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<PulsarSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => load_settings().context("failed to load settings")?,
        };
        self.apply_overrides(&mut settings);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut PulsarSettings) {
        if let Some(url) = &self.url {
            settings.realtime.url.clone_from(url);
        }
        if let Some(path) = &self.path {
            settings.realtime.path.clone_from(path);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }

    fn categories(&self) -> Vec<EventCategory> {
        if self.categories.is_empty() {
            EventCategory::KNOWN.to_vec()
        } else {
            self.categories.iter().map(|c| EventCategory::from(c.as_str())).collect()
        }
    }
}

/// One human-readable line per envelope.
fn format_line(envelope: &Envelope) -> String {
    let time = envelope
        .time()
        .map_or_else(|| envelope.timestamp().to_string(), |t| t.to_rfc3339());
    format!(
        "{time} {} project={} {}",
        envelope.category(),
        envelope.project_id(),
        envelope.data()
    )
}

fn print_envelope(envelope: &Envelope, json: bool) {
    if !json {
        println!("{}", format_line(envelope));
        return;
    }
    match envelope.encode() {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to encode envelope"),
    }
}

fn report(event: &ClientEvent) {
    match event {
        ClientEvent::Connected { generation } => info!(generation, "connected"),
        ClientEvent::Disconnected => info!("disconnected"),
        ClientEvent::ConnectionLost { reason } => warn!(reason, "connection lost"),
        ClientEvent::ReconnectScheduled { attempt, delay } => {
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        }
        ClientEvent::RetriesExhausted { attempts } => error!(attempts, "giving up"),
        ClientEvent::MalformedFrame { error } => warn!(error, "malformed frame"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    if settings.logging.json {
        pulsar_logging::init_json_subscriber(&settings.logging.level);
    } else {
        pulsar_logging::init_subscriber(&settings.logging.level);
    }

    let mut builder = RealtimeClient::builder(settings.realtime.clone());
    if let Some(token) = &cli.token {
        builder = builder.credentials(StaticToken(token.clone()));
    } else if let Some(path) = &cli.token_file {
        builder = builder.credentials(TokenFile::new(path));
    }
    let client = builder.build().context("failed to start realtime client")?;

    let mut lifecycle = client.events();
    let mut envelopes =
        futures::stream::select_all(cli.categories().into_iter().map(|c| client.stream(c)));
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    client.connect();
    let outcome = loop {
        tokio::select! {
            Some(envelope) = envelopes.next() => print_envelope(&envelope, cli.json),
            event = lifecycle.recv() => match event {
                Ok(ClientEvent::RetriesExhausted { attempts }) => {
                    report(&ClientEvent::RetriesExhausted { attempts });
                    break Err(attempts);
                }
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "lifecycle events dropped"),
                Err(RecvError::Closed) => break Ok(()),
            },
            res = &mut interrupted => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("interrupted, shutting down");
                break Ok(());
            }
        }
    };

    client.shutdown().await;
    if let Err(attempts) = outcome {
        bail!("connection failed after {attempts} reconnection attempts");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pulsar-watch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_watch_every_known_category() {
        let cli = parse(&[]);
        assert_eq!(cli.categories(), EventCategory::KNOWN.to_vec());
        assert!(!cli.json);
    }

    #[test]
    fn repeated_categories() {
        let cli = parse(&["--category", "pr_opened", "--category", "deploy_done"]);
        assert_eq!(
            cli.categories(),
            vec![
                EventCategory::PrOpened,
                EventCategory::Other("deploy_done".into())
            ]
        );
    }

    #[test]
    fn overrides_apply_over_settings() {
        let cli = parse(&["--url", "wss://pulsar.example", "--path", "/events", "--log-level", "debug"]);
        let mut settings = PulsarSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.realtime.url, "wss://pulsar.example");
        assert_eq!(settings.realtime.path, "/events");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn token_and_token_file_conflict() {
        let result = Cli::try_parse_from(["pulsar-watch", "--token", "t", "--token-file", "/tmp/t"]);
        assert!(result.is_err());
    }

    #[test]
    fn settings_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"realtime": {"path": "/live"}}"#).unwrap();

        let cli = parse(&["--settings", path.to_str().unwrap(), "--url", "ws://h:1"]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.realtime.path, "/live");
        assert_eq!(settings.realtime.url, "ws://h:1");
    }

    #[test]
    fn line_format() {
        let env = Envelope::new(EventCategory::PrMerged, "p1", json!({"pr_number": 3}), 0);
        assert_eq!(
            format_line(&env),
            r#"1970-01-01T00:00:00+00:00 pr_merged project=p1 {"pr_number":3}"#
        );
    }
}
