//! `faceid watch`: drive the live recognizer from detector output.
//!
//! The detector writes one JSON [`FrameObservation`] per line. A reader
//! thread parses them into a bounded channel; the tick loop wakes every
//! interval, takes the newest observation and prints what changed.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use faceid_core::{FrameObservation, Label, LiveConfig, LiveRecognizer, TickOutcome};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;

use crate::client::ApiClient;

pub struct WatchOptions {
    /// Observation source; stdin when `None` or `-`.
    pub input: Option<PathBuf>,
    pub config: LiveConfig,
    /// Refetch the gallery this often; never when `None`.
    pub refresh: Option<Duration>,
    /// Print every tick as a JSON line instead of text.
    pub json: bool,
}

/// Parse a `WIDTHxHEIGHT` display size.
pub fn parse_display(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid dimension {s:?}"))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Spawn the observation reader on a dedicated OS thread.
fn spawn_reader(input: Option<PathBuf>) -> Result<mpsc::Receiver<FrameObservation>> {
    let source: Box<dyn BufRead + Send> = match input {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let (tx, rx) = mpsc::channel::<FrameObservation>(1);
    std::thread::Builder::new()
        .name("faceid-reader".into())
        .spawn(move || {
            for (n, line) in source.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "input read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FrameObservation>(&line) {
                    Ok(obs) => {
                        if tx.blocking_send(obs).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping bad observation"),
                }
            }
            tracing::debug!("reader thread exiting");
        })
        .context("failed to spawn reader thread")?;
    Ok(rx)
}

/// Newest queued observation, and whether the input has ended.
fn drain_latest(rx: &mut mpsc::Receiver<FrameObservation>) -> (Option<FrameObservation>, bool) {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(obs) => latest = Some(obs),
            Err(TryRecvError::Empty) => return (latest, false),
            Err(TryRecvError::Disconnected) => return (latest, true),
        }
    }
}

/// Human-readable lines for what changed on a tick.
pub fn render(outcome: &TickOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    if outcome.changed {
        lines.push(match &outcome.label {
            Some(Label::Known { name, distance }) => format!("face: {name} (distance {distance:.3})"),
            Some(Label::Unknown) => "face: Unknown".to_string(),
            None => "face: none".to_string(),
        });
        if let Some(overlay) = &outcome.overlay {
            let r = &overlay.rect;
            lines.push(format!(
                "  box: x={:.0} y={:.0} w={:.0} h={:.0} {} label@({:.0},{:.0})",
                r.x,
                r.y,
                r.width,
                r.height,
                overlay.tone.color(),
                overlay.label_x,
                overlay.label_y
            ));
        }
    }
    if outcome.warning_changed {
        lines.push(match outcome.warning {
            Some(w) => format!("warning: {}", w.message()),
            None => "warning cleared".to_string(),
        });
    }
    lines
}

pub async fn run(client: &ApiClient, opts: WatchOptions) -> Result<()> {
    let gallery = client.list_people().await?;
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be Unknown");
    }
    tracing::info!(people = gallery.len(), "gallery loaded");

    let mut recognizer = LiveRecognizer::new(opts.config, gallery);
    let mut rx = spawn_reader(opts.input)?;

    let mut ticker = tokio::time::interval(recognizer.config().interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let refresh_every = opts.refresh.unwrap_or(Duration::from_secs(3600));
    let mut refresh = tokio::time::interval_at(tokio::time::Instant::now() + refresh_every, refresh_every);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            _ = refresh.tick(), if opts.refresh.is_some() => {
                match client.list_people().await {
                    Ok(people) => {
                        tracing::info!(people = people.len(), "gallery refreshed");
                        recognizer.set_gallery(people);
                    }
                    Err(e) => tracing::warn!(error = %e, "gallery refresh failed"),
                }
            }
            _ = ticker.tick() => {
                let (latest, ended) = drain_latest(&mut rx);
                if let Some(obs) = latest {
                    let outcome = recognizer.observe(&obs);
                    if opts.json {
                        println!("{}", serde_json::to_string(&outcome)?);
                    } else {
                        for line in render(&outcome) {
                            println!("{line}");
                        }
                    }
                }
                if ended {
                    tracing::info!("input ended");
                    break;
                }
            }
        }
    }
    Ok(())
}
