//! Text input for UI events
//!
//! Parses lines like "tap", "left", "right", "quit" or
//! "fling 100 400 300 410 900 20" into [`UiEvent`]s and forwards them to the
//! UI-event loop.

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::analysis::{Fling, Swipe};
use crate::shared::UiEvent;

/// Parses an event line. Keywords are case-insensitive.
pub fn parse_event(line: &str) -> Result<UiEvent> {
    let mut parts = line.split_whitespace();
    let keyword = parts
        .next()
        .ok_or_else(|| anyhow!("Empty event line"))?
        .to_uppercase();

    let event = match keyword.as_str() {
        "TAP" | "T" => UiEvent::Tap,
        "LEFT" | "L" => UiEvent::Swipe(Swipe::Left),
        "RIGHT" | "R" => UiEvent::Swipe(Swipe::Right),
        "QUIT" | "Q" | "EXIT" => UiEvent::Quit,
        "FLING" => {
            let values = parts
                .by_ref()
                .map(|p| match p.parse::<f32>() {
                    Ok(value) if value.is_finite() => Ok(value),
                    Ok(_) => Err(anyhow!("Non-finite number {:?}", p)),
                    Err(e) => Err(anyhow!("Invalid number {:?}: {}", p, e)),
                })
                .collect::<Result<Vec<f32>>>()?;
            let &[x1, y1, x2, y2, vx, vy] = values.as_slice() else {
                return Err(anyhow!(
                    "fling expects 6 numbers (x1 y1 x2 y2 vx vy), got {}",
                    values.len()
                ));
            };
            return Ok(UiEvent::Fling(Fling {
                start: (x1, y1),
                end: (x2, y2),
                velocity: (vx, vy),
            }));
        }
        _ => return Err(anyhow!("Unknown event: {}", keyword.to_lowercase())),
    };

    if let Some(extra) = parts.next() {
        return Err(anyhow!("Unexpected argument {:?}", extra));
    }
    Ok(event)
}

/// Read events until end of input or `quit`.
/// Bad lines are logged and skipped. Returns when the receiver is gone.
pub fn pump_events<R: BufRead>(reader: R, sender: &Sender<UiEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_event(&line) {
            Ok(event) => {
                let quit = event == UiEvent::Quit;
                if sender.send(event).is_err() || quit {
                    return;
                }
            }
            Err(e) => warn!("Ignoring input {:?}: {}", line.trim(), e),
        }
    }
    debug!("Input closed");
    let _ = sender.send(UiEvent::Quit);
}

/// Forward stdin events on a background thread
pub fn spawn_stdin_reader(sender: Sender<UiEvent>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-input".to_string())
        .spawn(move || pump_events(std::io::stdin().lock(), &sender))
}
