/*
 *  media/source.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Media source seam and the retry-forever connection pump
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::MediaStatus;

/// Fixed delay between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no media player named `{0}`")]
    NotFound(String),
    #[error("invalid source setting: {0}")]
    Config(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Http(_) => "Http",
            SourceError::Json(_) => "Json",
            SourceError::NotFound(_) => "NotFound",
            SourceError::Config(_) => "Config",
        }
    }
}

/// A connected listener on one media player.
pub trait MediaSession: Send {
    /// Make the next `next_status` emit even when nothing changed.
    fn request_status(&mut self);

    /// Next changed status; `Ok(None)` when the session has ended.
    fn next_status(&mut self) -> impl Future<Output = Result<Option<MediaStatus>, SourceError>> + Send;
}

/// Finds a media player by its friendly name.
pub trait MediaSource: Send + Sync {
    type Session: MediaSession;

    fn discover(&self, name: &str) -> impl Future<Output = Result<Self::Session, SourceError>> + Send;
}

enum PumpEnd {
    SessionEnded,
    ConsumerGone,
}

async fn pump<S: MediaSource>(
    source: &S,
    name: &str,
    tx: &mpsc::Sender<MediaStatus>,
) -> Result<PumpEnd, SourceError> {
    info!("Connecting to media player `{}`...", name);
    let mut session = source.discover(name).await?;
    info!("Connected to media player `{}`", name);

    session.request_status();
    while let Some(status) = session.next_status().await? {
        if tx.send(status).await.is_err() {
            return Ok(PumpEnd::ConsumerGone);
        }
    }
    Ok(PumpEnd::SessionEnded)
}

/// Keep a session to `name` alive, forwarding statuses to `tx`, until `stop`
/// fires or its sender is dropped.
pub async fn run_connection<S: MediaSource>(
    source: S,
    name: String,
    tx: mpsc::Sender<MediaStatus>,
    stop: mpsc::Receiver<()>,
) {
    run_connection_with_delay(source, name, tx, stop, RECONNECT_DELAY).await
}

/// [`run_connection`] with an explicit backoff.
pub async fn run_connection_with_delay<S: MediaSource>(
    source: S,
    name: String,
    tx: mpsc::Sender<MediaStatus>,
    mut stop: mpsc::Receiver<()>,
    delay: Duration,
) {
    loop {
        tokio::select! {
            result = pump(&source, &name, &tx) => match result {
                Ok(PumpEnd::ConsumerGone) => {
                    info!("Status consumer closed, stopping connection to `{}`", name);
                    return;
                }
                Ok(PumpEnd::SessionEnded) => warn!("Session with `{}` ended", name),
                Err(e) => error!("Media player `{}`: {} - {}", name, e.kind(), e),
            },
            _ = stop.recv() => {
                debug!("Connection loop received stop signal. Exiting.");
                return;
            }
        }

        info!("Retrying `{}` in {}s", name, delay.as_secs_f32());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.recv() => {
                debug!("Connection loop stopped during backoff.");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedSession {
        statuses: VecDeque<MediaStatus>,
        refreshed: bool,
    }

    impl MediaSession for ScriptedSession {
        fn request_status(&mut self) {
            self.refreshed = true;
        }

        async fn next_status(&mut self) -> Result<Option<MediaStatus>, SourceError> {
            assert!(self.refreshed, "refresh must be requested before pumping");
            Ok(self.statuses.pop_front())
        }
    }

    /// Fails `failures` discoveries, then hands out one status per session.
    struct FlakySource {
        failures: usize,
        attempts: Arc<AtomicUsize>,
        titles: Arc<Mutex<VecDeque<&'static str>>>,
    }

    impl MediaSource for FlakySource {
        type Session = ScriptedSession;

        async fn discover(&self, name: &str) -> Result<ScriptedSession, SourceError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(SourceError::NotFound(name.to_string()));
            }
            let title = self.titles.lock().unwrap().pop_front();
            let statuses = title
                .map(|t| MediaStatus {
                    title: Some(t.to_string()),
                    player_state: "PLAYING".into(),
                    ..Default::default()
                })
                .into_iter()
                .collect();
            Ok(ScriptedSession { statuses, refreshed: false })
        }
    }

    #[tokio::test]
    async fn test_retries_until_connected() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures: 2,
            attempts: attempts.clone(),
            titles: Arc::new(Mutex::new(VecDeque::from(["one", "two"]))),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(run_connection_with_delay(
            source,
            "Hi-fi System".into(),
            tx,
            stop_rx,
            Duration::from_millis(5),
        ));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.title.as_deref(), Some("one"));
        assert_eq!(second.title.as_deref(), Some("two"));
        // two failures, then one attempt per session
        assert!(attempts.load(Ordering::SeqCst) >= 4);

        stop_tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_backoff() {
        let source = FlakySource {
            failures: usize::MAX,
            attempts: Arc::new(AtomicUsize::new(0)),
            titles: Arc::new(Mutex::new(VecDeque::new())),
        };
        let (tx, _rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(run_connection(source, "nowhere".into(), tx, stop_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(stop_tx);

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_consumer_gone_ends_loop() {
        let source = FlakySource {
            failures: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
            titles: Arc::new(Mutex::new(VecDeque::from(["one"]))),
        };
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_stop_tx, stop_rx) = mpsc::channel(1);

        tokio::time::timeout(
            Duration::from_secs(1),
            run_connection_with_delay(source, "x".into(), tx, stop_rx, Duration::from_secs(60)),
        )
        .await
        .unwrap();
    }
}
