/*
 *  media/bridge.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Media status to screen and power: dedup and dispatch on the UI loop
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
use std::path::PathBuf;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::display::scroller::SCROLL_TICK;
use crate::lighting::ArtworkMirror;
use crate::media::{MediaPayload, MediaStatus, PlayState};
use crate::power::PowerSwitch;

/// Capacity of the status channel between a media source and the UI loop.
pub const STATUS_CHANNEL_CAPACITY: usize = 16;

/// What the bridge drives on screen.
pub trait Render {
    /// Show `payload`; returns the cached artwork path when artwork resolved.
    fn render(&mut self, payload: &MediaPayload) -> impl Future<Output = Option<PathBuf>>;

    /// Advance scroll animation by one tick.
    fn tick(&mut self);
}

/// Turns a stream of media statuses into power switching and renders.
///
/// Consecutive identical payloads render once. Power follows edges between
/// active and inactive play states: on when leaving `Unknown`, off when
/// entering it.
pub struct MediaBridge<P: PowerSwitch, R: Render> {
    power: P,
    renderer: R,
    mirror: Option<Box<dyn ArtworkMirror>>,
    previous_payload: Option<MediaPayload>,
    previous_state: PlayState,
}

impl<P: PowerSwitch, R: Render> MediaBridge<P, R> {
    pub fn new(power: P, renderer: R) -> Self {
        MediaBridge {
            power,
            renderer,
            mirror: None,
            previous_payload: None,
            previous_state: PlayState::Unknown,
        }
    }

    pub fn with_mirror(mut self, mirror: impl ArtworkMirror + 'static) -> Self {
        self.mirror = Some(Box::new(mirror));
        self
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn previous_state(&self) -> PlayState {
        self.previous_state
    }

    pub async fn handle_status(&mut self, status: &MediaStatus) {
        let Some(state) = status.play_state() else {
            error!("`player_state` in unexpected state: `{}`", status.player_state);
            return;
        };

        if state.is_active() {
            if !self.previous_state.is_active() {
                info!("Player state is `{}`. Switching on", state.as_str());
                let force = self.previous_state == PlayState::Unknown;
                if let Err(e) = self.power.switch_on(force) {
                    error!("Unable to switch display on: `{} - {}`", e.kind(), e);
                }
            }

            let payload = MediaPayload::from_status(status);
            if self.previous_payload.as_ref() == Some(&payload) {
                debug!("No change to core payload");
            } else {
                info!("Now showing `{}` by `{}`", payload.media_title, payload.media_artist);
                let artwork = self.renderer.render(&payload).await;
                if let (Some(mirror), Some(path)) = (&self.mirror, artwork) {
                    mirror.mirror(payload.album_or_title(), path);
                }
                self.previous_payload = Some(payload);
            }
        } else if self.previous_state.is_active() {
            info!("Player state is `{}`. Switching off", state.as_str());
            if let Err(e) = self.power.switch_off(true) {
                error!("Unable to switch display off: `{} - {}`", e.kind(), e);
            }
        } else {
            debug!("Player state is `{}`, display already off", state.as_str());
        }

        self.previous_state = state;
    }

    pub fn tick(&mut self) {
        self.renderer.tick();
    }

    /// Single consumer of media statuses, interleaved with scroll ticks.
    /// Returns when `stop` fires or every status sender is gone.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MediaStatus>, mut stop: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(SCROLL_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                status = rx.recv() => match status {
                    Some(status) => self.handle_status(&status).await,
                    None => {
                        info!("Media status channel closed.");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick(),
                _ = stop.recv() => {
                    debug!("UI loop received stop signal. Exiting.");
                    break;
                }
            }
        }
    }
}
