/*
 *  main.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
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

use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use local_ip_address::local_ip;
use log::{error, info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

use crtmirror::api::{self, AppState};
use crtmirror::artwork::{ArtworkCache, HttpFetcher};
use crtmirror::config::{self, Config};
use crtmirror::display::{DisplayDriver, DisplayRenderer, FbdevDriver, MockDriver};
use crtmirror::lighting::{LightingMirror, NanoleafClient};
use crtmirror::media::bridge::{MediaBridge, STATUS_CHANNEL_CAPACITY};
use crtmirror::media::hass::HassSource;
use crtmirror::media::source::run_connection;
use crtmirror::power::{PowerController, open_line};
use crtmirror::state_store::StateStore;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const HEADLESS_SIZE: (u32, u32) = (640, 480);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Waits for SIGINT, SIGTERM or SIGHUP.
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

fn open_driver(cfg: &Config) -> anyhow::Result<Box<dyn DisplayDriver>> {
    if cfg.headless() {
        let (w, h) = cfg.display_size().unwrap_or(HEADLESS_SIZE);
        info!("Headless display {}x{}", w, h);
        return Ok(Box::new(MockDriver::new(w, h)));
    }

    let device = cfg.display_device();
    let driver = FbdevDriver::open(&device)
        .with_context(|| format!("opening framebuffer {}", device.display()))?;
    Ok(Box::new(driver))
}

fn lighting_mirror(cfg: &Config, store: &StateStore) -> Option<LightingMirror> {
    let (host, token) = cfg.lighting()?;
    match NanoleafClient::new(host, token) {
        Ok(client) => Some(LightingMirror::new(client, store.clone())),
        Err(e) => {
            warn!("Lighting disabled: `{} - {}`", e.kind(), e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} - now playing, on glass", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let state_path = cfg.state_file();
    let store = StateStore::open(&state_path)
        .with_context(|| format!("loading config document {}", state_path.display()))?;

    let power = PowerController::new(store.clone(), open_line(cfg.crt_pin));
    if !power.has_hardware() {
        info!("CRT power line not wired, switching is logged only");
    }

    let cache = ArtworkCache::new(cfg.artwork_dir(), HttpFetcher::new()?)?;
    let renderer = DisplayRenderer::new(open_driver(&cfg)?, cache)?;

    let mut bridge = MediaBridge::new(power.clone(), renderer);
    if let Some(mirror) = lighting_mirror(&cfg, &store) {
        info!("Mirroring artwork colours to lighting");
        bridge = bridge.with_mirror(mirror);
    }

    // media source -> UI loop
    let url = cfg.source_url().unwrap_or_default();
    let source = HassSource::new(url, cfg.source_token(), cfg.poll_ms())?;
    let (status_tx, status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
    let (source_stop_tx, source_stop_rx) = mpsc::channel(1);
    let connection = tokio::spawn(run_connection(
        source,
        cfg.cast_name().to_string(),
        status_tx,
        source_stop_rx,
    ));
    info!("Following `{}` via {}", cfg.cast_name(), url);

    // control surface
    let port = cfg.api_port();
    let (api_stop_tx, api_stop_rx) = mpsc::channel(1);
    let app = AppState { store: store.clone(), power };
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(app, port, api_stop_rx).await {
            error!("Control surface failed: {}", e);
        }
    });
    match local_ip() {
        Ok(inet) => info!("Control surface at http://{}:{}/crt/toggle", inet, port),
        Err(e) => warn!("Unable to determine local address: {}", e),
    }

    // the UI stop sender lives until shutdown so the loop ends on signal or closed channel
    let (_ui_stop_tx, ui_stop_rx) = mpsc::channel(1);
    tokio::select! {
        _ = bridge.run(status_rx, ui_stop_rx) => {
            warn!("UI loop ended");
        }
        result = signal_handler() => {
            if let Err(e) = result {
                error!("Unable to install signal handlers: {}", e);
            }
        }
    }

    let _ = source_stop_tx.send(()).await;
    let _ = api_stop_tx.send(()).await;
    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = connection.await;
        let _ = api_task.await;
    })
    .await
    .is_err()
    {
        warn!("Background tasks did not stop within {:?}", SHUTDOWN_GRACE);
    }

    info!("Bye");
    Ok(())
}
