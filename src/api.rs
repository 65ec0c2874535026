/*
 *  api.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  HTTP control surface: CRT power and mirroring switches
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

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::power::{PowerController, PowerError, PowerSwitch};
use crate::state_store::{CRT_STATE, MIRROR_STATE, StateStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
    pub power: PowerController,
}

/// Any failure answers 500 with the error text.
#[derive(Debug)]
pub struct ApiError(String);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(format!("{} - {}", e.kind(), e))
    }
}

impl From<PowerError> for ApiError {
    fn from(e: PowerError) -> Self {
        ApiError(format!("{} - {}", e.kind(), e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("API request failed: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

type Page = Result<Html<String>, ApiError>;

fn on_off(on: bool) -> &'static str {
    if on { "On" } else { "Off" }
}

fn set_crt(app: &AppState, on: bool) -> Page {
    app.store.set(&CRT_STATE, Value::Bool(on))?;
    confirm_crt(app, on)
}

fn confirm_crt(app: &AppState, on: bool) -> Page {
    if on {
        app.power.switch_on(false)?;
    } else {
        app.power.switch_off(false)?;
    }
    Ok(Html(format!("<p>CRT {}</p>", on_off(on))))
}

fn mirror_page(on: bool) -> Page {
    Ok(Html(format!("<p>Mirror Control {}</p>", on_off(on))))
}

pub async fn crt_on(State(app): State<AppState>) -> Page {
    info!("API hit on `/crt/on`");
    set_crt(&app, true)
}

pub async fn crt_off(State(app): State<AppState>) -> Page {
    info!("API hit on `/crt/off`");
    set_crt(&app, false)
}

pub async fn crt_toggle(State(app): State<AppState>) -> Page {
    info!("API hit on `/crt/toggle`");
    let on = app.store.toggle(&CRT_STATE)?;
    confirm_crt(&app, on)
}

pub async fn mirror_on(State(app): State<AppState>) -> Page {
    info!("API hit on `/mirror/on`");
    app.store.set(&MIRROR_STATE, Value::Bool(true))?;
    mirror_page(true)
}

pub async fn mirror_off(State(app): State<AppState>) -> Page {
    info!("API hit on `/mirror/off`");
    app.store.set(&MIRROR_STATE, Value::Bool(false))?;
    mirror_page(false)
}

pub async fn mirror_toggle(State(app): State<AppState>) -> Page {
    info!("API hit on `/mirror/toggle`");
    let on = app.store.toggle(&MIRROR_STATE)?;
    mirror_page(on)
}

pub async fn state(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(app.store.document()?))
}

pub fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/crt/on", get(crt_on))
        .route("/crt/off", get(crt_off))
        .route("/crt/toggle", get(crt_toggle))
        .route("/mirror/on", get(mirror_on))
        .route("/mirror/off", get(mirror_off))
        .route("/mirror/toggle", get(mirror_toggle))
        .route("/state", get(state))
        .with_state(app)
}

/// Serve until `stop` fires or its sender is dropped.
pub async fn serve(app: AppState, port: u16, mut stop: mpsc::Receiver<()>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control surface listening on http://{}", addr);

    axum::serve(listener, build_router(app))
        .with_graceful_shutdown(async move {
            stop.recv().await;
        })
        .await
}
