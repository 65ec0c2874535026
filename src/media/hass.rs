/*
 *  media/hass.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Home Assistant media_player polling source
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

use log::{debug, info};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;

use crate::media::source::{MediaSession, MediaSource, SourceError};
use crate::media::{MediaImage, MediaStatus};

const MEDIA_PLAYER_DOMAIN: &str = "media_player.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HassAttributes {
    pub friendly_name: Option<String>,
    pub media_title: Option<String>,
    pub media_artist: Option<String>,
    pub media_album_name: Option<String>,
    pub entity_picture: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HassEntity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HassAttributes,
}

/// Home Assistant `media_player` states onto receiver player states.
/// Unrecognised states pass through so the bridge can report them.
pub fn map_state(state: &str) -> String {
    match state {
        "playing" => "PLAYING",
        "paused" => "PAUSED",
        "buffering" => "BUFFERING",
        "idle" | "on" => "IDLE",
        "off" | "standby" | "unavailable" | "unknown" => "UNKNOWN",
        other => other,
    }
    .to_string()
}

/// First media player whose friendly name matches, ignoring case.
pub fn find_player<'a>(entities: &'a [HassEntity], name: &str) -> Option<&'a HassEntity> {
    entities.iter().find(|e| {
        e.entity_id.starts_with(MEDIA_PLAYER_DOMAIN)
            && e.attributes
                .friendly_name
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case(name))
    })
}

impl HassEntity {
    /// Receiver-style status; relative picture paths are joined to `base_url`.
    pub fn to_status(&self, base_url: &str) -> MediaStatus {
        let attrs = &self.attributes;
        let images = attrs
            .entity_picture
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                let url = if p.starts_with("http://") || p.starts_with("https://") {
                    p.to_string()
                } else {
                    format!("{}/{}", base_url.trim_end_matches('/'), p.trim_start_matches('/'))
                };
                MediaImage { url, height: None }
            })
            .into_iter()
            .collect();

        MediaStatus {
            images,
            title: attrs.media_title.clone(),
            artist: attrs.media_artist.clone(),
            album_name: attrs.media_album_name.clone(),
            player_state: map_state(&self.state),
        }
    }
}

pub struct HassSource {
    client: Client,
    base_url: String,
    poll: Duration,
}

impl HassSource {
    pub fn new(base_url: &str, token: &str, poll_ms: u64) -> Result<Self, SourceError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut bearer = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SourceError::Config(format!("token: {}", e)))?;
        bearer.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(VERSION));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, bearer);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(HassSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll: Duration::from_millis(poll_ms),
        })
    }
}

impl MediaSource for HassSource {
    type Session = HassSession;

    async fn discover(&self, name: &str) -> Result<HassSession, SourceError> {
        let url = format!("{}/api/states", self.base_url);
        let entities: Vec<HassEntity> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Home Assistant reported {} entities", entities.len());

        let player = find_player(&entities, name).ok_or_else(|| SourceError::NotFound(name.to_string()))?;
        info!("Found `{}` as `{}`", name, player.entity_id);

        Ok(HassSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            entity_id: player.entity_id.clone(),
            poll: self.poll,
            last: None,
            refresh: false,
        })
    }
}

/// Polls one entity and emits on change.
pub struct HassSession {
    client: Client,
    base_url: String,
    entity_id: String,
    poll: Duration,
    last: Option<MediaStatus>,
    refresh: bool,
}

impl HassSession {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl MediaSession for HassSession {
    fn request_status(&mut self) {
        self.refresh = true;
    }

    async fn next_status(&mut self) -> Result<Option<MediaStatus>, SourceError> {
        let url = format!("{}/api/states/{}", self.base_url, self.entity_id);
        loop {
            if !self.refresh {
                tokio::time::sleep(self.poll).await;
            }

            let response = self.client.get(&url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                info!("`{}` is gone from Home Assistant", self.entity_id);
                return Ok(None);
            }
            let entity: HassEntity = response.error_for_status()?.json().await?;
            let status = entity.to_status(&self.base_url);

            if self.refresh || self.last.as_ref() != Some(&status) {
                self.refresh = false;
                self.last = Some(status.clone());
                return Ok(Some(status));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: &str = r#"[
        {"entity_id": "light.lounge", "state": "on", "attributes": {"friendly_name": "Hi-fi System"}},
        {"entity_id": "media_player.kitchen", "state": "idle", "attributes": {"friendly_name": "Kitchen"}},
        {"entity_id": "media_player.hifi", "state": "playing", "attributes": {
            "friendly_name": "Hi-fi System",
            "media_title": "Comfortably Numb",
            "media_artist": "Pink Floyd",
            "media_album_name": "The Wall",
            "entity_picture": "/api/media_player_proxy/media_player.hifi?token=abc",
            "volume_level": 0.4
        }},
        {"entity_id": "media_player.tv", "state": "off"}
    ]"#;

    fn entities() -> Vec<HassEntity> {
        serde_json::from_str(STATES).unwrap()
    }

    #[test]
    fn test_find_player_by_friendly_name() {
        let entities = entities();
        let player = find_player(&entities, "hi-fi system").unwrap();
        assert_eq!(player.entity_id, "media_player.hifi");
        assert!(find_player(&entities, "Bedroom").is_none());
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(map_state("playing"), "PLAYING");
        assert_eq!(map_state("on"), "IDLE");
        assert_eq!(map_state("standby"), "UNKNOWN");
        assert_eq!(map_state("unavailable"), "UNKNOWN");
        assert_eq!(map_state("seeking"), "seeking");
    }

    #[test]
    fn test_entity_to_status() {
        let entities = entities();
        let status = find_player(&entities, "Hi-fi System")
            .unwrap()
            .to_status("http://hass.local:8123/");

        assert_eq!(status.player_state, "PLAYING");
        assert_eq!(status.title.as_deref(), Some("Comfortably Numb"));
        assert_eq!(status.album_name.as_deref(), Some("The Wall"));
        assert_eq!(
            status.images[0].url,
            "http://hass.local:8123/api/media_player_proxy/media_player.hifi?token=abc"
        );
    }

    #[test]
    fn test_entity_without_attributes() {
        let entities = entities();
        let tv = entities.iter().find(|e| e.entity_id == "media_player.tv").unwrap();
        let status = tv.to_status("http://hass.local:8123");
        assert_eq!(status.player_state, "UNKNOWN");
        assert!(status.images.is_empty());
        assert_eq!(status.title, None);
    }
}
