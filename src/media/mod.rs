/*
 *  media/mod.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Media status model: play states, raw status and the normalised payload
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

pub mod bridge;
pub mod hass;
pub mod source;

use serde::{Deserialize, Serialize};

/// Audio file suffixes some players leave on the title.
const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".flac", ".m4a", ".ogg", ".wav", ".aac", ".opus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayState {
    Playing,
    Paused,
    Buffering,
    Idle,
    Unknown,
}

impl PlayState {
    /// Parse a receiver `player_state`, `None` for anything unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLAYING" => Some(PlayState::Playing),
            "PAUSED" => Some(PlayState::Paused),
            "BUFFERING" => Some(PlayState::Buffering),
            "IDLE" => Some(PlayState::Idle),
            "UNKNOWN" => Some(PlayState::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Playing => "PLAYING",
            PlayState::Paused => "PAUSED",
            PlayState::Buffering => "BUFFERING",
            PlayState::Idle => "IDLE",
            PlayState::Unknown => "UNKNOWN",
        }
    }

    /// Everything but `Unknown` keeps the CRT lit.
    pub fn is_active(&self) -> bool {
        !matches!(self, PlayState::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaImage {
    pub url: String,
    pub height: Option<u32>,
}

/// Status as delivered by a media source, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub images: Vec<MediaImage>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_name: Option<String>,
    pub player_state: String,
}

impl MediaStatus {
    pub fn play_state(&self) -> Option<PlayState> {
        PlayState::parse(&self.player_state)
    }
}

/// The now-playing record compared for change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MediaPayload {
    pub artwork_url: Option<String>,
    pub media_title: String,
    pub media_artist: String,
    pub album_name: Option<String>,
}

impl MediaPayload {
    pub fn from_status(status: &MediaStatus) -> Self {
        // tallest image wins, unknown heights rank lowest
        let artwork_url = status
            .images
            .iter()
            .max_by_key(|img| img.height.unwrap_or(0))
            .map(|img| img.url.clone());

        MediaPayload {
            artwork_url,
            media_title: sanitize_title(status.title.as_deref().unwrap_or_default()),
            media_artist: status.artist.clone().unwrap_or_default(),
            album_name: status.album_name.clone().filter(|a| !a.is_empty()),
        }
    }

    /// Album when known, otherwise the title.
    pub fn album_or_title(&self) -> &str {
        self.album_name.as_deref().unwrap_or(&self.media_title)
    }
}

/// Strip one trailing audio file extension, case-insensitive.
pub fn sanitize_title(title: &str) -> String {
    let lower = title.to_ascii_lowercase();
    for ext in AUDIO_EXTENSIONS {
        if lower.ends_with(ext) && title.len() > ext.len() {
            return title[..title.len() - ext.len()].to_string();
        }
    }
    title.to_string()
}
