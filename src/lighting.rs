/*
 *  lighting.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Ambient lighting: artwork palette pushed to Nanoleaf panels
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

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error};
use reqwest::{Client, header};
use serde::Serialize;
use thiserror::Error;

use crate::state_store::{MIRROR_STATE, StateStore};

/// Colours sent per effect.
pub const PALETTE_SIZE: usize = 15;

const NANOLEAF_PORT: u16 = 16021;
const SAMPLE_EDGE: u32 = 64;

#[derive(Debug, Error)]
pub enum LightingError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("palette task failed: {0}")]
    Task(String),
}

impl LightingError {
    pub fn kind(&self) -> &'static str {
        match self {
            LightingError::Http(_) => "Http",
            LightingError::Decode(_) => "Decode",
            LightingError::Io(_) => "Io",
            LightingError::Task(_) => "Task",
        }
    }
}

/// Hue 0-360, saturation and brightness 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hsb {
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
}

pub fn rgb_to_hsb(r: u8, g: u8, b: u8) -> Hsb {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    Hsb {
        hue: (hue.round() as u16) % 360,
        saturation: (saturation * 100.0).round() as u8,
        brightness: (max * 100.0).round() as u8,
    }
}

#[derive(Default)]
struct Bucket {
    count: u32,
    sum: [u32; 3],
}

/// Most common colours of an image, most frequent first.
///
/// The image is sampled down, colours are bucketed at 4 bits per channel and
/// each of the `n` fullest buckets contributes its mean colour.
pub fn palette_from_image(bytes: &[u8], n: usize) -> Result<Vec<Hsb>, LightingError> {
    let img = image::load_from_memory(bytes)?;
    let img = if img.width() > SAMPLE_EDGE || img.height() > SAMPLE_EDGE {
        img.thumbnail(SAMPLE_EDGE, SAMPLE_EDGE)
    } else {
        img
    }
    .to_rgb8();

    let mut buckets: HashMap<[u8; 3], Bucket> = HashMap::new();
    for px in img.pixels() {
        let [r, g, b] = px.0;
        let bucket = buckets.entry([r >> 4, g >> 4, b >> 4]).or_default();
        bucket.count += 1;
        bucket.sum[0] += r as u32;
        bucket.sum[1] += g as u32;
        bucket.sum[2] += b as u32;
    }

    let mut ranked: Vec<([u8; 3], Bucket)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));

    Ok(ranked
        .iter()
        .take(n)
        .map(|(_, bucket)| {
            let avg = |i: usize| (bucket.sum[i] / bucket.count) as u8;
            rgb_to_hsb(avg(0), avg(1), avg(2))
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub min_value: u32,
    pub max_value: u32,
}

/// Nanoleaf effect body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub command: &'static str,
    pub anim_type: &'static str,
    pub color_type: &'static str,
    pub anim_data: Option<String>,
    pub palette: Vec<Hsb>,
    pub trans_time: Range,
    pub delay_time: Range,
    #[serde(rename = "loop")]
    pub looping: bool,
}

impl Effect {
    /// Looping random transitions between the palette colours.
    pub fn random(palette: Vec<Hsb>) -> Self {
        Effect {
            command: "display",
            anim_type: "random",
            color_type: "HSB",
            anim_data: None,
            palette,
            trans_time: Range { min_value: 50, max_value: 100 },
            delay_time: Range { min_value: 50, max_value: 100 },
            looping: true,
        }
    }
}

#[derive(Serialize)]
struct WriteEffect<'a> {
    write: &'a Effect,
}

#[derive(Debug, Clone)]
pub struct NanoleafClient {
    client: Client,
    url: String,
}

impl NanoleafClient {
    pub fn new(host: &str, token: &str) -> Result<Self, LightingError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Content-Type", header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(NanoleafClient {
            client,
            url: format!("http://{}:{}/api/v1/{}/effects", host, NANOLEAF_PORT, token),
        })
    }

    pub async fn write_effect(&self, effect: &Effect) -> Result<(), LightingError> {
        self.client
            .put(&self.url)
            .json(&WriteEffect { write: effect })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Where an artwork palette ends up.
pub trait PaletteSink {
    /// Extract and send the palette of `artwork`; must not block the caller.
    fn send(&self, what: &str, artwork: PathBuf);
}

impl PaletteSink for NanoleafClient {
    fn send(&self, what: &str, artwork: PathBuf) {
        debug!("Sending colors for `{}` to Nanoleaf", what);
        let client = self.clone();
        tokio::spawn(async move {
            let palette = tokio::task::spawn_blocking(move || {
                let bytes = std::fs::read(&artwork)?;
                palette_from_image(&bytes, PALETTE_SIZE)
            })
            .await;

            let sent = match palette {
                Ok(Ok(palette)) => client.write_effect(&Effect::random(palette)).await,
                Ok(Err(e)) => Err(e),
                Err(e) => Err(LightingError::Task(e.to_string())),
            };
            if let Err(e) = sent {
                error!("Unable to mirror artwork: `{} - {}`", e.kind(), e);
            }
        });
    }
}

/// What the bridge hands resolved artwork to.
pub trait ArtworkMirror {
    fn mirror(&self, what: &str, artwork: PathBuf);
}

/// Forwards artwork to a [`PaletteSink`] while `mirrorControl.state` is on.
#[derive(Debug, Clone)]
pub struct LightingMirror<S: PaletteSink = NanoleafClient> {
    sink: S,
    store: StateStore,
}

impl<S: PaletteSink> LightingMirror<S> {
    pub fn new(sink: S, store: StateStore) -> Self {
        LightingMirror { sink, store }
    }

    pub fn enabled(&self) -> bool {
        match self.store.get_bool(&MIRROR_STATE) {
            Ok(state) => state == Some(true),
            Err(e) => {
                error!("Unable to read mirror state: `{} - {}`", e.kind(), e);
                false
            }
        }
    }
}

impl<S: PaletteSink> ArtworkMirror for LightingMirror<S> {
    fn mirror(&self, what: &str, artwork: PathBuf) {
        if self.enabled() {
            self.sink.send(what, artwork);
        } else {
            debug!("Mirror control off, not sending colors for `{}`", what);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_rgb_to_hsb() {
        assert_eq!(rgb_to_hsb(255, 0, 0), Hsb { hue: 0, saturation: 100, brightness: 100 });
        assert_eq!(rgb_to_hsb(0, 0, 255), Hsb { hue: 240, saturation: 100, brightness: 100 });
        assert_eq!(rgb_to_hsb(255, 255, 255), Hsb { hue: 0, saturation: 0, brightness: 100 });
        assert_eq!(rgb_to_hsb(0, 0, 0), Hsb { hue: 0, saturation: 0, brightness: 0 });
        assert_eq!(rgb_to_hsb(255, 0, 255).hue, 300);
    }

    #[test]
    fn test_palette_ranks_by_population() {
        // three quarters red, one quarter blue
        let img = RgbImage::from_fn(16, 16, |x, _| if x < 12 { Rgb([250, 0, 0]) } else { Rgb([0, 0, 250]) });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();

        let palette = palette_from_image(&bytes, PALETTE_SIZE).unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(palette[0].hue, 0);
        assert_eq!(palette[1].hue, 240);

        assert_eq!(palette_from_image(&bytes, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_palette_rejects_garbage() {
        let err = palette_from_image(b"not an image", 3).unwrap_err();
        assert_eq!(err.kind(), "Decode");
    }

    #[test]
    fn test_effect_body() {
        let effect = Effect::random(vec![Hsb { hue: 10, saturation: 20, brightness: 30 }]);
        let body = serde_json::to_value(WriteEffect { write: &effect }).unwrap();
        assert_eq!(
            body,
            json!({"write": {
                "command": "display",
                "animType": "random",
                "colorType": "HSB",
                "animData": null,
                "palette": [{"hue": 10, "saturation": 20, "brightness": 30}],
                "transTime": {"minValue": 50, "maxValue": 100},
                "delayTime": {"minValue": 50, "maxValue": 100},
                "loop": true
            }})
        );
    }

    #[test]
    fn test_mirror_follows_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).unwrap();
        let mirror = LightingMirror::new(NanoleafClient::new("127.0.0.1", "token").unwrap(), store.clone());

        assert!(!mirror.enabled());
        store.set(&MIRROR_STATE, json!(true)).unwrap();
        assert!(mirror.enabled());
    }
}
