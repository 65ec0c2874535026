/*
 *  display/renderer.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Now playing screen: artwork square over title and artist lines
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

use std::path::PathBuf;

use embedded_graphics::mono_font::{MonoFont, iso_8859_1};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::Point;
use image::RgbImage;
use image::imageops::FilterType;
use log::{debug, error, info};

use crate::artwork::{ArtworkCache, ArtworkError, ArtworkFetcher, HttpFetcher};
use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::label::Label;
use crate::display::scroller::{CHAR_LIMIT, DisplayState, LabelId, ScrollAnimator, scroll_text};
use crate::display::traits::DisplayDriver;
use crate::media::MediaPayload;
use crate::media::bridge::Render;

/// Artwork edge as a fraction of display height
const ARTWORK_SCALE: f32 = 0.65;
const ARTWORK_TOP: f32 = 0.075;
const TITLE_Y: f32 = 0.8;
const ARTIST_Y: f32 = 0.9;
const FONT_SCALE: f32 = 0.05;

/// Candidate fonts, ascending by glyph height.
const FONTS: [&MonoFont<'static>; 13] = [
    &iso_8859_1::FONT_4X6,
    &iso_8859_1::FONT_5X7,
    &iso_8859_1::FONT_5X8,
    &iso_8859_1::FONT_6X9,
    &iso_8859_1::FONT_6X10,
    &iso_8859_1::FONT_6X12,
    &iso_8859_1::FONT_6X13,
    &iso_8859_1::FONT_7X13,
    &iso_8859_1::FONT_8X13,
    &iso_8859_1::FONT_7X14,
    &iso_8859_1::FONT_9X15,
    &iso_8859_1::FONT_9X18,
    &iso_8859_1::FONT_10X20,
];

/// Largest font no taller than 5% of the display, else the smallest.
pub fn pick_font(display_height: u32) -> &'static MonoFont<'static> {
    let limit = display_height as f32 * FONT_SCALE;
    FONTS
        .iter()
        .rev()
        .find(|f| f.character_size.height as f32 <= limit)
        .copied()
        .unwrap_or(FONTS[0])
}

/// Screen geometry derived from the display size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub artwork_size: u32,
    pub artwork_origin: Point,
    pub title_center: Point,
    pub artist_center: Point,
}

impl Layout {
    pub fn new(width: u32, height: u32) -> Self {
        let h = height as f32;
        let artwork_size = (h * ARTWORK_SCALE).round() as u32;
        let cx = (width / 2) as i32;
        Layout {
            width,
            height,
            artwork_size,
            artwork_origin: Point::new(
                (width as i32 - artwork_size as i32) / 2,
                (h * ARTWORK_TOP).round() as i32,
            ),
            title_center: Point::new(cx, (h * TITLE_Y).round() as i32),
            artist_center: Point::new(cx, (h * ARTIST_Y).round() as i32),
        }
    }
}

/// Owns the canvas, the labels and their scroll animation.
pub struct DisplayRenderer<F: ArtworkFetcher = HttpFetcher> {
    driver: Box<dyn DisplayDriver>,
    canvas: Canvas,
    cache: ArtworkCache<F>,
    layout: Layout,
    state: DisplayState,
    animator: ScrollAnimator,
}

impl<F: ArtworkFetcher> DisplayRenderer<F> {
    pub fn new(mut driver: Box<dyn DisplayDriver>, cache: ArtworkCache<F>) -> Result<Self, DisplayError> {
        driver.init()?;

        let (width, height) = driver.dimensions();
        if width == 0 || height == 0 {
            return Err(DisplayError::InvalidConfiguration(format!("display is {}x{}", width, height)));
        }

        let layout = Layout::new(width, height);
        let font = pick_font(height);
        info!(
            "Display {}x{}, artwork {}px, font {}x{}",
            width, height, layout.artwork_size, font.character_size.width, font.character_size.height
        );

        let state = DisplayState::new(
            Label::new(layout.title_center, font),
            Label::new(layout.artist_center, font),
        );
        let canvas = Canvas::new(width, height);
        driver.flush(&canvas)?;

        Ok(DisplayRenderer {
            driver,
            canvas,
            cache,
            layout,
            state,
            animator: ScrollAnimator::new(),
        })
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn cache(&self) -> &ArtworkCache<F> {
        &self.cache
    }

    pub fn is_scrolling(&self, label: LabelId) -> bool {
        self.animator.is_scrolling(label)
    }

    async fn load_artwork(&self, payload: &MediaPayload) -> Result<(PathBuf, RgbImage), ArtworkError> {
        let (path, bytes) = self
            .cache
            .resolve(&payload.media_artist, payload.album_or_title(), payload.artwork_url.as_deref())
            .await?;
        let size = self.layout.artwork_size;
        let img = image::load_from_memory(&bytes)?
            .resize_exact(size, size, FilterType::Lanczos3)
            .to_rgb8();
        Ok((path, img))
    }

    fn set_label(&mut self, id: LabelId, text: &str) {
        let text = html_escape::decode_html_entities(text);
        let label = self.state.label_mut(id);
        if text.chars().count() > CHAR_LIMIT {
            label.set_text(scroll_text(&text));
            self.animator.start(id, self.state.generation);
        } else {
            label.set_text(text.into_owned());
            self.animator.stop(id);
        }
    }

    fn redraw(&mut self) {
        self.canvas.clear_color(Rgb888::BLACK);
        if let Some(artwork) = &self.state.artwork {
            let origin = self.layout.artwork_origin;
            self.canvas.blit_rgb(origin.x, origin.y, artwork);
        }
        let _ = self.state.title.draw(&mut self.canvas);
        let _ = self.state.artist.draw(&mut self.canvas);
    }
}

impl<F: ArtworkFetcher> Render for DisplayRenderer<F> {
    async fn render(&mut self, payload: &MediaPayload) -> Option<PathBuf> {
        self.state.generation += 1;

        let artwork_path = match self.load_artwork(payload).await {
            Ok((path, img)) => {
                self.state.artwork = Some(img);
                Some(path)
            }
            Err(e) => {
                error!("Unable to get artwork: `{} - {}`", e.kind(), e);
                None
            }
        };

        for (id, text) in [
            (LabelId::Title, &payload.media_title),
            (LabelId::Artist, &payload.media_artist),
        ] {
            self.set_label(id, text);
        }

        self.redraw();
        if let Err(e) = self.driver.flush(&self.canvas) {
            error!("Display flush failed: {} - {}", e.kind(), e);
        }
        debug!("Rendered generation {}", self.state.generation);

        artwork_path
    }

    fn tick(&mut self) {
        for id in self.animator.tick(&mut self.state) {
            let label = self.state.label(id);
            let (y0, y1) = label.band();
            self.canvas.fill_rows(y0 as usize, y1 as usize, Rgb888::BLACK);
            let _ = label.draw(&mut self.canvas);
            if let Err(e) = self.driver.flush_rows(&self.canvas, y0, y1) {
                error!("Display flush failed: {} - {}", e.kind(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::tests::CountingFetcher;
    use crate::display::drivers::MockDriver;
    use std::io::Cursor;

    fn red_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn renderer(fetcher: CountingFetcher) -> (tempfile::TempDir, MockDriver, DisplayRenderer<CountingFetcher>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtworkCache::new(dir.path(), fetcher).unwrap();
        let mock = MockDriver::new(640, 480);
        let renderer = DisplayRenderer::new(Box::new(mock.clone()), cache).unwrap();
        (dir, mock, renderer)
    }

    fn payload(title: &str, artist: &str) -> MediaPayload {
        MediaPayload {
            artwork_url: Some("http://art/cover.png".into()),
            media_title: title.into(),
            media_artist: artist.into(),
            album_name: Some("Album".into()),
        }
    }

    #[test]
    fn test_pick_font() {
        assert_eq!(pick_font(480).character_size.height, 20);
        assert_eq!(pick_font(240).character_size.height, 12);
        assert_eq!(pick_font(40).character_size.height, 6);
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new(640, 480);
        assert_eq!(layout.artwork_size, 312);
        assert_eq!(layout.artwork_origin, Point::new(164, 36));
        assert_eq!(layout.title_center, Point::new(320, 384));
        assert_eq!(layout.artist_center, Point::new(320, 432));
    }

    #[tokio::test]
    async fn test_31_chars_stay_centered() {
        let (_dir, _mock, mut r) = renderer(CountingFetcher { body: red_png(), ..Default::default() });
        let title = "t".repeat(31);
        r.render(&payload(&title, "artist")).await;

        assert_eq!(r.state().title.text(), title);
        assert!(!r.is_scrolling(LabelId::Title));
        assert_eq!(r.state().title.state.x_offset, r.state().title.state.base_x);
    }

    #[tokio::test]
    async fn test_32_chars_scroll_tripled() {
        let (_dir, mock, mut r) = renderer(CountingFetcher { body: red_png(), ..Default::default() });
        let title = "t".repeat(32);
        r.render(&payload(&title, "artist")).await;

        assert_eq!(r.state().title.text(), scroll_text(&title));
        assert!(r.is_scrolling(LabelId::Title));
        assert!(!r.is_scrolling(LabelId::Artist));

        r.tick();
        let band = r.state().title.band();
        assert_eq!(mock.state().lock().unwrap().row_flushes, vec![band]);
        assert_eq!(r.state().title.state.x_offset, 318.0);
    }

    #[tokio::test]
    async fn test_artwork_failure_still_updates_text() {
        let (_dir, mock, mut r) = renderer(CountingFetcher { fail: true, ..Default::default() });
        let path = r.render(&payload("Title", "Simon &amp; Garfunkel")).await;

        assert!(path.is_none());
        assert!(r.state().artwork.is_none());
        assert_eq!(r.state().title.text(), "Title");
        assert_eq!(r.state().artist.text(), "Simon & Garfunkel");
        assert_eq!(mock.state().lock().unwrap().flush_count, 2);
    }

    #[tokio::test]
    async fn test_artwork_is_drawn_centered() {
        let fetcher = CountingFetcher { body: red_png(), ..Default::default() };
        let (_dir, mock, mut r) = renderer(fetcher.clone());
        let path = r.render(&payload("Title", "Artist")).await.unwrap();

        assert!(path.ends_with("artist/album"));
        let px = mock.screen_pixel(320, 36 + 156).unwrap();
        assert!(px.r() > 200 && px.g() < 50 && px.b() < 50);
        assert_eq!(mock.screen_pixel(100, 100), Some(Rgb888::BLACK));
    }

    #[tokio::test]
    async fn test_new_render_cancels_old_sweep() {
        let (_dir, _mock, mut r) = renderer(CountingFetcher { body: red_png(), ..Default::default() });
        r.render(&payload(&"long ".repeat(10), "a")).await;
        assert!(r.is_scrolling(LabelId::Title));

        r.render(&payload("short", "a")).await;
        assert!(!r.is_scrolling(LabelId::Title));
        r.tick();
        assert_eq!(r.state().title.state.x_offset, r.state().title.state.base_x);
    }

    #[tokio::test]
    async fn test_empty_artist_blanks_label() {
        let (_dir, _mock, mut r) = renderer(CountingFetcher { body: red_png(), ..Default::default() });
        r.render(&payload("Song A", &"y".repeat(40))).await;
        assert!(r.is_scrolling(LabelId::Artist));

        r.render(&payload("Podcast Episode", "")).await;
        assert_eq!(r.state().title.text(), "Podcast Episode");
        assert_eq!(r.state().artist.text(), "");
        assert!(!r.is_scrolling(LabelId::Artist));
    }
}
