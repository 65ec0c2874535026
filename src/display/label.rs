/*
 *  display/label.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Centre-anchored single line text label
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

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};

/// Where a label is drawn. `x_offset` is the label's centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollState {
    pub x_offset: f32,
    pub base_x: f32,
    pub base_y: f32,
}

impl ScrollState {
    pub fn centered(base_x: f32, base_y: f32) -> Self {
        ScrollState { x_offset: base_x, base_x, base_y }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    text: String,
    pub state: ScrollState,
    font: &'static MonoFont<'static>,
}

impl Label {
    pub fn new(center: Point, font: &'static MonoFont<'static>) -> Self {
        Label {
            text: String::new(),
            state: ScrollState::centered(center.x as f32, center.y as f32),
            font,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Replace the text and re-centre.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.state.x_offset = self.state.base_x;
    }

    /// Rendered width in pixels.
    pub fn width(&self) -> f32 {
        let advance = self.font.character_size.width + self.font.character_spacing;
        (self.char_count() as u32 * advance) as f32
    }

    /// Rows `y0..y1` the text can touch, padded by one row each side.
    pub fn band(&self) -> (u32, u32) {
        let h = self.font.character_size.height as f32;
        let y0 = (self.state.base_y - h / 2.0 - 1.0).floor().max(0.0);
        let y1 = (self.state.base_y + h / 2.0 + 2.0).ceil().max(0.0);
        (y0 as u32, y1 as u32)
    }

    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        if self.text.is_empty() {
            return Ok(());
        }

        let character_style = MonoTextStyle::new(self.font, Rgb888::WHITE);
        let text_style = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();

        let position = Point::new(self.state.x_offset.round() as i32, self.state.base_y.round() as i32);
        Text::with_text_style(&self.text, position, character_style, text_style).draw(target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::canvas::Canvas;
    use embedded_graphics::mono_font::iso_8859_1::FONT_10X20;

    #[test]
    fn test_width_and_band() {
        let mut label = Label::new(Point::new(320, 384), &FONT_10X20);
        label.set_text("Hey You");
        assert_eq!(label.char_count(), 7);
        assert_eq!(label.width(), 70.0);
        assert_eq!(label.band(), (373, 396));
    }

    #[test]
    fn test_set_text_recentres() {
        let mut label = Label::new(Point::new(100, 50), &FONT_10X20);
        label.state.x_offset = 12.0;
        label.set_text("x");
        assert_eq!(label.state.x_offset, 100.0);
    }

    #[test]
    fn test_draw_stays_inside_band() {
        let mut canvas = Canvas::new(200, 100);
        let mut label = Label::new(Point::new(100, 50), &FONT_10X20);
        label.set_text("WWWW");
        label.draw(&mut canvas).unwrap();

        let (y0, y1) = label.band();
        let lit: Vec<usize> = (0..100)
            .filter(|&y| canvas.row(y).iter().any(|p| *p != Rgb888::BLACK))
            .collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&y| y >= y0 as usize && y < y1 as usize));
    }
}
