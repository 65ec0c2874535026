/*
 *  display/canvas.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime-sized RGB canvas the renderer draws into
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

use core::convert::Infallible;

use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use image::RgbImage;

/// RGB888 framebuffer sized at runtime from the device geometry.
#[derive(Debug, Clone)]
pub struct Canvas {
    buf: Vec<Rgb888>,
    w: usize,
    h: usize,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![Rgb888::BLACK; w * h], w, h }
    }

    pub fn width(&self) -> usize { self.w }
    pub fn height(&self) -> usize { self.h }

    pub fn as_slice(&self) -> &[Rgb888] { &self.buf }

    /// One row of pixels, empty when out of range
    pub fn row(&self, y: usize) -> &[Rgb888] {
        if y >= self.h {
            return &[];
        }
        &self.buf[y * self.w..(y + 1) * self.w]
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb888> {
        if x < self.w && y < self.h {
            return Some(self.buf[y * self.w + x]);
        }
        None
    }

    pub fn clear_color(&mut self, color: Rgb888) {
        self.buf.fill(color);
    }

    /// Fill rows `y0..y1` across the full width.
    pub fn fill_rows(&mut self, y0: usize, y1: usize, color: Rgb888) {
        let y1 = y1.min(self.h);
        if y0 >= y1 {
            return;
        }
        self.buf[y0 * self.w..y1 * self.w].fill(color);
    }

    /// Copy an image with its top-left corner at (x, y), clipped to the canvas.
    pub fn blit_rgb(&mut self, x: i32, y: i32, img: &RgbImage) {
        for (ix, iy, px) in img.enumerate_pixels() {
            let p = Point::new(x + ix as i32, y + iy as i32);
            if let Some(i) = self.idx(p) {
                self.buf[i] = Rgb888::new(px[0], px[1], px[2]);
            }
        }
    }

    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.clear_color(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let (x0, x1) = (area.top_left.x as usize, bottom_right.x as usize + 1);
        for y in area.top_left.y as usize..=bottom_right.y as usize {
            let base = y * self.w;
            self.buf[base + x0..base + x1].fill(color);
        }
        Ok(())
    }
}
