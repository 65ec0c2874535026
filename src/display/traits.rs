/*
 *  display/traits.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display driver abstraction
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

use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;

/// Position and width of one colour channel inside a packed pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub offset: u32,
    pub length: u32,
}

/// Packed pixel layout of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bits_per_pixel: u32,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

impl PixelLayout {
    /// 16 bpp 5-6-5
    pub const RGB565: PixelLayout = PixelLayout {
        bits_per_pixel: 16,
        red: Channel { offset: 11, length: 5 },
        green: Channel { offset: 5, length: 6 },
        blue: Channel { offset: 0, length: 5 },
    };

    /// 32 bpp, blue in the low byte
    pub const XRGB8888: PixelLayout = PixelLayout {
        bits_per_pixel: 32,
        red: Channel { offset: 16, length: 8 },
        green: Channel { offset: 8, length: 8 },
        blue: Channel { offset: 0, length: 8 },
    };

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel.div_ceil(8) as usize
    }

    /// Pack an 8-bit-per-channel colour into the device word.
    pub fn pack(&self, r: u8, g: u8, b: u8) -> u32 {
        fn chan(v: u8, c: Channel) -> u32 {
            if c.length == 0 {
                return 0;
            }
            let v = if c.length >= 8 {
                (v as u32) << (c.length - 8)
            } else {
                (v as u32) >> (8 - c.length)
            };
            v << c.offset
        }
        chan(r, self.red) | chan(g, self.green) | chan(b, self.blue)
    }
}

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Visible width in pixels
    pub width: u32,

    /// Visible height in pixels
    pub height: u32,

    /// How the device packs pixels
    pub layout: PixelLayout,
}

/// Every display backend implements this.
pub trait DisplayDriver: Send {
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Prepare the device for drawing.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Push the whole canvas to the device.
    fn flush(&mut self, canvas: &Canvas) -> Result<(), DisplayError>;

    /// Push rows `y0..y1` only; drivers without partial updates push everything.
    fn flush_rows(&mut self, canvas: &Canvas, y0: u32, y1: u32) -> Result<(), DisplayError> {
        let _ = (y0, y1);
        self.flush(canvas)
    }

    /// Blank the device.
    fn clear(&mut self) -> Result<(), DisplayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rgb565() {
        let l = PixelLayout::RGB565;
        assert_eq!(l.bytes_per_pixel(), 2);
        assert_eq!(l.pack(255, 255, 255), 0xFFFF);
        assert_eq!(l.pack(255, 0, 0), 0xF800);
        assert_eq!(l.pack(0, 255, 0), 0x07E0);
        assert_eq!(l.pack(0, 0, 255), 0x001F);
    }

    #[test]
    fn test_pack_xrgb8888() {
        let l = PixelLayout::XRGB8888;
        assert_eq!(l.bytes_per_pixel(), 4);
        assert_eq!(l.pack(0x12, 0x34, 0x56), 0x0012_3456);
    }
}
