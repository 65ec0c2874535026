/*
 *  display/drivers/fbdev.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Linux framebuffer driver (composite out on the Pi)
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

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use embedded_graphics::pixelcolor::RgbColor;
use log::info;
use memmap2::{MmapMut, MmapOptions};

use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::traits::{Channel, DisplayCapabilities, DisplayDriver, PixelLayout};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

// linux/fb.h
#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

fn ioctl_read<T: Default>(file: &File, request: libc::c_ulong) -> Result<T, DisplayError> {
    let mut out = T::default();
    // SAFETY: `out` is a repr(C) struct matching the kernel layout for `request`
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut out as *mut T) };
    if rc < 0 {
        return Err(DisplayError::Io(std::io::Error::last_os_error()));
    }
    Ok(out)
}

fn channel(b: FbBitfield) -> Channel {
    Channel { offset: b.offset, length: b.length }
}

/// Framebuffer device mapped into memory.
pub struct FbdevDriver {
    _file: File,
    map: MmapMut,
    capabilities: DisplayCapabilities,
    line_length: usize,
    /// Byte offset of the visible origin inside the mapping
    origin: usize,
    row: Vec<u8>,
}

/// Byte offset of the visible area, once the reported geometry is known to
/// fit both a stride and the mapping.
fn visible_origin(
    var: &FbVarScreeninfo,
    line_length: usize,
    bytes_per_pixel: usize,
    smem_len: usize,
) -> Result<usize, DisplayError> {
    let row_bytes = var.xres as usize * bytes_per_pixel;
    if row_bytes > line_length {
        return Err(DisplayError::BufferSizeMismatch { expected: row_bytes, actual: line_length });
    }

    let origin = var.yoffset as usize * line_length + var.xoffset as usize * bytes_per_pixel;
    let needed = origin + var.yres as usize * line_length;
    if smem_len < needed {
        return Err(DisplayError::BufferSizeMismatch { expected: needed, actual: smem_len });
    }
    Ok(origin)
}

impl FbdevDriver {
    pub fn open(device: impl AsRef<Path>) -> Result<Self, DisplayError> {
        let device = device.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| DisplayError::InitializationFailed(format!("{}: {}", device.display(), e)))?;

        let var: FbVarScreeninfo = ioctl_read(&file, FBIOGET_VSCREENINFO)?;
        let fix: FbFixScreeninfo = ioctl_read(&file, FBIOGET_FSCREENINFO)?;

        if !matches!(var.bits_per_pixel, 16 | 24 | 32) {
            return Err(DisplayError::UnsupportedFormat { bits_per_pixel: var.bits_per_pixel });
        }
        let layout = PixelLayout {
            bits_per_pixel: var.bits_per_pixel,
            red: channel(var.red),
            green: channel(var.green),
            blue: channel(var.blue),
        };

        let line_length = fix.line_length as usize;
        let origin = visible_origin(&var, line_length, layout.bytes_per_pixel(), fix.smem_len as usize)?;

        // SAFETY: the device stays open for the lifetime of the mapping
        let map = unsafe { MmapOptions::new().len(fix.smem_len as usize).map_mut(&file)? };

        info!(
            "Framebuffer {} is {}x{} @ {}bpp, stride {}",
            device.display(),
            var.xres,
            var.yres,
            var.bits_per_pixel,
            line_length
        );

        Ok(FbdevDriver {
            _file: file,
            map,
            capabilities: DisplayCapabilities {
                width: var.xres,
                height: var.yres,
                layout,
            },
            line_length,
            origin,
            row: Vec::new(),
        })
    }

    fn write_rows(&mut self, canvas: &Canvas, y0: u32, y1: u32) -> Result<(), DisplayError> {
        let (w, h) = (self.capabilities.width as usize, self.capabilities.height as usize);
        if canvas.width() != w || canvas.height() != h {
            return Err(DisplayError::BufferSizeMismatch { expected: w * h, actual: canvas.as_slice().len() });
        }

        let layout = self.capabilities.layout;
        let bpp = layout.bytes_per_pixel();
        let y1 = (y1 as usize).min(h);
        self.row.resize(w * bpp, 0);

        for y in (y0 as usize).min(y1)..y1 {
            for (x, px) in canvas.row(y).iter().enumerate() {
                let word = layout.pack(px.r(), px.g(), px.b()).to_le_bytes();
                self.row[x * bpp..(x + 1) * bpp].copy_from_slice(&word[..bpp]);
            }
            let start = self.origin + y * self.line_length;
            self.map[start..start + w * bpp].copy_from_slice(&self.row);
        }
        Ok(())
    }
}

impl DisplayDriver for FbdevDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.clear()
    }

    fn flush(&mut self, canvas: &Canvas) -> Result<(), DisplayError> {
        self.write_rows(canvas, 0, self.capabilities.height)
    }

    fn flush_rows(&mut self, canvas: &Canvas, y0: u32, y1: u32) -> Result<(), DisplayError> {
        self.write_rows(canvas, y0, y1)
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let h = self.capabilities.height as usize;
        let end = (self.origin + h * self.line_length).min(self.map.len());
        self.map[self.origin..end].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(xres: u32, yres: u32, yoffset: u32) -> FbVarScreeninfo {
        FbVarScreeninfo { xres, yres, yoffset, bits_per_pixel: 16, ..Default::default() }
    }

    #[test]
    fn test_visible_origin() {
        // 720x576 RGB565, stride padded to 1536 bytes
        assert_eq!(visible_origin(&var(720, 576, 0), 1536, 2, 1536 * 576).unwrap(), 0);
        assert_eq!(visible_origin(&var(720, 576, 576), 1536, 2, 1536 * 1152).unwrap(), 1536 * 576);
    }

    #[test]
    fn test_stride_shorter_than_row_is_rejected() {
        let err = visible_origin(&var(720, 576, 0), 1280, 2, 1 << 24).unwrap_err();
        assert_eq!(err.kind(), "BufferSizeMismatch");
        assert!(matches!(err, DisplayError::BufferSizeMismatch { expected: 1440, actual: 1280 }));
    }

    #[test]
    fn test_mapping_too_small_is_rejected() {
        let err = visible_origin(&var(720, 576, 576), 1536, 2, 1536 * 576).unwrap_err();
        assert!(matches!(err, DisplayError::BufferSizeMismatch { expected, .. } if expected == 1536 * 1152));
    }
}
