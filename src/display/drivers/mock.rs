/*
 *  display/drivers/mock.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Headless display driver, used without a CRT and by tests
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

use std::sync::{Arc, Mutex, MutexGuard};

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::traits::{DisplayCapabilities, DisplayDriver, PixelLayout};

/// Mock display driver
///
/// Records every operation and keeps a copy of what was last flushed, so
/// tests (and `--headless` runs) can look at the "screen".
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

/// Shared state for inspection
#[derive(Debug, Default)]
pub struct MockDriverState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Number of full flushes
    pub flush_count: usize,

    /// Row ranges pushed through flush_rows()
    pub row_flushes: Vec<(u32, u32)>,

    /// Number of times clear() was called
    pub clear_count: usize,

    /// Whether the driver is initialized
    pub is_initialized: bool,

    /// Pixels as last pushed to the "device"
    pub screen: Vec<Rgb888>,

    /// Simulate failures (for error testing)
    pub simulate_flush_failure: bool,
    pub simulate_init_failure: bool,
}

impl MockDriver {
    pub fn new(width: u32, height: u32) -> Self {
        let capabilities = DisplayCapabilities {
            width,
            height,
            layout: PixelLayout::XRGB8888,
        };
        let state = MockDriverState {
            screen: vec![Rgb888::BLACK; (width * height) as usize],
            ..Default::default()
        };
        Self { capabilities, state: Arc::new(Mutex::new(state)) }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    /// Pixel as last flushed
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.capabilities.width || y >= self.capabilities.height {
            return None;
        }
        let idx = (y * self.capabilities.width + x) as usize;
        self.lock().ok()?.screen.get(idx).copied()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockDriverState>, DisplayError> {
        self.state
            .lock()
            .map_err(|_| DisplayError::Other("mock driver state poisoned".to_string()))
    }

    fn copy_rows(&self, canvas: &Canvas, y0: u32, y1: u32) -> Result<(), DisplayError> {
        let w = self.capabilities.width as usize;
        if canvas.width() != w || canvas.height() != self.capabilities.height as usize {
            return Err(DisplayError::BufferSizeMismatch {
                expected: w * self.capabilities.height as usize,
                actual: canvas.as_slice().len(),
            });
        }

        let mut state = self.lock()?;
        if state.simulate_flush_failure {
            return Err(DisplayError::Other("Simulated flush failure".to_string()));
        }
        let y1 = (y1 as usize).min(canvas.height());
        let y0 = (y0 as usize).min(y1);
        state.screen[y0 * w..y1 * w].copy_from_slice(&canvas.as_slice()[y0 * w..y1 * w]);
        Ok(())
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;

        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }

        state.init_count += 1;
        state.is_initialized = true;
        Ok(())
    }

    fn flush(&mut self, canvas: &Canvas) -> Result<(), DisplayError> {
        self.copy_rows(canvas, 0, self.capabilities.height)?;
        self.lock()?.flush_count += 1;
        Ok(())
    }

    fn flush_rows(&mut self, canvas: &Canvas, y0: u32, y1: u32) -> Result<(), DisplayError> {
        self.copy_rows(canvas, y0, y1)?;
        self.lock()?.row_flushes.push((y0, y1));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        state.clear_count += 1;
        state.screen.fill(Rgb888::BLACK);
        Ok(())
    }
}
