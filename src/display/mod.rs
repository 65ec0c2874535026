/*
 *  display/mod.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem: drivers, canvas, labels, scrolling and the renderer
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod canvas;

// Display drivers
pub mod drivers;

// Screen content
pub mod label;
pub mod scroller;
pub mod renderer;

// Re-exports for convenience
pub use traits::{DisplayDriver, DisplayCapabilities, PixelLayout};
pub use error::DisplayError;
pub use canvas::Canvas;
pub use drivers::{FbdevDriver, MockDriver};
pub use scroller::{DisplayState, LabelId, ScrollAnimator};
pub use renderer::DisplayRenderer;
