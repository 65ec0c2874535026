/*
 *  display/error.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error type for the display subsystem
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

use std::error::Error;
use std::fmt;
use std::io;

/// Error type for all display operations
#[derive(Debug)]
pub enum DisplayError {
    /// Device could not be opened or queried
    InitializationFailed(String),

    /// Device I/O failure
    Io(io::Error),

    /// Pixel layout the driver cannot pack
    UnsupportedFormat { bits_per_pixel: u32 },

    /// Invalid configuration
    InvalidConfiguration(String),

    /// Framebuffer size mismatch
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Generic error with message
    Other(String),
}

impl DisplayError {
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayError::InitializationFailed(_) => "InitializationFailed",
            DisplayError::Io(_) => "Io",
            DisplayError::UnsupportedFormat { .. } => "UnsupportedFormat",
            DisplayError::InvalidConfiguration(_) => "InvalidConfiguration",
            DisplayError::BufferSizeMismatch { .. } => "BufferSizeMismatch",
            DisplayError::Other(_) => "Other",
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitializationFailed(msg) =>
                write!(f, "Display initialization failed: {}", msg),
            DisplayError::Io(err) =>
                write!(f, "Display I/O error: {}", err),
            DisplayError::UnsupportedFormat { bits_per_pixel } =>
                write!(f, "Unsupported pixel format: {} bits per pixel", bits_per_pixel),
            DisplayError::InvalidConfiguration(msg) =>
                write!(f, "Invalid configuration: {}", msg),
            DisplayError::BufferSizeMismatch { expected, actual } =>
                write!(f, "Buffer size mismatch: expected {} bytes, got {}", expected, actual),
            DisplayError::Other(msg) =>
                write!(f, "{}", msg),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DisplayError {
    fn from(err: io::Error) -> Self {
        DisplayError::Io(err)
    }
}
