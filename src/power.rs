/*
 *  power.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  CRT power relay, one digital output line confirmed against stored state
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

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::state_store::{CRT_STATE, StateStore, StoreError};

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("GPIO error: {0}")]
    Gpio(String),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("power line lock poisoned")]
    Poisoned,
}

impl PowerError {
    pub fn kind(&self) -> &'static str {
        match self {
            PowerError::Gpio(_) => "Gpio",
            PowerError::Store(_) => "Store",
            PowerError::Poisoned => "Poisoned",
        }
    }
}

/// A single digital output.
pub trait PowerLine: Send {
    fn write(&mut self, high: bool) -> Result<(), PowerError>;

    /// False for the null line.
    fn is_hardware(&self) -> bool {
        true
    }
}

/// Stand-in when no output line exists; every write is a logged no-op.
#[derive(Debug, Default)]
pub struct NullLine;

impl PowerLine for NullLine {
    fn write(&mut self, high: bool) -> Result<(), PowerError> {
        debug!("No power line present, ignoring write of {}", if high { "HIGH" } else { "LOW" });
        Ok(())
    }

    fn is_hardware(&self) -> bool {
        false
    }
}

#[cfg(feature = "gpio")]
pub struct GpioLine {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "gpio")]
impl GpioLine {
    pub fn new(bcm_pin: u8) -> Result<Self, PowerError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| PowerError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| PowerError::Gpio(e.to_string()))?
            .into_output();
        info!("CRT power line on BCM pin {}", bcm_pin);
        Ok(GpioLine { pin })
    }
}

#[cfg(feature = "gpio")]
impl PowerLine for GpioLine {
    fn write(&mut self, high: bool) -> Result<(), PowerError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

/// Open the configured output line, degrading to [`NullLine`] when there is
/// no pin, no GPIO support compiled in, or the pin cannot be claimed.
pub fn open_line(bcm_pin: Option<u8>) -> Box<dyn PowerLine> {
    let Some(pin) = bcm_pin else {
        info!("No CRT pin configured, power switching is a no-op");
        return Box::new(NullLine);
    };

    #[cfg(feature = "gpio")]
    {
        match GpioLine::new(pin) {
            Ok(line) => return Box::new(line),
            Err(e) => warn!("Unable to claim BCM pin {}: {}. Power switching is a no-op", pin, e),
        }
    }

    #[cfg(not(feature = "gpio"))]
    warn!("Built without the `gpio` feature, ignoring CRT pin {}", pin);

    Box::new(NullLine)
}

/// Power operations the bridge and control surface drive.
pub trait PowerSwitch {
    fn switch_on(&self, force: bool) -> Result<(), PowerError>;
    fn switch_off(&self, force: bool) -> Result<(), PowerError>;
}

/// Idempotent on/off over one output line.
///
/// Without `force` the pin is only written when the stored `crt.state` already
/// agrees with the requested direction (a confirm, not a setter). A null state
/// agrees with neither. Every call records the requested direction.
#[derive(Clone)]
pub struct PowerController {
    line: Arc<Mutex<Box<dyn PowerLine>>>,
    store: StateStore,
}

impl PowerController {
    pub fn new(store: StateStore, line: Box<dyn PowerLine>) -> Self {
        PowerController {
            line: Arc::new(Mutex::new(line)),
            store,
        }
    }

    pub fn has_hardware(&self) -> bool {
        self.line.lock().map(|l| l.is_hardware()).unwrap_or(false)
    }

    fn switch(&self, on: bool, force: bool) -> Result<(), PowerError> {
        let label = if on { "on" } else { "off" };
        let stored = self.store.get_bool(&CRT_STATE)?;

        if force || stored == Some(on) {
            debug!("Switching display {}", label);
            let mut line = self.line.lock().map_err(|_| PowerError::Poisoned)?;
            line.write(on)?;
        } else {
            debug!("Switching display {} (but not really)", label);
        }

        self.store.set(&CRT_STATE, Value::Bool(on))?;
        Ok(())
    }
}

impl PowerSwitch for PowerController {
    fn switch_on(&self, force: bool) -> Result<(), PowerError> {
        self.switch(true, force)
    }

    fn switch_off(&self, force: bool) -> Result<(), PowerError> {
        self.switch(false, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records every write.
    struct RecordingLine(Arc<Mutex<Vec<bool>>>);

    impl PowerLine for RecordingLine {
        fn write(&mut self, high: bool) -> Result<(), PowerError> {
            self.0.lock().unwrap().push(high);
            Ok(())
        }
    }

    fn setup(initial: Value) -> (tempfile::TempDir, StateStore, PowerController, Arc<Mutex<Vec<bool>>>) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).unwrap();
        store.set(&CRT_STATE, initial).unwrap();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let power = PowerController::new(store.clone(), Box::new(RecordingLine(writes.clone())));
        (dir, store, power, writes)
    }

    #[test]
    fn test_switch_on_twice_without_hardware_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).unwrap();
        let power = PowerController::new(store.clone(), Box::new(NullLine));
        assert!(!power.has_hardware());

        power.switch_on(false).unwrap();
        let first = store.document().unwrap();
        power.switch_on(false).unwrap();
        let second = store.document().unwrap();

        assert_eq!(first["crt"], json!({"state": true}));
        assert_eq!(first, second);
    }

    #[test]
    fn test_unforced_write_only_confirms_stored_state() {
        let (_dir, store, power, writes) = setup(Value::Null);

        // null agrees with nothing
        power.switch_on(false).unwrap();
        assert!(writes.lock().unwrap().is_empty());
        assert_eq!(store.get_bool(&CRT_STATE).unwrap(), Some(true));

        // stored true now confirms
        power.switch_on(false).unwrap();
        assert_eq!(*writes.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_unforced_off_against_stored_on_does_not_touch_pin() {
        let (_dir, store, power, writes) = setup(json!(true));
        power.switch_off(false).unwrap();
        assert!(writes.lock().unwrap().is_empty());
        assert_eq!(store.get_bool(&CRT_STATE).unwrap(), Some(false));
    }

    #[test]
    fn test_force_always_writes() {
        let (_dir, store, power, writes) = setup(json!(false));
        power.switch_on(true).unwrap();
        power.switch_off(true).unwrap();
        assert_eq!(*writes.lock().unwrap(), vec![true, false]);
        assert_eq!(store.get_bool(&CRT_STATE).unwrap(), Some(false));
    }

    #[test]
    fn test_open_line_without_pin_is_null() {
        assert!(!open_line(None).is_hardware());
    }
}
