/*
 *  state_store.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Persistent key-path state document shared with the control surface
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

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub const CRT_STATE: [&str; 2] = ["crt", "state"];
pub const MIRROR_STATE: [&str; 2] = ["mirrorControl", "state"];

/// Error type for the state document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot use `{0}` as a key path")]
    BadPath(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "Io",
            StoreError::Json { .. } => "Json",
            StoreError::BadPath(_) => "BadPath",
        }
    }
}

/// The compiled-in schema every loaded document is merged against.
pub fn default_schema() -> Value {
    json!({
        "crt": { "state": null },
        "mirrorControl": { "state": null },
    })
}

/// Insert every key of `defaults` missing from `doc`, recursing into nested maps.
/// Existing values, including unknown extra keys, are left untouched.
pub fn merge_defaults(defaults: &Value, doc: &mut Value) {
    let (Value::Object(defaults), Value::Object(doc)) = (defaults, doc) else {
        return;
    };
    for (key, value) in defaults {
        match doc.get_mut(key) {
            None => {
                doc.insert(key.clone(), value.clone());
            }
            Some(existing) => {
                if value.is_object() {
                    merge_defaults(value, existing);
                }
            }
        }
    }
}

/// JSON document on disk addressed by key paths, e.g. `["crt", "state"]`.
///
/// Each `get`/`set` re-reads the whole file and `set` rewrites it. There is no
/// locking: when the control surface and the bridge write concurrently the
/// later writer wins.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Open the document at `path`, creating it from the default schema when
    /// absent, otherwise merging the schema in and persisting the result.
    ///
    /// Malformed JSON is returned as an error; callers treat it as fatal.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_defaults(path, &default_schema())
    }

    pub fn open_with_defaults(path: impl Into<PathBuf>, defaults: &Value) -> Result<Self, StoreError> {
        let store = StateStore { path: path.into() };

        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        if store.path.exists() {
            let mut doc = store.read()?;
            merge_defaults(defaults, &mut doc);
            store.write(&doc)?;
            debug!("Merged default schema into `{}`", store.path.display());
        } else {
            store.write(defaults)?;
            info!("Created state document `{}`", store.path.display());
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole document.
    pub fn document(&self) -> Result<Value, StoreError> {
        self.read()
    }

    /// Value at `keys`; missing keys resolve to `null`.
    pub fn get(&self, keys: &[&str]) -> Result<Value, StoreError> {
        debug!("Getting state for `{}`", keys.join("."));
        let doc = self.read()?;
        let mut node = &doc;
        for key in keys {
            match node.get(*key) {
                Some(next) => node = next,
                None => return Ok(Value::Null),
            }
        }
        Ok(node.clone())
    }

    /// Boolean at `keys`, `None` when null, missing or not a bool.
    pub fn get_bool(&self, keys: &[&str]) -> Result<Option<bool>, StoreError> {
        Ok(self.get(keys)?.as_bool())
    }

    /// Set the value at `keys`, creating intermediate maps as needed.
    pub fn set(&self, keys: &[&str], value: Value) -> Result<(), StoreError> {
        debug!("Setting state to `{}` for `{}`", value, keys.join("."));

        let Some((target, parents)) = keys.split_last() else {
            return Err(StoreError::BadPath(String::new()));
        };

        let mut doc = self.read()?;
        let mut node = &mut doc;
        for key in parents {
            node = match node {
                Value::Object(map) => map
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return Err(StoreError::BadPath(keys.join("."))),
            };
        }
        match node {
            Value::Object(map) => {
                map.insert(target.to_string(), value);
            }
            _ => return Err(StoreError::BadPath(keys.join("."))),
        }

        self.write(&doc)
    }

    /// Flip a boolean; null counts as false. Returns the new value.
    pub fn toggle(&self, keys: &[&str]) -> Result<bool, StoreError> {
        let next = !self.get_bool(keys)?.unwrap_or(false);
        self.set(keys, Value::Bool(next))?;
        Ok(next)
    }

    fn read(&self) -> Result<Value, StoreError> {
        let s = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&s).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, doc: &Value) -> Result<(), StoreError> {
        let s = serde_json::to_string(doc).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, s).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
