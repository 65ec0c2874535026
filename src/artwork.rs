/*
 *  artwork.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Write-once on-disk artwork cache keyed by artist and album
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
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, header};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no artwork URL and nothing cached for `{0}`")]
    NoUrl(String),
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("artwork key `{artist}` / `{album_or_title}` has no usable characters")]
    EmptyKey { artist: String, album_or_title: String },
}

impl ArtworkError {
    pub fn kind(&self) -> &'static str {
        match self {
            ArtworkError::Http(_) => "Http",
            ArtworkError::Io { .. } => "Io",
            ArtworkError::NoUrl(_) => "NoUrl",
            ArtworkError::Decode(_) => "Decode",
            ArtworkError::EmptyKey { .. } => "EmptyKey",
        }
    }
}

/// Source of artwork bytes on a cache miss.
pub trait ArtworkFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ArtworkError>> + Send;
}

/// Plain HTTP GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ArtworkError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("image/*"));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(HttpFetcher { client })
    }
}

impl ArtworkFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtworkError> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Lowercase, treat runs of non-word characters as separators, join words with `_`.
///
/// `"AC/DC"`, `"ac dc"` and `"Ac-Dc!"` all become `ac_dc`.
pub fn normalize_key(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `<root>/<artist>/<album-or-title>` cache of raw image bytes.
///
/// Entries are written once and never refreshed. A miss is not locked, so two
/// overlapping resolutions of one key may both fetch and write the same file.
#[derive(Debug, Clone)]
pub struct ArtworkCache<F: ArtworkFetcher = HttpFetcher> {
    root: PathBuf,
    fetcher: F,
}

impl<F: ArtworkFetcher> ArtworkCache<F> {
    pub fn new(root: impl Into<PathBuf>, fetcher: F) -> Result<Self, ArtworkError> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|source| ArtworkError::Io {
                path: root.clone(),
                source,
            })?;
        }
        Ok(ArtworkCache { root, fetcher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// On-disk location for an (artist, album-or-title) pair.
    pub fn path_for(&self, artist: &str, album_or_title: &str) -> PathBuf {
        self.root
            .join(normalize_key(artist))
            .join(normalize_key(album_or_title))
    }

    /// Cached bytes for the key, fetching `url` and persisting on a miss.
    pub async fn resolve(
        &self,
        artist: &str,
        album_or_title: &str,
        url: Option<&str>,
    ) -> Result<(PathBuf, Vec<u8>), ArtworkError> {
        if normalize_key(artist).is_empty() || normalize_key(album_or_title).is_empty() {
            return Err(ArtworkError::EmptyKey {
                artist: artist.to_string(),
                album_or_title: album_or_title.to_string(),
            });
        }
        let path = self.path_for(artist, album_or_title);

        if let Some(artist_dir) = path.parent() {
            if !artist_dir.exists() {
                fs::create_dir_all(artist_dir).map_err(|source| ArtworkError::Io {
                    path: artist_dir.to_path_buf(),
                    source,
                })?;
                info!("Created artwork directory for `{}`: `{}`", artist, artist_dir.display());
            }
        }

        if path.is_file() {
            let bytes = fs::read(&path).map_err(|source| ArtworkError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("Retrieved artwork from `{}`", path.display());
            return Ok((path, bytes));
        }

        let Some(url) = url else {
            return Err(ArtworkError::NoUrl(path.display().to_string()));
        };

        let bytes = self.fetcher.fetch(url).await?;
        fs::write(&path, &bytes).map_err(|source| ArtworkError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "Saved artwork for `{}` by `{}` to `{}`",
            album_or_title,
            artist,
            path.display()
        );

        Ok((path, bytes))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed bytes and counts calls.
    #[derive(Clone, Default)]
    pub(crate) struct CountingFetcher {
        pub calls: Arc<AtomicUsize>,
        pub body: Vec<u8>,
        pub fail: bool,
    }

    impl ArtworkFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ArtworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ArtworkError::NoUrl("simulated".into()));
            }
            Ok(self.body.clone())
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("AC/DC"), "ac_dc");
        assert_eq!(normalize_key("ac dc"), "ac_dc");
        assert_eq!(normalize_key("Back in Black!"), "back_in_black");
        assert_eq!(normalize_key("  The   Wall "), "the_wall");
        assert_eq!(normalize_key("Sigur Rós"), "sigur_rós");
    }

    #[tokio::test]
    async fn test_second_resolve_is_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher { body: b"jpeg bytes".to_vec(), ..Default::default() };
        let cache = ArtworkCache::new(dir.path(), fetcher.clone()).unwrap();

        let (p1, b1) = cache.resolve("Pink Floyd", "The Wall", Some("http://x/a.jpg")).await.unwrap();
        let (p2, b2) = cache.resolve("Pink Floyd", "The Wall", Some("http://x/a.jpg")).await.unwrap();

        assert_eq!(b1, b2);
        assert_eq!(p1, p2);
        assert_eq!(p1, dir.path().join("pink_floyd").join("the_wall"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_punctuation_insensitive_keys_share_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher { body: vec![1, 2, 3], ..Default::default() };
        let cache = ArtworkCache::new(dir.path(), fetcher.clone()).unwrap();

        let (p1, _) = cache.resolve("AC/DC", "Back in Black!", Some("http://x")).await.unwrap();
        let (p2, _) = cache.resolve("ac dc", "back in black", Some("http://x")).await.unwrap();

        assert_eq!(p1, p2);
        assert!(p1.ends_with("ac_dc/back_in_black"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher { fail: true, ..Default::default() };
        let cache = ArtworkCache::new(dir.path(), fetcher).unwrap();

        assert!(cache.resolve("A", "B", Some("http://x")).await.is_err());
        assert!(!cache.path_for("A", "B").exists());
    }

    #[tokio::test]
    async fn test_miss_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtworkCache::new(dir.path(), CountingFetcher::default()).unwrap();
        let err = cache.resolve("A", "B", None).await.unwrap_err();
        assert_eq!(err.kind(), "NoUrl");
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher { body: vec![1], ..Default::default() };
        let cache = ArtworkCache::new(dir.path(), fetcher.clone()).unwrap();

        let err = cache.resolve("!!!", "Album", Some("http://x")).await.unwrap_err();
        assert_eq!(err.kind(), "EmptyKey");
        let err = cache.resolve("Artist", "", Some("http://x")).await.unwrap_err();
        assert_eq!(err.kind(), "EmptyKey");

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
