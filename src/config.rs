/*
 *  config.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Application settings: YAML file, CLI and environment overrides
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

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

pub const DEFAULT_CAST_NAME: &str = "Hi-fi System";
pub const DEFAULT_POLL_MS: u64 = 1000;
pub const DEFAULT_API_PORT: u16 = 5000;
pub const DEFAULT_FB_DEVICE: &str = "/dev/fb0";

/// Error type for settings loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Yaml(_) => "Yaml",
            ConfigError::Io(_) => "Io",
            ConfigError::Validation(_) => "Validation",
        }
    }
}

/// Top-level settings. Everything is optional so layers can be merged;
/// the accessors supply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Friendly name of the media player to follow
    pub cast_name: Option<String>,
    /// Config Store document (crt/mirror switches)
    pub state_file: Option<PathBuf>,
    pub artwork_dir: Option<PathBuf>,
    /// BCM pin of the CRT power relay
    pub crt_pin: Option<u8>,
    pub display: Option<DisplayConfig>,
    pub source: Option<SourceConfig>,
    pub lighting: Option<LightingConfig>,
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    pub device: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub headless: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub poll_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LightingConfig {
    pub host: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    pub port: Option<u16>,
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn cast_name(&self) -> &str {
        self.cast_name.as_deref().unwrap_or(DEFAULT_CAST_NAME)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| home_or_cwd().join(".config/crtmirror/state.json"))
    }

    pub fn artwork_dir(&self) -> PathBuf {
        self.artwork_dir
            .clone()
            .unwrap_or_else(|| home_or_cwd().join("crt_artwork"))
    }

    pub fn display_device(&self) -> PathBuf {
        self.display
            .as_ref()
            .and_then(|d| d.device.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FB_DEVICE))
    }

    /// Explicit geometry, used by the headless driver.
    pub fn display_size(&self) -> Option<(u32, u32)> {
        let d = self.display.as_ref()?;
        Some((d.width?, d.height?))
    }

    pub fn headless(&self) -> bool {
        self.display.as_ref().and_then(|d| d.headless).unwrap_or(false)
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.url.as_deref())
    }

    pub fn source_token(&self) -> &str {
        self.source.as_ref().and_then(|s| s.token.as_deref()).unwrap_or("")
    }

    pub fn poll_ms(&self) -> u64 {
        self.source.as_ref().and_then(|s| s.poll_ms).unwrap_or(DEFAULT_POLL_MS)
    }

    /// Host and token, only when both are configured.
    pub fn lighting(&self) -> Option<(&str, &str)> {
        let l = self.lighting.as_ref()?;
        Some((l.host.as_deref()?, l.token.as_deref()?))
    }

    pub fn api_port(&self) -> u16 {
        self.api.as_ref().and_then(|a| a.port).unwrap_or(DEFAULT_API_PORT)
    }
}

fn home_or_cwd() -> PathBuf {
    home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "crtmirror", version, about = "Now-playing mirror for a repurposed CRT")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Enable debug log level
    #[arg(short = 'v', long, alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Media player friendly name to follow
    #[arg(short = 'N', long = "name")]
    pub cast_name: Option<String>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub state_file: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub artwork_dir: Option<PathBuf>,
    #[arg(long, env = "CRT_PIN")]
    pub crt_pin: Option<u8>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub display_device: Option<PathBuf>,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    /// Render to an in-memory display
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,
    #[arg(long, env = "CRT_SOURCE_URL")]
    pub source_url: Option<String>,
    #[arg(long, env = "CRT_SOURCE_TOKEN", hide_env_values = true)]
    pub source_token: Option<String>,
    #[arg(long)]
    pub poll_ms: Option<u64>,
    #[arg(long, env = "NANOLEAF_HOST")]
    pub lighting_host: Option<String>,
    #[arg(long, env = "NANOLEAF_TOKEN", hide_env_values = true)]
    pub lighting_token: Option<String>,
    #[arg(long, env = "CRT_API_PORT")]
    pub api_port: Option<u16>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if !p.exists() {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        merge(&mut cfg, read_yaml(p)?);
    } else if let Some(p) = find_config_file() {
        merge(&mut cfg, read_yaml(&p)?);
    }

    apply_cli_overrides(&mut cfg, cli);
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    if let Some(home) = home_dir() {
        let p = home.join(".config/crtmirror/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/crtmirror.yaml");
        if p.exists() { return Some(p) }
    }
    for candidate in &["crtmirror.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&s)?)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()   { dst.log_level = src.log_level; }
    if src.cast_name.is_some()   { dst.cast_name = src.cast_name; }
    if src.state_file.is_some()  { dst.state_file = src.state_file; }
    if src.artwork_dir.is_some() { dst.artwork_dir = src.artwork_dir; }
    if src.crt_pin.is_some()     { dst.crt_pin = src.crt_pin; }

    match (&mut dst.display, src.display) {
        (None, Some(s)) => dst.display = Some(s),
        (Some(d), Some(s)) => {
            if s.device.is_some()   { d.device = s.device; }
            if s.width.is_some()    { d.width = s.width; }
            if s.height.is_some()   { d.height = s.height; }
            if s.headless.is_some() { d.headless = s.headless; }
        }
        _ => {}
    }
    match (&mut dst.source, src.source) {
        (None, Some(s)) => dst.source = Some(s),
        (Some(d), Some(s)) => {
            if s.url.is_some()     { d.url = s.url; }
            if s.token.is_some()   { d.token = s.token; }
            if s.poll_ms.is_some() { d.poll_ms = s.poll_ms; }
        }
        _ => {}
    }
    match (&mut dst.lighting, src.lighting) {
        (None, Some(s)) => dst.lighting = Some(s),
        (Some(d), Some(s)) => {
            if s.host.is_some()  { d.host = s.host; }
            if s.token.is_some() { d.token = s.token; }
        }
        _ => {}
    }
    match (&mut dst.api, src.api) {
        (None, Some(s)) => dst.api = Some(s),
        (Some(d), Some(s)) => {
            if s.port.is_some() { d.port = s.port; }
        }
        _ => {}
    }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()   { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                 { cfg.log_level = Some("debug".into()); }
    if cli.cast_name.is_some()   { cfg.cast_name = cli.cast_name.clone(); }
    if cli.state_file.is_some()  { cfg.state_file = cli.state_file.clone(); }
    if cli.artwork_dir.is_some() { cfg.artwork_dir = cli.artwork_dir.clone(); }
    if cli.crt_pin.is_some()     { cfg.crt_pin = cli.crt_pin; }

    if cli.display_device.is_some() || cli.display_width.is_some()
        || cli.display_height.is_some() || cli.headless
    {
        let display = cfg.display.get_or_insert_with(DisplayConfig::default);
        if cli.display_device.is_some() { display.device = cli.display_device.clone(); }
        if cli.display_width.is_some()  { display.width = cli.display_width; }
        if cli.display_height.is_some() { display.height = cli.display_height; }
        if cli.headless                 { display.headless = Some(true); }
    }

    if cli.source_url.is_some() || cli.source_token.is_some() || cli.poll_ms.is_some() {
        let source = cfg.source.get_or_insert_with(SourceConfig::default);
        if cli.source_url.is_some()   { source.url = cli.source_url.clone(); }
        if cli.source_token.is_some() { source.token = cli.source_token.clone(); }
        if cli.poll_ms.is_some()      { source.poll_ms = cli.poll_ms; }
    }

    if cli.lighting_host.is_some() || cli.lighting_token.is_some() {
        let lighting = cfg.lighting.get_or_insert_with(LightingConfig::default);
        if cli.lighting_host.is_some()  { lighting.host = cli.lighting_host.clone(); }
        if cli.lighting_token.is_some() { lighting.token = cli.lighting_token.clone(); }
    }

    if cli.api_port.is_some() {
        cfg.api.get_or_insert_with(ApiConfig::default).port = cli.api_port;
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(display) = cfg.display.as_ref() {
        if let (Some(w), Some(h)) = (display.width, display.height) {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation("display width/height must be > 0".into()));
            }
        }
    }
    if cfg.poll_ms() == 0 {
        return Err(ConfigError::Validation("source poll_ms must be > 0".into()));
    }
    if cfg.source_url().is_none_or(|u| u.trim().is_empty()) {
        return Err(ConfigError::Validation("source url is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("crtmirror").chain(args.iter().copied()))
    }

    fn yaml_file(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.cast_name(), "Hi-fi System");
        assert_eq!(cfg.poll_ms(), 1000);
        assert_eq!(cfg.api_port(), 5000);
        assert_eq!(cfg.display_device(), PathBuf::from("/dev/fb0"));
        assert!(cfg.state_file().ends_with(".config/crtmirror/state.json"));
        assert!(cfg.artwork_dir().ends_with("crt_artwork"));
        assert!(!cfg.headless());
        assert!(cfg.lighting().is_none());
    }

    #[test]
    fn test_yaml_then_cli_precedence() {
        let f = yaml_file(
            "cast_name: Kitchen\nsource:\n  url: http://hass.local:8123\n  poll_ms: 500\napi:\n  port: 8080\n",
        );
        let path = f.path().to_str().unwrap();

        let cfg = load_with(&cli(&["--config", path, "--poll-ms", "250", "-v"])).unwrap();
        assert_eq!(cfg.cast_name(), "Kitchen");
        assert_eq!(cfg.source_url(), Some("http://hass.local:8123"));
        assert_eq!(cfg.poll_ms(), 250);
        assert_eq!(cfg.api_port(), 8080);
        assert_eq!(cfg.log_level(), "debug");
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut dst = Config {
            display: Some(DisplayConfig { width: Some(640), height: Some(480), ..Default::default() }),
            ..Default::default()
        };
        let src = Config {
            display: Some(DisplayConfig { headless: Some(true), ..Default::default() }),
            ..Default::default()
        };
        merge(&mut dst, src);
        assert_eq!(dst.display_size(), Some((640, 480)));
        assert!(dst.headless());
    }

    #[test]
    fn test_lighting_needs_host_and_token() {
        let mut cfg = Config {
            lighting: Some(LightingConfig { host: Some("10.0.0.5".into()), token: None }),
            ..Default::default()
        };
        assert!(cfg.lighting().is_none());
        cfg.lighting.as_mut().unwrap().token = Some("abc".into());
        assert_eq!(cfg.lighting(), Some(("10.0.0.5", "abc")));
    }

    #[test]
    fn test_validation() {
        let f = yaml_file("source:\n  url: http://hass.local:8123\n");
        let path = f.path().to_str().unwrap();

        let err = load_with(&cli(&["--config", path, "--poll-ms", "0"])).unwrap_err();
        assert_eq!(err.kind(), "Validation");

        let err = load_with(&cli(&[
            "--config", path, "--display-width", "0", "--display-height", "480",
        ]))
        .unwrap_err();
        assert_eq!(err.kind(), "Validation");

        let empty = yaml_file("cast_name: Lounge\n");
        let err = load_with(&cli(&["--config", empty.path().to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("source url"));
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_with(&cli(&["--config", "/nonexistent/crtmirror.yaml"])).unwrap_err();
        assert_eq!(err.kind(), "Validation");
    }

    #[test]
    fn test_bad_yaml() {
        let f = yaml_file("source: [unterminated\n");
        let err = load_with(&cli(&["--config", f.path().to_str().unwrap()])).unwrap_err();
        assert_eq!(err.kind(), "Yaml");
    }
}
