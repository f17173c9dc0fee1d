//! Configuration loading and parsing.
//!
//! Parses `landing-sync.toml` (or an override path provided by the binary).
//! Every key is optional; missing sections fall back to defaults and unknown
//! fields are ignored so the file can evolve without immediate warnings. A
//! file that fails to parse also falls back to defaults.
//!
//! The debounce interval is clamped to `[0, DEBOUNCE_MAX_MS]` by
//! `Config::apply_limits`; the raw parsed value is retained alongside the
//! effective one.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "landing-sync.toml";
pub const DEBOUNCE_MAX_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Clone)]
pub struct PreviewConfig {
    /// Quiet interval before a burst of edits is dispatched to the preview.
    #[serde(default = "PreviewConfig::default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
        }
    }
}

impl PreviewConfig {
    const fn default_debounce_ms() -> u64 {
        300
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    /// Append a block whose identity is missing from the list instead of
    /// dropping the edit.
    #[serde(default = "MergeConfig::default_true")]
    pub append_on_missing: bool,
    /// Reject dispatches older than the last one accepted for the same block.
    #[serde(default = "MergeConfig::default_true")]
    pub reject_stale: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            append_on_missing: true,
            reject_stale: true,
        }
    }
}

impl MergeConfig {
    const fn default_true() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_ms: Self::default_tick_ms(),
        }
    }
}

impl RuntimeConfig {
    const fn default_tick_ms() -> u64 {
        250
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub raw: Option<String>,        // original file string (optional)
    pub file: ConfigFile,           // parsed (or default) data
    pub effective_debounce_ms: u64, // clamped
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            raw: None,
            effective_debounce_ms: file.preview.debounce_ms,
            file,
        }
    }
}

/// Best-effort config path: working directory first, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("landing-sync").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let mut cfg = Config {
                raw: Some(content),
                file,
                effective_debounce_ms: 0,
            };
            cfg.apply_limits();
            Ok(cfg)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Clamp the debounce interval. Returns the effective value.
    pub fn apply_limits(&mut self) -> u64 {
        let raw = self.file.preview.debounce_ms;
        let clamped = raw.min(DEBOUNCE_MAX_MS);
        if clamped != raw {
            info!(
                target: "config",
                raw,
                clamped,
                max = DEBOUNCE_MAX_MS,
                "debounce_ms_clamped"
            );
        }
        self.effective_debounce_ms = clamped;
        clamped
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.effective_debounce_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.file.runtime.tick_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), body).unwrap();
        tmp
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.preview.debounce_ms, 300);
        assert_eq!(cfg.debounce(), Duration::from_millis(300));
        assert!(cfg.file.merge.append_on_missing);
        assert!(cfg.file.merge.reject_stale);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
    }

    #[test]
    fn parses_all_sections() {
        let tmp = write_config(
            "[preview]\ndebounce_ms = 120\n[merge]\nappend_on_missing = false\nreject_stale = false\n[runtime]\ntick_ms = 50\n",
        );
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective_debounce_ms, 120);
        assert!(!cfg.file.merge.append_on_missing);
        assert!(!cfg.file.merge.reject_stale);
        assert_eq!(cfg.file.runtime.tick_ms, 50);
        assert!(cfg.raw.is_some());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let tmp = write_config("[merge]\nreject_stale = false\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.file.merge.append_on_missing);
        assert!(!cfg.file.merge.reject_stale);
        assert_eq!(cfg.effective_debounce_ms, 300);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = write_config("[preview\ndebounce_ms = ");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.effective_debounce_ms, 300);
    }

    #[test]
    fn clamp_logging_uses_config_target() {
        let tmp = write_config("[preview]\ndebounce_ms = 60000\n");
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || load_from(Some(tmp.path().to_path_buf()))).unwrap();

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("debounce_ms_clamped"));
        assert_eq!(cfg.effective_debounce_ms, DEBOUNCE_MAX_MS);
        assert_eq!(cfg.file.preview.debounce_ms, 60000);
    }
}
