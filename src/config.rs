use crate::error::{RemuxError, Result};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Smallest pack the muxer accepts.
pub const MIN_PACK_SIZE: usize = 64;
/// Largest pack whose PES length field still fits in 16 bits.
pub const MAX_PACK_SIZE: usize = 0xFFFF + 20;

const CONFIG_PATHS: [&str; 2] = ["./psremux.toml", "./psremux_config.toml"];

lazy_static! {
    static ref CONFIG: RwLock<MuxConfig> = RwLock::new(MuxConfig::load());
}

/// Muxer settings shared by the pack writers and [`crate::format::ps::PSMuxer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxConfig {
    /// Size of every emitted pack in bytes
    pub pack_size: usize,
    /// Multiplex rate in bytes per second
    pub mux_rate: u32,
    /// Capacity of the video staging ring
    pub video_buffer_size: usize,
    /// Capacity of each audio staging ring
    pub audio_buffer_size: usize,
    /// Emit a DVD navigation pack in front of the stream
    pub navigation_packs: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            pack_size: 2048,
            mux_rate: 1_260_000,
            video_buffer_size: 4 * 1024 * 1024,
            audio_buffer_size: 256 * 1024,
            navigation_packs: false,
        }
    }
}

impl MuxConfig {
    /// Builds a config from defaults, then environment variables, then the
    /// first readable config file. Invalid values are logged and skipped.
    pub fn load() -> Self {
        let mut config = MuxConfig::default();

        for (key, var) in [
            ("pack_size", "PSREMUX_PACK_SIZE"),
            ("mux_rate", "PSREMUX_MUX_RATE"),
            ("video_buffer_size", "PSREMUX_VIDEO_BUFFER"),
            ("audio_buffer_size", "PSREMUX_AUDIO_BUFFER"),
            ("navigation_packs", "PSREMUX_NAV_PACKS"),
        ] {
            if let Ok(value) = env::var(var) {
                if let Err(e) = config.set(key, &value) {
                    log::warn!("ignoring {}: {}", var, e);
                }
            }
        }

        for path in &CONFIG_PATHS {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    if let Err(e) = config.apply_str(&content) {
                        log::warn!("ignoring {}: {}", path, e);
                    }
                    break;
                }
            }
        }

        config
    }

    /// Applies `key = value` lines. `#` starts a comment line.
    pub fn apply_str(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(RemuxError::Config(format!("malformed line '{}'", line)));
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.set(key.trim(), value)?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "pack_size" => self.pack_size = value.parse()?,
            "mux_rate" => self.mux_rate = value.parse()?,
            "video_buffer_size" => self.video_buffer_size = value.parse()?,
            "audio_buffer_size" => self.audio_buffer_size = value.parse()?,
            "navigation_packs" => {
                self.navigation_packs = match value {
                    "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    other => {
                        return Err(RemuxError::Config(format!(
                            "navigation_packs expects a boolean, got '{}'",
                            other
                        )))
                    }
                }
            }
            other => return Err(RemuxError::Config(format!("unknown key '{}'", other))),
        }
        Ok(())
    }

    /// Checks the settings the pack writers rely on.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PACK_SIZE..=MAX_PACK_SIZE).contains(&self.pack_size) {
            return Err(RemuxError::Config(format!(
                "pack size {} outside {}..={}",
                self.pack_size, MIN_PACK_SIZE, MAX_PACK_SIZE
            )));
        }
        if self.mux_rate == 0 {
            return Err(RemuxError::Config("mux rate must be non-zero".into()));
        }
        if self.mux_rate / 50 > 0x3F_FFFF {
            return Err(RemuxError::Config(format!(
                "mux rate {} does not fit the 22-bit field",
                self.mux_rate
            )));
        }
        if self.video_buffer_size < self.pack_size || self.audio_buffer_size < self.pack_size {
            return Err(RemuxError::Config(
                "staging buffers must hold at least one pack".into(),
            ));
        }
        Ok(())
    }

    /// Reloads the process-wide configuration.
    pub fn reload() {
        *CONFIG.write() = MuxConfig::load();
    }
}

/// Returns a copy of the process-wide configuration.
pub fn current() -> MuxConfig {
    CONFIG.read().clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# psremux configuration
# Every key is optional; environment variables PSREMUX_* take precedence
# over defaults, this file over both.

pack_size = 2048
mux_rate = 1260000
video_buffer_size = 4194304
audio_buffer_size = 262144
navigation_packs = false
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
