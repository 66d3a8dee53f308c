//! Renderer and cache configuration
//!
//! JSON on disk, every field optional (`#[serde(default)]`), so older config
//! files keep loading when fields are added.
//!
//! # Frame Skip
//!
//! The playback clock runs at `60 / frame_skip` Hz. `Auto` picks 1 on a
//! capable machine and 2 in low-power mode or with too few cores, halving
//! decode work when the UI thread has the least headroom.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How the frame skip factor is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FrameSkipPolicy {
    /// Derive from power state and CPU count at construction
    #[default]
    Auto,
    /// Always use this factor (clamped to >= 1)
    Fixed(u32),
}

/// Settings for `MultiAnimationRenderer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub frame_skip: FrameSkipPolicy,
    /// Reduced-performance mode reported by the host (battery saver etc.)
    pub low_power_mode: bool,
    /// Fewer logical CPUs than this forces frame skip 2 under `Auto`
    pub full_rate_min_cpus: usize,
    pub decode_queue_name: String,
    pub first_frame_queue_name: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_skip: FrameSkipPolicy::Auto,
            low_power_mode: false,
            full_rate_min_cpus: 3,
            decode_queue_name: "multianim-decode".to_string(),
            first_frame_queue_name: "multianim-first-frame".to_string(),
        }
    }
}

impl RendererConfig {
    /// Frame skip factor for this machine
    pub fn resolve_frame_skip(&self) -> u32 {
        match self.frame_skip {
            FrameSkipPolicy::Fixed(n) => n.max(1),
            FrameSkipPolicy::Auto => {
                let cpus = num_cpus::get();
                let skip = derive_frame_skip(self.low_power_mode, cpus, self.full_rate_min_cpus);
                debug!(
                    "Frame skip: {} (low_power={}, cpus={}, min_cpus={})",
                    skip, self.low_power_mode, cpus, self.full_rate_min_cpus
                );
                skip
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// 1 normally, 2 in low-power mode or below `min_cpus` logical CPUs
pub fn derive_frame_skip(low_power_mode: bool, cpus: usize, min_cpus: usize) -> u32 {
    if !low_power_mode && cpus >= min_cpus { 1 } else { 2 }
}

/// Settings for `MemoryAnimationCache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fraction of available memory the cache may use (0.0-1.0)
    pub mem_fraction: f64,
    /// Memory left for the rest of the system (MB)
    pub reserve_mb: u64,
    /// Maximum resident items before LRU eviction
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mem_fraction: 0.25,
            reserve_mb: 512,
            capacity: 512,
        }
    }
}
