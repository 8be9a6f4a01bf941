//! Storage configuration
//!
//! Loaded from TOML; every section is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! [geometry]
//! max_cartridges = 64
//! frames_per_cartridge = 1024
//! frame_size = 1024
//!
//! [cache]
//! capacity = 64
//!
//! [network]
//! host = "127.0.0.1"
//! port = 19876
//! read_timeout_ms = 5000
//! ```

use crate::error::{CartError, Result};
use crate::frame::{
    FrameLocation, DEFAULT_CARTRIDGE_SIZE, DEFAULT_FRAME_SIZE, DEFAULT_MAX_CARTRIDGES,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 19876;
pub const DEFAULT_CACHE_FRAMES: usize = 64;
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Upper bound on cartridges times frames per cartridge
///
/// The ownership table holds one entry per frame and is allocated up front.
pub const MAX_TOTAL_FRAMES: usize = 1 << 24;

/// Shape of the cartridge device
///
/// Cartridge and frame indices travel in 16-bit opcode fields, so neither
/// count may exceed 65536. Together they may not exceed [`MAX_TOTAL_FRAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Geometry {
    #[validate(range(min = 1, max = 65536))]
    pub max_cartridges: usize,

    #[validate(range(min = 1, max = 65536))]
    pub frames_per_cartridge: usize,

    #[validate(range(min = 1, max = 65536))]
    pub frame_size: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            max_cartridges: DEFAULT_MAX_CARTRIDGES,
            frames_per_cartridge: DEFAULT_CARTRIDGE_SIZE,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl Geometry {
    pub fn new(max_cartridges: usize, frames_per_cartridge: usize, frame_size: usize) -> Self {
        Geometry {
            max_cartridges,
            frames_per_cartridge,
            frame_size,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.max_cartridges * self.frames_per_cartridge
    }

    pub fn total_bytes(&self) -> usize {
        self.total_frames() * self.frame_size
    }

    pub fn contains(&self, location: FrameLocation) -> bool {
        (location.cartridge as usize) < self.max_cartridges
            && (location.frame as usize) < self.frames_per_cartridge
    }

    /// Flat index of a location in cartridge-major scan order
    pub fn index_of(&self, location: FrameLocation) -> Option<usize> {
        if !self.contains(location) {
            return None;
        }
        Some(location.cartridge as usize * self.frames_per_cartridge + location.frame as usize)
    }

    /// Location for a flat index; caller guarantees `index < total_frames()`
    pub fn location_at(&self, index: usize) -> FrameLocation {
        FrameLocation::new(
            (index / self.frames_per_cartridge) as u16,
            (index % self.frames_per_cartridge) as u16,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of frames the cache holds (1..=MAX_CACHE_FRAMES)
    #[validate(range(min = 1, max = 128))]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: DEFAULT_CACHE_FRAMES,
        }
    }
}

/// Where the cartridge server lives and how long socket calls may block
///
/// A timeout of 0 disables that deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NetworkConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl NetworkConfig {
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        NetworkConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Complete storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartConfig {
    pub geometry: Geometry,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
}

impl CartConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CartConfig =
            toml::from_str(text).map_err(|e| CartError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loaded configuration from {:?}", path.as_ref());
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CartError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry
            .validate()
            .map_err(|e| CartError::Config(format!("geometry: {}", e)))?;
        let total = self
            .geometry
            .max_cartridges
            .checked_mul(self.geometry.frames_per_cartridge);
        if !matches!(total, Some(n) if n <= MAX_TOTAL_FRAMES) {
            return Err(CartError::Config(format!(
                "geometry: {} cartridges of {} frames exceeds {} frames in total",
                self.geometry.max_cartridges,
                self.geometry.frames_per_cartridge,
                MAX_TOTAL_FRAMES
            )));
        }
        self.network
            .validate()
            .map_err(|e| CartError::Config(format!("network: {}", e)))?;
        if self.cache.validate().is_err() {
            return Err(CartError::InvalidCacheSize(self.cache.capacity));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CartConfig::default();
        config.validate().unwrap();
        assert_eq!(config.geometry.total_frames(), 64 * 1024);
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.network.port, 19876);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CartConfig::from_toml_str(
            r#"
            [geometry]
            max_cartridges = 4

            [cache]
            capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.geometry.max_cartridges, 4);
        assert_eq!(config.geometry.frames_per_cartridge, 1024);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.network.host, "127.0.0.1");
    }

    #[test]
    fn test_rejects_oversized_geometry() {
        let result = CartConfig::from_toml_str("[geometry]\nmax_cartridges = 70000\n");
        assert!(matches!(result, Err(CartError::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_frame_total() {
        let mut config = CartConfig::default();
        config.geometry = Geometry::new(65536, 65536, 65536);
        assert!(matches!(config.validate(), Err(CartError::Config(_))));

        // Each axis is in range on its own; only the product is too large
        config.geometry = Geometry::new(257, 65536, 16);
        assert!(matches!(config.validate(), Err(CartError::Config(_))));

        config.geometry = Geometry::new(256, 65536, 16);
        assert_eq!(config.geometry.total_frames(), MAX_TOTAL_FRAMES);
        config.validate().unwrap();

        let result = CartConfig::from_toml_str(
            "[geometry]\nmax_cartridges = 65536\nframes_per_cartridge = 65536\n",
        );
        assert!(matches!(result, Err(CartError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_cache_size() {
        let result = CartConfig::from_toml_str("[cache]\ncapacity = 0\n");
        assert!(matches!(result, Err(CartError::InvalidCacheSize(0))));

        let result = CartConfig::from_toml_str("[cache]\ncapacity = 129\n");
        assert!(matches!(result, Err(CartError::InvalidCacheSize(129))));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = CartConfig::default();
        config.geometry = Geometry::new(2, 16, 32);
        config.network = NetworkConfig::with_address("localhost", 4000);

        let text = config.to_toml_string().unwrap();
        let parsed = CartConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_geometry_indexing() {
        let geometry = Geometry::new(3, 4, 16);
        assert_eq!(geometry.total_frames(), 12);
        assert_eq!(geometry.index_of(FrameLocation::new(0, 0)), Some(0));
        assert_eq!(geometry.index_of(FrameLocation::new(2, 3)), Some(11));
        assert_eq!(geometry.index_of(FrameLocation::new(3, 0)), None);
        assert_eq!(geometry.index_of(FrameLocation::new(0, 4)), None);
        assert_eq!(geometry.location_at(5), FrameLocation::new(1, 1));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let mut network = NetworkConfig::default();
        network.read_timeout_ms = 0;
        assert_eq!(network.read_timeout(), None);
        assert_eq!(network.write_timeout(), Some(Duration::from_millis(5000)));
    }
}
