//! # Engine configuration
//!
//! All tunables of the harness live in [`EngineConfig`]. Every field has a
//! default, so an empty TOML document is a valid configuration and a file
//! only needs to name what it overrides.
//!
//! ```toml
//! log_filter = "info,ember=trace"
//!
//! [window]
//! width = 1280
//! height = 720
//!
//! [frames]
//! frame_count = 2
//!
//! [heaps]
//! cbv_srv_uav = 128
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest number of frames the ring may keep in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 5;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub window: WindowConfig,
    pub frames: FrameConfig,
    pub memory: MemoryConfig,
    pub heaps: HeapConfig,
    pub render: RenderConfig,
}

/// Window title and initial client size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Frame ring sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of ring slots (frames in flight).
    pub frame_count: usize,
    /// How long a slot acquisition may wait on the GPU before the device
    /// is considered lost.
    pub fence_timeout_ms: u64,
}

/// Arena sizes in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Total size of the dynamic constant arena, split evenly across slots.
    pub constant_arena_bytes: u64,
    /// Capacity of the static geometry pool.
    pub geometry_pool_bytes: u64,
}

/// View heap capacities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    pub rtv: u32,
    pub dsv: u32,
    pub cbv_srv_uav: u32,
    pub sampler: u32,
}

/// Presentation and pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub enable_validation: bool,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub fov_y_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: crate::logging::DEFAULT_FILTER.to_string(),
            window: WindowConfig::default(),
            frames: FrameConfig::default(),
            memory: MemoryConfig::default(),
            heaps: HeapConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_count: 3,
            fence_timeout_ms: 5_000,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            constant_arena_bytes: 4 * 1024 * 1024,
            geometry_pool_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            rtv: 8,
            dsv: 2,
            cbv_srv_uav: 64,
            sampler: 8,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.4, 1.0, 1.0],
            vsync: true,
            enable_validation: cfg!(debug_assertions),
            vertex_shader: PathBuf::from("shaders/scene.vert.spv"),
            fragment_shader: PathBuf::from("shaders/scene.frag.spv"),
            fov_y_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 1000.0,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fence wait timeout as a [`Duration`](std::time::Duration).
    #[inline]
    pub fn fence_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frames.fence_timeout_ms)
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let frames = self.frames.frame_count;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frame_count must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames}"
            )));
        }
        if self.memory.constant_arena_bytes == 0 || self.memory.geometry_pool_bytes == 0 {
            return Err(Error::Config("arena sizes must be non-zero".to_string()));
        }
        if self.heaps.rtv == 0 || self.heaps.dsv == 0 || self.heaps.cbv_srv_uav == 0 {
            return Err(Error::Config(
                "rtv, dsv and cbv_srv_uav heaps need at least one slot".to_string(),
            ));
        }
        if self.render.near_plane <= 0.0 || self.render.far_plane <= self.render.near_plane {
            return Err(Error::Config(format!(
                "invalid clip planes: near {} far {}",
                self.render.near_plane, self.render.far_plane
            )));
        }
        Ok(())
    }
}
