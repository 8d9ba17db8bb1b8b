//! # Heap Configuration
//!
//! Loaded once at startup, before [`crate::memory::init`].
//!
//! ```toml
//! initial_capacity = 1048576
//! max_capacity = 67108864
//! page_size = 65536
//! allow_growth = true
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::layout::{GRANULE, MAX_ALIGN};

/// WebAssembly page size. Also the default native growth step.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Configuration for the engine heap.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
    /// Bytes committed at initialization.
    pub initial_capacity: usize,
    /// Bytes reserved up front. The heap never grows past this.
    pub max_capacity: usize,
    /// Growth step in bytes.
    pub page_size: usize,
    /// Whether the heap may grow past `initial_capacity`.
    pub allow_growth: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16 * WASM_PAGE_SIZE, // 1 MiB
            max_capacity: 1024 * WASM_PAGE_SIZE,   // 64 MiB
            page_size: WASM_PAGE_SIZE,
            allow_growth: true,
        }
    }
}

impl HeapConfig {
    /// Fixed-size heap: no growth past `capacity`.
    #[must_use]
    pub fn fixed(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            max_capacity: capacity,
            page_size: WASM_PAGE_SIZE,
            allow_growth: false,
        }
    }

    /// Parses a config from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> RuntimeResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Upper bound the heap may reach under this config.
    #[must_use]
    pub fn limit(&self) -> usize {
        if self.allow_growth {
            self.max_capacity
        } else {
            self.initial_capacity
        }
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidConfig`] describing the first violated rule.
    pub fn validate(&self) -> RuntimeResult<()> {
        let invalid = |msg: String| Err(RuntimeError::InvalidConfig(msg));

        if self.page_size == 0 || !self.page_size.is_power_of_two() || self.page_size < MAX_ALIGN {
            return invalid(format!(
                "page_size {} must be a power of two >= {MAX_ALIGN}",
                self.page_size
            ));
        }
        if self.initial_capacity < 2 * GRANULE {
            return invalid(format!(
                "initial_capacity {} is below the minimum of {} bytes",
                self.initial_capacity,
                2 * GRANULE
            ));
        }
        if self.initial_capacity > self.max_capacity {
            return invalid(format!(
                "initial_capacity {} exceeds max_capacity {}",
                self.initial_capacity, self.max_capacity
            ));
        }
        // Heap records store offsets as u32, like wasm32 linear memory.
        if u32::try_from(self.max_capacity).is_err() {
            return invalid(format!("max_capacity {} exceeds 4 GiB", self.max_capacity));
        }
        Ok(())
    }
}
