//! Tagger configuration: delay classes and per-source options.
//!
//! Configuration is written in TOML:
//!
//! ```toml
//! [delays]
//! short-ms = 50
//! medium-ms = 500
//! long-ms = 1500
//!
//! [source]
//! span-tracking = "anchor-start"
//! remove-tags-that-intersect-edits = true
//! compute-synchronously-if-nothing-cached = false
//! ```
//!
//! Missing keys take their defaults; unknown keys and unknown tracking mode
//! names are rejected.

use std::time::Duration;

use serde::Deserialize;
use xeno_primitives::SpanTrackingMode;

use crate::error::ConfigError;
use crate::event::DelayClass;

/// Durations assigned to each [`DelayClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DelayConfig {
	pub short_ms: u64,
	pub medium_ms: u64,
	pub long_ms: u64,
}

impl Default for DelayConfig {
	fn default() -> Self {
		Self {
			short_ms: 50,
			medium_ms: 500,
			long_ms: 1500,
		}
	}
}

impl DelayConfig {
	/// Returns the debounce duration for a delay class.
	pub fn duration(&self, class: DelayClass) -> Duration {
		let ms = match class {
			DelayClass::Short => self.short_ms,
			DelayClass::Medium => self.medium_ms,
			DelayClass::Long => self.long_ms,
		};
		Duration::from_millis(ms)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.short_ms <= self.medium_ms && self.medium_ms <= self.long_ms {
			Ok(())
		} else {
			Err(ConfigError::UnorderedDelays {
				short_ms: self.short_ms,
				medium_ms: self.medium_ms,
				long_ms: self.long_ms,
			})
		}
	}
}

/// Behaviour switches fixed for the lifetime of one tag source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct TagSourceOptions {
	pub span_tracking: SpanTrackingMode,
	/// Drop cached tags touched by an edit immediately instead of letting
	/// them survive until the next recomputation.
	pub remove_tags_that_intersect_edits: bool,
	/// Run the producer inline on the first query if nothing was computed yet.
	pub compute_synchronously_if_nothing_cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaggerConfig {
	pub delays: DelayConfig,
	pub source: TagSourceOptions,
}

impl TaggerConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		self.delays.validate()
	}
}
