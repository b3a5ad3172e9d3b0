//! Error types for tag production and tag source construction.

use thiserror::Error;

/// Failure reported by a [`TagProducer`](crate::TagProducer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProduceError {
	/// The producer observed its cancellation token and stopped early.
	///
	/// Not a failure: the result is silently discarded.
	#[error("tag production cancelled")]
	Cancelled,
	/// The producer could not compute tags.
	#[error("tag producer failed: {0}")]
	Failed(String),
}

/// Errors that can occur when loading tagger configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unknown key or value.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A delay class is shorter than the class below it.
	#[error("delay classes must be ordered short <= medium <= long (got {short_ms}ms, {medium_ms}ms, {long_ms}ms)")]
	UnorderedDelays { short_ms: u64, medium_ms: u64, long_ms: u64 },
}

/// Errors that can occur when constructing a tag source.
#[derive(Debug, Error)]
pub enum TaggerError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The construction parameters are inconsistent.
	#[error("invalid tag source spec: {0}")]
	InvalidSpec(String),
}

/// Result type for tag source construction.
pub type Result<T> = std::result::Result<T, TaggerError>;
