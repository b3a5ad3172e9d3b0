//! Text-layer primitives: spans, changes, versions, and snapshots.

/// Text changes, position mapping, and span tracking modes.
pub mod change;
/// Identifier types for buffers.
pub mod ids;
/// Character spans.
pub mod range;
/// Versioned buffers and immutable snapshots.
pub mod text;

pub use change::{Bias, ParseTrackingModeError, SpanTrackingMode, TextChange, TextChangeRange};
pub use ids::BufferId;
pub use range::{CharIdx, CharLen, Span};
pub use ropey::Rope;
pub use text::{EditError, TextBuffer, TextEdit, TextSnapshot, TextVersion};
