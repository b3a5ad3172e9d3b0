//! Text changes, position mapping, and span tracking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::range::{CharIdx, CharLen, Span};

/// Bias determines how positions at change boundaries are mapped.
///
/// When mapping a position through a change, bias determines whether the position
/// moves with insertions or stays before them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
	/// Position stays before insertions at the same location.
	Left,
	/// Position moves after insertions at the same location.
	Right,
}

/// A single replacement of the old span `[start, start + old_len)` by `text`.
///
/// Fields are private to keep `new_len` equal to `text.chars().count()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
	old: Span,
	text: String,
	new_len: CharLen,
}

impl TextChange {
	/// Creates a change replacing `old` with `text`.
	pub fn new(old: Span, text: impl Into<String>) -> Self {
		let text = text.into();
		let new_len = text.chars().count();
		Self { old, text, new_len }
	}

	/// Creates a pure insertion at `pos`.
	pub fn insert(pos: CharIdx, text: impl Into<String>) -> Self {
		Self::new(Span::point(pos), text)
	}

	/// Creates a pure deletion of `span`.
	pub fn delete(span: Span) -> Self {
		Self::new(span, String::new())
	}

	/// Returns the replaced span in the coordinates before the change.
	#[inline]
	pub fn old_span(&self) -> Span {
		self.old
	}

	/// Returns the inserted span in the coordinates after the change.
	#[inline]
	pub fn new_span(&self) -> Span {
		Span::from_len(self.old.start, self.new_len)
	}

	/// Returns the inserted text.
	#[inline]
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Returns the cached character length of the inserted text.
	#[inline]
	pub fn new_len(&self) -> CharLen {
		self.new_len
	}

	/// Returns the collapsed range description of this change.
	pub fn range(&self) -> TextChangeRange {
		TextChangeRange::new(self.old, self.new_len)
	}

	/// Maps a position from before this change to after it.
	///
	/// Positions strictly inside the replaced span collapse onto one edge of
	/// the inserted text according to `bias`. A position at a pure insertion
	/// point stays before the text for [`Bias::Left`] and moves past it for
	/// [`Bias::Right`].
	pub fn map_pos(&self, pos: CharIdx, bias: Bias) -> CharIdx {
		let Span { start, end } = self.old;
		let new_end = start + self.new_len;

		if pos < start {
			return pos;
		}
		if pos > end {
			return pos - self.old.len() + self.new_len;
		}
		if start == end {
			return match bias {
				Bias::Left => start,
				Bias::Right => new_end,
			};
		}
		if pos == start {
			return start;
		}
		if pos == end {
			return new_end;
		}
		match bias {
			Bias::Left => start,
			Bias::Right => new_end,
		}
	}
}

/// Collapsed description of one or more changes as a single replacement.
///
/// `span` is expressed in the coordinates of the oldest version covered and
/// `new_len` is the length of the text that replaced it in the newest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextChangeRange {
	/// Replaced span in the oldest version.
	pub span: Span,
	/// Length of the replacement in the newest version.
	pub new_len: CharLen,
}

impl TextChangeRange {
	pub fn new(span: Span, new_len: CharLen) -> Self {
		Self { span, new_len }
	}

	/// Returns the replacement span in the newest version.
	#[inline]
	pub fn new_span(&self) -> Span {
		Span::from_len(self.span.start, self.new_len)
	}

	/// Composes `self` with a later range expressed in the coordinates after `self`.
	///
	/// The result covers both edits in the coordinates before `self`.
	pub fn compose(self, next: TextChangeRange) -> TextChangeRange {
		let first_new_end = self.span.start + self.new_len;
		let start = self.span.start.min(next.span.start);
		let end_after_first = first_new_end.max(next.span.end);

		let old_end = end_after_first - self.new_len + self.span.len();
		let new_len = end_after_first - start - next.span.len() + next.new_len;

		TextChangeRange {
			span: Span::new(start, old_end),
			new_len,
		}
	}
}

/// Policy for how a span's bounds move as the underlying text is edited.
///
/// Chosen once per tag source and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanTrackingMode {
	/// Neither edge grows: insertions at either edge stay outside the span.
	#[default]
	Exact,
	/// Both edges are left-biased: insertions at the start are absorbed,
	/// insertions at the end are not.
	AnchorStart,
	/// Both edges are right-biased: insertions at the end are absorbed,
	/// insertions at the start push the span forward.
	AnchorEnd,
}

impl SpanTrackingMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Exact => "exact",
			Self::AnchorStart => "anchor-start",
			Self::AnchorEnd => "anchor-end",
		}
	}

	const fn biases(self) -> (Bias, Bias) {
		match self {
			Self::Exact => (Bias::Right, Bias::Left),
			Self::AnchorStart => (Bias::Left, Bias::Left),
			Self::AnchorEnd => (Bias::Right, Bias::Right),
		}
	}

	/// Maps a span through one change.
	pub fn map_span(self, span: Span, change: &TextChange) -> Span {
		let (start_bias, end_bias) = self.biases();
		let start = change.map_pos(span.start, start_bias);
		let end = change.map_pos(span.end, end_bias);
		Span { start, end: end.max(start) }
	}

	/// Maps a span through an ordered sequence of changes.
	pub fn map_span_through<'a>(self, span: Span, changes: impl IntoIterator<Item = &'a TextChange>) -> Span {
		changes.into_iter().fold(span, |span, change| self.map_span(span, change))
	}
}

impl fmt::Display for SpanTrackingMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a span tracking mode name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown span tracking mode '{0}' (expected 'exact', 'anchor-start' or 'anchor-end')")]
pub struct ParseTrackingModeError(pub String);

impl FromStr for SpanTrackingMode {
	type Err = ParseTrackingModeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"exact" => Ok(Self::Exact),
			"anchor-start" => Ok(Self::AnchorStart),
			"anchor-end" => Ok(Self::AnchorEnd),
			other => Err(ParseTrackingModeError(other.to_string())),
		}
	}
}
