use serde::{Deserialize, Serialize};

/// A position in the text, measured in characters (not bytes).
///
/// This is the canonical coordinate space for Xeno.
pub type CharIdx = usize;

/// A length or count in the text, measured in characters (not bytes).
///
/// This is distinct from CharIdx to avoid accidentally passing an index
/// where a length is expected or vice versa.
pub type CharLen = usize;

/// A half-open character range `[start, end)` in one version of a buffer.
///
/// Spans carry no version of their own; they are only meaningful together
/// with the [`TextSnapshot`](crate::TextSnapshot) they were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
	/// Inclusive start.
	pub start: CharIdx,
	/// Exclusive end.
	pub end: CharIdx,
}

impl Span {
	/// Creates a span from `start` to `end`, swapping the bounds if reversed.
	pub fn new(start: CharIdx, end: CharIdx) -> Self {
		if end < start { Self { start: end, end: start } } else { Self { start, end } }
	}

	/// Creates a span from a start position and a length.
	pub fn from_len(start: CharIdx, len: CharLen) -> Self {
		Self { start, end: start + len }
	}

	/// Creates a zero-width span at the given position.
	pub fn point(pos: CharIdx) -> Self {
		Self { start: pos, end: pos }
	}

	/// Returns the length of the span in characters.
	#[inline]
	pub fn len(&self) -> CharLen {
		self.end - self.start
	}

	/// Returns true for zero-width spans.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Returns true if the position is within the span (exclusive of end).
	#[inline]
	pub fn contains(&self, pos: CharIdx) -> bool {
		pos >= self.start && pos < self.end
	}

	/// Returns true if `other` lies entirely within this span.
	#[inline]
	pub fn contains_span(&self, other: &Span) -> bool {
		self.start <= other.start && other.end <= self.end
	}

	/// Returns true if the spans share at least one position, counting
	/// touching edges and empty spans as intersecting.
	#[inline]
	pub fn intersects(&self, other: &Span) -> bool {
		self.start <= other.end && other.start <= self.end
	}

	/// Returns true if the spans share at least one character.
	#[inline]
	pub fn overlaps(&self, other: &Span) -> bool {
		self.start < other.end && other.start < self.end
	}

	/// Returns true if this span belongs to `region` as a half-open tag
	/// producer sees it.
	///
	/// A non-empty span belongs if it shares a character with `region`, or
	/// contains its position when `region` is empty. An empty span belongs if
	/// it lies within the closed bounds of `region`.
	#[inline]
	pub fn falls_in(&self, region: &Span) -> bool {
		if self.is_empty() {
			region.start <= self.start && self.start <= region.end
		} else if region.is_empty() {
			self.contains(region.start)
		} else {
			self.overlaps(region)
		}
	}

	/// Returns the smallest span covering both.
	pub fn cover(&self, other: &Span) -> Self {
		Self {
			start: self.start.min(other.start),
			end: self.end.max(other.end),
		}
	}

	/// Clamps both bounds to `[0, max_char]`.
	pub fn clamp_to(&self, max_char: CharIdx) -> Self {
		Self {
			start: self.start.min(max_char),
			end: self.end.min(max_char),
		}
	}
}

impl From<std::ops::Range<CharIdx>> for Span {
	fn from(range: std::ops::Range<CharIdx>) -> Self {
		Self::new(range.start, range.end)
	}
}
