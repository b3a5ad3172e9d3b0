//! Immutable, versioned interval index over tagged spans.
//!
//! An [`IntervalSnapshot`] is built once and never mutated. Tags are kept
//! sorted by `(start, end)` next to a prefix-maximum of their end positions,
//! so an intersection query binary-searches both bounds and only scans the
//! candidates in between.

use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use xeno_primitives::{BufferId, CharIdx, Span, SpanTrackingMode, TextSnapshot};

/// A tag payload attached to a span of one buffer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSpan<T> {
	pub span: Span,
	pub tag: T,
}

impl<T> TaggedSpan<T> {
	pub fn new(span: impl Into<Span>, tag: T) -> Self {
		Self { span: span.into(), tag }
	}
}

/// Published per-buffer snapshots of one tag source.
pub type SnapshotMap<T> = FxHashMap<BufferId, Arc<IntervalSnapshot<T>>>;

/// Immutable index of the tags of one buffer at one text version.
#[derive(Debug, Clone)]
pub struct IntervalSnapshot<T> {
	text: TextSnapshot,
	tracking: SpanTrackingMode,
	tags: Vec<TaggedSpan<T>>,
	/// `max_end[i]` is the largest end among `tags[..=i]`.
	max_end: Vec<CharIdx>,
}

impl<T> IntervalSnapshot<T> {
	/// Creates a snapshot with no tags.
	pub fn empty(text: TextSnapshot, tracking: SpanTrackingMode) -> Self {
		Self {
			text,
			tracking,
			tags: Vec::new(),
			max_end: Vec::new(),
		}
	}

	/// Builds a snapshot from tags in `text` coordinates, in any order.
	///
	/// Spans reaching past the end of the text are clamped.
	pub fn new(text: TextSnapshot, tracking: SpanTrackingMode, tags: impl IntoIterator<Item = TaggedSpan<T>>) -> Self {
		let len = text.len_chars();
		let mut tags: Vec<_> = tags
			.into_iter()
			.map(|mut t| {
				t.span = t.span.clamp_to(len);
				t
			})
			.collect();
		tags.sort_by_key(|t| (t.span.start, t.span.end));

		let mut max_end = Vec::with_capacity(tags.len());
		let mut running = 0;
		for t in &tags {
			running = running.max(t.span.end);
			max_end.push(running);
		}

		Self {
			text,
			tracking,
			tags,
			max_end,
		}
	}

	/// Returns the text snapshot the spans are expressed in.
	pub fn text(&self) -> &TextSnapshot {
		&self.text
	}

	pub fn buffer(&self) -> BufferId {
		self.text.buffer()
	}

	pub fn tracking(&self) -> SpanTrackingMode {
		self.tracking
	}

	/// Returns all tags ordered by `(start, end)`.
	pub fn tags(&self) -> &[TaggedSpan<T>] {
		&self.tags
	}

	pub fn len(&self) -> usize {
		self.tags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tags.is_empty()
	}

	fn candidates(&self, span: Span) -> Range<usize> {
		let lo = self.max_end.partition_point(|&end| end < span.start);
		let hi = self.tags.partition_point(|t| t.span.start <= span.end);
		lo..hi.max(lo)
	}

	/// Returns the tags intersecting `span`, ordered by start.
	pub fn intersecting(&self, span: Span) -> impl Iterator<Item = &TaggedSpan<T>> + '_ {
		let range = self.candidates(span);
		self.tags[range].iter().filter(move |t| t.span.intersects(&span))
	}

	/// Returns the tags that do not intersect `span`, ordered by start.
	pub fn non_intersecting(&self, span: Span) -> impl Iterator<Item = &TaggedSpan<T>> + '_ {
		self.tags.iter().filter(move |t| !t.span.intersects(&span))
	}
}

impl<T: Clone> IntervalSnapshot<T> {
	/// Returns all tags mapped onto `target` using this snapshot's tracking mode.
	///
	/// Targets not reachable forward from this snapshot's version keep their
	/// coordinates, clamped to the target length.
	pub fn tags_on(&self, target: &TextSnapshot) -> Vec<TaggedSpan<T>> {
		if self.text.same_version(target) {
			return self.tags.clone();
		}
		let changes = if self.text.buffer() == target.buffer() {
			self.text.version().changes_to(target.version())
		} else {
			None
		};
		let len = target.len_chars();
		self.tags
			.iter()
			.map(|t| {
				let span = match &changes {
					Some(changes) => self.tracking.map_span_through(t.span, changes),
					None => t.span.clamp_to(len),
				};
				TaggedSpan { span, tag: t.tag.clone() }
			})
			.collect()
	}

	/// Returns this snapshot re-expressed on `target`, sharing it when the
	/// versions already match.
	pub fn translated(self: &Arc<Self>, target: &TextSnapshot) -> Arc<Self> {
		if self.text.same_version(target) {
			return Arc::clone(self);
		}
		Arc::new(Self::new(target.clone(), self.tracking, self.tags_on(target)))
	}

	/// Returns a copy without the tags intersecting any of `spans`.
	pub fn without_intersecting(&self, spans: &[Span]) -> Self {
		let kept = self.tags.iter().filter(|t| !spans.iter().any(|s| t.span.intersects(s))).cloned();
		Self::new(self.text.clone(), self.tracking, kept)
	}
}
