//! Changed-span computation between two snapshots of one buffer.
//!
//! The walk errs towards reporting too much: an extra repaint is harmless,
//! a stale tag left on screen is not.

use xeno_primitives::Span;

use crate::snapshot::{IntervalSnapshot, TaggedSpan};

/// Returns the spans whose tags differ between `old` and `new`.
///
/// `old` is first mapped onto the text version of `new`. The result is
/// normalized: sorted, with overlapping or touching spans merged.
pub fn diff<T: Clone>(old: &IntervalSnapshot<T>, new: &IntervalSnapshot<T>, tags_equal: impl Fn(&T, &T) -> bool) -> Vec<Span> {
	let mut old_tags = old.tags_on(new.text());
	old_tags.sort_by_key(|t| (t.span.start, t.span.end));
	diff_sorted(&old_tags, new.tags(), tags_equal)
}

/// Two-cursor walk over tags sorted by `(start, end)` on the same version.
pub fn diff_sorted<T>(old: &[TaggedSpan<T>], new: &[TaggedSpan<T>], tags_equal: impl Fn(&T, &T) -> bool) -> Vec<Span> {
	let mut changed = Vec::new();
	let (mut i, mut j) = (0, 0);

	while i < old.len() && j < new.len() {
		let (a, b) = (&old[i], &new[j]);
		if a.span.start < b.span.start {
			changed.push(a.span);
			i += 1;
		} else if b.span.start < a.span.start {
			changed.push(b.span);
			j += 1;
		} else if a.span.end < b.span.end {
			changed.push(b.span);
			i += 1;
		} else if b.span.end < a.span.end {
			changed.push(a.span);
			j += 1;
		} else {
			if !tags_equal(&a.tag, &b.tag) {
				changed.push(a.span);
			}
			i += 1;
			j += 1;
		}
	}

	changed.extend(old[i..].iter().map(|t| t.span));
	changed.extend(new[j..].iter().map(|t| t.span));
	normalize(changed)
}

/// Returns the normalized spans of every tag, for buffers that appeared or
/// disappeared wholesale.
pub fn all_spans<T>(snapshot: &IntervalSnapshot<T>) -> Vec<Span> {
	normalize(snapshot.tags().iter().map(|t| t.span).collect())
}

/// Sorts spans and merges those that overlap or touch.
pub fn normalize(mut spans: Vec<Span>) -> Vec<Span> {
	spans.sort();
	let mut out: Vec<Span> = Vec::with_capacity(spans.len());
	for span in spans {
		match out.last_mut() {
			Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
			_ => out.push(span),
		}
	}
	out
}
