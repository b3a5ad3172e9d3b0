//! Merging freshly produced tags with cached tags outside the computed region.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xeno_primitives::{BufferId, Span, SpanTrackingMode, TextSnapshot};

use crate::producer::{DocumentSpan, ProducedTag};
use crate::snapshot::{IntervalSnapshot, SnapshotMap, TaggedSpan};

struct Computed<'a> {
	text: &'a TextSnapshot,
	spans: Vec<Span>,
}

/// Groups requested spans by buffer, in the coordinates of the first snapshot
/// requested for that buffer.
fn computed_regions(requested: &[DocumentSpan]) -> FxHashMap<BufferId, Computed<'_>> {
	let mut regions: FxHashMap<BufferId, Computed<'_>> = FxHashMap::default();
	for doc in requested {
		let region = regions.entry(doc.buffer()).or_insert_with(|| Computed {
			text: &doc.snapshot,
			spans: Vec::new(),
		});
		let span = if doc.snapshot.same_version(region.text) {
			doc.span
		} else {
			doc.span.clamp_to(region.text.len_chars())
		};
		region.spans.push(span);
	}
	regions
}

impl Computed<'_> {
	fn contains(&self, span: &Span) -> bool {
		self.spans.iter().any(|region| span.falls_in(region))
	}
}

/// Builds the per-buffer snapshots of one recomputation.
///
/// Every requested buffer gets a snapshot at the requested version holding
/// the produced tags that fall in the computed region, plus the `previous`
/// tags (mapped onto that version) that do not. Membership follows
/// [`Span::falls_in`], so cached tags merely touching the region survive.
/// Buffers that were not requested are absent from the result, and produced
/// tags for them are dropped. `previous` must not be ahead of the requested
/// versions, as mapping only runs forward.
pub fn convert_to_snapshots<T: Clone>(produced: &[ProducedTag<T>], requested: &[DocumentSpan], previous: &SnapshotMap<T>, tracking: SpanTrackingMode) -> SnapshotMap<T> {
	let regions = computed_regions(requested);
	let mut fresh: FxHashMap<BufferId, Vec<TaggedSpan<T>>> = FxHashMap::default();

	for tag in produced {
		let Some(region) = regions.get(&tag.buffer) else {
			tracing::trace!(buffer = %tag.buffer, "tagger.splice.unrequested_buffer");
			continue;
		};
		if region.contains(&tag.span) {
			fresh.entry(tag.buffer).or_default().push(TaggedSpan::new(tag.span, tag.tag.clone()));
		}
	}

	regions
		.into_iter()
		.map(|(buffer, region)| {
			let mut tags = fresh.remove(&buffer).unwrap_or_default();
			if let Some(prev) = previous.get(&buffer) {
				let kept = prev.tags_on(region.text).into_iter().filter(|t| !region.contains(&t.span));
				tags.extend(kept);
			}
			(buffer, Arc::new(IntervalSnapshot::new(region.text.clone(), tracking, tags)))
		})
		.collect()
}
