//! The recomputation cycle: capture, produce, splice, diff, swap.

use std::borrow::Cow;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use xeno_primitives::BufferId;
use xeno_worker::{CancellationToken, GenerationToken};

use super::{SourceInner, SourceState, TagsChanged, changes_between, narrowing};
use crate::accumulate::ChangeHint;
use crate::error::ProduceError;
use crate::producer::{DocumentSpan, ProducedTag, TagProducer, TagRequest};
use crate::snapshot::SnapshotMap;
use crate::splice::convert_to_snapshots;

/// State read at the start of a cycle.
pub(super) struct Capture<T> {
	pub(super) hint: Option<ChangeHint>,
	generation: u64,
	previous: SnapshotMap<T>,
	semantic_versions: FxHashMap<BufferId, u64>,
}

/// Result of a cycle computed against the captured map.
pub(super) struct Prepared<T> {
	base_generation: u64,
	next: SnapshotMap<T>,
	changes: Vec<TagsChanged>,
	semantic_versions: Vec<(BufferId, u64)>,
}

impl<P: TagProducer> SourceInner<P> {
	pub(super) async fn recompute(self: Arc<Self>, token: GenerationToken, kind: Cow<'static, str>) {
		let generation = token.generation();
		let Some(capture) = self.capture() else {
			return;
		};
		let request = self.request_for(&capture);
		tracing::debug!(
			source = %self.name,
			generation,
			%kind,
			spans = request.spans.len(),
			hinted = request.change_hint.is_some(),
			"tagger.recompute.start"
		);

		let result = self.producer.produce(&request, token.cancellation()).await;
		if token.is_cancelled() {
			tracing::trace!(source = %self.name, generation, "tagger.recompute.superseded");
			return;
		}
		let produced = match result {
			Ok(produced) => produced,
			Err(ProduceError::Cancelled) => {
				tracing::trace!(source = %self.name, generation, "tagger.recompute.superseded");
				return;
			}
			Err(error) => {
				self.report_fault(Some(generation), error);
				return;
			}
		};

		let prepared = self.prepare(&capture, &request.spans, &produced);
		let mut state = self.state.lock();
		if token.is_cancelled() || state.disposed {
			tracing::trace!(source = %self.name, generation, "tagger.recompute.superseded");
			return;
		}
		if self.swap(&mut state, capture.hint, &request.spans, &produced, prepared) {
			tracing::debug!(source = %self.name, generation, tags = produced.len(), swaps = state.generation, "tagger.recompute.swapped");
		}
	}

	/// Runs the producer inline on the calling thread and publishes the result.
	///
	/// Returns false if nothing was published.
	pub(super) fn compute_synchronously(&self) -> bool {
		self.scheduler.cancel();
		let Some(capture) = self.capture() else {
			return true;
		};
		let request = self.request_for(&capture);
		tracing::debug!(source = %self.name, spans = request.spans.len(), "tagger.sync_fallback");

		let produced = match self.producer.produce_now(&request, &CancellationToken::new()) {
			Ok(produced) => produced,
			Err(ProduceError::Cancelled) => return false,
			Err(error) => {
				self.report_fault(None, error);
				return false;
			}
		};

		let prepared = self.prepare(&capture, &request.spans, &produced);
		let mut state = self.state.lock();
		state.disposed || self.swap(&mut state, capture.hint, &request.spans, &produced, prepared)
	}

	pub(super) fn capture(&self) -> Option<Capture<P::Tag>> {
		let state = self.state.lock();
		if state.disposed {
			return None;
		}
		Some(Capture {
			hint: state.hint.hint(),
			generation: state.generation,
			previous: state.current.clone(),
			semantic_versions: state.semantic_versions.clone(),
		})
	}

	pub(super) fn request_for(&self, capture: &Capture<P::Tag>) -> TagRequest {
		let spans = self.view.spans_to_tag();
		let caret = self.view.caret();
		let narrowed = self
			.narrowing
			.as_deref()
			.and_then(|n| narrowing::narrow(n, &spans, capture.hint, &capture.previous, &capture.semantic_versions));

		let spans = match narrowed {
			Some(unit) => {
				tracing::debug!(source = %self.name, buffer = %unit.buffer(), start = unit.span.start, end = unit.span.end, "tagger.narrowed");
				vec![unit]
			}
			None => spans,
		};
		TagRequest {
			spans,
			caret,
			change_hint: capture.hint.and_then(|h| h.range()),
		}
	}

	pub(super) fn prepare(&self, capture: &Capture<P::Tag>, requested: &[DocumentSpan], produced: &[ProducedTag<P::Tag>]) -> Prepared<P::Tag> {
		let next = convert_to_snapshots(produced, requested, &capture.previous, self.options.span_tracking);
		let changes = changes_between(&self.producer, &capture.previous, &next);
		let semantic_versions = match &self.narrowing {
			Some(narrowing) => requested
				.iter()
				.filter_map(|doc| narrowing.semantic_version(&doc.snapshot).map(|v| (doc.buffer(), v)))
				.collect(),
			None => Vec::new(),
		};
		Prepared {
			base_generation: capture.generation,
			next,
			changes,
			semantic_versions,
		}
	}

	/// Publishes `prepared`, rebuilding it first if `current` was replaced
	/// since capture.
	///
	/// A replacement together with a newer edit means `current` may already
	/// be ahead of the produced version. The result is then dropped, keeping
	/// the hint for the cycle that edit scheduled. Returns true if swapped.
	pub(super) fn swap(&self, state: &mut SourceState<P::Tag>, captured: Option<ChangeHint>, requested: &[DocumentSpan], produced: &[ProducedTag<P::Tag>], prepared: Prepared<P::Tag>) -> bool {
		let Prepared {
			base_generation,
			mut next,
			mut changes,
			semantic_versions,
		} = prepared;

		if base_generation != state.generation {
			if state.hint.hint() != captured {
				tracing::trace!(source = %self.name, base_generation, current = state.generation, "tagger.recompute.outpaced");
				return false;
			}
			tracing::trace!(source = %self.name, base_generation, current = state.generation, "tagger.recompute.rebased");
			next = convert_to_snapshots(produced, requested, &state.current, self.options.span_tracking);
			changes = changes_between(&self.producer, &state.current, &next);
		}

		state.current = next;
		state.generation += 1;
		state.completed_once = true;
		state.semantic_versions.extend(semantic_versions);
		if !state.hint.clear_if_unchanged(captured) {
			tracing::trace!(source = %self.name, "tagger.hint.retained");
		}
		self.publish(state, changes);
		true
	}
}
