//! Synchronous query façade for the UI thread.

use crate::producer::{DocumentSpan, ProducedTag, TagProducer};
use crate::source::TagSource;

/// Answers "which tags cover these spans" from the best available snapshot.
pub struct TagPresenter<'a, P: TagProducer> {
	source: &'a TagSource<P>,
}

impl<'a, P: TagProducer> TagPresenter<'a, P> {
	pub fn new(source: &'a TagSource<P>) -> Self {
		Self { source }
	}

	/// Returns the tags intersecting each requested span, mapped onto the
	/// requested text version, in request order.
	///
	/// Buffers without a snapshot contribute nothing.
	pub fn tags(&self, spans: &[DocumentSpan]) -> Vec<ProducedTag<P::Tag>> {
		let mut out = Vec::new();
		for doc in spans {
			let Some(snapshot) = self.source.get_snapshot_for_buffer(doc.buffer()) else {
				continue;
			};
			let snapshot = snapshot.translated(&doc.snapshot);
			out.extend(snapshot.intersecting(doc.span).map(|t| ProducedTag::new(doc.buffer(), t.span, t.tag.clone())));
		}
		out
	}
}
