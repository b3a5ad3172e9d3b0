//! Contracts of the external collaborators a tag source consumes.

use async_trait::async_trait;
use xeno_primitives::{BufferId, CharIdx, Span, TextChangeRange, TextSnapshot};
use xeno_worker::CancellationToken;

use crate::error::ProduceError;

/// A span within one specific buffer version.
#[derive(Debug, Clone)]
pub struct DocumentSpan {
	pub snapshot: TextSnapshot,
	pub span: Span,
}

impl DocumentSpan {
	pub fn new(snapshot: TextSnapshot, span: impl Into<Span>) -> Self {
		Self { snapshot, span: span.into() }
	}

	/// The span covering the whole snapshot.
	pub fn whole(snapshot: TextSnapshot) -> Self {
		let span = snapshot.full_span();
		Self { snapshot, span }
	}

	pub fn buffer(&self) -> BufferId {
		self.snapshot.buffer()
	}
}

/// Caret location in one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
	pub buffer: BufferId,
	pub position: CharIdx,
}

/// Input of one tag production.
#[derive(Debug, Clone)]
pub struct TagRequest {
	pub spans: Vec<DocumentSpan>,
	pub caret: Option<Caret>,
	/// Accumulated change since the previous production, when the edits hit
	/// one buffer contiguously.
	pub change_hint: Option<TextChangeRange>,
}

/// A tag produced for a span of one of the requested snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedTag<T> {
	pub buffer: BufferId,
	pub span: Span,
	pub tag: T,
}

impl<T> ProducedTag<T> {
	pub fn new(buffer: BufferId, span: impl Into<Span>, tag: T) -> Self {
		Self {
			buffer,
			span: span.into(),
			tag,
		}
	}
}

/// Computes tags for the requested spans.
///
/// Implementations must observe `cancel` promptly, returning
/// [`ProduceError::Cancelled`] or any result; once the token fires the
/// result is discarded. Producers never touch tag source state. Returned
/// tags may come in any order and are expressed in the coordinates of the
/// snapshot requested for their buffer. Only tags that
/// [fall in](Span::falls_in) a requested span are kept; a producer owes
/// nothing for neighbours that merely touch it.
#[async_trait]
pub trait TagProducer: Send + Sync + 'static {
	type Tag: Clone + Send + Sync + 'static;

	async fn produce(&self, request: &TagRequest, cancel: &CancellationToken) -> Result<Vec<ProducedTag<Self::Tag>>, ProduceError>;

	/// Produces tags on the calling thread.
	///
	/// Used only by the synchronous first-query fallback. The default drives
	/// [`Self::produce`] to completion with a local executor, so producers
	/// whose futures need a reactor should override it.
	fn produce_now(&self, request: &TagRequest, cancel: &CancellationToken) -> Result<Vec<ProducedTag<Self::Tag>>, ProduceError> {
		futures::executor::block_on(self.produce(request, cancel))
	}

	/// Payload equality used when diffing snapshots.
	fn tags_equal(&self, a: &Self::Tag, b: &Self::Tag) -> bool;
}

/// The view being tagged: what is visible and where the caret is.
pub trait TagView: Send + Sync + 'static {
	/// Spans to tag, at most one snapshot per buffer.
	fn spans_to_tag(&self) -> Vec<DocumentSpan>;

	fn caret(&self) -> Option<Caret> {
		None
	}
}
