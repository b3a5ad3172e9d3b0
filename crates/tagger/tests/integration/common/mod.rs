//! Common fixtures for tag source integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use xeno_primitives::{BufferId, Span, TextBuffer, TextEdit, TextSnapshot};
use xeno_tagger::{
	CancellationToken, Caret, ChangeEvent, DelayClass, DelayConfig, DocumentSpan, EventHub, ProduceError, ProducedTag, ProducerFault, SemanticNarrowing, StructuralUnit,
	Subscription, TagProducer, TagRequest, TagSource, TagSourceOptions, TagSourceSpec, TagView, TaggerConfig, TaggerEvent, TagsChanged,
};

pub const BUF: BufferId = BufferId(1);

/// Debounce window used by every delay class in these tests.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// What a [`CharProducer`] tag carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
	/// Character offset in the produced version.
	Offset,
	/// The character itself.
	Char,
}

/// Invocation log shared between a test and its producer.
#[derive(Default)]
pub struct ProducerStats {
	pub calls: AtomicUsize,
	pub cancelled: AtomicUsize,
	pub requests: Mutex<Vec<(Instant, TagRequest)>>,
	pub fail: AtomicBool,
	pub latency: Mutex<Duration>,
}

impl ProducerStats {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_request(&self) -> TagRequest {
		self.requests.lock().last().map(|(_, r)| r.clone()).expect("no request recorded")
	}
}

/// Produces one tag per character inside the requested spans.
pub struct CharProducer {
	pub payload: Payload,
	pub stats: Arc<ProducerStats>,
}

impl CharProducer {
	fn tags_for(&self, request: &TagRequest) -> Vec<ProducedTag<u32>> {
		let mut tags = Vec::new();
		for doc in &request.spans {
			tags.extend(char_tags(&doc.snapshot, doc.span, self.payload));
		}
		tags
	}
}

pub fn char_tags(text: &TextSnapshot, span: Span, payload: Payload) -> Vec<ProducedTag<u32>> {
	let end = span.end.min(text.len_chars());
	(span.start.min(end)..end)
		.map(|i| {
			let tag = match payload {
				Payload::Offset => i as u32,
				Payload::Char => text.text().char(i) as u32,
			};
			ProducedTag::new(text.buffer(), i..i + 1, tag)
		})
		.collect()
}

impl CharProducer {
	fn record(&self, request: &TagRequest) {
		self.stats.calls.fetch_add(1, Ordering::SeqCst);
		self.stats.requests.lock().push((Instant::now(), request.clone()));
	}

	fn finish(&self, request: &TagRequest) -> Result<Vec<ProducedTag<u32>>, ProduceError> {
		if self.stats.fail.load(Ordering::SeqCst) {
			return Err(ProduceError::Failed("classifier unavailable".to_string()));
		}
		Ok(self.tags_for(request))
	}
}

#[async_trait]
impl TagProducer for CharProducer {
	type Tag = u32;

	async fn produce(&self, request: &TagRequest, cancel: &CancellationToken) -> Result<Vec<ProducedTag<u32>>, ProduceError> {
		self.record(request);

		let latency = *self.stats.latency.lock();
		if !latency.is_zero() {
			tokio::select! {
				_ = cancel.cancelled() => {
					self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
					return Err(ProduceError::Cancelled);
				}
				_ = tokio::time::sleep(latency) => {}
			}
		}
		self.finish(request)
	}

	/// Skips the latency, which would need the runtime this call blocks.
	fn produce_now(&self, request: &TagRequest, _cancel: &CancellationToken) -> Result<Vec<ProducedTag<u32>>, ProduceError> {
		self.record(request);
		self.finish(request)
	}

	fn tags_equal(&self, a: &u32, b: &u32) -> bool {
		a == b
	}
}

/// View tagging the whole current text of one buffer.
pub struct WholeBufferView {
	pub buffer: Arc<Mutex<TextBuffer>>,
	pub caret: Mutex<Option<Caret>>,
}

impl TagView for WholeBufferView {
	fn spans_to_tag(&self) -> Vec<DocumentSpan> {
		vec![DocumentSpan::whole(self.buffer.lock().snapshot())]
	}

	fn caret(&self) -> Option<Caret> {
		*self.caret.lock()
	}
}

/// Semantic layer treating each innermost `{...}` block as a narrowable unit.
#[derive(Default)]
pub struct BraceUnits {
	pub version: std::sync::atomic::AtomicU64,
}

impl SemanticNarrowing for BraceUnits {
	fn semantic_version(&self, _text: &TextSnapshot) -> Option<u64> {
		Some(self.version.load(Ordering::SeqCst))
	}

	fn containing_unit(&self, text: &TextSnapshot, span: Span) -> Option<StructuralUnit> {
		let chars: Vec<char> = text.text().chars().collect();
		let open = chars[..span.start.min(chars.len())].iter().rposition(|&c| c == '{')?;
		let close = span.end + chars.get(span.end..)?.iter().position(|&c| c == '}')?;
		let inner = &chars[open + 1..close];
		let nested = inner.iter().any(|&c| c == '{' || c == '}');
		Some(StructuralUnit {
			span: Span::new(open, close + 1),
			narrowable: !nested,
		})
	}
}

pub fn test_config(options: TagSourceOptions) -> TaggerConfig {
	let ms = DEBOUNCE.as_millis() as u64;
	TaggerConfig {
		delays: DelayConfig {
			short_ms: ms,
			medium_ms: ms,
			long_ms: ms,
		},
		source: options,
	}
}

/// A tag source over one live buffer, driven through an [`EventHub`].
pub struct Harness {
	pub buffer: Arc<Mutex<TextBuffer>>,
	pub view: Arc<WholeBufferView>,
	pub hub: Arc<EventHub>,
	pub stats: Arc<ProducerStats>,
	pub source: TagSource<CharProducer>,
	pub changes: Arc<Mutex<Vec<TagsChanged>>>,
	pub faults: Arc<Mutex<Vec<ProducerFault>>>,
	_subscriptions: Vec<Subscription>,
}

pub struct HarnessBuilder {
	text: String,
	payload: Payload,
	options: TagSourceOptions,
	narrowing: Option<Arc<BraceUnits>>,
}

impl HarnessBuilder {
	pub fn payload(mut self, payload: Payload) -> Self {
		self.payload = payload;
		self
	}

	pub fn options(mut self, options: TagSourceOptions) -> Self {
		self.options = options;
		self
	}

	pub fn narrowing(mut self, narrowing: Arc<BraceUnits>) -> Self {
		self.narrowing = Some(narrowing);
		self
	}

	pub fn build(self) -> Harness {
		let _ = tracing_subscriber::fmt::try_init();

		let buffer = Arc::new(Mutex::new(TextBuffer::new(BUF, &self.text)));
		let hub = Arc::new(EventHub::new());
		let stats = Arc::new(ProducerStats::default());
		let producer = CharProducer {
			payload: self.payload,
			stats: Arc::clone(&stats),
		};
		let view = Arc::new(WholeBufferView {
			buffer: Arc::clone(&buffer),
			caret: Mutex::new(None),
		});

		let mut spec = TagSourceSpec::new("chars", producer, view.clone()).config(test_config(self.options)).event_source(hub.clone());
		if let Some(narrowing) = self.narrowing {
			spec = spec.narrowing(narrowing);
		}
		let source = spec.build().expect("valid tag source spec");

		let changes = Arc::new(Mutex::new(Vec::new()));
		let faults = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&changes);
		let fault_sink = Arc::clone(&faults);
		let subscriptions = vec![
			source.subscribe(Arc::new(move |change: &TagsChanged| sink.lock().push(change.clone()))),
			source.subscribe_faults(Arc::new(move |fault: &ProducerFault| fault_sink.lock().push(fault.clone()))),
		];

		Harness {
			buffer,
			view,
			hub,
			stats,
			source,
			changes,
			faults,
			_subscriptions: subscriptions,
		}
	}
}

impl Harness {
	pub fn builder(text: &str) -> HarnessBuilder {
		HarnessBuilder {
			text: text.to_string(),
			payload: Payload::Offset,
			options: TagSourceOptions::default(),
			narrowing: None,
		}
	}

	/// Applies an edit to the buffer and reports it through the hub.
	pub fn edit(&self, apply: impl FnOnce(&mut TextBuffer) -> TextEdit) {
		let edit = apply(&mut *self.buffer.lock());
		self.hub.changed(ChangeEvent::text_edited(edit, DelayClass::Short));
	}

	pub fn insert(&self, pos: usize, text: &str) {
		self.edit(|buf| buf.insert(pos, text).expect("insert in bounds"));
	}

	pub fn move_caret(&self, position: usize) {
		*self.view.caret.lock() = Some(Caret { buffer: BUF, position });
		self.hub.changed(ChangeEvent::caret_moved(DelayClass::Short));
	}

	pub fn pause(&self) {
		self.hub.emit(TaggerEvent::UiUpdatesPaused);
	}

	pub fn resume(&self) {
		self.hub.emit(TaggerEvent::UiUpdatesResumed);
	}

	pub fn snapshot(&self) -> TextSnapshot {
		self.buffer.lock().snapshot()
	}

	/// Spans and payloads of the published snapshot.
	pub fn published(&self) -> Vec<(Span, u32)> {
		self.source
			.get_snapshot_for_buffer(BUF)
			.map(|s| s.tags().iter().map(|t| (t.span, t.tag)).collect())
			.unwrap_or_default()
	}

	/// Drains the recorded notifications as `(buffer, spans)` pairs.
	pub fn take_changes(&self) -> Vec<(BufferId, Vec<Span>)> {
		self.changes.lock().drain(..).map(|c| (c.buffer, c.spans)).collect()
	}

	/// Waits for the initial computation and forgets its notifications.
	pub async fn settle(&self) {
		self.source.wait_idle().await;
		self.changes.lock().clear();
	}
}

/// Every character of `text` as a tag with `payload`.
pub fn expected_tags(text: &TextSnapshot, payload: Payload) -> Vec<(Span, u32)> {
	char_tags(text, text.full_span(), payload).into_iter().map(|t| (t.span, t.tag)).collect()
}
