//! Tag source: the cache and recomputation lifecycle of one tagged view.
//!
//! A [`TagSource`] serves its current per-buffer [`IntervalSnapshot`]s to
//! queries without waiting, and keeps them fresh in the background:
//!
//! ```text
//! ChangeEvent -> accumulate hint -> WorkScheduler (debounce, cancel predecessor)
//!             -> TagProducer::produce -> splice -> diff -> swap -> TagsChanged
//! ```
//!
//! All mutable state sits behind one mutex. Published snapshots are never
//! mutated; a swap replaces the map wholesale, so readers only need the lock
//! to clone an `Arc`. Change notifications are queued under that same lock
//! and delivered in swap order by a single coordination task.

mod narrowing;
mod recompute;

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use xeno_primitives::{BufferId, Span, TextEdit, TextSnapshot};
use xeno_worker::{CancellationToken, TaskClass, WorkScheduler, spawn};

pub use self::narrowing::{SemanticNarrowing, StructuralUnit};
use crate::accumulate::ChangeAccumulator;
use crate::config::{DelayConfig, TagSourceOptions, TaggerConfig};
use crate::diff::{all_spans, diff, normalize};
use crate::error::{ProduceError, Result, TaggerError};
use crate::event::{ChangeEvent, ChangeEventSource, DelayClass, TaggerEvent, TaggerEventSink};
use crate::observers::{Observers, Subscription};
use crate::presenter::TagPresenter;
use crate::producer::{TagProducer, TagView};
use crate::snapshot::{IntervalSnapshot, SnapshotMap};

/// Spans of one buffer whose tags changed.
#[derive(Debug, Clone)]
pub struct TagsChanged {
	pub buffer: BufferId,
	/// Text version `spans` are expressed in.
	pub text: TextSnapshot,
	/// Normalized changed spans.
	pub spans: Vec<Span>,
}

pub trait TagsChangedHandler: Send + Sync {
	fn tags_changed(&self, change: &TagsChanged);
}

impl<F: Fn(&TagsChanged) + Send + Sync> TagsChangedHandler for F {
	fn tags_changed(&self, change: &TagsChanged) {
		self(change)
	}
}

/// A failed production, reported to fault subscribers.
#[derive(Debug, Clone)]
pub struct ProducerFault {
	/// Name of the tag source.
	pub source: String,
	/// Scheduler generation of the failed cycle, `None` for the synchronous fallback.
	pub generation: Option<u64>,
	pub error: ProduceError,
}

pub trait FaultHandler: Send + Sync {
	fn producer_failed(&self, fault: &ProducerFault);
}

impl<F: Fn(&ProducerFault) + Send + Sync> FaultHandler for F {
	fn producer_failed(&self, fault: &ProducerFault) {
		self(fault)
	}
}

/// Construction parameters of a [`TagSource`].
pub struct TagSourceSpec<P: TagProducer> {
	name: String,
	producer: P,
	view: Arc<dyn TagView>,
	config: TaggerConfig,
	narrowing: Option<Arc<dyn SemanticNarrowing>>,
	event_sources: Vec<Arc<dyn ChangeEventSource>>,
}

impl<P: TagProducer> TagSourceSpec<P> {
	pub fn new(name: impl Into<String>, producer: P, view: Arc<dyn TagView>) -> Self {
		Self {
			name: name.into(),
			producer,
			view,
			config: TaggerConfig::default(),
			narrowing: None,
			event_sources: Vec::new(),
		}
	}

	pub fn config(mut self, config: TaggerConfig) -> Self {
		self.config = config;
		self
	}

	pub fn options(mut self, options: TagSourceOptions) -> Self {
		self.config.source = options;
		self
	}

	pub fn delays(mut self, delays: DelayConfig) -> Self {
		self.config.delays = delays;
		self
	}

	/// Enables the semantic narrowing refinement.
	pub fn narrowing(mut self, narrowing: Arc<dyn SemanticNarrowing>) -> Self {
		self.narrowing = Some(narrowing);
		self
	}

	/// Subscribes the source to `source` for its whole lifetime.
	pub fn event_source(mut self, source: Arc<dyn ChangeEventSource>) -> Self {
		self.event_sources.push(source);
		self
	}

	/// Validates the parameters, creates the source and schedules its first computation.
	pub fn build(self) -> Result<TagSource<P>> {
		if self.name.trim().is_empty() {
			return Err(TaggerError::InvalidSpec("tag source name must not be empty".to_string()));
		}
		self.config.validate()?;

		let tags_changed = Observers::new();
		let faults = Observers::new();
		let inner = Arc::new(SourceInner {
			scheduler: WorkScheduler::new(format!("tagger:{}", self.name), TaskClass::Background),
			outbox: Outbox::start(tags_changed.clone(), faults.clone()),
			name: self.name,
			producer: self.producer,
			view: self.view,
			narrowing: self.narrowing,
			options: self.config.source,
			delays: self.config.delays,
			state: Mutex::new(SourceState::new()),
			tags_changed,
			faults,
			event_subscriptions: Mutex::new(Vec::new()),
		});

		let sink: Arc<dyn TaggerEventSink> = Arc::new(SourceSink { inner: Arc::downgrade(&inner) });
		let subscriptions = self.event_sources.iter().map(|source| source.subscribe(Arc::clone(&sink))).collect();
		*inner.event_subscriptions.lock() = subscriptions;

		tracing::debug!(
			source = %inner.name,
			tracking = %inner.options.span_tracking,
			narrowing = inner.narrowing.is_some(),
			"tagger.source.created"
		);
		inner.schedule(DelayClass::Short, Cow::Borrowed("created"));
		Ok(TagSource { inner })
	}
}

struct SourceState<T> {
	current: SnapshotMap<T>,
	/// Frozen view published while UI updates are paused.
	paused: Option<SnapshotMap<T>>,
	hint: ChangeAccumulator,
	/// Bumped on every replacement of `current`.
	generation: u64,
	completed_once: bool,
	/// Set once the synchronous first-query fallback has run.
	sync_attempted: bool,
	/// Semantic version per buffer at the last swap.
	semantic_versions: FxHashMap<BufferId, u64>,
	disposed: bool,
}

impl<T> SourceState<T> {
	fn new() -> Self {
		Self {
			current: SnapshotMap::default(),
			paused: None,
			hint: ChangeAccumulator::new(),
			generation: 0,
			completed_once: false,
			sync_attempted: false,
			semantic_versions: FxHashMap::default(),
			disposed: false,
		}
	}
}

/// Notification delivered on the coordination task.
enum Notice {
	Changed(TagsChanged),
	Fault(ProducerFault),
}

/// Queue of pending notifications, drained by the coordination task.
struct Outbox {
	tx: mpsc::UnboundedSender<Notice>,
	enqueued: AtomicU64,
	delivered: watch::Receiver<u64>,
	shutdown: CancellationToken,
}

impl Outbox {
	fn start(handlers: Observers<dyn TagsChangedHandler>, faults: Observers<dyn FaultHandler>) -> Self {
		let (tx, mut rx) = mpsc::unbounded_channel::<Notice>();
		let (delivered_tx, delivered) = watch::channel(0u64);
		let shutdown = CancellationToken::new();
		let stop = shutdown.clone();

		spawn(TaskClass::Interactive, async move {
			loop {
				tokio::select! {
					biased;
					_ = stop.cancelled() => break,
					notice = rx.recv() => {
						match notice {
							Some(Notice::Changed(change)) => handlers.for_each(|h| h.tags_changed(&change)),
							Some(Notice::Fault(fault)) => faults.for_each(|h| h.producer_failed(&fault)),
							None => break,
						}
						delivered_tx.send_modify(|n| *n += 1);
					}
				}
			}
		});

		Self {
			tx,
			enqueued: AtomicU64::new(0),
			delivered,
			shutdown,
		}
	}

	fn push(&self, notice: Notice) {
		self.enqueued.fetch_add(1, Ordering::AcqRel);
		if self.tx.send(notice).is_err() {
			self.enqueued.fetch_sub(1, Ordering::AcqRel);
		}
	}

	/// Waits until everything queued so far has been delivered.
	async fn flushed(&self) {
		let target = self.enqueued.load(Ordering::Acquire);
		let mut delivered = self.delivered.clone();
		let _ = delivered.wait_for(|n| *n >= target).await;
	}

	fn close(&self) {
		self.shutdown.cancel();
	}
}

struct SourceInner<P: TagProducer> {
	name: String,
	producer: P,
	view: Arc<dyn TagView>,
	narrowing: Option<Arc<dyn SemanticNarrowing>>,
	options: TagSourceOptions,
	delays: DelayConfig,
	scheduler: WorkScheduler,
	state: Mutex<SourceState<P::Tag>>,
	outbox: Outbox,
	tags_changed: Observers<dyn TagsChangedHandler>,
	faults: Observers<dyn FaultHandler>,
	event_subscriptions: Mutex<Vec<Subscription>>,
}

impl<P: TagProducer> SourceInner<P> {
	fn snapshot_for_buffer(self: &Arc<Self>, buffer: BufferId) -> Option<Arc<IntervalSnapshot<P::Tag>>> {
		{
			let mut state = self.state.lock();
			if let Some(paused) = &state.paused {
				return paused.get(&buffer).cloned();
			}
			if let Some(snapshot) = state.current.get(&buffer) {
				return Some(Arc::clone(snapshot));
			}
			if state.disposed || state.completed_once || state.sync_attempted || !self.options.compute_synchronously_if_nothing_cached {
				return None;
			}
			state.sync_attempted = true;
		}
		if !self.compute_synchronously() {
			self.schedule(DelayClass::Short, Cow::Borrowed("sync-fallback-failed"));
		}
		self.state.lock().current.get(&buffer).cloned()
	}

	/// Scheduling happens under the state lock, so a cycle in flight is
	/// cancelled before it can swap against the new hint or map.
	fn on_changed(self: &Arc<Self>, event: &ChangeEvent) {
		let mut state = self.state.lock();
		if state.disposed {
			return;
		}
		if let Some(edit) = &event.text_change {
			if self.options.remove_tags_that_intersect_edits {
				self.remove_intersecting(&mut state, edit);
			}
			state.hint.accumulate(edit);
		}
		self.schedule(event.delay, event.kind.clone());
	}

	/// Drops cached tags touched by `edit` and reports them as changed.
	fn remove_intersecting(&self, state: &mut SourceState<P::Tag>, edit: &TextEdit) {
		let buffer = edit.buffer();
		let Some(cached) = state.current.get(&buffer) else {
			return;
		};
		let cached = cached.translated(&edit.before);
		let edited = edit.change.old_span();
		let removed: Vec<Span> = cached.intersecting(edited).map(|t| t.span).collect();
		if removed.is_empty() {
			return;
		}

		let tracking = cached.tracking();
		let kept = Arc::new(cached.without_intersecting(&[edited])).translated(&edit.after);
		state.current.insert(buffer, kept);
		state.generation += 1;

		let spans = normalize(removed.into_iter().map(|span| tracking.map_span(span, &edit.change)).collect());
		tracing::trace!(source = %self.name, %buffer, removed = spans.len(), "tagger.edit.removed_intersecting");
		self.publish(
			state,
			vec![TagsChanged {
				buffer,
				text: edit.after.clone(),
				spans,
			}],
		);
	}

	fn schedule(self: &Arc<Self>, delay: DelayClass, kind: Cow<'static, str>) {
		let duration = self.delays.duration(delay);
		tracing::trace!(source = %self.name, %kind, delay_ms = duration.as_millis() as u64, "tagger.recompute.scheduled");
		let weak = Arc::downgrade(self);
		self.scheduler.schedule(duration, move |token| async move {
			if let Some(inner) = weak.upgrade() {
				inner.recompute(token, kind).await;
			}
		});
	}

	/// Queues notifications unless UI updates are paused.
	fn publish(&self, state: &SourceState<P::Tag>, changes: Vec<TagsChanged>) {
		if state.paused.is_some() {
			return;
		}
		for change in changes {
			self.outbox.push(Notice::Changed(change));
		}
	}

	fn pause(&self) {
		let mut state = self.state.lock();
		if state.disposed || state.paused.is_some() {
			return;
		}
		state.paused = Some(state.current.clone());
		tracing::trace!(source = %self.name, "tagger.ui.paused");
	}

	fn resume(&self) {
		let mut state = self.state.lock();
		let Some(paused) = state.paused.take() else {
			return;
		};
		let changes = changes_between(&self.producer, &paused, &state.current);
		tracing::trace!(source = %self.name, changed_buffers = changes.len(), "tagger.ui.resumed");
		self.publish(&state, changes);
	}

	fn report_fault(&self, generation: Option<u64>, error: ProduceError) {
		tracing::warn!(source = %self.name, ?generation, %error, "tagger.recompute.failed");
		let fault = ProducerFault {
			source: self.name.clone(),
			generation,
			error,
		};
		self.outbox.push(Notice::Fault(fault));
	}

	fn dispose(&self) {
		{
			let mut state = self.state.lock();
			if state.disposed {
				return;
			}
			state.disposed = true;
			state.paused = None;
		}
		self.scheduler.cancel();
		let subscriptions = std::mem::take(&mut *self.event_subscriptions.lock());
		drop(subscriptions);
		self.outbox.close();
		self.tags_changed.clear();
		self.faults.clear();
		tracing::debug!(source = %self.name, "tagger.source.disposed");
	}
}

/// Changed spans per buffer between two published maps, ordered by buffer.
///
/// Buffers only in `new` report all their tags, buffers only in `old` report
/// all their old tags in old coordinates.
fn changes_between<P: TagProducer>(producer: &P, old: &SnapshotMap<P::Tag>, new: &SnapshotMap<P::Tag>) -> Vec<TagsChanged> {
	let mut changes = Vec::new();
	for (&buffer, snapshot) in new {
		let spans = match old.get(&buffer) {
			Some(prev) if Arc::ptr_eq(prev, snapshot) => continue,
			Some(prev) => diff(prev, snapshot, |a, b| producer.tags_equal(a, b)),
			None => all_spans(snapshot),
		};
		if !spans.is_empty() {
			changes.push(TagsChanged {
				buffer,
				text: snapshot.text().clone(),
				spans,
			});
		}
	}
	for (&buffer, prev) in old {
		if new.contains_key(&buffer) {
			continue;
		}
		let spans = all_spans(prev);
		if !spans.is_empty() {
			changes.push(TagsChanged {
				buffer,
				text: prev.text().clone(),
				spans,
			});
		}
	}
	changes.sort_by_key(|c| c.buffer);
	changes
}

/// Event sink handed to event sources; holds the source weakly.
struct SourceSink<P: TagProducer> {
	inner: Weak<SourceInner<P>>,
}

impl<P: TagProducer> TaggerEventSink for SourceSink<P> {
	fn on_event(&self, event: &TaggerEvent) {
		let Some(inner) = self.inner.upgrade() else {
			return;
		};
		match event {
			TaggerEvent::Changed(change) => inner.on_changed(change),
			TaggerEvent::UiUpdatesPaused => inner.pause(),
			TaggerEvent::UiUpdatesResumed => inner.resume(),
		}
	}
}

/// Asynchronously maintained tags of one view.
///
/// Dropping the source disposes it.
pub struct TagSource<P: TagProducer> {
	inner: Arc<SourceInner<P>>,
}

impl<P: TagProducer> TagSource<P> {
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn options(&self) -> TagSourceOptions {
		self.inner.options
	}

	/// Returns the best available snapshot for `buffer`.
	///
	/// While UI updates are paused this is the frozen snapshot. Otherwise it is
	/// the current one, computed inline first if nothing was ever computed and
	/// `compute-synchronously-if-nothing-cached` is set.
	pub fn get_snapshot_for_buffer(&self, buffer: BufferId) -> Option<Arc<IntervalSnapshot<P::Tag>>> {
		self.inner.snapshot_for_buffer(buffer)
	}

	/// Reacts to a change: removes touched tags if configured, accumulates the
	/// edit, and schedules a recomputation after the event's delay.
	pub fn on_changed(&self, event: &ChangeEvent) {
		self.inner.on_changed(event);
	}

	pub fn on_ui_updates_paused(&self) {
		self.inner.pause();
	}

	/// Unfreezes the published view and reports what changed while paused.
	pub fn on_ui_updates_resumed(&self) {
		self.inner.resume();
	}

	pub fn is_paused(&self) -> bool {
		self.inner.state.lock().paused.is_some()
	}

	#[must_use = "dropping the subscription unsubscribes the handler"]
	pub fn subscribe(&self, handler: Arc<dyn TagsChangedHandler>) -> Subscription {
		self.inner.tags_changed.subscribe(handler)
	}

	#[must_use = "dropping the subscription unsubscribes the handler"]
	pub fn subscribe_faults(&self, handler: Arc<dyn FaultHandler>) -> Subscription {
		self.inner.faults.subscribe(handler)
	}

	/// Number of snapshot replacements so far.
	pub fn generation(&self) -> u64 {
		self.inner.state.lock().generation
	}

	pub fn presenter(&self) -> TagPresenter<'_, P> {
		TagPresenter::new(self)
	}

	/// Waits until no recomputation is pending and every queued notification
	/// has been delivered.
	pub async fn wait_idle(&self) {
		loop {
			self.inner.scheduler.wait_idle().await;
			self.inner.outbox.flushed().await;
			if self.inner.scheduler.is_idle() {
				break;
			}
		}
	}

	/// Cancels in-flight work, disconnects from event sources and stops
	/// notifications. Later events and queries find nothing new.
	pub fn dispose(&self) {
		self.inner.dispose();
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.state.lock().disposed
	}
}

impl<P: TagProducer> Drop for TagSource<P> {
	fn drop(&mut self) {
		self.inner.dispose();
	}
}
