//! Inbound change events and the sources that deliver them.

use std::borrow::Cow;
use std::sync::Arc;

use xeno_primitives::TextEdit;

use crate::observers::{Observers, Subscription};

/// Debounce latency class of a change event, mapped to a duration by
/// [`DelayConfig`](crate::DelayConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayClass {
	Short,
	Medium,
	Long,
}

/// "Something changed" signal from the text or semantic layer.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
	/// The applied edit, for text changes.
	pub text_change: Option<TextEdit>,
	pub delay: DelayClass,
	/// Short label of the event origin, used for tracing.
	pub kind: Cow<'static, str>,
}

impl ChangeEvent {
	pub fn new(kind: impl Into<Cow<'static, str>>, delay: DelayClass) -> Self {
		Self {
			text_change: None,
			delay,
			kind: kind.into(),
		}
	}

	/// A text edit, debounced as typing.
	pub fn text_edited(edit: TextEdit, delay: DelayClass) -> Self {
		Self {
			text_change: Some(edit),
			delay,
			kind: Cow::Borrowed("text"),
		}
	}

	/// A semantic-version bump with no text payload.
	pub fn semantics_changed(delay: DelayClass) -> Self {
		Self::new("semantics", delay)
	}

	/// A caret move.
	pub fn caret_moved(delay: DelayClass) -> Self {
		Self::new("caret", delay)
	}
}

/// Events a tag source reacts to.
#[derive(Debug, Clone)]
pub enum TaggerEvent {
	Changed(ChangeEvent),
	UiUpdatesPaused,
	UiUpdatesResumed,
}

/// Receiver side of an event source.
pub trait TaggerEventSink: Send + Sync {
	fn on_event(&self, event: &TaggerEvent);
}

/// Anything a tag source can subscribe to for change events.
pub trait ChangeEventSource: Send + Sync {
	#[must_use = "dropping the subscription disconnects the sink"]
	fn subscribe(&self, sink: Arc<dyn TaggerEventSink>) -> Subscription;
}

/// Broadcasting event source driven by the host.
#[derive(Default)]
pub struct EventHub {
	sinks: Observers<dyn TaggerEventSink>,
}

impl EventHub {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers `event` to every connected sink.
	pub fn emit(&self, event: TaggerEvent) {
		self.sinks.for_each(|sink| sink.on_event(&event));
	}

	/// Shorthand for [`TaggerEvent::Changed`].
	pub fn changed(&self, event: ChangeEvent) {
		self.emit(TaggerEvent::Changed(event));
	}

	pub fn sink_count(&self) -> usize {
		self.sinks.len()
	}
}

impl ChangeEventSource for EventHub {
	fn subscribe(&self, sink: Arc<dyn TaggerEventSink>) -> Subscription {
		self.sinks.subscribe(sink)
	}
}
