//! Single-flight, cancel-predecessor work scheduling with debounce.
//!
//! [`WorkScheduler`] owns at most one live unit of work. Every call to
//! [`WorkScheduler::schedule`] cancels the previous unit, whether it is still
//! waiting out its debounce delay or already running, and replaces it:
//!
//! ```text
//! Idle -> Debouncing -> Running -> Idle
//!            ^  |          |
//!            +--+----------+   (schedule: cancel predecessor, restart debounce)
//! ```
//!
//! There is no queue. A superseded unit is never awaited by its successor;
//! its token is cancelled and whatever it produces afterwards is expected to
//! be discarded by the caller. Cancellation is not an error and is only
//! traced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::token::{GenerationClock, GenerationToken};
use crate::{TaskClass, join_error_panic_message, spawn};

/// Observable phase of a [`WorkScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePhase {
	/// No live work.
	Idle,
	/// Work is waiting out its debounce delay.
	Debouncing,
	/// Work has been handed to the background context.
	Running,
}

struct SchedulerInner {
	name: String,
	class: TaskClass,
	clock: GenerationClock,
	current: Mutex<Option<GenerationToken>>,
	phase: watch::Sender<SchedulePhase>,
}

impl SchedulerInner {
	/// Moves `token` from debouncing to running if it is still the live unit.
	fn promote(&self, token: &GenerationToken) -> bool {
		let current = self.current.lock();
		let live = current.as_ref().is_some_and(|t| t.generation() == token.generation()) && !token.is_cancelled();
		if live {
			self.phase.send_replace(SchedulePhase::Running);
		}
		live
	}

	fn finish(&self, token: &GenerationToken) {
		let mut current = self.current.lock();
		if current.as_ref().is_some_and(|t| t.generation() == token.generation()) {
			*current = None;
			self.phase.send_replace(SchedulePhase::Idle);
		}
	}
}

/// Debounced single-flight scheduler for one owner.
#[derive(Clone)]
pub struct WorkScheduler {
	inner: Arc<SchedulerInner>,
}

impl WorkScheduler {
	/// Creates an idle scheduler. `name` is used for tracing only.
	pub fn new(name: impl Into<String>, class: TaskClass) -> Self {
		let (phase, _) = watch::channel(SchedulePhase::Idle);
		Self {
			inner: Arc::new(SchedulerInner {
				name: name.into(),
				class,
				clock: GenerationClock::new(),
				current: Mutex::new(None),
				phase,
			}),
		}
	}

	/// Cancels any live work and schedules `work` to run after `delay`.
	///
	/// `work` receives the token of its own generation and must observe it
	/// cooperatively. Returns the generation assigned to the new unit.
	pub fn schedule<F, Fut>(&self, delay: Duration, work: F) -> u64
	where
		F: FnOnce(GenerationToken) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let token = {
			let mut current = self.inner.current.lock();
			if let Some(prev) = current.take() {
				prev.cancel();
				tracing::trace!(scheduler = %self.inner.name, generation = prev.generation(), "worker.scheduler.superseded");
			}
			let token = GenerationToken::new(self.inner.clock.next(), CancellationToken::new());
			*current = Some(token.clone());
			self.inner.phase.send_replace(SchedulePhase::Debouncing);
			token
		};
		let generation = token.generation();

		let inner = Arc::clone(&self.inner);
		spawn(self.inner.class, async move {
			tokio::select! {
				biased;
				_ = token.cancelled() => return,
				_ = tokio::time::sleep(delay) => {}
			}
			if !inner.promote(&token) {
				return;
			}

			let handle = spawn(inner.class, work(token.clone()));
			if let Err(err) = handle.await {
				match join_error_panic_message(err) {
					Some(panic) => {
						tracing::warn!(scheduler = %inner.name, generation = token.generation(), %panic, "worker.scheduler.panicked");
					}
					None => {
						tracing::trace!(scheduler = %inner.name, generation = token.generation(), "worker.scheduler.aborted");
					}
				}
			}
			inner.finish(&token);
		});

		generation
	}

	/// Cancels any live work and returns to idle.
	pub fn cancel(&self) {
		let mut current = self.inner.current.lock();
		if let Some(prev) = current.take() {
			prev.cancel();
			tracing::trace!(scheduler = %self.inner.name, generation = prev.generation(), "worker.scheduler.cancelled");
		}
		self.inner.phase.send_replace(SchedulePhase::Idle);
	}

	/// Returns the current phase.
	pub fn phase(&self) -> SchedulePhase {
		*self.inner.phase.borrow()
	}

	/// Returns true when no work is debouncing or running.
	pub fn is_idle(&self) -> bool {
		self.phase() == SchedulePhase::Idle
	}

	/// Returns the generation of the live unit, if any.
	pub fn current_generation(&self) -> Option<u64> {
		self.inner.current.lock().as_ref().map(GenerationToken::generation)
	}

	/// Waits until the scheduler has no live work.
	pub async fn wait_idle(&self) {
		let mut rx = self.inner.phase.subscribe();
		let _ = rx.wait_for(|phase| *phase == SchedulePhase::Idle).await;
	}
}
