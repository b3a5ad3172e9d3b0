//! Failure recovery, pause/resume, synchronous fallback, eager removal,
//! narrowing and teardown.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::sleep;
use xeno_primitives::{Span, SpanTrackingMode, TextChangeRange};
use xeno_tagger::{DocumentSpan, ProduceError, TagSourceOptions, TaggerConfig};

use crate::common::{BUF, BraceUnits, DEBOUNCE, Harness, Payload, expected_tags};

fn sync_fallback() -> TagSourceOptions {
	TagSourceOptions {
		compute_synchronously_if_nothing_cached: true,
		..TagSourceOptions::default()
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn producer_failure_keeps_the_last_good_snapshot() {
	let h = Harness::builder("abc").build();
	h.settle().await;
	let good = h.source.get_snapshot_for_buffer(BUF).unwrap();

	h.stats.fail.store(true, Ordering::SeqCst);
	h.insert(3, "d");
	h.source.wait_idle().await;

	assert!(Arc::ptr_eq(&good, &h.source.get_snapshot_for_buffer(BUF).unwrap()));
	assert!(h.take_changes().is_empty());
	{
		let faults = h.faults.lock();
		assert_eq!(faults.len(), 1);
		assert_eq!(faults[0].source, "chars");
		assert!(faults[0].generation.is_some());
		assert_eq!(faults[0].error, ProduceError::Failed("classifier unavailable".to_string()));
	}

	h.stats.fail.store(false, Ordering::SeqCst);
	h.insert(4, "e");
	h.source.wait_idle().await;

	// The hint of the failed cycle is kept and extended.
	assert_eq!(h.stats.last_request().change_hint, Some(TextChangeRange::new(Span::point(3), 2)));
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
	assert_eq!(h.take_changes(), vec![(BUF, vec![Span::new(3, 5)])]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn pause_then_resume_restores_the_view() {
	let h = Harness::builder("abc").build();
	h.settle().await;
	let before = h.source.get_snapshot_for_buffer(BUF).unwrap();

	h.pause();
	assert!(h.source.is_paused());
	h.resume();
	assert!(!h.source.is_paused());
	h.source.wait_idle().await;

	assert!(Arc::ptr_eq(&before, &h.source.get_snapshot_for_buffer(BUF).unwrap()));
	assert!(h.take_changes().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn paused_view_is_frozen_until_resume() {
	let h = Harness::builder("abc").build();
	h.settle().await;
	let frozen = h.source.get_snapshot_for_buffer(BUF).unwrap();

	h.pause();
	h.insert(1, "X");
	h.source.wait_idle().await;

	assert_eq!(h.source.generation(), 2);
	assert!(Arc::ptr_eq(&frozen, &h.source.get_snapshot_for_buffer(BUF).unwrap()));
	assert!(h.take_changes().is_empty());

	h.resume();
	h.source.wait_idle().await;

	assert_eq!(h.take_changes(), vec![(BUF, vec![Span::new(1, 4)])]);
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn first_query_computes_synchronously_when_enabled() {
	let h = Harness::builder("abc").options(sync_fallback()).build();

	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
	assert_eq!(h.stats.calls(), 1);
	assert_eq!(h.source.generation(), 1);

	h.source.wait_idle().await;
	assert_eq!(h.stats.calls(), 1);
	assert_eq!(h.take_changes(), vec![(BUF, vec![Span::new(0, 3)])]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn first_query_cancels_the_background_pass_in_flight() {
	let h = Harness::builder("abc").options(sync_fallback()).build();
	*h.stats.latency.lock() = Duration::from_millis(50);
	sleep(DEBOUNCE + Duration::from_millis(10)).await;
	assert_eq!(h.stats.calls(), 1);

	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
	assert_eq!(h.stats.calls(), 2);

	h.source.wait_idle().await;
	sleep(Duration::from_millis(100)).await;
	assert_eq!(h.stats.cancelled.load(Ordering::SeqCst), 1);
	assert_eq!(h.stats.calls(), 2);
	assert_eq!(h.source.generation(), 1);
	assert_eq!(h.take_changes(), vec![(BUF, vec![Span::new(0, 3)])]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_first_query_falls_back_to_the_background() {
	let h = Harness::builder("abc").options(sync_fallback()).build();
	h.stats.fail.store(true, Ordering::SeqCst);

	assert!(h.source.get_snapshot_for_buffer(BUF).is_none());
	assert!(h.source.get_snapshot_for_buffer(BUF).is_none());
	assert_eq!(h.stats.calls(), 1);

	h.stats.fail.store(false, Ordering::SeqCst);
	h.source.wait_idle().await;
	assert_eq!(h.stats.calls(), 2);
	assert_eq!(h.source.generation(), 1);
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
	assert_eq!(h.stats.calls(), 2);

	let faults = h.faults.lock();
	assert_eq!(faults.len(), 1);
	assert_eq!(faults[0].generation, None);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn first_query_is_empty_without_synchronous_fallback() {
	let h = Harness::builder("abc").build();
	assert!(h.source.get_snapshot_for_buffer(BUF).is_none());
	assert_eq!(h.stats.calls(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_remove_intersecting_tags_immediately_when_enabled() {
	let options = TagSourceOptions {
		remove_tags_that_intersect_edits: true,
		..TagSourceOptions::default()
	};
	let h = Harness::builder("abcdef").options(options).build();
	h.settle().await;

	h.edit(|buf| buf.delete(Span::new(2, 3)).unwrap());

	// Tags touching the deleted "c" are gone; the rest moved onto the new version.
	assert_eq!(h.published(), vec![(Span::new(0, 1), 0), (Span::new(3, 4), 4), (Span::new(4, 5), 5)]);
	assert!(h.source.get_snapshot_for_buffer(BUF).unwrap().text().same_version(&h.snapshot()));

	h.source.wait_idle().await;
	let changes = h.take_changes();
	assert_eq!(changes[0], (BUF, vec![Span::new(1, 3)]));
	assert_eq!(changes.len(), 2);
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn removal_during_production_discards_the_older_result() {
	let options = TagSourceOptions {
		remove_tags_that_intersect_edits: true,
		..TagSourceOptions::default()
	};
	let h = Harness::builder("abcdef").options(options).build();
	h.settle().await;
	*h.stats.latency.lock() = Duration::from_millis(50);

	h.insert(0, "ZZ");
	sleep(DEBOUNCE + Duration::from_millis(10)).await;
	assert_eq!(h.stats.calls(), 2);

	h.edit(|buf| buf.delete(Span::new(3, 4)).unwrap());
	h.source.wait_idle().await;

	assert_eq!(h.stats.cancelled.load(Ordering::SeqCst), 1);
	assert_eq!(h.stats.calls(), 3);
	assert_eq!(h.stats.last_request().change_hint, Some(TextChangeRange::new(Span::new(0, 2), 3)));
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Offset));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_keep_stale_tags_until_recomputation_by_default() {
	let h = Harness::builder("abcdef").build();
	h.settle().await;

	h.edit(|buf| buf.delete(Span::new(2, 3)).unwrap());
	assert_eq!(h.published().len(), 6);
	assert!(h.take_changes().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_inside_a_unit_recompute_only_that_unit() {
	let units = Arc::new(BraceUnits::default());
	units.version.store(1, Ordering::SeqCst);
	let h = Harness::builder("fn a() { x } fn b() { y }").payload(Payload::Char).narrowing(units.clone()).build();
	h.settle().await;

	h.insert(9, "X");
	h.source.wait_idle().await;
	let request = h.stats.last_request();
	assert_eq!(request.spans.len(), 1);
	assert_eq!(request.spans[0].span, Span::new(7, 13));
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Char));

	// A semantic change outside bodies forces a whole-buffer pass.
	units.version.store(2, Ordering::SeqCst);
	h.insert(23, "Z");
	h.source.wait_idle().await;
	assert_eq!(h.stats.last_request().spans[0].span, h.snapshot().full_span());
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Char));

	h.insert(24, "W");
	h.source.wait_idle().await;
	assert_eq!(h.stats.last_request().spans[0].span, Span::new(21, 28));
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Char));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn narrowed_recomputation_keeps_neighbours_of_the_unit() {
	let units = Arc::new(BraceUnits::default());
	units.version.store(1, Ordering::SeqCst);
	let text = "fn a() { x } fn b() { y }";
	let h = Harness::builder(text).payload(Payload::Char).narrowing(units).build();
	h.settle().await;
	let before = h.published();
	assert!(before.contains(&(Span::new(6, 7), ' ' as u32)));
	assert!(before.contains(&(Span::new(12, 13), ' ' as u32)));

	h.insert(9, "X");
	h.source.wait_idle().await;

	assert_eq!(h.stats.last_request().spans[0].span, Span::new(7, 13));
	let after = h.published();
	assert_eq!(after.len(), text.len() + 1);
	assert!(after.contains(&(Span::new(6, 7), ' ' as u32)));
	assert!(after.contains(&(Span::new(13, 14), ' ' as u32)));
	assert_eq!(after, expected_tags(&h.snapshot(), Payload::Char));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn narrowing_covers_tags_removed_eagerly() {
	let units = Arc::new(BraceUnits::default());
	units.version.store(1, Ordering::SeqCst);
	let options = TagSourceOptions {
		remove_tags_that_intersect_edits: true,
		..TagSourceOptions::default()
	};
	let h = Harness::builder("fn a() { x } fn b() { y }").payload(Payload::Char).options(options).narrowing(units).build();
	h.settle().await;

	h.insert(9, "X");
	h.source.wait_idle().await;

	assert_eq!(h.stats.last_request().spans[0].span, Span::new(7, 13));
	assert_eq!(h.published(), expected_tags(&h.snapshot(), Payload::Char));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn presenter_maps_stale_tags_onto_the_requested_version() {
	let h = Harness::builder("abc").build();
	h.settle().await;

	h.insert(0, "Z");
	let tags = h.source.presenter().tags(&[DocumentSpan::new(h.snapshot(), 0..2)]);
	let tags: Vec<_> = tags.iter().map(|t| (t.buffer, t.span, t.tag)).collect();
	assert_eq!(tags, vec![(BUF, Span::new(1, 2), 0), (BUF, Span::new(2, 3), 1)]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_the_source_disconnects_it() {
	let h = Harness::builder("abc").build();
	h.settle().await;
	let hub = h.hub.clone();
	assert_eq!(hub.sink_count(), 1);

	drop(h);
	assert_eq!(hub.sink_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn options_load_from_toml() {
	let config = TaggerConfig::from_toml_str("[source]\nspan-tracking = \"anchor-start\"\nremove-tags-that-intersect-edits = true\n").unwrap();
	let h = Harness::builder("abc").options(config.source).build();
	assert_eq!(h.source.options().span_tracking, SpanTrackingMode::AnchorStart);
	assert!(h.source.options().remove_tags_that_intersect_edits);
	h.settle().await;
	assert_eq!(h.published().len(), 3);
}
