//! Incremental tag computation for editor decorations.
//!
//! A [`TagSource`] keeps per-buffer [`IntervalSnapshot`]s of the tags a
//! [`TagProducer`] computes, serves them to UI queries immediately, and
//! recomputes them in the background when the text or its semantics change.
//!
//! # Architecture
//!
//! * [`snapshot`]: immutable interval index over tagged spans
//! * [`diff`]: changed-span computation between two snapshots
//! * [`splice`]: merging produced tags with cached tags outside the computed region
//! * [`accumulate`]: coalescing edits into a recomputation hint
//! * [`source`]: the tag source state machine and its narrowing refinement
//! * [`presenter`]: synchronous query façade
//! * [`config`]: delay classes and per-source options loaded from TOML

pub mod accumulate;
pub mod config;
pub mod diff;
mod error;
pub mod event;
pub mod observers;
pub mod presenter;
pub mod producer;
pub mod snapshot;
pub mod source;
pub mod splice;

pub use accumulate::{ChangeAccumulator, ChangeHint, HintRegion};
pub use config::{DelayConfig, TagSourceOptions, TaggerConfig};
pub use error::{ConfigError, ProduceError, Result, TaggerError};
pub use event::{ChangeEvent, ChangeEventSource, DelayClass, EventHub, TaggerEvent, TaggerEventSink};
pub use observers::{Observers, Subscription};
pub use presenter::TagPresenter;
pub use producer::{Caret, DocumentSpan, ProducedTag, TagProducer, TagRequest, TagView};
pub use snapshot::{IntervalSnapshot, SnapshotMap, TaggedSpan};
pub use source::{FaultHandler, ProducerFault, SemanticNarrowing, StructuralUnit, TagSource, TagSourceSpec, TagsChanged, TagsChangedHandler};
pub use xeno_worker::CancellationToken;
