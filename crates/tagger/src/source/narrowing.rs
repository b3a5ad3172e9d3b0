//! Restriction of a recomputation to the structural unit containing an edit.

use rustc_hash::FxHashMap;
use xeno_primitives::{BufferId, Span, TextSnapshot};

use crate::accumulate::{ChangeHint, HintRegion};
use crate::producer::DocumentSpan;
use crate::snapshot::SnapshotMap;

/// A structural unit of a document, such as a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralUnit {
	pub span: Span,
	/// True if edits inside the unit cannot change tags outside it.
	pub narrowable: bool,
}

/// Semantic layer queried by the narrowing refinement.
pub trait SemanticNarrowing: Send + Sync + 'static {
	/// Version of the semantics visible outside structural units.
	///
	/// Must change whenever an edit can affect tags beyond the unit
	/// containing it. `None` disables narrowing for the snapshot.
	fn semantic_version(&self, text: &TextSnapshot) -> Option<u64>;

	/// Smallest structural unit of `text` containing `span`.
	fn containing_unit(&self, text: &TextSnapshot, span: Span) -> Option<StructuralUnit>;
}

/// Returns the narrowed request, or `None` to compute `spans` unchanged.
///
/// Narrowing applies only when every condition below holds:
/// * the hint describes contiguous edits of one buffer, and that buffer is
///   the only one requested, at the version the hint ends on;
/// * a snapshot of the buffer is cached to splice into;
/// * the semantic version equals the one recorded at the last swap;
/// * a narrowable unit strictly contains the edited region, with at least one
///   character of the unit on either side, and lies inside the requested span.
///
/// The margin keeps every tag touching the edit inside the recomputed region,
/// including tags dropped eagerly when the edit arrived.
pub(crate) fn narrow<T>(
	narrowing: &dyn SemanticNarrowing,
	spans: &[DocumentSpan],
	hint: Option<ChangeHint>,
	previous: &SnapshotMap<T>,
	semantic_versions: &FxHashMap<BufferId, u64>,
) -> Option<DocumentSpan> {
	let HintRegion::Buffer { buffer, version, range } = hint?.region else {
		return None;
	};
	let [requested] = spans else {
		return None;
	};
	if requested.buffer() != buffer || requested.snapshot.version().number() != version || !previous.contains_key(&buffer) {
		return None;
	}

	let semantic = narrowing.semantic_version(&requested.snapshot)?;
	if semantic_versions.get(&buffer) != Some(&semantic) {
		return None;
	}

	let edited = range.new_span();
	let unit = narrowing.containing_unit(&requested.snapshot, edited)?;
	let inside = unit.span.start < edited.start && edited.end < unit.span.end;
	if !unit.narrowable || !inside || !requested.span.contains_span(&unit.span) {
		return None;
	}

	Some(DocumentSpan::new(requested.snapshot.clone(), unit.span))
}
