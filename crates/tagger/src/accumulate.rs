//! Coalescing of text edits into one recomputation hint.
//!
//! Edits arriving between two recomputations collapse into a single
//! [`TextChangeRange`] as long as they hit one buffer in version order. Any
//! break in that chain degrades the hint to [`HintRegion::Scattered`]; the
//! hint is widened, never dropped.

use xeno_primitives::{BufferId, TextChangeRange, TextEdit};

/// Where the accumulated edits landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintRegion {
	/// Contiguous edits of one buffer.
	Buffer {
		buffer: BufferId,
		/// Version number after the last accumulated edit.
		version: u64,
		/// Combined change, old span relative to the version before the first edit.
		range: TextChangeRange,
	},
	/// Edits that cannot be described as one change.
	Scattered,
}

/// Accumulated description of the edits since the last recomputation.
///
/// `edits` is a running total that never resets, so two hints compare equal
/// only if no edit happened between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeHint {
	pub edits: u64,
	pub region: HintRegion,
}

impl ChangeHint {
	/// Returns the combined range if the edits hit a single buffer contiguously.
	pub fn range(&self) -> Option<TextChangeRange> {
		match self.region {
			HintRegion::Buffer { range, .. } => Some(range),
			HintRegion::Scattered => None,
		}
	}
}

#[derive(Debug, Default)]
pub struct ChangeAccumulator {
	pending: Option<ChangeHint>,
	edits: u64,
}

impl ChangeAccumulator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Folds one applied edit into the pending hint.
	pub fn accumulate(&mut self, edit: &TextEdit) {
		self.edits = self.edits.wrapping_add(1);
		let buffer = edit.buffer();
		let next = edit.change.range();
		let after = edit.after.version().number();

		let region = match self.pending.map(|hint| hint.region) {
			None => HintRegion::Buffer {
				buffer,
				version: after,
				range: next,
			},
			Some(HintRegion::Buffer {
				buffer: prev_buffer,
				version,
				range,
			}) if prev_buffer == buffer && version == edit.before.version().number() => HintRegion::Buffer {
				buffer,
				version: after,
				range: range.compose(next),
			},
			Some(_) => {
				tracing::trace!(%buffer, "tagger.hint.scattered");
				HintRegion::Scattered
			}
		};

		self.pending = Some(ChangeHint { edits: self.edits, region });
	}

	/// Returns the pending hint.
	pub fn hint(&self) -> Option<ChangeHint> {
		self.pending
	}

	/// Clears the hint if it is still exactly `captured`.
	///
	/// Returns false, keeping the hint, when edits arrived after capture.
	pub fn clear_if_unchanged(&mut self, captured: Option<ChangeHint>) -> bool {
		if self.pending == captured {
			self.pending = None;
			true
		} else {
			false
		}
	}
}
