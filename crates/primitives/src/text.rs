//! Versioned text buffers and immutable snapshots.
//!
//! A [`TextBuffer`] owns the live text of one document. Every edit produces a
//! new [`TextVersion`] linked forward from the previous one, so any snapshot
//! can reach the changes that lead to a newer snapshot of the same buffer.
//! Old versions never keep newer ones from being dropped by the buffer; the
//! link only points forward.

use std::fmt;
use std::sync::{Arc, OnceLock};

use ropey::Rope;
use thiserror::Error;

use crate::change::TextChange;
use crate::ids::BufferId;
use crate::range::{CharLen, Span};

/// Errors produced when applying an edit to a [`TextBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
	/// The replaced span extends past the end of the text.
	#[error("edit span {start}..{end} is out of bounds for text of length {len}")]
	OutOfBounds { start: usize, end: usize, len: CharLen },
}

struct VersionNode {
	number: u64,
	len: CharLen,
	next: OnceLock<(TextChange, TextVersion)>,
}

/// One version in a buffer's forward-linked version chain.
#[derive(Clone)]
pub struct TextVersion {
	node: Arc<VersionNode>,
}

impl TextVersion {
	fn root(len: CharLen) -> Self {
		Self {
			node: Arc::new(VersionNode {
				number: 0,
				len,
				next: OnceLock::new(),
			}),
		}
	}

	/// Returns the monotonically increasing version number.
	#[inline]
	pub fn number(&self) -> u64 {
		self.node.number
	}

	/// Returns the text length at this version.
	#[inline]
	pub fn len(&self) -> CharLen {
		self.node.len
	}

	/// Returns true if the text at this version is empty.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.node.len == 0
	}

	/// Returns the change leading to the next version, if one exists yet.
	pub fn next(&self) -> Option<(&TextChange, &TextVersion)> {
		self.node.next.get().map(|(change, next)| (change, next))
	}

	/// Collects the changes leading from this version to `target`.
	///
	/// Returns `None` if `target` is older than `self` or not on this chain.
	pub fn changes_to(&self, target: &TextVersion) -> Option<Vec<TextChange>> {
		let mut changes = Vec::new();
		let mut cursor = self;
		while cursor.number() < target.number() {
			let (change, next) = cursor.next()?;
			changes.push(change.clone());
			cursor = next;
		}
		Arc::ptr_eq(&cursor.node, &target.node).then_some(changes)
	}

	fn append(&self, change: TextChange, len: CharLen) -> TextVersion {
		let next = TextVersion {
			node: Arc::new(VersionNode {
				number: self.number() + 1,
				len,
				next: OnceLock::new(),
			}),
		};
		let _ = self.node.next.set((change, next.clone()));
		next
	}
}

impl PartialEq for TextVersion {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.node, &other.node)
	}
}

impl Eq for TextVersion {}

impl fmt::Debug for TextVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TextVersion").field("number", &self.number()).field("len", &self.len()).finish()
	}
}

/// Immutable view of a buffer's text at one version.
///
/// Cloning is cheap: the rope and the version node are shared.
#[derive(Clone)]
pub struct TextSnapshot {
	buffer: BufferId,
	version: TextVersion,
	text: Rope,
}

impl TextSnapshot {
	/// Returns the buffer this snapshot belongs to.
	#[inline]
	pub fn buffer(&self) -> BufferId {
		self.buffer
	}

	/// Returns the version this snapshot was taken at.
	#[inline]
	pub fn version(&self) -> &TextVersion {
		&self.version
	}

	/// Returns the text.
	#[inline]
	pub fn text(&self) -> &Rope {
		&self.text
	}

	/// Returns the length of the text in characters.
	#[inline]
	pub fn len_chars(&self) -> CharLen {
		self.version.len()
	}

	/// Returns the span covering the whole text.
	pub fn full_span(&self) -> Span {
		Span::new(0, self.len_chars())
	}

	/// Returns true if both snapshots are the same version of the same buffer.
	pub fn same_version(&self, other: &TextSnapshot) -> bool {
		self.buffer == other.buffer && self.version == other.version
	}
}

impl fmt::Debug for TextSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TextSnapshot")
			.field("buffer", &self.buffer)
			.field("version", &self.version.number())
			.field("len", &self.len_chars())
			.finish()
	}
}

/// A single applied edit: the change plus the snapshots on either side.
#[derive(Debug, Clone)]
pub struct TextEdit {
	pub before: TextSnapshot,
	pub after: TextSnapshot,
	pub change: TextChange,
}

impl TextEdit {
	/// Returns the edited buffer.
	pub fn buffer(&self) -> BufferId {
		self.after.buffer()
	}
}

/// Live, editable text of one buffer.
#[derive(Debug)]
pub struct TextBuffer {
	current: TextSnapshot,
}

impl TextBuffer {
	/// Creates a buffer at version 0 holding `text`.
	pub fn new(buffer: BufferId, text: &str) -> Self {
		let text = Rope::from(text);
		let version = TextVersion::root(text.len_chars());
		Self {
			current: TextSnapshot { buffer, version, text },
		}
	}

	/// Returns the buffer id.
	pub fn id(&self) -> BufferId {
		self.current.buffer
	}

	/// Returns the current snapshot.
	pub fn snapshot(&self) -> TextSnapshot {
		self.current.clone()
	}

	/// Applies a change, advancing the buffer to a new version.
	pub fn apply(&mut self, change: TextChange) -> Result<TextEdit, EditError> {
		let len = self.current.len_chars();
		let old = change.old_span();
		if old.end > len {
			return Err(EditError::OutOfBounds {
				start: old.start,
				end: old.end,
				len,
			});
		}

		let mut text = self.current.text.clone();
		text.remove(old.start..old.end);
		text.insert(old.start, change.text());

		let version = self.current.version.append(change.clone(), text.len_chars());
		let after = TextSnapshot {
			buffer: self.current.buffer,
			version,
			text,
		};
		let before = std::mem::replace(&mut self.current, after.clone());
		Ok(TextEdit { before, after, change })
	}

	/// Inserts `text` at `pos`.
	pub fn insert(&mut self, pos: usize, text: &str) -> Result<TextEdit, EditError> {
		self.apply(TextChange::insert(pos, text))
	}

	/// Deletes `span`.
	pub fn delete(&mut self, span: Span) -> Result<TextEdit, EditError> {
		self.apply(TextChange::delete(span))
	}
}
