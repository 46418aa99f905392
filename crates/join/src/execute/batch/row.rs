// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use slab::Slab;

use crate::interface::{BoxedCursor, PendingCursor, Row};

/// Stable handle of one in-flight row inside the arena.
pub(crate) type RowId = usize;

/// Per-filter progress of one in-flight row. Strictly increasing over the
/// row's lifecycle; going back means building a new row instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Progress {
	Empty,
	Pending,
	Cursor,
	Row,
}

impl Progress {
	pub(crate) fn name(&self) -> &'static str {
		match self {
			Progress::Empty => "empty",
			Progress::Pending => "pending",
			Progress::Cursor => "cursor",
			Progress::Row => "row",
		}
	}
}

/// A positioned cursor slot. `NoMatch` records a range that was statically
/// known to be empty, so no lookup was ever submitted for it; it behaves
/// like a cursor exhausted on its first advance.
pub(crate) enum SlotCursor {
	NoMatch,
	Positioned(BoxedCursor),
}

/// What one filter currently contributes to an in-flight row.
pub(crate) enum Slot {
	/// No attempt yet.
	Empty,
	/// A lookup was submitted; the result has not been consumed.
	Pending(PendingCursor),
	/// A cursor is available and may or may not have a current row.
	Cursor(SlotCursor),
	/// The contribution is fixed, either a real match or the synthetic
	/// null row of an unmatched outer join.
	Row(Row),
}

impl Slot {
	pub(crate) fn progress(&self) -> Progress {
		match self {
			Slot::Empty => Progress::Empty,
			Slot::Pending(_) => Progress::Pending,
			Slot::Cursor(_) => Progress::Cursor,
			Slot::Row(_) => Progress::Row,
		}
	}

	pub(crate) fn is_empty(&self) -> bool {
		matches!(self, Slot::Empty)
	}

	pub(crate) fn is_row(&self) -> bool {
		matches!(self, Slot::Row(_))
	}

	pub(crate) fn is_no_match(&self) -> bool {
		matches!(self, Slot::Cursor(SlotCursor::NoMatch))
	}
}

impl std::fmt::Debug for Slot {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Slot::Empty => f.write_str("Empty"),
			Slot::Pending(_) => f.write_str("Pending"),
			Slot::Cursor(SlotCursor::NoMatch) => f.write_str("Cursor(NoMatch)"),
			Slot::Cursor(SlotCursor::Positioned(_)) => f.write_str("Cursor"),
			Slot::Row(_) => f.write_str("Row"),
		}
	}
}

/// One (possibly partial) join-output row under construction, linked by
/// discovery time into the list of rows in flight.
pub(crate) struct JoinRow {
	slots: Vec<Slot>,
	prev: Option<RowId>,
	next: Option<RowId>,
	dropped: bool,
}

impl JoinRow {
	fn new(filters: usize) -> Self {
		let mut slots = Vec::with_capacity(filters);
		slots.resize_with(filters, || Slot::Empty);
		Self {
			slots,
			prev: None,
			next: None,
			dropped: false,
		}
	}

	pub(crate) fn slot(&self, filter: usize) -> &Slot {
		&self.slots[filter]
	}

	/// Remove a slot value for an in-place transition, leaving `Empty`.
	/// The caller advances the slot again before the row is observed.
	pub(crate) fn take(&mut self, filter: usize) -> Slot {
		std::mem::replace(&mut self.slots[filter], Slot::Empty)
	}

	/// Install the next stage of a slot. Progress per filter is
	/// monotonic; a regression is a bug in the state machine.
	pub(crate) fn advance(&mut self, filter: usize, slot: Slot) {
		debug_assert!(
			slot.progress() > self.slots[filter].progress(),
			"slot regression for filter {}: {:?} -> {:?}",
			filter,
			self.slots[filter],
			slot
		);
		self.slots[filter] = slot;
	}

	pub(crate) fn is_complete(&self) -> bool {
		self.slots.last().is_some_and(Slot::is_row)
	}

	pub(crate) fn is_dropped(&self) -> bool {
		self.dropped
	}

	pub(crate) fn prev(&self) -> Option<RowId> {
		self.prev
	}

	pub(crate) fn next(&self) -> Option<RowId> {
		self.next
	}

	pub(crate) fn set_prev(&mut self, prev: Option<RowId>) {
		self.prev = prev;
	}
}

impl std::fmt::Debug for JoinRow {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JoinRow")
			.field("slots", &self.slots)
			.field("prev", &self.prev)
			.field("next", &self.next)
			.field("dropped", &self.dropped)
			.finish()
	}
}

/// Arena of the rows in flight. Links are slab handles, so unlinking a
/// row can never leave a dangling reference behind.
pub(crate) struct RowArena {
	rows: Slab<JoinRow>,
}

impl RowArena {
	pub(crate) fn new() -> Self {
		Self {
			rows: Slab::new(),
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.rows.len()
	}

	pub(crate) fn clear(&mut self) {
		self.rows.clear();
	}

	pub(crate) fn alloc(&mut self, filters: usize) -> RowId {
		self.rows.insert(JoinRow::new(filters))
	}

	/// A placeholder linked in front of the first real row; the walk
	/// always moves forward before fetching, so the initial position must
	/// sit before the first candidate.
	pub(crate) fn alloc_placeholder(&mut self, before: RowId) -> RowId {
		let mut placeholder = JoinRow::new(0);
		placeholder.dropped = true;
		placeholder.next = Some(before);
		let id = self.rows.insert(placeholder);
		self.rows[before].prev = Some(id);
		id
	}

	pub(crate) fn row(&self, id: RowId) -> &JoinRow {
		&self.rows[id]
	}

	pub(crate) fn row_mut(&mut self, id: RowId) -> &mut JoinRow {
		&mut self.rows[id]
	}

	/// Copy the row behind itself: the copy receives the already
	/// materialized prefix and becomes the row the accepted candidate is
	/// fixed on, while the original keeps its live cursor for later
	/// candidates.
	pub(crate) fn copy_behind(&mut self, id: RowId, filter: usize) -> RowId {
		let original = &self.rows[id];
		debug_assert!(matches!(original.slot(filter), Slot::Cursor(_)), "copy_behind expects a cursor at {}", filter);
		debug_assert!(
			filter + 1 == original.slots.len() || original.slot(filter + 1).is_empty(),
			"copy_behind expects no progress right of {}",
			filter
		);

		let mut slots = Vec::with_capacity(original.slots.len());
		for left in 0..filter {
			match original.slot(left) {
				Slot::Row(row) => slots.push(Slot::Row(row.clone())),
				slot => unreachable!("unmaterialized prefix slot {} in copy_behind: {:?}", left, slot),
			}
		}
		slots.resize_with(original.slots.len(), || Slot::Empty);

		let prev = original.prev;
		let copy = self.rows.insert(JoinRow {
			slots,
			prev,
			next: Some(id),
			dropped: false,
		});
		if let Some(prev) = prev {
			self.rows[prev].next = Some(copy);
		}
		self.rows[id].prev = Some(copy);
		copy
	}

	/// Unlink the row and release its slots. The row's own links survive
	/// until the walk has moved off it.
	pub(crate) fn drop_row(&mut self, id: RowId) {
		let (prev, next) = {
			let row = &mut self.rows[id];
			row.dropped = true;
			row.slots.clear();
			(row.prev, row.next)
		};
		if let Some(prev) = prev {
			self.rows[prev].next = next;
		}
		if let Some(next) = next {
			self.rows[next].prev = prev;
		}
	}

	/// Free a row that nothing links to anymore.
	pub(crate) fn release(&mut self, id: RowId) {
		self.rows.remove(id);
	}

	/// Free a consumed row together with the history chain behind it.
	pub(crate) fn release_history(&mut self, id: RowId) {
		let mut at = Some(id);
		while let Some(id) = at {
			at = self.rows[id].prev;
			self.rows.remove(id);
		}
	}
}
