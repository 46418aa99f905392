// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use tracing::trace;

use crate::{
	error::diagnostic::join::unpaired_lookup_result,
	execute::batch::{
		fallback::FallbackLookupBatch,
		row::{RowArena, RowId, Slot, SlotCursor},
	},
	interface::{JoinedRows, LookupBatch, Row, SourceFilter},
	return_error,
};

/// One filter participating in the batched join: the source filter plus
/// the lookup batch of its index, fallback-wrapped when the index cannot
/// batch so every filter speaks the same protocol.
pub(crate) struct JoinFilter {
	id: usize,
	filter: Arc<dyn SourceFilter>,
	batch: Box<dyn LookupBatch>,
	batched: bool,
}

impl JoinFilter {
	pub(crate) fn new(id: usize, filter: Arc<dyn SourceFilter>) -> Self {
		let (batch, batched) = match filter.lookup_batch() {
			Some(batch) => (batch, true),
			None => (Box::new(FallbackLookupBatch::new(filter.clone())) as Box<dyn LookupBatch>, false),
		};
		Self {
			id,
			filter,
			batch,
			batched,
		}
	}

	/// Whether the index really batches in this query, as opposed to the
	/// synchronous fallback.
	pub(crate) fn is_batched(&self) -> bool {
		self.batched
	}

	pub(crate) fn is_outer(&self) -> bool {
		self.filter.is_outer()
	}

	pub(crate) fn null_row(&self) -> Row {
		self.filter.null_row()
	}

	pub(crate) fn is_batch_full(&self) -> bool {
		self.batch.is_full()
	}

	pub(crate) fn source(&self) -> &Arc<dyn SourceFilter> {
		&self.filter
	}

	pub(crate) fn reset(&mut self) {
		self.batch.reset();
	}

	pub(crate) fn accepts(
		&self,
		candidate: &Row,
		left: &dyn JoinedRows,
		ignore_join_condition: bool,
	) -> crate::Result<bool> {
		self.filter.accepts(candidate, left, ignore_join_condition)
	}

	/// Push the filter's search range for the given left rows into the
	/// batch. Returns `false` when the range is statically unsatisfiable
	/// and nothing was enqueued.
	pub(crate) fn collect_search_range(&mut self, left: &dyn JoinedRows) -> crate::Result<bool> {
		debug_assert!(!self.batch.is_full(), "collecting into a full batch for filter {}", self.id);
		match self.filter.search_range(left) {
			Some(range) => {
				self.batch.add_search_range(range)?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Submit the accumulated batch and pair the results back onto the
	/// waiting rows, walking backward from `current` in submission order.
	/// Rows already resolved to the no-match sentinel never submitted a
	/// range and are skipped. Returns the last updated row, where
	/// fetching continues.
	pub(crate) fn find(&mut self, rows: &mut RowArena, current: RowId) -> crate::Result<RowId> {
		// the batch may be empty on a forced find when only sentinel rows
		// are waiting
		let mut results = self.batch.find()?;
		trace!(filter = self.filter.name(), results = results.len(), "pairing lookup results");

		let mut at = current;
		while !results.is_empty() {
			if rows.row(at).slot(self.id).is_no_match() {
				match rows.row(at).prev() {
					Some(prev) => {
						at = prev;
						continue;
					}
					None => return_error!(unpaired_lookup_result(self.id)),
				}
			}
			debug_assert!(self.id == 0 || rows.row(at).slot(self.id - 1).is_row());
			if !rows.row(at).slot(self.id).is_empty() {
				return_error!(unpaired_lookup_result(self.id));
			}
			let result = results.pop().expect("results not empty");
			match result {
				Some(pending) => rows.row_mut(at).advance(self.id, Slot::Pending(pending)),
				None => rows.row_mut(at).advance(self.id, Slot::Cursor(SlotCursor::NoMatch)),
			}
			if results.is_empty() {
				break;
			}
			match rows.row(at).prev() {
				Some(prev) => at = prev,
				None => break,
			}
		}

		// sentinel rows in front still need fetching; continue from the
		// earliest of them
		while let Some(prev) = rows.row(at).prev() {
			if rows.row(prev).slot(self.id).is_no_match() {
				at = prev;
			} else {
				break;
			}
		}

		debug_assert!(match rows.row(at).prev() {
			Some(prev) => rows.row(prev).slot(self.id).is_row(),
			None => true,
		});
		debug_assert!(!rows.row(at).slot(self.id).is_empty());
		debug_assert!(!rows.row(at).slot(self.id).is_row());

		Ok(at)
	}
}
