// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use tracing::instrument;

use crate::{
	error,
	error::diagnostic::join::{lookup_failed, missing_column_value, row_not_complete, slot_state, too_many_filters},
	interface::{ColumnRef, JoinedRows, Row, RowsCursor, SourceFilter, TrailingFilter, Value},
	return_error,
};

pub(crate) mod fallback;
pub(crate) mod filter;
pub(crate) mod nested;
pub(crate) mod row;

pub use nested::{NestedLookupBatch, NestedParams};

use filter::JoinFilter;
use row::{RowArena, RowId, Slot, SlotCursor};

/// Upper bound on the number of filters participating in one batched
/// join.
pub const MAX_FILTERS: usize = 32;

/// Batched asynchronous multi-way join executor.
///
/// Filters join left to right in nested-loop order; the driving
/// (outermost) filter paces the scan while the lookups of the inner
/// filters are batched, so their latency overlaps across the rows in
/// flight. Rows under construction live in an arena, linked by discovery
/// time, each holding one progress slot per filter.
pub struct BatchedJoin {
	filters: Vec<JoinFilter>,
	trailing: Option<Box<dyn TrailingFilter>>,
	rows: RowArena,
	current: Option<RowId>,
	started: bool,
}

impl BatchedJoin {
	/// Build the executor over the ordered participating filters and an
	/// optional trailing filter evaluated outside the batched core.
	pub fn new(
		filters: Vec<Arc<dyn SourceFilter>>,
		trailing: Option<Box<dyn TrailingFilter>>,
	) -> crate::Result<Self> {
		if filters.len() > MAX_FILTERS {
			return_error!(too_many_filters(filters.len()));
		}
		debug_assert!(!filters.is_empty(), "a join needs at least one filter");
		let filters = filters.into_iter().enumerate().map(|(id, filter)| JoinFilter::new(id, filter)).collect();
		Ok(Self {
			filters,
			trailing,
			rows: RowArena::new(),
			current: None,
			started: false,
		})
	}

	pub fn filter_count(&self) -> usize {
		self.filters.len()
	}

	/// Whether the index of the given filter really batches in this
	/// query, as opposed to the synchronous fallback.
	pub fn is_batched_index(&self, filter: usize) -> bool {
		self.filters[filter].is_batched()
	}

	/// Discard all in-flight state; the next `next()` starts over. Also
	/// the only cancellation primitive, safe between any two calls.
	#[instrument(name = "BatchedJoin::reset", level = "trace", skip_all)]
	pub fn reset(&mut self) {
		self.rows.clear();
		self.current = None;
		self.started = false;
		for filter in &mut self.filters {
			filter.reset();
		}
		if let Some(trailing) = self.trailing.as_mut() {
			trailing.reset();
		}
	}

	/// Advance to the next joined output row. While this returns `true`
	/// the row's contributions are readable through `value_at`.
	#[instrument(name = "BatchedJoin::next", level = "trace", skip_all)]
	pub fn next(&mut self) -> crate::Result<bool> {
		if !self.started {
			self.start()?;
			self.started = true;
		}
		if self.trailing.is_none() {
			let advanced = self.batched_next()?;
			debug_assert!(!advanced || self.rows.row(self.current.expect("current set")).is_complete());
			return Ok(advanced);
		}
		// the trailing filter runs in the usual way outside the batched
		// core, which is cheaper than making it participate in batching
		loop {
			if !self.batched_next()? {
				return Ok(false);
			}
			let current = self.current.expect("current set after batched_next");
			debug_assert!(self.rows.row(current).is_complete());
			let trailing = self.trailing.as_mut().expect("trailing presence checked");
			trailing.reset();
			let view = JoinedView {
				row: self.rows.row(current),
				fetched: self.filters.len(),
				candidate: None,
			};
			if trailing.test(&view)? {
				return Ok(true);
			}
		}
	}

	/// The column value of the given filter in the current output row.
	/// Only valid while `next()` reports a row; the synthetic null row
	/// supplies `Undefined` for every column and for the row number.
	pub fn value_at(&self, filter: usize, column: ColumnRef) -> crate::Result<Value> {
		let Some(current) = self.current else {
			return_error!(row_not_complete(filter));
		};
		let Slot::Row(row) = self.rows.row(current).slot(filter) else {
			return_error!(row_not_complete(filter));
		};
		match column {
			ColumnRef::RowNumber => Ok(row.number().map(Value::RowNumber).unwrap_or(Value::Undefined)),
			ColumnRef::Column(index) => match row.value(index) {
				Some(value) => Ok(value.clone()),
				None => return_error!(missing_column_value(filter, index)),
			},
		}
	}

	/// Flatten the current output row into a single row spanning every
	/// filter's columns, e.g. to feed an outer join through the nested
	/// adapter.
	pub fn materialized_row(&self) -> crate::Result<Row> {
		let Some(current) = self.current else {
			return_error!(row_not_complete(0));
		};
		let row = self.rows.row(current);
		let mut values = Vec::new();
		for filter in 0..self.filters.len() {
			match row.slot(filter) {
				Slot::Row(row) => values.extend_from_slice(row.values()),
				_ => return_error!(row_not_complete(filter)),
			}
		}
		Ok(Row::unkeyed(values))
	}

	/// Whether the driving filter can produce any range under the
	/// currently configured parameters.
	pub(crate) fn driving_range_satisfiable(&self) -> bool {
		self.filters[0].source().search_range(&NoJoinedRows).is_some()
	}

	fn start(&mut self) -> crate::Result<()> {
		let first = self.rows.alloc(self.filters.len());
		// the driving filter is never batched: its cursor is positioned
		// directly and paces the whole join
		let driving = &self.filters[0];
		let slot = match driving.source().search_range(&NoJoinedRows) {
			Some(range) => match driving.source().find(&range) {
				Ok(cursor) => Slot::Cursor(SlotCursor::Positioned(cursor)),
				Err(err) => return Err(error!(lookup_failed(&err))),
			},
			// a statically empty driving range scans nothing, outer or
			// not
			None => Slot::Cursor(SlotCursor::Positioned(Box::new(RowsCursor::empty()))),
		};
		self.rows.row_mut(first).advance(0, slot);
		// the walk always moves forward before fetching, so the initial
		// position is a placeholder in front of the first real row
		self.current = Some(self.rows.alloc_placeholder(first));
		Ok(())
	}

	fn batched_next(&mut self) -> crate::Result<bool> {
		let Some(consumed) = self.current else {
			// after last
			return Ok(false);
		};
		let Some(mut current) = self.rows.row(consumed).next() else {
			self.current = None;
			self.rows.clear();
			return Ok(false);
		};
		// once the position moved on, the consumed row and the history
		// behind it can no longer pair any result
		self.rows.row_mut(current).set_prev(None);
		self.rows.release_history(consumed);

		let last = self.filters.len() - 1;
		// resume at the rightmost filter this row has progress for
		let mut jf = last;
		while self.rows.row(current).slot(jf).is_empty() {
			jf -= 1;
		}

		loop {
			current = self.fetch_current(current, jf)?;

			if !self.rows.row(current).is_dropped() {
				// a row that was not dropped was fetched successfully
				if jf == last {
					// the whole join row is ready to be returned
					self.current = Some(current);
					return Ok(true);
				}
				let next_filter = jf + 1;
				if self.filters[next_filter].is_batch_full() {
					current = self.filters[next_filter].find(&mut self.rows, current)?;
				}
				if !self.rows.row(current).slot(next_filter).is_empty() {
					// either the batch was submitted or the slot holds
					// the no-match sentinel of an outer join; advancing
					// it must wait until the row before it has
					// materialized this filter, or rows would surface
					// out of nested-loop order
					let ready = match self.rows.row(current).prev() {
						Some(prev) => self.rows.row(prev).slot(next_filter).is_row(),
						None => true,
					};
					if ready {
						jf = next_filter;
						continue;
					}
				}
			}
			// fetch more rows to keep filling the next batch, or force a
			// submission when nothing can feed it before output is due
			if self.rows.row(current).next().is_none() {
				if self.rows.row(current).is_dropped() {
					let prev = self.rows.row(current).prev();
					self.rows.release(current);
					match prev {
						Some(prev) => current = prev,
						None => {
							self.current = None;
							self.rows.clear();
							return Ok(false);
						}
					}
				}
				debug_assert!(!self.rows.row(current).is_dropped());
				debug_assert!(jf != last, "the last filter cannot wait for further rows");
				jf = 0;
				while self.rows.row(current).slot(jf).is_row() {
					jf += 1;
				}
				// force find on the partially filled batch; the waiting
				// rows hold either search rows or the no-match sentinel
				current = self.filters[jf].find(&mut self.rows, current)?;
			} else {
				let next_row = self.rows.row(current).next().expect("next presence checked");
				if self.rows.row(current).is_dropped() {
					self.rows.release(current);
				}
				current = next_row;
				debug_assert!(!self.rows.row(current).slot(jf).is_row());
				while self.rows.row(current).slot(jf).is_empty() {
					debug_assert!(jf != 0, "the driving filter always has progress");
					jf -= 1;
					debug_assert!(!self.rows.row(current).slot(jf).is_row());
				}
			}
		}
	}

	/// Advance filter `jf_id`'s contribution for the given row: resolve a
	/// pending lookup if needed, then iterate the cursor until a
	/// candidate passes the conditions, substituting the null row on a
	/// fresh outer-join miss. Returns the row holding the fetched
	/// contribution, or the dropped row.
	fn fetch_current(&mut self, current: RowId, jf_id: usize) -> crate::Result<RowId> {
		debug_assert!(
			match self.rows.row(current).prev() {
				Some(prev) => self.rows.row(prev).slot(jf_id).is_row(),
				None => true,
			},
			"prev must be already fetched"
		);
		debug_assert!(
			jf_id == 0 || self.rows.row(current).slot(jf_id - 1).is_row(),
			"left must be already fetched"
		);
		debug_assert!(!self.rows.row(current).slot(jf_id).is_row(), "double fetch");

		// only a cursor that has never been advanced for this row may
		// substitute the outer-join null row on exhaustion
		let (mut cursor, mut fresh) = match self.rows.row_mut(current).take(jf_id) {
			Slot::Pending(pending) => {
				// blocking is lazy: only the row being advanced resolves
				(Some(pending.resolve()?), true)
			}
			Slot::Cursor(SlotCursor::NoMatch) => (None, true),
			Slot::Cursor(SlotCursor::Positioned(cursor)) => (Some(cursor), false),
			slot => return_error!(slot_state(jf_id, "pending or cursor", slot.progress().name())),
		};

		let mut substituted = false;
		loop {
			let advanced = match cursor.as_mut() {
				Some(cursor) => cursor.next()?,
				None => false,
			};
			if !advanced {
				if fresh && self.filters[jf_id].is_outer() {
					// replace the exhausted cursor with the null row
					let null_row = self.filters[jf_id].null_row();
					self.rows.row_mut(current).advance(jf_id, Slot::Row(null_row));
					cursor = None;
					fresh = false;
					substituted = true;
				} else {
					// cursor is done, drop the row
					self.rows.drop_row(current);
					return Ok(current);
				}
			}

			let verdict = {
				let row = self.rows.row(current);
				let candidate: &Row = if substituted {
					match row.slot(jf_id) {
						Slot::Row(row) => row,
						slot => unreachable!("substituted slot holds the null row: {:?}", slot),
					}
				} else {
					cursor.as_ref().expect("cursor advanced").row()
				};
				let left = JoinedView {
					row,
					fetched: jf_id,
					candidate: None,
				};
				// the join condition is ignored for the null row
				if !self.filters[jf_id].accepts(candidate, &left, substituted)? {
					Verdict::Retry
				} else {
					let mut join_empty = false;
					let mut retry = false;
					if jf_id + 1 < self.filters.len() {
						let with_candidate = JoinedView {
							row,
							fetched: jf_id,
							candidate: Some(candidate),
						};
						// pre-check the dependent range; a statically
						// empty one saves a wasted lookup
						if !self.filters[jf_id + 1].collect_search_range(&with_candidate)? {
							if self.filters[jf_id + 1].is_outer() {
								join_empty = true;
							} else {
								// the join would fail, try the next row
								// in the cursor
								retry = true;
							}
						}
					}
					if retry {
						Verdict::Retry
					} else {
						Verdict::Accept {
							candidate: (!substituted).then(|| candidate.clone()),
							join_empty,
						}
					}
				}
			};

			match verdict {
				Verdict::Retry => continue,
				Verdict::Accept {
					candidate,
					join_empty,
				} => {
					let current = match candidate {
						Some(candidate) => {
							// the original keeps the live cursor for
							// later candidates; the copy behind it
							// receives the materialized row and becomes
							// current
							let cursor = cursor.take().expect("accepted candidate comes from a cursor");
							self.rows
								.row_mut(current)
								.advance(jf_id, Slot::Cursor(SlotCursor::Positioned(cursor)));
							let copy = self.rows.copy_behind(current, jf_id);
							self.rows.row_mut(copy).advance(jf_id, Slot::Row(candidate));
							copy
						}
						None => current,
					};
					if join_empty {
						self.rows.row_mut(current).advance(jf_id + 1, Slot::Cursor(SlotCursor::NoMatch));
					}
					return Ok(current);
				}
			}
		}
	}
}

impl std::fmt::Debug for BatchedJoin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BatchedJoin")
			.field("filters", &self.filters.len())
			.field("started", &self.started)
			.field("in_flight", &self.rows.len())
			.field("current", &self.current)
			.finish()
	}
}

enum Verdict {
	Retry,
	Accept {
		candidate: Option<Row>,
		join_empty: bool,
	},
}

/// View over one in-flight row's materialized prefix, optionally with the
/// candidate row currently under evaluation appended.
struct JoinedView<'a> {
	row: &'a row::JoinRow,
	fetched: usize,
	candidate: Option<&'a Row>,
}

impl JoinedRows for JoinedView<'_> {
	fn len(&self) -> usize {
		self.fetched + usize::from(self.candidate.is_some())
	}

	fn row(&self, filter: usize) -> &Row {
		if filter < self.fetched {
			match self.row.slot(filter) {
				Slot::Row(row) => row,
				slot => panic!("filter {} is not materialized: {:?}", filter, slot),
			}
		} else {
			debug_assert_eq!(filter, self.fetched, "reading past the joined rows");
			self.candidate.expect("candidate row present")
		}
	}
}

/// The empty context of the driving filter, which depends on no one.
struct NoJoinedRows;

impl JoinedRows for NoJoinedRows {
	fn len(&self) -> usize {
		0
	}

	fn row(&self, filter: usize) -> &Row {
		panic!("no joined rows at filter {}", filter)
	}
}
