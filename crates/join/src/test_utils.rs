// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use crate::{
	execute::{BatchedJoin, NestedParams},
	interface::{
		BoxedCursor, JoinedRows, LookupBatch, LookupError, PendingCursor, Row, RowNumber, RowsCursor,
		SearchRange, SearchRow, SourceFilter, TrailingFilter, Value,
	},
	return_error,
};

pub(crate) fn int_row(number: u64, values: &[i64]) -> Row {
	Row::new(RowNumber(number), values.iter().copied().map(Value::Int8).collect())
}

/// Drive a join to exhaustion, collecting each output row flattened
/// across all filters.
pub(crate) fn collect(join: &mut BatchedJoin) -> Vec<Vec<Value>> {
	let mut out = Vec::new();
	while join.next().unwrap() {
		out.push(join.materialized_row().unwrap().values().to_vec());
	}
	out
}

fn range_matches(range: &SearchRange, key: &Value) -> bool {
	if let Some(first) = &range.first {
		if let Some(bound) = first.values().first() {
			if key < bound {
				return false;
			}
		}
	}
	if let Some(last) = &range.last {
		if let Some(bound) = last.values().first() {
			if key > bound {
				return false;
			}
		}
	}
	true
}

/// A filter over an in-memory table, equality-joining its key column to
/// one column of an upstream filter's row.
pub(crate) struct TestFilter {
	name: String,
	rows: Arc<Vec<Row>>,
	columns: usize,
	key_column: usize,
	join_to: Option<(usize, usize)>,
	outer: bool,
	batch_capacity: Option<usize>,
	prefilter: bool,
	params: Option<NestedParams>,
	residual: Option<fn(&Row) -> bool>,
	failing: bool,
}

impl TestFilter {
	/// The driving filter: scans the whole table.
	pub(crate) fn driving(name: &str, rows: Vec<Row>) -> Self {
		Self::with_join(name, rows, 0, None)
	}

	/// An inner filter whose key column equality-joins to
	/// `(left filter, left column)`.
	pub(crate) fn keyed(name: &str, rows: Vec<Row>, key_column: usize, join_to: (usize, usize)) -> Self {
		Self::with_join(name, rows, key_column, Some(join_to))
	}

	fn with_join(name: &str, rows: Vec<Row>, key_column: usize, join_to: Option<(usize, usize)>) -> Self {
		let columns = rows.first().map(Row::width).unwrap_or(1);
		Self {
			name: name.to_string(),
			rows: Arc::new(rows),
			columns,
			key_column,
			join_to,
			outer: false,
			batch_capacity: None,
			prefilter: false,
			params: None,
			residual: None,
			failing: false,
		}
	}

	pub(crate) fn outer(mut self) -> Self {
		self.outer = true;
		self
	}

	/// Give the filter's index native batching with the given capacity,
	/// resolved on a worker thread.
	pub(crate) fn batched(mut self, capacity: usize) -> Self {
		self.batch_capacity = Some(capacity);
		self
	}

	/// Let the batched index report known-empty ranges as absent results
	/// instead of resolving them to empty cursors.
	pub(crate) fn prefiltered(mut self) -> Self {
		self.prefilter = true;
		self
	}

	/// Make this a nested join's driving filter: its search range comes
	/// from the shared parameter slot instead of the left rows.
	pub(crate) fn nested(mut self, params: NestedParams) -> Self {
		self.params = Some(params);
		self
	}

	pub(crate) fn residual(mut self, residual: fn(&Row) -> bool) -> Self {
		self.residual = Some(residual);
		self
	}

	/// Inject a storage failure into every lookup of this filter.
	pub(crate) fn failing(mut self) -> Self {
		self.failing = true;
		self
	}

	fn matching_rows(rows: &[Row], key_column: usize, range: &SearchRange) -> Vec<Row> {
		rows.iter()
			.filter(|row| row.value(key_column).is_some_and(|key| range_matches(range, key)))
			.cloned()
			.collect()
	}
}

impl SourceFilter for TestFilter {
	fn name(&self) -> &str {
		&self.name
	}

	fn column_count(&self) -> usize {
		self.columns
	}

	fn is_outer(&self) -> bool {
		self.outer
	}

	fn search_range(&self, left: &dyn JoinedRows) -> Option<SearchRange> {
		if let Some(params) = &self.params {
			return match params.get() {
				Some(range) => Some(range),
				None => Some(SearchRange::all()),
			};
		}
		match self.join_to {
			None => Some(SearchRange::all()),
			Some((filter, column)) => {
				let value = left.row(filter).value(column).cloned().unwrap_or(Value::Undefined);
				if value.is_undefined() {
					// an undefined key matches nothing
					None
				} else {
					Some(SearchRange::key(SearchRow::key(value)))
				}
			}
		}
	}

	fn accepts(&self, candidate: &Row, left: &dyn JoinedRows, ignore_join_condition: bool) -> crate::Result<bool> {
		if let Some(residual) = self.residual {
			if !residual(candidate) {
				return Ok(false);
			}
		}
		if ignore_join_condition {
			return Ok(true);
		}
		match self.join_to {
			None => Ok(true),
			Some((filter, column)) => {
				let key = candidate.value(self.key_column);
				Ok(key.is_some() && key == left.row(filter).value(column))
			}
		}
	}

	fn find(&self, range: &SearchRange) -> Result<BoxedCursor, LookupError> {
		if self.failing {
			return Err(LookupError::Storage("injected lookup failure".to_string()));
		}
		let rows = Self::matching_rows(&self.rows, self.key_column, range);
		Ok(Box::new(RowsCursor::new(rows)))
	}

	fn lookup_batch(&self) -> Option<Box<dyn LookupBatch>> {
		self.batch_capacity.map(|capacity| {
			Box::new(TestLookupBatch {
				rows: self.rows.clone(),
				key_column: self.key_column,
				capacity,
				prefilter: self.prefilter,
				failing: self.failing,
				ranges: Vec::new(),
			}) as Box<dyn LookupBatch>
		})
	}
}

/// A batching index over an in-memory table. Every submitted range is
/// resolved on its own worker thread, so results genuinely arrive
/// out-of-band.
pub(crate) struct TestLookupBatch {
	rows: Arc<Vec<Row>>,
	key_column: usize,
	capacity: usize,
	prefilter: bool,
	failing: bool,
	ranges: Vec<SearchRange>,
}

impl LookupBatch for TestLookupBatch {
	fn add_search_range(&mut self, range: SearchRange) -> crate::Result<()> {
		if self.is_full() {
			return_error!(crate::error::diagnostic::join::batch_overflow());
		}
		self.ranges.push(range);
		Ok(())
	}

	fn is_full(&self) -> bool {
		self.ranges.len() >= self.capacity
	}

	fn find(&mut self) -> crate::Result<Vec<Option<PendingCursor>>> {
		let ranges = std::mem::take(&mut self.ranges);
		let mut results = Vec::with_capacity(ranges.len());
		for range in ranges {
			if self.prefilter && TestFilter::matching_rows(&self.rows, self.key_column, &range).is_empty() {
				// known in advance to have no match
				results.push(None);
				continue;
			}
			let (tx, rx) = crossbeam_channel::bounded(1);
			let rows = self.rows.clone();
			let key_column = self.key_column;
			let failing = self.failing;
			std::thread::spawn(move || {
				if failing {
					let _ = tx.send(Err(LookupError::Storage("injected lookup failure".to_string())));
					return;
				}
				let matching = TestFilter::matching_rows(&rows, key_column, &range);
				let cursor: BoxedCursor = Box::new(RowsCursor::new(matching));
				let _ = tx.send(Ok(cursor));
			});
			results.push(Some(PendingCursor::waiting(rx)));
		}
		Ok(results)
	}

	fn reset(&mut self) {
		self.ranges.clear();
	}
}

/// A trailing filter accepting rows by a plain predicate over the joined
/// rows, counting its resets.
pub(crate) struct TestTrailingFilter {
	predicate: fn(&dyn JoinedRows) -> bool,
	resets: Arc<AtomicUsize>,
}

impl TestTrailingFilter {
	pub(crate) fn new(predicate: fn(&dyn JoinedRows) -> bool) -> (Self, Arc<AtomicUsize>) {
		let resets = Arc::new(AtomicUsize::new(0));
		(
			Self {
				predicate,
				resets: resets.clone(),
			},
			resets,
		)
	}
}

impl TrailingFilter for TestTrailingFilter {
	fn reset(&mut self) {
		self.resets.fetch_add(1, Ordering::Relaxed);
	}

	fn test(&mut self, rows: &dyn JoinedRows) -> crate::Result<bool> {
		Ok((self.predicate)(rows))
	}
}
