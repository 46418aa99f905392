// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::{
	execute::batch::BatchedJoin,
	interface::{LookupBatch, PendingCursor, RowsCursor, SearchRange},
};

/// Shared parameter slot connecting an outer lookup range to the driving
/// filter of a nested join. The driving filter of the inner join reads
/// the slot when computing its search range, the way a view or subquery
/// receives its correlation parameters.
#[derive(Clone, Default)]
pub struct NestedParams(Arc<RwLock<Option<SearchRange>>>);

impl NestedParams {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, range: SearchRange) {
		*self.0.write() = Some(range);
	}

	pub fn clear(&self) {
		*self.0.write() = None;
	}

	pub fn get(&self) -> Option<SearchRange> {
		self.0.read().clone()
	}
}

/// Lookup batch over a whole join, so the join can serve as the batched
/// lookup source of an outer orchestrator. This is the recursion point
/// that lets batched joins nest arbitrarily deep.
pub struct NestedLookupBatch {
	join: BatchedJoin,
	params: NestedParams,
	capacity: usize,
	ranges: Vec<Option<SearchRange>>,
	found: bool,
}

impl NestedLookupBatch {
	pub fn new(join: BatchedJoin, params: NestedParams, capacity: usize) -> Self {
		debug_assert!(capacity > 0, "a lookup batch holds at least one range");
		Self {
			join,
			params,
			capacity,
			ranges: Vec::new(),
			found: false,
		}
	}

	/// Run the inner join to completion for one range, materializing its
	/// output rows flattened across the inner filters.
	fn materialize(&mut self, range: &SearchRange) -> crate::Result<RowsCursor> {
		self.params.set(range.clone());
		self.join.reset();
		let mut rows = Vec::new();
		while self.join.next()? {
			rows.push(self.join.materialized_row()?);
		}
		self.params.clear();
		trace!(rows = rows.len(), "materialized nested join range");
		Ok(RowsCursor::new(rows))
	}
}

impl LookupBatch for NestedLookupBatch {
	fn add_search_range(&mut self, range: SearchRange) -> crate::Result<()> {
		if self.found {
			// a fresh round of ranges after the previous find
			self.ranges.clear();
			self.found = false;
		}
		debug_assert!(!self.is_full(), "range added to a full nested batch");
		// classify up front: when the driving filter of the inner join
		// cannot search under these parameters, the range has no match
		// and no execution is recorded for it
		self.params.set(range.clone());
		let satisfiable = self.join.driving_range_satisfiable();
		self.params.clear();
		self.ranges.push(satisfiable.then_some(range));
		Ok(())
	}

	fn is_full(&self) -> bool {
		self.ranges.len() >= self.capacity
	}

	fn find(&mut self) -> crate::Result<Vec<Option<PendingCursor>>> {
		let ranges = std::mem::take(&mut self.ranges);
		let mut results = Vec::with_capacity(ranges.len());
		for range in &ranges {
			match range {
				Some(range) => {
					let cursor = self.materialize(range)?;
					results.push(Some(PendingCursor::ready(Box::new(cursor))));
				}
				None => results.push(None),
			}
		}
		self.found = true;
		Ok(results)
	}

	fn reset(&mut self) {
		self.ranges.clear();
		self.found = false;
		self.params.clear();
		// the inner orchestrator is reset recursively
		self.join.reset();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use parking_lot::Mutex;

	use super::*;
	use crate::{
		interface::{BoxedCursor, Cursor, JoinedRows, LookupError, Row, SearchRow, SourceFilter, Value},
		test_utils::{TestFilter, collect, int_row},
	};

	fn inner_join(params: NestedParams) -> BatchedJoin {
		// ia ⨝ ib on ia.key = ib.key, ia driven by the shared parameters
		let ia = TestFilter::driving("ia", vec![int_row(1, &[1, 10]), int_row(2, &[2, 20]), int_row(3, &[3, 30])])
			.nested(params);
		let ib = TestFilter::keyed("ib", vec![int_row(4, &[1, 5]), int_row(5, &[3, 6])], 0, (0, 0)).batched(2);
		BatchedJoin::new(vec![Arc::new(ia), Arc::new(ib)], None).unwrap()
	}

	fn nested_batch(capacity: usize) -> NestedLookupBatch {
		let params = NestedParams::new();
		NestedLookupBatch::new(inner_join(params.clone()), params, capacity)
	}

	/// A filter of an outer join whose lookup source is a nested join.
	struct NestedSource {
		columns: usize,
		key_column: usize,
		join_to: (usize, usize),
		outer: bool,
		batch: Mutex<Option<Box<dyn LookupBatch>>>,
	}

	impl NestedSource {
		fn new(columns: usize, key_column: usize, join_to: (usize, usize), batch: NestedLookupBatch) -> Self {
			Self {
				columns,
				key_column,
				join_to,
				outer: false,
				batch: Mutex::new(Some(Box::new(batch))),
			}
		}

		fn outer(mut self) -> Self {
			self.outer = true;
			self
		}
	}

	impl SourceFilter for NestedSource {
		fn name(&self) -> &str {
			"nested"
		}

		fn column_count(&self) -> usize {
			self.columns
		}

		fn is_outer(&self) -> bool {
			self.outer
		}

		fn search_range(&self, left: &dyn JoinedRows) -> Option<SearchRange> {
			let (filter, column) = self.join_to;
			let value = left.row(filter).value(column).cloned().unwrap_or(Value::Undefined);
			if value.is_undefined() {
				None
			} else {
				Some(SearchRange::key(SearchRow::key(value)))
			}
		}

		fn accepts(&self, candidate: &Row, left: &dyn JoinedRows, ignore_join_condition: bool) -> crate::Result<bool> {
			if ignore_join_condition {
				return Ok(true);
			}
			let (filter, column) = self.join_to;
			let key = candidate.value(self.key_column);
			Ok(key.is_some() && key == left.row(filter).value(column))
		}

		fn find(&self, _range: &SearchRange) -> Result<BoxedCursor, LookupError> {
			Err(LookupError::Storage("the nested source only supports batched lookups".to_string()))
		}

		fn lookup_batch(&self) -> Option<Box<dyn LookupBatch>> {
			self.batch.lock().take()
		}
	}

	#[test]
	fn test_find_materializes_each_range() {
		let mut batch = nested_batch(2);
		batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(1)))).unwrap();
		assert!(!batch.is_full());
		batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(2)))).unwrap();
		assert!(batch.is_full());

		let mut results = batch.find().unwrap();
		assert_eq!(results.len(), 2);

		// key 1 joins (1, 10) with (1, 5)
		let mut cursor = results.remove(0).unwrap().resolve().unwrap();
		assert!(cursor.next().unwrap());
		assert_eq!(
			cursor.row().values(),
			&[Value::Int8(1), Value::Int8(10), Value::Int8(1), Value::Int8(5)]
		);
		assert!(!cursor.next().unwrap());

		// key 2 has no ib match, so the nested join yields nothing
		let mut cursor = results.remove(0).unwrap().resolve().unwrap();
		assert!(!cursor.next().unwrap());
	}

	#[test]
	fn test_ranges_added_after_find_start_a_fresh_round() {
		let mut batch = nested_batch(2);
		batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(1)))).unwrap();
		batch.find().unwrap();

		batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(3)))).unwrap();
		let mut results = batch.find().unwrap();
		assert_eq!(results.len(), 1);
		let mut cursor = results.remove(0).unwrap().resolve().unwrap();
		assert!(cursor.next().unwrap());
		assert_eq!(
			cursor.row().values(),
			&[Value::Int8(3), Value::Int8(30), Value::Int8(3), Value::Int8(6)]
		);
	}

	#[test]
	fn test_reset_clears_ranges_and_the_inner_join() {
		let mut batch = nested_batch(2);
		batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(1)))).unwrap();
		batch.reset();
		assert!(!batch.is_full());
		assert!(batch.find().unwrap().is_empty());
	}

	#[test]
	fn test_outer_orchestrator_consumes_the_nested_join() {
		// o ⨝ (ia ⨝ ib), the nested join keyed on ia's key column
		let run = |outer: bool, capacity: usize| {
			let params = NestedParams::new();
			let nested = NestedLookupBatch::new(inner_join(params.clone()), params, capacity);
			let source = NestedSource::new(4, 0, (0, 0), nested);
			let source = if outer {
				source.outer()
			} else {
				source
			};
			let o = TestFilter::driving("o", vec![int_row(1, &[1]), int_row(2, &[3]), int_row(3, &[4])]);
			let mut join =
				BatchedJoin::new(vec![Arc::new(o) as Arc<dyn SourceFilter>, Arc::new(source)], None).unwrap();
			collect(&mut join)
		};

		let ints = |values: &[i64]| values.iter().copied().map(Value::Int8).collect::<Vec<_>>();
		// each submitted range yields exactly the rows the inner join
		// produces for it standalone, attributed to the submitting row
		let inner_expected = vec![ints(&[1, 1, 10, 1, 5]), ints(&[3, 3, 30, 3, 6])];
		assert_eq!(run(false, 2), inner_expected);
		// a capacity the ranges never fill exercises forced submission
		assert_eq!(run(false, 10), inner_expected);

		let mut outer_expected = inner_expected.clone();
		outer_expected.push(vec![
			Value::Int8(4),
			Value::Undefined,
			Value::Undefined,
			Value::Undefined,
			Value::Undefined,
		]);
		assert_eq!(run(true, 2), outer_expected);
	}

	#[test]
	fn test_nested_join_matches_standalone_union() {
		let keys = [1i64, 3, 4];
		let params = NestedParams::new();
		let mut standalone = Vec::new();
		{
			let mut join = inner_join(params.clone());
			for key in keys {
				params.set(SearchRange::key(SearchRow::key(Value::Int8(key))));
				join.reset();
				standalone.extend(collect(&mut join).into_iter());
			}
			params.clear();
		}

		let params = NestedParams::new();
		let mut batch = NestedLookupBatch::new(inner_join(params.clone()), params, keys.len());
		for key in keys {
			batch.add_search_range(SearchRange::key(SearchRow::key(Value::Int8(key)))).unwrap();
		}
		let mut via_batch = Vec::new();
		for result in batch.find().unwrap() {
			let mut cursor = result.unwrap().resolve().unwrap();
			while cursor.next().unwrap() {
				via_batch.push(cursor.row().values().to_vec());
			}
		}
		assert_eq!(via_batch, standalone);
	}
}
