// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::interface::{BoxedCursor, LookupBatch, LookupError, Row, SearchRange};

/// Read access to the rows joined so far, one per upstream filter in
/// join order. Handed to a filter when it computes search ranges or
/// evaluates conditions that depend on the filters to its left.
pub trait JoinedRows {
	/// Number of filters with a materialized row.
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The materialized row of the given filter. Only filters below
	/// `len()` may be read.
	fn row(&self, filter: usize) -> &Row;
}

/// One table (and its chosen index) participating in the join, in a
/// fixed left-to-right order.
///
/// The executor never evaluates expressions itself; range computation and
/// condition checks are delegated here.
pub trait SourceFilter: Send + Sync {
	/// Identifier used in traces and diagnostics.
	fn name(&self) -> &str;

	fn column_count(&self) -> usize;

	/// Whether unmatched lookups still produce output, paired with the
	/// all-null substitute row.
	fn is_outer(&self) -> bool;

	/// The all-null substitute row for an outer-join miss.
	fn null_row(&self) -> Row {
		Row::synthetic_null(self.column_count())
	}

	/// The index range to search given the rows joined so far. `None`
	/// when the range is statically known to be unsatisfiable.
	fn search_range(&self, left: &dyn JoinedRows) -> Option<SearchRange>;

	/// Evaluate this filter's residual condition on `candidate` and,
	/// unless `ignore_join_condition` is set (the candidate is a
	/// synthetic null row), its join condition against the rows it
	/// depends on.
	fn accepts(&self, candidate: &Row, left: &dyn JoinedRows, ignore_join_condition: bool) -> crate::Result<bool>;

	/// Direct synchronous index lookup, used for the driving filter and
	/// by the fallback adapter.
	fn find(&self, range: &SearchRange) -> Result<BoxedCursor, LookupError>;

	/// A batched lookup handle for this filter's index, or `None` when
	/// the index does not support batching.
	fn lookup_batch(&self) -> Option<Box<dyn LookupBatch>>;
}

/// A filter joined after the batched core. It stays outside batching and
/// is evaluated on complete candidate rows only, which realizes a further
/// selective condition cheaply.
pub trait TrailingFilter: Send {
	fn reset(&mut self);

	fn test(&mut self, rows: &dyn JoinedRows) -> crate::Result<bool>;
}
