// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use crate::{
	error::diagnostic::join::batch_overflow,
	interface::{LookupBatch, PendingCursor, SearchRange, SourceFilter},
	return_error,
};

/// Lookup batch for indexes without native batching support. It accepts a
/// single range, reports full immediately and performs the lookup
/// synchronously on `find`, so non-batching indexes participate in the
/// batched join protocol unchanged.
pub(crate) struct FallbackLookupBatch {
	filter: Arc<dyn SourceFilter>,
	range: Option<SearchRange>,
}

impl FallbackLookupBatch {
	pub(crate) fn new(filter: Arc<dyn SourceFilter>) -> Self {
		Self {
			filter,
			range: None,
		}
	}
}

impl LookupBatch for FallbackLookupBatch {
	fn add_search_range(&mut self, range: SearchRange) -> crate::Result<()> {
		if self.range.is_some() {
			return_error!(batch_overflow());
		}
		self.range = Some(range);
		Ok(())
	}

	fn is_full(&self) -> bool {
		self.range.is_some()
	}

	fn find(&mut self) -> crate::Result<Vec<Option<PendingCursor>>> {
		let Some(range) = self.range.take() else {
			return Ok(Vec::new());
		};
		let pending = match self.filter.find(&range) {
			Ok(cursor) => PendingCursor::ready(cursor),
			Err(err) => PendingCursor::failed(err),
		};
		Ok(vec![Some(pending)])
	}

	fn reset(&mut self) {
		self.range = None;
	}
}
