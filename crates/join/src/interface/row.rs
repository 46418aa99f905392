// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::interface::{RowNumber, Value};

/// One stored (or synthesized) row of a single source.
///
/// Synthetic null rows, substituted for outer-join misses, carry no row
/// number and an undefined value in every column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
	number: Option<RowNumber>,
	values: Vec<Value>,
}

impl Row {
	pub fn new(number: RowNumber, values: Vec<Value>) -> Self {
		Self {
			number: Some(number),
			values,
		}
	}

	/// A row without identity, e.g. the flattened output of a nested join.
	pub fn unkeyed(values: Vec<Value>) -> Self {
		Self {
			number: None,
			values,
		}
	}

	/// The all-null substitute row for an outer-join miss.
	pub fn synthetic_null(width: usize) -> Self {
		Self {
			number: None,
			values: vec![Value::Undefined; width],
		}
	}

	pub fn number(&self) -> Option<RowNumber> {
		self.number
	}

	pub fn value(&self, column: usize) -> Option<&Value> {
		self.values.get(column)
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn width(&self) -> usize {
		self.values.len()
	}
}

/// A column reference within one filter's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef {
	/// The synthetic identity column backed by the row number.
	RowNumber,
	/// A stored column by position.
	Column(usize),
}

/// A partial row bounding one side of an index range query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchRow(pub Vec<Value>);

impl SearchRow {
	pub fn key(value: Value) -> Self {
		Self(vec![value])
	}

	pub fn values(&self) -> &[Value] {
		&self.0
	}
}

/// The range of index entries one lookup covers. `None` bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRange {
	pub first: Option<SearchRow>,
	pub last: Option<SearchRow>,
}

impl SearchRange {
	pub fn new(first: Option<SearchRow>, last: Option<SearchRow>) -> Self {
		Self {
			first,
			last,
		}
	}

	/// The unbounded range, scanning the whole index.
	pub fn all() -> Self {
		Self {
			first: None,
			last: None,
		}
	}

	/// An equality lookup: both bounds are the same search row.
	pub fn key(row: SearchRow) -> Self {
		Self {
			first: Some(row.clone()),
			last: Some(row),
		}
	}
}
