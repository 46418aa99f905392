// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

mod cursor;
mod filter;
mod lookup;
mod row;
mod value;

pub use cursor::{BoxedCursor, Cursor, RowsCursor};
pub use filter::{JoinedRows, SourceFilter, TrailingFilter};
pub use lookup::{LookupBatch, LookupError, LookupOutcome, PendingCursor};
pub use row::{ColumnRef, Row, SearchRange, SearchRow};
pub use value::{RowNumber, Value};
