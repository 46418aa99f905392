// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::{
	error,
	error::diagnostic::join::lookup_failed,
	interface::{BoxedCursor, SearchRange},
};

/// Failure of the storage layer behind a lookup. Converted into the
/// engine's diagnostic signal when a pending result is resolved; the
/// executor performs no retries of its own.
#[derive(Debug, Error)]
pub enum LookupError {
	#[error("index lookup i/o failure: {0}")]
	Io(#[from] std::io::Error),
	#[error("storage failure during index lookup: {0}")]
	Storage(String),
	#[error("lookup worker disconnected before delivering a result")]
	Disconnected,
}

/// The outcome of one batched lookup: a cursor over the matching rows
/// (possibly empty), or the storage failure that prevented it.
pub type LookupOutcome = Result<BoxedCursor, LookupError>;

/// Handle to one not-yet-consumed lookup outcome.
///
/// Resolution consumes the handle; a pending result is read exactly once,
/// at the moment the owning row is advanced.
pub enum PendingCursor {
	/// Already resolved, e.g. by a synchronous fallback lookup.
	Ready(LookupOutcome),
	/// Resolved out-of-band; receiving blocks until the worker delivers.
	Waiting(Receiver<LookupOutcome>),
}

impl PendingCursor {
	pub fn ready(cursor: BoxedCursor) -> Self {
		PendingCursor::Ready(Ok(cursor))
	}

	pub fn failed(err: LookupError) -> Self {
		PendingCursor::Ready(Err(err))
	}

	pub fn waiting(rx: Receiver<LookupOutcome>) -> Self {
		PendingCursor::Waiting(rx)
	}

	/// Block until the lookup outcome is available.
	pub fn resolve(self) -> crate::Result<BoxedCursor> {
		let outcome = match self {
			PendingCursor::Ready(outcome) => outcome,
			PendingCursor::Waiting(rx) => rx.recv().unwrap_or(Err(LookupError::Disconnected)),
		};
		outcome.map_err(|err| error!(lookup_failed(&err)))
	}
}

impl std::fmt::Debug for PendingCursor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PendingCursor::Ready(Ok(_)) => f.write_str("PendingCursor::Ready"),
			PendingCursor::Ready(Err(err)) => write!(f, "PendingCursor::Failed({})", err),
			PendingCursor::Waiting(_) => f.write_str("PendingCursor::Waiting"),
		}
	}
}

/// A batch of index lookups submitted together so their latency overlaps.
///
/// Ranges accumulate until the batch reports full; `find` submits them and
/// yields one pending result per range, in the order the ranges were
/// added. An absent entry means the engine already knows the range has no
/// match.
pub trait LookupBatch: Send {
	/// Enqueue one search range. Must not be called while the batch
	/// reports full.
	fn add_search_range(&mut self, range: SearchRange) -> crate::Result<()>;

	fn is_full(&self) -> bool;

	/// Submit the accumulated ranges.
	fn find(&mut self) -> crate::Result<Vec<Option<PendingCursor>>>;

	/// Discard any pending or enqueued state.
	fn reset(&mut self);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::interface::{Cursor, RowsCursor};

	#[test]
	fn test_ready_resolves_immediately() {
		let pending = PendingCursor::ready(Box::new(RowsCursor::empty()));
		let mut cursor = pending.resolve().unwrap();
		assert!(!cursor.next().unwrap());
	}

	#[test]
	fn test_failed_resolution_carries_diagnostic() {
		let pending = PendingCursor::failed(LookupError::Storage("page torn".to_string()));
		let err = pending.resolve().unwrap_err();
		assert_eq!(err.code(), "JOIN_007");
	}

	#[test]
	fn test_waiting_resolves_from_worker() {
		let (tx, rx) = crossbeam_channel::bounded(1);
		let pending = PendingCursor::waiting(rx);
		std::thread::spawn(move || {
			let cursor: BoxedCursor = Box::new(RowsCursor::empty());
			tx.send(Ok(cursor)).unwrap();
		});
		let mut cursor = pending.resolve().unwrap();
		assert!(!cursor.next().unwrap());
	}

	#[test]
	fn test_disconnected_worker_is_a_lookup_failure() {
		let (tx, rx) = crossbeam_channel::bounded::<LookupOutcome>(1);
		drop(tx);
		let err = PendingCursor::waiting(rx).resolve().unwrap_err();
		assert_eq!(err.code(), "JOIN_007");
	}
}
