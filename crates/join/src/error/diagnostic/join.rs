// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::{error::diagnostic::Diagnostic, interface::LookupError};

pub fn too_many_filters(count: usize) -> Diagnostic {
	Diagnostic {
		code: "JOIN_001".to_string(),
		message: format!("too many tables in join: {} (at most 32 supported)", count),
		label: Some("the batched join stores per-filter progress in a fixed-width table".to_string()),
		help: Some("split the query or let the planner fall back to non-batched joins".to_string()),
		notes: vec![],
		cause: None,
	}
}

pub fn slot_state(filter: usize, expected: &str, found: &str) -> Diagnostic {
	Diagnostic {
		code: "JOIN_002".to_string(),
		message: format!("join row slot for filter {} is in state {} but {} was required", filter, found, expected),
		label: Some("per-filter progress may only move forward".to_string()),
		help: Some("please report this problem".to_string()),
		notes: vec![],
		cause: None,
	}
}

pub fn missing_column_value(filter: usize, column: usize) -> Diagnostic {
	Diagnostic {
		code: "JOIN_003".to_string(),
		message: format!("materialized row of filter {} has no value for column {}", filter, column),
		label: Some("a complete join row must supply every referenced column".to_string()),
		help: Some("please report this problem".to_string()),
		notes: vec![],
		cause: None,
	}
}

pub fn unpaired_lookup_result(filter: usize) -> Diagnostic {
	Diagnostic {
		code: "JOIN_004".to_string(),
		message: format!("lookup result for filter {} could not be paired to a waiting row", filter),
		label: Some("a resolved slot was found where an empty one was expected".to_string()),
		help: Some("please report this problem".to_string()),
		notes: vec![],
		cause: None,
	}
}

pub fn row_not_complete(filter: usize) -> Diagnostic {
	Diagnostic {
		code: "JOIN_005".to_string(),
		message: format!("value of filter {} requested before the join row was complete", filter),
		label: Some("call next() and check its result before reading values".to_string()),
		help: None,
		notes: vec![],
		cause: None,
	}
}

pub fn batch_overflow() -> Diagnostic {
	Diagnostic {
		code: "JOIN_006".to_string(),
		message: "search range added to a full lookup batch".to_string(),
		label: Some("a full batch must be submitted or reset before more ranges are added".to_string()),
		help: Some("please report this problem".to_string()),
		notes: vec![],
		cause: None,
	}
}

pub fn lookup_failed(err: &LookupError) -> Diagnostic {
	Diagnostic {
		code: "JOIN_007".to_string(),
		message: "index lookup failed".to_string(),
		label: Some("the storage layer could not resolve a batched lookup".to_string()),
		help: Some("the join must be reset or disposed after this failure".to_string()),
		notes: vec![err.to_string()],
		cause: None,
	}
}
