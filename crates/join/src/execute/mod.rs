// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

pub(crate) mod batch;

pub use batch::{BatchedJoin, MAX_FILTERS, NestedLookupBatch, NestedParams};
