//! Runner selection and planning front-end for a BSON document store.
//!
//! Given a canonical query against a named collection, the selector decides
//! how to execute it: an EOF runner for a missing collection, an id-hack
//! point lookup, a cached plan, a single generated plan, or a multi-plan
//! race. It also houses the count and distinct rewrites and the projection
//! validation pass that feeds the planner.

pub mod catalog;
pub mod error;
pub mod obs;
pub mod options;
pub mod query;
mod util;

pub use crate::error::{Error, Result};
pub use crate::query::canonical::{CanonicalQuery, QueryRequest};
pub use crate::query::get_runner::{
    get_runner, get_runner_count, get_runner_distinct, get_runner_unparsed,
};
pub use crate::query::runner::{Runner, RunnerKind};
