//! Qube Query Engine
//!
//! Computes cross-tabulated count-distinct grids over a cube while keeping
//! the number of cube round trips proportional to rows plus columns.
//!
//! # Architecture
//!
//! - `request` - JSON query requests, resolved against cube metadata
//! - `ast` - The resolved query AST
//! - `result` - Intermediate member-slice and crossjoin results
//! - `text` - Deterministic MDX text, also used as cache keys
//! - `reachability` - Cache-then-cube non-empty crossjoin lookups
//! - `evaluator` - Expression evaluation, filter reduction and grid evaluation
//! - `grid` - The labelled output grid

pub mod ast;
pub mod evaluator;
pub mod grid;
pub mod reachability;
pub mod request;
pub mod result;
pub mod text;

pub use ast::{MemberScope, MembersExpr, QubeExpr, QubeQuery};
pub use evaluator::{evaluate, ExecutionStats, QueryEvaluator, QueryResult};
pub use grid::{AxisLabel, CountGrid};
pub use reachability::Reachability;
pub use request::{ExprRequest, Operator, QueryRequest};
pub use result::{ExprResult, MemberSetResult};
