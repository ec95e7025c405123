//! Qube - cross-tabulated count-distinct evaluation over OLAP cubes
//!
//! This is the main library crate that re-exports all Qube components.

pub use qube_cache as cache;
pub use qube_core as core;
pub use qube_cube as cube;
pub use qube_query as query;

// Re-export commonly used types
pub use qube_core::{
    ContainerId, Cube, CubeDefinition, Error, HierarchyDefinition, Level, MemberRef, MemberSet,
    Result, SchemaId,
};

pub use qube_cache::{CacheOptions, CacheScope, CubeCache};
pub use qube_cube::{CubeConnection, CubeFixture, MemoryCube};
pub use qube_query::{
    evaluate, CountGrid, ExprRequest, Operator, QubeExpr, QubeQuery, QueryEvaluator,
    QueryRequest, QueryResult,
};
