//! Qube Cube Layer
//!
//! The boundary between the evaluator and a cube engine.
//!
//! # Modules
//!
//! - `connection` - The [`CubeConnection`] trait and cellset types
//! - `lexer` - MDX tokens (logos)
//! - `parser` - Recursive-descent parser for the MDX subset the evaluator emits
//! - `engine` - [`MemoryCube`], an in-memory fact cube executing that subset

pub mod connection;
pub mod engine;
pub mod lexer;
pub mod parser;

pub use connection::{CellMember, CellSet, CubeConnection, Position};
pub use engine::{CubeFixture, FactRow, MemoryCube, MEASURES_LEVEL};
pub use parser::{parse, Axis, AxisSpec, MdxQuery, MemberPath, SetExpr};
