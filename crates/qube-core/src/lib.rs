//! Qube Core Library
//!
//! This crate provides the fundamental types shared by every Qube crate:
//! errors, cube metadata with explicit member ordinals, and member sets.
//!
//! # Overview
//!
//! Qube computes cross-tabulated count-distinct grids against an OLAP cube
//! while keeping cube round trips proportional to rows + columns. The
//! algebra it evaluates operates on [`MemberSet`]s: bitmaps of member
//! ordinals over a single cube level.
//!
//! # Modules
//!
//! - `error` - Error types and result aliases
//! - `id` - Level, container and schema identifiers
//! - `definition` - Serializable cube definitions
//! - `metadata` - Indexed cube metadata (hierarchies, levels, members)
//! - `member_set` - Member sets and their detached form

pub mod definition;
pub mod error;
pub mod id;
pub mod member_set;
pub mod metadata;

pub use definition::{
    CubeDefinition, HierarchyDefinition, LevelDefinition, MeasureDefinition, MemberDefinition,
};
pub use error::{Error, Result};
pub use id::{ContainerId, LevelId, Ordinal, SchemaId};
pub use member_set::{DetachedMemberSet, MemberSet};
pub use metadata::{bracket, Cube, Hierarchy, Level, LevelMap, Measure, Member, MemberRef};
