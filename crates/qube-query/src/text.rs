//! Query text generation
//!
//! Produces the MDX sent to the cube. The text is deterministic (explicit
//! sets are written in ordinal order) because it doubles as the suffix of
//! every cache key.

use crate::result::MemberSetResult;
use qube_core::{Cube, Hierarchy, Level, MemberRef, MemberSet};

pub fn member(member: &MemberRef) -> String {
    member.unique_name().to_string()
}

pub fn level(level: &Level) -> String {
    format!("{}.members", level.unique_name())
}

pub fn hierarchy(hierarchy: &Hierarchy) -> String {
    format!("{}.members", hierarchy.unique_name())
}

/// `{a,b,...}` in the given order
pub fn set<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = &'a MemberRef>,
{
    let names: Vec<&str> = members.into_iter().map(|m| m.unique_name()).collect();
    format!("{{{}}}", names.join(","))
}

pub fn member_set(set: &MemberSet) -> String {
    let refs: Vec<MemberRef> = set.refs().collect();
    self::set(&refs)
}

pub fn result(result: &MemberSetResult) -> String {
    match result {
        MemberSetResult::Member(m) => member(m),
        MemberSetResult::Level(l) => level(l),
        MemberSetResult::Hierarchy(h) => hierarchy(h),
        MemberSetResult::Set(s) => member_set(s),
    }
}

/// Members of `outer` with facts under each member of `inner`
///
/// Rows come back as `(inner, outer)` tuples.
pub fn reachability(cube: &Cube, outer: &Level, inner: &str) -> String {
    format!(
        "SELECT [Measures].DefaultMember ON COLUMNS, NON EMPTY CROSSJOIN({}, {}) ON ROWS FROM {}",
        inner,
        self::level(outer),
        cube.unique_name()
    )
}

/// Members of `level` with at least one fact
pub fn non_empty(cube: &Cube, level: &Level) -> String {
    format!(
        "SELECT [Measures].DefaultMember ON COLUMNS, NON EMPTY {} ON ROWS FROM {}",
        self::level(level),
        cube.unique_name()
    )
}
