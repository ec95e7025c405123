//! Intermediate evaluation results

use qube_core::{Error, Hierarchy, Level, MemberRef, MemberSet, Result};
use std::sync::Arc;

/// A slice of members on one hierarchy
#[derive(Debug, Clone)]
pub enum MemberSetResult {
    Member(MemberRef),
    Level(Arc<Level>),
    Hierarchy(Arc<Hierarchy>),
    Set(MemberSet),
}

impl MemberSetResult {
    pub fn kind(&self) -> &'static str {
        match self {
            MemberSetResult::Member(_) => "member",
            MemberSetResult::Level(_) => "level",
            MemberSetResult::Hierarchy(_) => "hierarchy",
            MemberSetResult::Set(_) => "member set",
        }
    }

    /// The single level this slice lies on; a hierarchy spans several
    pub fn level(&self) -> Option<&Arc<Level>> {
        match self {
            MemberSetResult::Member(m) => Some(m.level()),
            MemberSetResult::Level(l) => Some(l),
            MemberSetResult::Hierarchy(_) => None,
            MemberSetResult::Set(s) => Some(s.level()),
        }
    }

    /// Unique name of the hierarchy this slice lies on
    pub fn hierarchy_name(&self) -> &str {
        match self {
            MemberSetResult::Member(m) => m.level().hierarchy_name(),
            MemberSetResult::Level(l) => l.hierarchy_name(),
            MemberSetResult::Hierarchy(h) => h.unique_name(),
            MemberSetResult::Set(s) => s.level().hierarchy_name(),
        }
    }

    /// Every member of the slice, expanding levels and hierarchies
    ///
    /// A hierarchy expands to the members of all its levels, top down.
    pub fn collection(&self) -> Vec<MemberRef> {
        match self {
            MemberSetResult::Member(m) => vec![m.clone()],
            MemberSetResult::Level(l) => MemberSet::full(Arc::clone(l)).refs().collect(),
            MemberSetResult::Hierarchy(h) => h
                .levels()
                .iter()
                .flat_map(|l| MemberSet::full(Arc::clone(l)).refs().collect::<Vec<_>>())
                .collect(),
            MemberSetResult::Set(s) => s.refs().collect(),
        }
    }

    /// The slice as a single-level member set
    ///
    /// A hierarchy is taken at its leaf level.
    pub fn to_member_set(&self) -> Result<MemberSet> {
        match self {
            MemberSetResult::Member(m) => MemberSet::from_refs(Arc::clone(m.level()), [m]),
            MemberSetResult::Level(l) => Ok(MemberSet::full(Arc::clone(l))),
            MemberSetResult::Hierarchy(h) => {
                let leaf = h.leaf_level().ok_or_else(|| {
                    Error::InvalidMetadata(format!("Hierarchy {} has no levels", h))
                })?;
                Ok(MemberSet::full(Arc::clone(leaf)))
            }
            MemberSetResult::Set(s) => Ok(s.clone()),
        }
    }

    /// Number of members in the slice
    pub fn len(&self) -> usize {
        match self {
            MemberSetResult::Member(_) => 1,
            MemberSetResult::Level(l) => l.len(),
            MemberSetResult::Hierarchy(h) => h.member_count(),
            MemberSetResult::Set(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone)]
pub enum ExprResult {
    Members(MemberSetResult),
    /// Independent constraints, one slot each; never materialized as tuples
    Cross(Vec<MemberSetResult>),
}

impl ExprResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ExprResult::Members(m) => m.kind(),
            ExprResult::Cross(_) => "crossjoin",
        }
    }

    /// Require a member-set result
    pub fn into_members(self) -> Result<MemberSetResult> {
        match self {
            ExprResult::Members(m) => Ok(m),
            ExprResult::Cross(_) => Err(Error::type_mismatch("member set", "crossjoin")),
        }
    }

    /// The constraint slots of this result
    pub fn into_slots(self) -> Vec<MemberSetResult> {
        match self {
            ExprResult::Members(m) => vec![m],
            ExprResult::Cross(slots) => slots,
        }
    }
}
