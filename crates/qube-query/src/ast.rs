//! Resolved query AST
//!
//! Every node carries exactly the fields its operator needs and refers to
//! cube metadata directly. An AST is built against one cube connection and
//! lives no longer than one evaluation.

use qube_core::{Hierarchy, Level, MemberRef, MemberSet};
use std::sync::Arc;

/// A count-distinct query
#[derive(Debug, Clone)]
pub struct QubeQuery {
    /// The level whose distinct members are counted
    pub measure_level: Arc<Level>,

    /// Unique name of the measure the count is reported under, if any
    pub measure_name: Option<String>,

    pub on_rows: Option<QubeExpr>,
    pub on_columns: Option<QubeExpr>,
    pub filter: Option<QubeExpr>,
}

impl QubeQuery {
    /// A query counting members of `measure_level` with no axes or filter
    pub fn new(measure_level: Arc<Level>) -> Self {
        Self {
            measure_level,
            measure_name: None,
            on_rows: None,
            on_columns: None,
            filter: None,
        }
    }

    pub fn measure_name<S: Into<String>>(mut self, name: S) -> Self {
        self.measure_name = Some(name.into());
        self
    }

    pub fn on_rows(mut self, expr: QubeExpr) -> Self {
        self.on_rows = Some(expr);
        self
    }

    pub fn on_columns(mut self, expr: QubeExpr) -> Self {
        self.on_columns = Some(expr);
        self
    }

    pub fn filter(mut self, expr: QubeExpr) -> Self {
        self.filter = Some(expr);
        self
    }

    /// Label of the count: the measure name, or the level when there is none
    pub fn measure_label(&self) -> &str {
        self.measure_name
            .as_deref()
            .unwrap_or_else(|| self.measure_level.unique_name())
    }
}

/// Expression nodes
#[derive(Debug, Clone)]
pub enum QubeExpr {
    /// A slice of members, optionally narrowed by a nested query
    Members(MembersExpr),
    /// Independent constraints, one slot per argument
    CrossJoin(Vec<QubeExpr>),
    /// Like `CrossJoin`, merging same-level slots by intersection
    XIntersect(Vec<QubeExpr>),
    /// Intersection of concrete member sets
    Intersect(Vec<QubeExpr>),
    /// Union of concrete member sets
    Union(Vec<QubeExpr>),
}

impl QubeExpr {
    /// Name of the operator, as written in requests
    pub fn operator(&self) -> &'static str {
        match self {
            QubeExpr::Members(_) => "MEMBERS",
            QubeExpr::CrossJoin(_) => "CROSSJOIN",
            QubeExpr::XIntersect(_) => "XINTERSECT",
            QubeExpr::Intersect(_) => "INTERSECT",
            QubeExpr::Union(_) => "UNION",
        }
    }

    pub fn member(member: MemberRef) -> Self {
        QubeExpr::Members(MembersExpr::new(MemberScope::Member(member)))
    }

    pub fn set(set: MemberSet) -> Self {
        QubeExpr::Members(MembersExpr::new(MemberScope::Set(set)))
    }

    pub fn level(level: Arc<Level>) -> Self {
        QubeExpr::Members(MembersExpr::new(MemberScope::Level(level)))
    }

    pub fn hierarchy(hierarchy: Arc<Hierarchy>) -> Self {
        QubeExpr::Members(MembersExpr::new(MemberScope::Hierarchy {
            hierarchy,
            children: false,
        }))
    }

    /// Immediate children of a hierarchy's root, i.e. its second level
    pub fn children(hierarchy: Arc<Hierarchy>) -> Self {
        QubeExpr::Members(MembersExpr::new(MemberScope::Hierarchy {
            hierarchy,
            children: true,
        }))
    }

    /// Builder: narrow a `Members` node to members reachable from `query`
    ///
    /// Other nodes are returned unchanged.
    pub fn members_query(self, query: QubeExpr) -> Self {
        match self {
            QubeExpr::Members(m) => QubeExpr::Members(MembersExpr {
                members_query: Some(Box::new(query)),
                ..m
            }),
            other => other,
        }
    }
}

/// A `MEMBERS` node
#[derive(Debug, Clone)]
pub struct MembersExpr {
    pub scope: MemberScope,
    pub members_query: Option<Box<QubeExpr>>,
}

impl MembersExpr {
    pub fn new(scope: MemberScope) -> Self {
        Self {
            scope,
            members_query: None,
        }
    }
}

/// The base slice of a `MEMBERS` node
#[derive(Debug, Clone)]
pub enum MemberScope {
    Member(MemberRef),
    Set(MemberSet),
    Level(Arc<Level>),
    Hierarchy {
        hierarchy: Arc<Hierarchy>,
        /// Restrict to the root's immediate children
        children: bool,
    },
}
