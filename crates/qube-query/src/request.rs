//! JSON query requests
//!
//! A [`QueryRequest`] names hierarchies, levels and members by unique name.
//! [`QueryRequest::resolve`] looks every name up in a cube's metadata and
//! produces the [`QubeQuery`] AST the evaluator runs.

use crate::ast::{MemberScope, MembersExpr, QubeExpr, QubeQuery};
use qube_core::{Cube, Error, Level, MemberRef, MemberSet, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Expression operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Members,
    CrossJoin,
    XIntersect,
    Intersect,
    Union,
}

/// A count-distinct query as sent by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Unique name of the level to count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_distinct_level: Option<String>,

    /// Name of a count-distinct measure; used when no level is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_distinct_measure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_rows: Option<ExprRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_columns: Option<ExprRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ExprRequest>,
}

/// One expression node of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExprRequest {
    pub operator: Operator,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ExprRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members_query: Option<Box<ExprRequest>>,

    /// List the children of this member; the hierarchy's all-member selects
    /// its second level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_member: Option<String>,
}

impl ExprRequest {
    fn new(operator: Operator) -> Self {
        Self {
            operator,
            arguments: Vec::new(),
            hierarchy: None,
            level: None,
            members: None,
            members_query: None,
            children_member: None,
        }
    }

    /// `MEMBERS` of a level
    pub fn level<S: Into<String>>(level: S) -> Self {
        Self {
            level: Some(level.into()),
            ..Self::new(Operator::Members)
        }
    }

    /// `MEMBERS` of a hierarchy
    pub fn hierarchy<S: Into<String>>(hierarchy: S) -> Self {
        Self {
            hierarchy: Some(hierarchy.into()),
            ..Self::new(Operator::Members)
        }
    }

    /// `MEMBERS` from an explicit list
    pub fn members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: Some(members.into_iter().map(Into::into).collect()),
            ..Self::new(Operator::Members)
        }
    }

    /// An interior node
    pub fn op(operator: Operator, arguments: Vec<ExprRequest>) -> Self {
        Self {
            arguments,
            ..Self::new(operator)
        }
    }

    /// Builder: attach a nested members query
    pub fn members_query(mut self, query: ExprRequest) -> Self {
        self.members_query = Some(Box::new(query));
        self
    }

    /// Resolve names against cube metadata
    pub fn resolve(&self, cube: &Cube) -> Result<QubeExpr> {
        let node: fn(Vec<QubeExpr>) -> QubeExpr = match self.operator {
            Operator::Members => return self.resolve_members(cube),
            Operator::CrossJoin => QubeExpr::CrossJoin,
            Operator::XIntersect => QubeExpr::XIntersect,
            Operator::Intersect => QubeExpr::Intersect,
            Operator::Union => QubeExpr::Union,
        };
        if self.arguments.is_empty() {
            return Err(Error::MissingArgument(format!(
                "{:?} requires at least one argument",
                self.operator
            )));
        }
        let args = self
            .arguments
            .iter()
            .map(|a| a.resolve(cube))
            .collect::<Result<Vec<_>>>()?;
        Ok(node(args))
    }

    fn resolve_members(&self, cube: &Cube) -> Result<QubeExpr> {
        let scope = self.resolve_scope(cube)?;
        let members_query = match &self.members_query {
            Some(q) => Some(Box::new(q.resolve(cube)?)),
            None => None,
        };
        Ok(QubeExpr::Members(MembersExpr {
            scope,
            members_query,
        }))
    }

    fn resolve_level(&self, cube: &Cube, name: &str) -> Result<Arc<Level>> {
        if let Ok(level) = cube.level(name) {
            return Ok(Arc::clone(level));
        }
        // A caption is accepted when the hierarchy is given
        let hierarchy = match &self.hierarchy {
            Some(h) => cube.hierarchy(h)?,
            None => return Err(Error::LevelNotFound(name.to_string())),
        };
        hierarchy
            .level_by_name(name)
            .cloned()
            .ok_or_else(|| Error::LevelNotFound(name.to_string()))
    }

    fn resolve_scope(&self, cube: &Cube) -> Result<MemberScope> {
        let level = match &self.level {
            Some(name) => Some(self.resolve_level(cube, name)?),
            None => None,
        };

        if let Some(names) = &self.members {
            let mut members = Vec::with_capacity(names.len());
            for name in names {
                members.push(resolve_member(cube, level.as_ref(), name)?);
            }
            return match (members.as_slice(), level) {
                ([single], None) => Ok(MemberScope::Member(single.clone())),
                ([], None) => Err(Error::MissingArgument(
                    "an empty member list needs a level".to_string(),
                )),
                (_, Some(level)) => Ok(MemberScope::Set(MemberSet::from_refs(level, &members)?)),
                ([first, ..], None) => Ok(MemberScope::Set(MemberSet::from_refs(
                    Arc::clone(first.level()),
                    &members,
                )?)),
            };
        }

        if let Some(name) = &self.children_member {
            let parent = cube.member(name)?;
            let hierarchy = cube.hierarchy_of(parent.level())?;
            if parent.level().is_all() {
                return Ok(MemberScope::Hierarchy {
                    hierarchy: Arc::clone(hierarchy),
                    children: true,
                });
            }
            let set = match hierarchy.level(parent.level().depth() + 1) {
                Some(child_level) => {
                    let children: Vec<MemberRef> = MemberSet::full(Arc::clone(child_level))
                        .refs()
                        .filter(|m| m.member().parent() == Some(parent.ordinal()))
                        .collect();
                    MemberSet::from_refs(Arc::clone(child_level), &children)?
                }
                None => MemberSet::new(Arc::clone(parent.level())),
            };
            return Ok(MemberScope::Set(set));
        }

        if let Some(level) = level {
            return Ok(MemberScope::Level(level));
        }

        if let Some(name) = &self.hierarchy {
            return Ok(MemberScope::Hierarchy {
                hierarchy: Arc::clone(cube.hierarchy(name)?),
                children: false,
            });
        }

        Err(Error::MissingArgument(
            "MEMBERS needs members, childrenMember, level or hierarchy".to_string(),
        ))
    }
}

fn resolve_member(cube: &Cube, level: Option<&Arc<Level>>, name: &str) -> Result<MemberRef> {
    match (cube.member(name), level) {
        (Ok(member), _) => Ok(member),
        (Err(e), None) => Err(e),
        (Err(_), Some(level)) => {
            let found = level
                .find(name)
                .ok_or_else(|| Error::MemberNotFound(name.to_string()))?;
            MemberRef::new(Arc::clone(level), found.ordinal())
        }
    }
}

impl QueryRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Resolve the request against cube metadata
    ///
    /// The counted level comes from `countDistinctLevel`, else from the named
    /// measure, else from the cube's first count-distinct measure.
    pub fn resolve(&self, cube: &Cube) -> Result<QubeQuery> {
        let (measure_level, measure_name) = match (&self.count_distinct_level, &self.count_distinct_measure) {
            (Some(level), _) => (Arc::clone(cube.level(level)?), None),
            (None, Some(name)) => {
                let measure = cube.measure(name)?;
                let level = measure
                    .count_distinct_level()
                    .ok_or(Error::NoCountDistinctMeasure)?;
                (Arc::clone(level), Some(measure.unique_name().to_string()))
            }
            (None, None) => {
                let measure = cube
                    .measures()
                    .iter()
                    .find(|m| m.count_distinct_level().is_some())
                    .ok_or(Error::NoCountDistinctMeasure)?;
                let level = measure
                    .count_distinct_level()
                    .ok_or(Error::NoCountDistinctMeasure)?;
                (Arc::clone(level), Some(measure.unique_name().to_string()))
            }
        };

        let resolve = |expr: &Option<ExprRequest>| expr.as_ref().map(|e| e.resolve(cube)).transpose();
        Ok(QubeQuery {
            measure_level,
            measure_name,
            on_rows: resolve(&self.on_rows)?,
            on_columns: resolve(&self.on_columns)?,
            filter: resolve(&self.filter)?,
        })
    }
}
