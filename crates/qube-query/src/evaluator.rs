//! Count-distinct query evaluation
//!
//! Reduces a [`QubeQuery`] to a grid of distinct-member counts:
//!
//! 1. Axis and filter expressions are evaluated bottom-up into
//!    [`ExprResult`]s. Crossjoins are kept as independent constraint slots
//!    and never enumerated.
//! 2. The filter is reduced to one set over the measure level.
//! 3. Both axes are pre-warmed in the reachability cache, one round trip
//!    each, before any per-cell work.
//! 4. Each cell is the size of an intersection of reachable sets; a
//!    column's reachable set is computed once for the whole grid. Axis
//!    members on the measure level reach themselves only if they have facts.

use crate::ast::{MemberScope, MembersExpr, QubeExpr, QubeQuery};
use crate::grid::{AxisLabel, CountGrid};
use crate::reachability::Reachability;
use crate::result::{ExprResult, MemberSetResult};
use qube_cache::CacheScope;
use qube_core::{Error, Level, MemberRef, MemberSet, Result};
use qube_cube::CubeConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Query evaluation result
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub grid: CountGrid,
    pub stats: ExecutionStats,
}

/// Execution statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub cube_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cells_computed: u64,
    pub execution_time_ms: u64,
}

/// Evaluates queries against one cube connection
pub struct QueryEvaluator<'a> {
    reach: Reachability<'a>,
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(connection: &'a dyn CubeConnection, cache: CacheScope) -> Self {
        Self {
            reach: Reachability::new(connection, cache),
        }
    }

    /// Statistics accumulated so far
    pub fn stats(&self) -> &ExecutionStats {
        self.reach.stats()
    }

    /// Access the underlying reachability helper
    pub fn reachability(&mut self) -> &mut Reachability<'a> {
        &mut self.reach
    }

    /// Evaluate a query to a grid of counts
    pub fn evaluate(&mut self, query: &QubeQuery) -> Result<QueryResult> {
        let start = Instant::now();
        let measure = &query.measure_level;

        let filter = match &query.filter {
            Some(expr) => {
                let result = self.evaluate_expr(expr)?;
                self.filter(measure, result)?
            }
            None => None,
        };
        if let Some(f) = &filter {
            debug!("Filter reduced to {} of {} members", f.len(), measure.len());
        }

        let rows = self.axis_members(query.on_rows.as_ref(), measure, filter.as_ref())?;
        let columns = self.axis_members(query.on_columns.as_ref(), measure, filter.as_ref())?;

        let grid = self.grid(query, rows, columns, filter.as_ref())?;

        let stats = self.reach.stats_mut();
        stats.execution_time_ms = start.elapsed().as_millis() as u64;
        let stats = stats.clone();
        info!(
            "Evaluated {}x{} grid with {} cube queries ({} cache hits) in {}ms",
            grid.row_count(),
            grid.column_count(),
            stats.cube_queries,
            stats.cache_hits,
            stats.execution_time_ms
        );

        Ok(QueryResult { grid, stats })
    }

    /// Evaluate an expression to a member slice or a set of constraints
    pub fn evaluate_expr(&mut self, expr: &QubeExpr) -> Result<ExprResult> {
        match expr {
            QubeExpr::Members(m) => Ok(ExprResult::Members(self.evaluate_members(m)?)),
            QubeExpr::CrossJoin(args) => {
                if let Some(single) = Self::single(expr, args)? {
                    return self.evaluate_expr(single);
                }
                let mut slots = Vec::with_capacity(args.len());
                for arg in args {
                    slots.extend(self.evaluate_expr(arg)?.into_slots());
                }
                Ok(ExprResult::Cross(slots))
            }
            QubeExpr::XIntersect(args) => {
                if let Some(single) = Self::single(expr, args)? {
                    return self.evaluate_expr(single);
                }
                let mut slots: Vec<MemberSetResult> = Vec::with_capacity(args.len());
                for arg in args {
                    for slot in self.evaluate_expr(arg)?.into_slots() {
                        Self::merge_slot(&mut slots, slot)?;
                    }
                }
                Ok(ExprResult::Cross(slots))
            }
            QubeExpr::Intersect(args) | QubeExpr::Union(args) => {
                if let Some(single) = Self::single(expr, args)? {
                    return self.evaluate_expr(single);
                }
                let mut sets = Vec::with_capacity(args.len());
                for arg in args {
                    let result = self.evaluate_expr(arg)?;
                    if let ExprResult::Cross(_) = result {
                        return Err(Error::type_mismatch(
                            format!("member set argument to {}", expr.operator()),
                            result.kind(),
                        ));
                    }
                    sets.push(result.into_members()?.to_member_set()?);
                }

                let mut iter = sets.into_iter();
                let mut combined = iter
                    .next()
                    .ok_or_else(|| Error::MissingArgument(expr.operator().to_string()))?;
                for set in iter {
                    if let QubeExpr::Intersect(_) = expr {
                        combined.retain_all(&set)?;
                    } else {
                        combined.add_all(&set)?;
                    }
                }
                Ok(ExprResult::Members(MemberSetResult::Set(combined)))
            }
        }
    }

    /// Reduce a filter result to a set over `measure`
    ///
    /// `None` means unfiltered. A filter that admits every member of the
    /// measure level is also reported as unfiltered.
    pub fn filter(&mut self, measure: &Arc<Level>, filter: ExprResult) -> Result<Option<MemberSet>> {
        let slots = filter.into_slots();
        if slots.is_empty() {
            return Ok(None);
        }

        let set = self.constrain(measure, slots, true)?;
        if set.is_full() {
            debug!("Filter admits all of {}; treating as unfiltered", measure);
            return Ok(None);
        }
        Ok(Some(set))
    }

    fn single<'e>(expr: &QubeExpr, args: &'e [QubeExpr]) -> Result<Option<&'e QubeExpr>> {
        match args {
            [] => Err(Error::MissingArgument(format!(
                "{} requires at least one argument",
                expr.operator()
            ))),
            [single] => Ok(Some(single)),
            _ => Ok(None),
        }
    }

    /// Add a slot, intersecting it into an existing slot on the same level
    fn merge_slot(slots: &mut Vec<MemberSetResult>, slot: MemberSetResult) -> Result<()> {
        let existing = slot.level().and_then(|level| {
            slots
                .iter()
                .position(|s| s.level().is_some_and(|l| l.id() == level.id()))
        });
        match existing {
            Some(i) => {
                let merged = MemberSet::intersect(&slots[i].to_member_set()?, &slot.to_member_set()?)?;
                slots[i] = MemberSetResult::Set(merged);
            }
            None => slots.push(slot),
        }
        Ok(())
    }

    fn evaluate_members(&mut self, expr: &MembersExpr) -> Result<MemberSetResult> {
        let base = match &expr.scope {
            MemberScope::Member(m) => MemberSetResult::Member(m.clone()),
            MemberScope::Set(s) => MemberSetResult::Set(s.clone()),
            MemberScope::Level(l) => MemberSetResult::Level(Arc::clone(l)),
            MemberScope::Hierarchy {
                hierarchy,
                children: true,
            } => {
                let level = hierarchy.children_level().ok_or_else(|| {
                    Error::InvalidQuery(format!("Hierarchy {} has no second level", hierarchy))
                })?;
                MemberSetResult::Level(Arc::clone(level))
            }
            MemberScope::Hierarchy { hierarchy, .. } => {
                MemberSetResult::Hierarchy(Arc::clone(hierarchy))
            }
        };

        let Some(query) = &expr.members_query else {
            return Ok(base);
        };

        let nested = self.evaluate_expr(query)?;
        let narrowed = match &base {
            MemberSetResult::Level(level) => self.constrain(level, nested.into_slots(), false)?,
            other => {
                let mut set = other.to_member_set()?;
                let reachable = self.constrain(set.level(), nested.into_slots(), false)?;
                set.retain_all(&reachable)?;
                set
            }
        };
        Ok(MemberSetResult::Set(narrowed))
    }

    /// Members of `outer` satisfying every slot
    fn constrain(
        &mut self,
        outer: &Arc<Level>,
        slots: Vec<MemberSetResult>,
        hierarchy_compat: bool,
    ) -> Result<MemberSet> {
        let mut result: Option<MemberSet> = None;
        for slot in slots {
            let set = match &slot {
                // Older callers filtered on the measure's whole hierarchy
                MemberSetResult::Hierarchy(h) if hierarchy_compat && h.contains_level(outer) => {
                    MemberSet::only_for(outer, &slot.collection())
                }
                _ => self.reach.reachable(outer, &slot)?,
            };
            match &mut result {
                Some(acc) => acc.retain_all(&set)?,
                None => result = Some(set),
            }
            if result.as_ref().is_some_and(MemberSet::is_empty) {
                break;
            }
        }
        Ok(result.unwrap_or_else(|| MemberSet::full(Arc::clone(outer))))
    }

    fn axis_members(
        &mut self,
        expr: Option<&QubeExpr>,
        measure: &Arc<Level>,
        filter: Option<&MemberSet>,
    ) -> Result<Option<Vec<MemberRef>>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let result = self.evaluate_expr(expr)?;
        if let ExprResult::Cross(_) = result {
            return Err(Error::type_mismatch("member set on an axis", result.kind()));
        }
        let members = result.into_members()?.collection();

        // Axis members on the counted level are themselves subject to the filter
        let members = match filter {
            Some(f) => members
                .into_iter()
                .filter(|m| m.level().id() != measure.id() || f.contains(m))
                .collect(),
            None => members,
        };
        Ok(Some(members))
    }

    fn member_reach(
        &mut self,
        measure: &Arc<Level>,
        member: &MemberRef,
        populated: Option<&MemberSet>,
    ) -> Result<MemberSet> {
        let mut set = self.reach.reachable_member(measure, member)?;
        if let Some(populated) = populated {
            if member.level().id() == measure.id() {
                set.retain_all(populated)?;
            }
        }
        Ok(set)
    }

    fn count(set: &MemberSet, filter: Option<&MemberSet>) -> Result<u64> {
        match filter {
            Some(f) => MemberSet::count_intersect(set, f),
            None => Ok(set.len() as u64),
        }
    }

    fn grid(
        &mut self,
        query: &QubeQuery,
        rows: Option<Vec<MemberRef>>,
        columns: Option<Vec<MemberRef>>,
        filter: Option<&MemberSet>,
    ) -> Result<CountGrid> {
        let measure = &query.measure_level;
        let empty_filter = filter.is_some_and(MemberSet::is_empty);

        if !empty_filter {
            for axis in [&rows, &columns].into_iter().flatten() {
                self.reach.populate_cache(measure, axis)?;
            }
        }

        // Counted-level members have no crossjoin to weed out those without facts
        let on_measure = [&rows, &columns]
            .into_iter()
            .flatten()
            .flatten()
            .any(|m| m.level().id() == measure.id());
        let no_axes = rows.is_none() && columns.is_none();
        let populated = if (on_measure || no_axes) && !empty_filter {
            Some(self.reach.non_empty(measure)?)
        } else {
            None
        };
        let populated = populated.as_ref();

        let label = || vec![AxisLabel::measure(query.measure_label())];

        let (row_labels, column_labels, counts) = match (rows, columns) {
            (None, None) => {
                let count = match (populated, filter) {
                    (Some(p), Some(f)) => MemberSet::count_intersect(p, f)?,
                    (Some(p), None) => p.len() as u64,
                    (None, _) => 0,
                };
                (label(), label(), vec![count])
            }
            (Some(members), None) | (None, Some(members)) => {
                let mut counts = Vec::with_capacity(members.len());
                for member in &members {
                    counts.push(if empty_filter {
                        0
                    } else {
                        Self::count(&self.member_reach(measure, member, populated)?, filter)?
                    });
                }
                self.reach.stats_mut().cells_computed += counts.len() as u64;
                if query.on_rows.is_some() {
                    (labels(&members), label(), counts)
                } else {
                    (label(), labels(&members), counts)
                }
            }
            (Some(rows), Some(columns)) => {
                let mut counts = Vec::with_capacity(rows.len() * columns.len());
                let mut memo: Vec<Option<MemberSet>> = vec![None; columns.len()];
                for row in &rows {
                    if empty_filter {
                        counts.extend(std::iter::repeat_n(0, columns.len()));
                        continue;
                    }
                    let row_set = self.member_reach(measure, row, populated)?;
                    for (c, column) in columns.iter().enumerate() {
                        if memo[c].is_none() {
                            memo[c] = Some(self.member_reach(measure, column, populated)?);
                        }
                        let column_set = memo[c]
                            .as_ref()
                            .ok_or_else(|| Error::Internal("Column memo not populated".to_string()))?;
                        counts.push(match filter {
                            Some(f) => MemberSet::count_intersect3(&row_set, column_set, f)?,
                            None => MemberSet::count_intersect(&row_set, column_set)?,
                        });
                    }
                }
                self.reach.stats_mut().cells_computed += counts.len() as u64;
                (labels(&rows), labels(&columns), counts)
            }
        };

        CountGrid::new(row_labels, column_labels, counts)
    }
}

fn labels(members: &[MemberRef]) -> Vec<AxisLabel> {
    members.iter().map(AxisLabel::from).collect()
}

/// Evaluate one query on a connection, with a cache scoped to the caller
pub fn evaluate(
    connection: &dyn CubeConnection,
    cache: CacheScope,
    query: &QubeQuery,
) -> Result<QueryResult> {
    QueryEvaluator::new(connection, cache).evaluate(query)
}
