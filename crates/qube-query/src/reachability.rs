//! Reachability helper
//!
//! Answers "which members of this level have facts under that member or
//! set" with one non-empty crossjoin round trip per question, cached per
//! inner member. A query over a set stores one entry for every member of
//! the set, so later single-member questions are answered from the cache.

use crate::evaluator::ExecutionStats;
use crate::result::MemberSetResult;
use crate::text;
use qube_cache::CacheScope;
use qube_core::{Level, MemberRef, MemberSet, Result};
use qube_cube::CubeConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache-then-cube reachability lookups for one evaluation
pub struct Reachability<'a> {
    connection: &'a dyn CubeConnection,
    cache: CacheScope,
    stats: ExecutionStats,
}

impl<'a> Reachability<'a> {
    pub fn new(connection: &'a dyn CubeConnection, cache: CacheScope) -> Self {
        Self {
            connection,
            cache,
            stats: ExecutionStats::default(),
        }
    }

    pub fn connection(&self) -> &'a dyn CubeConnection {
        self.connection
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ExecutionStats {
        &mut self.stats
    }

    /// Members of `outer` with facts under `inner`
    ///
    /// For a set, level or hierarchy this is the union over its members.
    pub fn reachable(&mut self, outer: &Arc<Level>, inner: &MemberSetResult) -> Result<MemberSet> {
        if let Some(level) = inner.level() {
            if level.id() == outer.id() {
                return inner.to_member_set();
            }
        }

        match inner {
            MemberSetResult::Member(m) => self.reachable_member(outer, m),
            other => {
                let members = other.collection();
                self.reachable_set(outer, &text::result(other), &members)
            }
        }
    }

    /// Members of `outer` with facts under a single member
    pub fn reachable_member(&mut self, outer: &Arc<Level>, member: &MemberRef) -> Result<MemberSet> {
        if member.level().id() == outer.id() {
            return MemberSet::from_refs(Arc::clone(outer), [member]);
        }

        let key = self.member_query(outer, member);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let mut per_member = self.query(outer, &text::member(member), std::slice::from_ref(member))?;
        let set = per_member
            .pop()
            .map(|(_, set)| set)
            .unwrap_or_else(|| MemberSet::new(Arc::clone(outer)));
        self.cache.put(&key, &set);
        Ok(set)
    }

    /// Warm the cache for every member of `inner` in one round trip
    ///
    /// Only members without a cached entry are queried; nothing is sent when
    /// all of them are cached.
    pub fn populate_cache(&mut self, outer: &Arc<Level>, inner: &[MemberRef]) -> Result<()> {
        let levels = self.connection.cube().level_map();
        let missing: Vec<MemberRef> = inner
            .iter()
            .filter(|m| m.level().id() != outer.id())
            .filter(|m| !self.cache.contains(&self.member_query(outer, m), levels))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!(
            "Populating reachability cache for {} of {} members over {}",
            missing.len(),
            inner.len(),
            outer
        );
        self.query(outer, &text::set(&missing), &missing)?;
        Ok(())
    }

    /// Members of `level` with at least one fact
    pub fn non_empty(&mut self, level: &Arc<Level>) -> Result<MemberSet> {
        let query = text::non_empty(self.connection.cube(), level);
        if let Some(hit) = self.lookup(&query) {
            return Ok(hit);
        }

        self.stats.cube_queries += 1;
        let cells = self.connection.execute(&query)?;
        let mut set = MemberSet::new(Arc::clone(level));
        for position in &cells.rows {
            let [member] = position.as_slice() else {
                warn!(
                    "Ignoring cube row with {} members, expected 1: {}",
                    position.len(),
                    query
                );
                continue;
            };
            match level.ordinal_of(&member.unique_name) {
                Some(ordinal) => {
                    set.insert_ordinal(ordinal)?;
                }
                None => warn!("Ignoring member {} not found in level {}", member.unique_name, level),
            }
        }
        self.cache.put(&query, &set);
        Ok(set)
    }

    fn reachable_set(
        &mut self,
        outer: &Arc<Level>,
        inner_text: &str,
        members: &[MemberRef],
    ) -> Result<MemberSet> {
        if members.is_empty() {
            return Ok(MemberSet::new(Arc::clone(outer)));
        }

        let key = text::reachability(self.connection.cube(), outer, inner_text);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let cached: Option<Vec<MemberSet>> = members
            .iter()
            .map(|m| {
                let member_key = self.member_query(outer, m);
                self.lookup(&member_key)
            })
            .collect();

        let union = match cached {
            Some(sets) => MemberSet::union_all(outer, &sets)?,
            None => {
                let per_member = self.query(outer, inner_text, members)?;
                MemberSet::union_all(outer, per_member.iter().map(|(_, set)| set))?
            }
        };
        self.cache.put(&key, &union);
        Ok(union)
    }

    fn member_query(&self, outer: &Level, member: &MemberRef) -> String {
        text::reachability(self.connection.cube(), outer, &text::member(member))
    }

    fn lookup(&mut self, query: &str) -> Option<MemberSet> {
        match self.cache.get(query, self.connection.cube().level_map()) {
            Some(set) => {
                self.stats.cache_hits += 1;
                debug!("Reachability cache hit: {}", query);
                Some(set)
            }
            None => {
                self.stats.cache_misses += 1;
                debug!("Reachability cache miss: {}", query);
                None
            }
        }
    }

    /// Run one crossjoin and split it into a set per requested member
    ///
    /// Every requested member gets a cache entry, empty ones included.
    fn query(
        &mut self,
        outer: &Arc<Level>,
        inner_text: &str,
        requested: &[MemberRef],
    ) -> Result<Vec<(MemberRef, MemberSet)>> {
        let cube = self.connection.cube();
        let query = text::reachability(cube, outer, inner_text);

        self.stats.cube_queries += 1;
        let cells = self.connection.execute(&query)?;

        let index: HashMap<&str, usize> = requested
            .iter()
            .enumerate()
            .map(|(i, m)| (m.unique_name(), i))
            .collect();
        let mut per_member: Vec<(MemberRef, MemberSet)> = requested
            .iter()
            .map(|m| (m.clone(), MemberSet::new(Arc::clone(outer))))
            .collect();

        for position in &cells.rows {
            let [inner, outer_member] = position.as_slice() else {
                warn!(
                    "Ignoring cube row with {} members, expected 2: {}",
                    position.len(),
                    query
                );
                continue;
            };
            let Some(&slot) = index.get(inner.unique_name.as_str()) else {
                warn!("Ignoring unexpected member {} in cube result", inner.unique_name);
                continue;
            };
            let Some(ordinal) = outer.ordinal_of(&outer_member.unique_name) else {
                warn!(
                    "Ignoring member {} not found in level {}",
                    outer_member.unique_name, outer
                );
                continue;
            };
            per_member[slot].1.insert_ordinal(ordinal)?;
        }

        for (member, set) in &per_member {
            self.cache.put(&self.member_query(outer, member), set);
        }
        Ok(per_member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qube_cache::CubeCache;
    use qube_core::{ContainerId, CubeDefinition, HierarchyDefinition, SchemaId};
    use qube_cube::{CubeFixture, MemoryCube};

    fn toy_cube() -> MemoryCube {
        let def = CubeDefinition::new("Study")
            .hierarchy(HierarchyDefinition::flat("Subject", ["S1", "S2", "S3"]))
            .hierarchy(HierarchyDefinition::flat("Visit", ["V1", "V2"]))
            .count_distinct("SubjectCount", "[Subject].[Subject]");
        let fixture = CubeFixture::new(def)
            .fact([("Subject", "S1"), ("Visit", "V1")])
            .fact([("Subject", "S1"), ("Visit", "V2")])
            .fact([("Subject", "S2"), ("Visit", "V1")]);
        MemoryCube::from_fixture(fixture).unwrap()
    }

    fn scope(cache: &CubeCache) -> CacheScope {
        cache.scope(ContainerId::new("c1").unwrap(), SchemaId::new("study").unwrap())
    }

    fn names(set: &MemberSet) -> Vec<&str> {
        set.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_reachable_member() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let v1 = cube.cube().member("[Visit].[V1]").unwrap();
        let v2 = cube.cube().member("[Visit].[V2]").unwrap();

        assert_eq!(names(&reach.reachable_member(&subjects, &v1).unwrap()), vec!["S1", "S2"]);
        assert_eq!(names(&reach.reachable_member(&subjects, &v2).unwrap()), vec!["S1"]);
        assert_eq!(reach.stats().cube_queries, 2);
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let v1 = cube.cube().member("[Visit].[V1]").unwrap();

        let first = reach.reachable_member(&subjects, &v1).unwrap();
        let second = reach.reachable_member(&subjects, &v1).unwrap();
        assert_eq!(first, second);
        assert_eq!(cube.execute_count(), 1);
        assert_eq!(reach.stats().cache_hits, 1);
    }

    #[test]
    fn test_set_query_stores_per_member_entries() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let visits = Arc::clone(cube.cube().level("[Visit].[Visit]").unwrap());

        let all = reach
            .reachable(&subjects, &MemberSetResult::Level(Arc::clone(&visits)))
            .unwrap();
        assert_eq!(names(&all), vec!["S1", "S2"]);
        assert_eq!(cube.execute_count(), 1);

        // Single-member lookups are now answered from the cache
        let v2 = cube.cube().member("[Visit].[V2]").unwrap();
        assert_eq!(names(&reach.reachable_member(&subjects, &v2).unwrap()), vec!["S1"]);

        // So is a different set over the same members
        let set = MemberSet::full(visits);
        let again = reach.reachable(&subjects, &MemberSetResult::Set(set)).unwrap();
        assert_eq!(again, all);
        assert_eq!(cube.execute_count(), 1);
    }

    #[test]
    fn test_populate_cache_batches_missing_members() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let v1 = cube.cube().member("[Visit].[V1]").unwrap();
        let v2 = cube.cube().member("[Visit].[V2]").unwrap();

        reach.reachable_member(&subjects, &v1).unwrap();
        reach.populate_cache(&subjects, &[v1.clone(), v2.clone()]).unwrap();
        assert_eq!(cube.execute_count(), 2);
        assert!(cube.executed_queries()[1].contains("{[Visit].[V2]}"));

        // Everything cached: no further round trips
        reach.populate_cache(&subjects, &[v1, v2.clone()]).unwrap();
        reach.reachable_member(&subjects, &v2).unwrap();
        assert_eq!(cube.execute_count(), 2);
    }

    #[test]
    fn test_same_level_needs_no_cube() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let s3 = cube.cube().member("[Subject].[S3]").unwrap();
        let set = reach.reachable_member(&subjects, &s3).unwrap();
        assert_eq!(names(&set), vec!["S3"]);
        assert_eq!(cube.execute_count(), 0);
    }

    #[test]
    fn test_non_empty_population() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        assert_eq!(names(&reach.non_empty(&subjects).unwrap()), vec!["S1", "S2"]);
        assert_eq!(names(&reach.non_empty(&subjects).unwrap()), vec!["S1", "S2"]);
        assert_eq!(cube.execute_count(), 1);
        assert_eq!(reach.stats().cache_hits, 1);
    }

    #[test]
    fn test_populate_cache_requeries_stale_entries() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let v1 = cube.cube().member("[Visit].[V1]").unwrap();

        // An entry whose ordinals the live level cannot hold
        let query = text::reachability(cube.cube(), &subjects, &text::member(&v1));
        let wider = CubeDefinition::new("Study").hierarchy(HierarchyDefinition::flat(
            "Subject",
            ["S1", "S2", "S3", "S4", "S5"],
        ));
        let wider = qube_core::Cube::from_definition(&wider).unwrap();
        let wide_level = wider.level("[Subject].[Subject]").unwrap();
        scope(&cache).put(&query, &MemberSet::from_ordinals(Arc::clone(wide_level), [4]).unwrap());

        let mut reach = Reachability::new(&cube, scope(&cache));
        reach.populate_cache(&subjects, &[v1.clone()]).unwrap();
        assert_eq!(cube.execute_count(), 1);
        assert_eq!(names(&reach.reachable_member(&subjects, &v1).unwrap()), vec!["S1", "S2"]);
        assert_eq!(cube.execute_count(), 1);
    }

    #[test]
    fn test_cache_survives_reconnect() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        {
            let mut reach = Reachability::new(&cube, scope(&cache));
            let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
            let v1 = cube.cube().member("[Visit].[V1]").unwrap();
            reach.reachable_member(&subjects, &v1).unwrap();
        }

        let reconnected = cube.reconnect().unwrap();
        let mut reach = Reachability::new(&reconnected, scope(&cache));
        let subjects = Arc::clone(reconnected.cube().level("[Subject].[Subject]").unwrap());
        let v1 = reconnected.cube().member("[Visit].[V1]").unwrap();

        let set = reach.reachable_member(&subjects, &v1).unwrap();
        assert!(Arc::ptr_eq(set.level(), &subjects));
        assert_eq!(names(&set), vec!["S1", "S2"]);
        assert_eq!(reconnected.execute_count(), 0);
    }

    #[test]
    fn test_empty_set_needs_no_cube() {
        let cube = toy_cube();
        let cache = CubeCache::default();
        let mut reach = Reachability::new(&cube, scope(&cache));

        let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
        let visits = Arc::clone(cube.cube().level("[Visit].[Visit]").unwrap());
        let set = reach
            .reachable(&subjects, &MemberSetResult::Set(MemberSet::new(visits)))
            .unwrap();
        assert!(set.is_empty());
        assert_eq!(cube.execute_count(), 0);
    }
}
