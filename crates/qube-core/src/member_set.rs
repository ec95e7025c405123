//! Member sets
//!
//! A [`MemberSet`] is a bitmap of member ordinals over a single level.
//! Membership, intersection, union and counting all work on ordinals, never
//! on member names.
//!
//! # Level invariant
//!
//! Every member of a set belongs to the set's level. Every operation that
//! combines two sets checks that both sets share a level and fails with
//! [`Error::LevelMismatch`] otherwise; ordinals from different levels mean
//! nothing to each other. Callers holding members that may span a whole
//! hierarchy must first project them with [`MemberSet::only_for`].

use crate::error::{Error, Result};
use crate::id::Ordinal;
use crate::metadata::{Level, LevelMap, Member, MemberRef};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A set of members of one level
#[derive(Clone)]
pub struct MemberSet {
    level: Arc<Level>,
    ordinals: RoaringBitmap,
}

impl MemberSet {
    /// Create an empty set over a level
    pub fn new(level: Arc<Level>) -> Self {
        Self {
            level,
            ordinals: RoaringBitmap::new(),
        }
    }

    /// Create a set holding every member of a level
    pub fn full(level: Arc<Level>) -> Self {
        let ordinals = (0..level.len() as Ordinal).collect();
        Self { level, ordinals }
    }

    /// Build a set from member handles, all of which must belong to `level`
    pub fn from_refs<'a, I>(level: Arc<Level>, members: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a MemberRef>,
    {
        let mut set = Self::new(level);
        for member in members {
            set.insert(member)?;
        }
        Ok(set)
    }

    /// Build a set from raw ordinals, range-checked against the level
    pub fn from_ordinals<I>(level: Arc<Level>, ordinals: I) -> Result<Self>
    where
        I: IntoIterator<Item = Ordinal>,
    {
        let mut set = Self::new(level);
        for ordinal in ordinals {
            set.insert_ordinal(ordinal)?;
        }
        Ok(set)
    }

    /// Project members of mixed origin down to one level
    ///
    /// Members of other levels are dropped. Used when a constraint targets a
    /// whole hierarchy but only one of its levels is meaningful.
    pub fn only_for<'a, I>(level: &Arc<Level>, members: I) -> Self
    where
        I: IntoIterator<Item = &'a MemberRef>,
    {
        let ordinals = members
            .into_iter()
            .filter(|m| m.level().id() == level.id())
            .map(|m| m.ordinal())
            .collect();
        Self {
            level: Arc::clone(level),
            ordinals,
        }
    }

    pub fn level(&self) -> &Arc<Level> {
        &self.level
    }

    pub fn len(&self) -> usize {
        self.ordinals.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Whether the set holds every member of its level
    pub fn is_full(&self) -> bool {
        self.len() == self.level.len()
    }

    /// Membership test; members of other levels are never contained
    pub fn contains(&self, member: &MemberRef) -> bool {
        member.level().id() == self.level.id() && self.ordinals.contains(member.ordinal())
    }

    pub fn contains_ordinal(&self, ordinal: Ordinal) -> bool {
        self.ordinals.contains(ordinal)
    }

    /// Add a member; returns whether it was newly inserted
    pub fn insert(&mut self, member: &MemberRef) -> Result<bool> {
        if member.level().id() != self.level.id() {
            return Err(Error::level_mismatch(
                self.level.unique_name(),
                member.level().unique_name(),
            ));
        }
        Ok(self.ordinals.insert(member.ordinal()))
    }

    /// Add a member by ordinal; returns whether it was newly inserted
    pub fn insert_ordinal(&mut self, ordinal: Ordinal) -> Result<bool> {
        if ordinal as usize >= self.level.len() {
            return Err(Error::MemberNotFound(format!(
                "ordinal {} in level {}",
                ordinal,
                self.level.unique_name()
            )));
        }
        Ok(self.ordinals.insert(ordinal))
    }

    /// Remove a member; returns whether it was present
    pub fn remove(&mut self, member: &MemberRef) -> bool {
        member.level().id() == self.level.id() && self.ordinals.remove(member.ordinal())
    }

    /// Members in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = &Member> + '_ {
        self.ordinals
            .iter()
            .filter_map(move |ordinal| self.level.member(ordinal))
    }

    /// Member handles in ordinal order
    pub fn refs(&self) -> impl Iterator<Item = MemberRef> + '_ {
        self.ordinals
            .iter()
            .filter_map(move |ordinal| MemberRef::new(Arc::clone(&self.level), ordinal).ok())
    }

    /// The raw ordinal bitmap
    pub fn ordinals(&self) -> &RoaringBitmap {
        &self.ordinals
    }

    /// Keep only the members also present in `other`
    pub fn retain_all(&mut self, other: &MemberSet) -> Result<()> {
        self.check_level(other)?;
        self.ordinals &= &other.ordinals;
        Ok(())
    }

    /// Add every member of `other`
    pub fn add_all(&mut self, other: &MemberSet) -> Result<()> {
        self.check_level(other)?;
        self.ordinals |= &other.ordinals;
        Ok(())
    }

    /// Whether every member of this set is in `other`
    pub fn is_subset(&self, other: &MemberSet) -> Result<bool> {
        self.check_level(other)?;
        Ok(self.ordinals.is_subset(&other.ordinals))
    }

    /// Intersection of two sets over the same level
    pub fn intersect(a: &MemberSet, b: &MemberSet) -> Result<MemberSet> {
        a.check_level(b)?;
        Ok(Self {
            level: Arc::clone(&a.level),
            ordinals: &a.ordinals & &b.ordinals,
        })
    }

    /// Union of two sets over the same level
    pub fn union(a: &MemberSet, b: &MemberSet) -> Result<MemberSet> {
        a.check_level(b)?;
        Ok(Self {
            level: Arc::clone(&a.level),
            ordinals: &a.ordinals | &b.ordinals,
        })
    }

    /// Union of any number of sets over `level`
    pub fn union_all<'a, I>(level: &Arc<Level>, sets: I) -> Result<MemberSet>
    where
        I: IntoIterator<Item = &'a MemberSet>,
    {
        let mut result = Self::new(Arc::clone(level));
        for set in sets {
            result.add_all(set)?;
        }
        Ok(result)
    }

    /// `|a ∩ b|` without materializing the intersection
    pub fn count_intersect(a: &MemberSet, b: &MemberSet) -> Result<u64> {
        a.check_level(b)?;
        Ok(a.ordinals.intersection_len(&b.ordinals))
    }

    /// `|a ∩ b ∩ c|`
    pub fn count_intersect3(a: &MemberSet, b: &MemberSet, c: &MemberSet) -> Result<u64> {
        a.check_level(b)?;
        a.check_level(c)?;
        let ab = &a.ordinals & &b.ordinals;
        Ok(ab.intersection_len(&c.ordinals))
    }

    /// Strip the live level reference for storage outside this connection
    pub fn detach(&self) -> DetachedMemberSet {
        DetachedMemberSet {
            level: self.level.unique_name().to_string(),
            ordinals: self.ordinals.clone(),
        }
    }

    fn check_level(&self, other: &MemberSet) -> Result<()> {
        if self.level.id() == other.level.id() {
            Ok(())
        } else {
            Err(Error::level_mismatch(
                self.level.unique_name(),
                other.level.unique_name(),
            ))
        }
    }
}

impl PartialEq for MemberSet {
    fn eq(&self, other: &Self) -> bool {
        self.level.id() == other.level.id() && self.ordinals == other.ordinals
    }
}

impl fmt::Debug for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberSet")
            .field("level", &self.level.unique_name())
            .field(
                "members",
                &self.iter().map(|m| m.unique_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A member set stripped of connection-scoped references
///
/// Holds only the level unique name and member ordinals, so it can outlive
/// the cube connection that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachedMemberSet {
    level: String,
    ordinals: RoaringBitmap,
}

impl DetachedMemberSet {
    pub fn level_unique_name(&self) -> &str {
        &self.level
    }

    pub fn len(&self) -> usize {
        self.ordinals.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Re-resolve against the level map of a live connection
    pub fn attach(&self, levels: &LevelMap) -> Result<MemberSet> {
        let level = self.live_level(levels)?;
        Ok(MemberSet {
            level: Arc::clone(level),
            ordinals: self.ordinals.clone(),
        })
    }

    /// Whether [`attach`](Self::attach) would succeed, without copying the bitmap
    pub fn attaches_to(&self, levels: &LevelMap) -> bool {
        self.live_level(levels).is_ok()
    }

    fn live_level<'a>(&self, levels: &'a LevelMap) -> Result<&'a Arc<Level>> {
        let level = levels
            .get(&self.level)
            .ok_or_else(|| Error::LevelNotFound(self.level.clone()))?;
        if let Some(max) = self.ordinals.max() {
            if max as usize >= level.len() {
                return Err(Error::InvalidMetadata(format!(
                    "Ordinal {} out of range for level {} with {} members",
                    max,
                    self.level,
                    level.len()
                )));
            }
        }
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CubeDefinition, HierarchyDefinition};
    use crate::metadata::Cube;
    use proptest::prelude::*;

    const POPULATION: usize = 48;

    fn cube() -> Cube {
        let subjects: Vec<String> = (0..POPULATION).map(|i| format!("S{}", i)).collect();
        let def = CubeDefinition::new("Study")
            .hierarchy(HierarchyDefinition::flat("Subject", subjects))
            .hierarchy(HierarchyDefinition::flat("Visit", ["V1", "V2"]));
        Cube::from_definition(&def).unwrap()
    }

    fn subjects(cube: &Cube) -> Arc<Level> {
        Arc::clone(cube.level("[Subject].[Subject]").unwrap())
    }

    fn set_of(level: &Arc<Level>, ordinals: &[Ordinal]) -> MemberSet {
        MemberSet::from_ordinals(Arc::clone(level), ordinals.iter().copied()).unwrap()
    }

    #[test]
    fn test_basic_operations() {
        let cube = cube();
        let level = subjects(&cube);
        let a = set_of(&level, &[0, 1, 2]);
        let b = set_of(&level, &[2, 3]);

        assert_eq!(MemberSet::intersect(&a, &b).unwrap(), set_of(&level, &[2]));
        assert_eq!(
            MemberSet::union(&a, &b).unwrap(),
            set_of(&level, &[0, 1, 2, 3])
        );
        assert_eq!(MemberSet::count_intersect(&a, &b).unwrap(), 1);

        let c = set_of(&level, &[2, 4]);
        assert_eq!(MemberSet::count_intersect3(&a, &b, &c).unwrap(), 1);

        let mut d = a.clone();
        d.retain_all(&b).unwrap();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_membership_by_ordinal() {
        let cube = cube();
        let level = subjects(&cube);
        let set = set_of(&level, &[5]);

        let s5 = cube.member("[Subject].[S5]").unwrap();
        let s6 = cube.member("[Subject].[S6]").unwrap();
        let v1 = cube.member("[Visit].[V1]").unwrap();
        assert!(set.contains(&s5));
        assert!(!set.contains(&s6));
        // Same ordinal, different level
        assert_eq!(v1.ordinal(), 0);
        assert!(!set_of(&level, &[0]).contains(&v1));
    }

    #[test]
    fn test_level_mismatch() {
        let cube = cube();
        let subjects = MemberSet::full(subjects(&cube));
        let visits = MemberSet::full(Arc::clone(cube.level("[Visit].[Visit]").unwrap()));

        assert!(matches!(
            MemberSet::intersect(&subjects, &visits),
            Err(Error::LevelMismatch { .. })
        ));
        assert!(MemberSet::count_intersect(&subjects, &visits).is_err());

        let mut s = subjects.clone();
        let v1 = cube.member("[Visit].[V1]").unwrap();
        assert!(s.insert(&v1).is_err());
    }

    #[test]
    fn test_only_for_projects_hierarchy_members() {
        let cube = cube();
        let level = subjects(&cube);
        let hierarchy = cube.hierarchy("Subject").unwrap();

        let mixed: Vec<MemberRef> = hierarchy
            .levels()
            .iter()
            .flat_map(|l| (0..l.len() as Ordinal).map(move |o| MemberRef::new(Arc::clone(l), o)))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(mixed.len(), POPULATION + 1);

        let projected = MemberSet::only_for(&level, &mixed);
        assert_eq!(projected.len(), POPULATION);
        assert!(projected.is_full());
    }

    #[test]
    fn test_iteration_is_in_ordinal_order() {
        let cube = cube();
        let level = subjects(&cube);
        let set = set_of(&level, &[7, 1, 3]);
        let names: Vec<&str> = set.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["S1", "S3", "S7"]);
    }

    #[test]
    fn test_attach_rejects_unknown_level() {
        let cube = cube();
        let detached = set_of(&subjects(&cube), &[1]).detach();

        let other = Cube::from_definition(
            &CubeDefinition::new("Other").hierarchy(HierarchyDefinition::flat("Visit", ["V1"])),
        )
        .unwrap();
        assert!(matches!(
            detached.attach(other.level_map()),
            Err(Error::LevelNotFound(_))
        ));
    }

    #[test]
    fn test_attach_rejects_stale_ordinals() {
        let cube = cube();
        let detached = set_of(&subjects(&cube), &[40]).detach();

        let smaller = Cube::from_definition(
            &CubeDefinition::new("Study").hierarchy(HierarchyDefinition::flat("Subject", ["S0"])),
        )
        .unwrap();
        assert!(detached.attach(smaller.level_map()).is_err());
        assert!(!detached.attaches_to(smaller.level_map()));
        assert!(detached.attaches_to(cube.level_map()));
    }

    #[test]
    fn test_detached_serde() {
        let cube = cube();
        let detached = set_of(&subjects(&cube), &[1, 2, 30]).detach();
        let json = serde_json::to_string(&detached).unwrap();
        let back: DetachedMemberSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detached);
    }

    fn ordinal_vec() -> impl Strategy<Value = Vec<Ordinal>> {
        proptest::collection::vec(0..POPULATION as Ordinal, 0..POPULATION)
    }

    proptest! {
        #[test]
        fn prop_intersection_is_subset(a in ordinal_vec(), b in ordinal_vec()) {
            let cube = cube();
            let level = subjects(&cube);
            let s = set_of(&level, &a);
            let t = set_of(&level, &b);
            let i = MemberSet::intersect(&s, &t).unwrap();
            prop_assert!(i.is_subset(&s).unwrap());
            prop_assert!(i.is_subset(&t).unwrap());
            prop_assert_eq!(i.len() as u64, MemberSet::count_intersect(&s, &t).unwrap());
        }

        #[test]
        fn prop_union_size(a in ordinal_vec(), b in ordinal_vec()) {
            let cube = cube();
            let level = subjects(&cube);
            let s = set_of(&level, &a);
            let t = set_of(&level, &b);
            let u = MemberSet::union(&s, &t).unwrap();
            let i = MemberSet::intersect(&s, &t).unwrap();
            prop_assert_eq!(u.len(), s.len() + t.len() - i.len());
        }

        #[test]
        fn prop_detach_attach_roundtrip(a in ordinal_vec()) {
            let cube = cube();
            let s = set_of(&subjects(&cube), &a);
            let attached = s.detach().attach(cube.level_map()).unwrap();
            prop_assert_eq!(&attached, &s);
            let before: Vec<(&str, Ordinal)> = s.iter().map(|m| (m.unique_name(), m.ordinal())).collect();
            let after: Vec<(&str, Ordinal)> = attached.iter().map(|m| (m.unique_name(), m.ordinal())).collect();
            prop_assert_eq!(before, after);
        }
    }
}
