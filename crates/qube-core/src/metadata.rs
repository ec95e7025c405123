//! Cube metadata for Qube
//!
//! Indexes a [`CubeDefinition`] into connection-scoped metadata: hierarchies,
//! levels and members with explicitly assigned ordinals. Cube engines do not
//! guarantee member ordinals, so they are assigned here, once per cube
//! instance, by position in each level's member list.

use crate::definition::CubeDefinition;
use crate::error::{Error, Result};
use crate::id::{LevelId, Ordinal};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Caption of the synthetic top level of a hierarchy
pub const ALL_LEVEL_NAME: &str = "(All)";

/// Caption of the single member of the `(All)` level
pub const ALL_MEMBER_NAME: &str = "All";

/// Wrap a name in MDX brackets, escaping any closing bracket
pub fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// A member of a level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    unique_name: String,
    name: String,
    ordinal: Ordinal,
    parent: Option<Ordinal>,
}

impl Member {
    /// Unique name, e.g. `[Subject].[S1]`
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Caption
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the owning level
    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    /// Ordinal of the parent member in the level directly above
    pub fn parent(&self) -> Option<Ordinal> {
        self.parent
    }
}

/// A level of a hierarchy, owning its members in ordinal order
#[derive(Debug)]
pub struct Level {
    id: LevelId,
    unique_name: String,
    name: String,
    hierarchy: String,
    depth: usize,
    is_all: bool,
    members: Vec<Member>,
    index: HashMap<String, Ordinal>,
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Level {}

impl Level {
    fn build(
        hierarchy: &str,
        unique_name: String,
        name: &str,
        depth: usize,
        is_all: bool,
        specs: Vec<(String, String, Option<Ordinal>)>,
    ) -> Result<Self> {
        let mut members = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());

        for (ordinal, (member_unique, member_name, parent)) in specs.into_iter().enumerate() {
            let ordinal = Ordinal::try_from(ordinal).map_err(|_| {
                Error::InvalidMetadata(format!("Level {} has too many members", unique_name))
            })?;
            if index.insert(member_unique.clone(), ordinal).is_some() {
                return Err(Error::InvalidMetadata(format!(
                    "Duplicate member {} in level {}",
                    member_unique, unique_name
                )));
            }
            members.push(Member {
                unique_name: member_unique,
                name: member_name,
                ordinal,
                parent,
            });
        }

        Ok(Self {
            id: LevelId::from_unique_name(&unique_name),
            unique_name,
            name: name.to_string(),
            hierarchy: hierarchy.to_string(),
            depth,
            is_all,
            members,
            index,
        })
    }

    pub fn id(&self) -> LevelId {
        self.id
    }

    /// Unique name, e.g. `[Subject].[Subject]`
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique name of the owning hierarchy
    pub fn hierarchy_name(&self) -> &str {
        &self.hierarchy
    }

    /// Depth within the hierarchy; the `(All)` level has depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this is the synthetic `(All)` level
    pub fn is_all(&self) -> bool {
        self.is_all
    }

    /// Members in ordinal order
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Number of members, i.e. the population size of this level
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Get a member by ordinal
    pub fn member(&self, ordinal: Ordinal) -> Option<&Member> {
        self.members.get(ordinal as usize)
    }

    /// Look up a member's ordinal by unique name
    pub fn ordinal_of(&self, unique_name: &str) -> Option<Ordinal> {
        self.index.get(unique_name).copied()
    }

    /// Look up a member by unique name or, failing that, by caption
    pub fn find(&self, name: &str) -> Option<&Member> {
        match self.ordinal_of(name) {
            Some(ordinal) => self.member(ordinal),
            None => self.members.iter().find(|m| m.name == name),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

/// A hierarchy: an ordered list of levels from the top down
#[derive(Debug)]
pub struct Hierarchy {
    unique_name: String,
    name: String,
    levels: Vec<Arc<Level>>,
}

impl Hierarchy {
    /// Unique name, e.g. `[Subject]`
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[Arc<Level>] {
        &self.levels
    }

    /// Get a level by depth
    pub fn level(&self, depth: usize) -> Option<&Arc<Level>> {
        self.levels.get(depth)
    }

    /// Get a level by caption or unique name
    pub fn level_by_name(&self, name: &str) -> Option<&Arc<Level>> {
        self.levels
            .iter()
            .find(|l| l.unique_name == name || l.name == name)
    }

    /// The level that holds the immediate children of the hierarchy's root,
    /// i.e. the second level
    pub fn children_level(&self) -> Option<&Arc<Level>> {
        self.levels.get(1)
    }

    /// The deepest level
    pub fn leaf_level(&self) -> Option<&Arc<Level>> {
        self.levels.last()
    }

    /// Whether the given level belongs to this hierarchy
    pub fn contains_level(&self, level: &Level) -> bool {
        level.hierarchy == self.unique_name
    }

    /// Total number of members across all levels
    pub fn member_count(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}

/// A cheap handle to one member: its level plus ordinal
#[derive(Debug, Clone)]
pub struct MemberRef {
    level: Arc<Level>,
    ordinal: Ordinal,
}

impl MemberRef {
    /// Create a member handle, checking the ordinal is in range
    pub fn new(level: Arc<Level>, ordinal: Ordinal) -> Result<Self> {
        if (ordinal as usize) < level.len() {
            Ok(Self { level, ordinal })
        } else {
            Err(Error::MemberNotFound(format!(
                "ordinal {} in level {}",
                ordinal, level.unique_name
            )))
        }
    }

    pub fn level(&self) -> &Arc<Level> {
        &self.level
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn member(&self) -> &Member {
        // The ordinal is range-checked on construction and levels are immutable
        &self.level.members[self.ordinal as usize]
    }

    pub fn unique_name(&self) -> &str {
        self.member().unique_name()
    }

    pub fn name(&self) -> &str {
        self.member().name()
    }
}

impl PartialEq for MemberRef {
    fn eq(&self, other: &Self) -> bool {
        self.level.id == other.level.id && self.ordinal == other.ordinal
    }
}

impl Eq for MemberRef {}

impl Hash for MemberRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.level.id.hash(state);
        self.ordinal.hash(state);
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unique_name())
    }
}

/// Level unique name to level, for one cube connection
///
/// Detached member sets are re-attached against a `LevelMap`.
#[derive(Debug, Clone, Default)]
pub struct LevelMap(HashMap<String, Arc<Level>>);

impl LevelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, level: Arc<Level>) -> Option<Arc<Level>> {
        self.0.insert(level.unique_name.clone(), level)
    }

    pub fn get(&self, unique_name: &str) -> Option<&Arc<Level>> {
        self.0.get(unique_name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Level>> {
        self.0.values()
    }
}

/// A measure exposed by the cube
#[derive(Debug, Clone)]
pub struct Measure {
    unique_name: String,
    name: String,
    count_distinct_level: Option<Arc<Level>>,
}

impl Measure {
    /// Unique name, e.g. `[Measures].[SubjectCount]`
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The level whose distinct members this measure counts, if any
    pub fn count_distinct_level(&self) -> Option<&Arc<Level>> {
        self.count_distinct_level.as_ref()
    }
}

/// Indexed, connection-scoped cube metadata
#[derive(Debug)]
pub struct Cube {
    name: String,
    hierarchies: Vec<Arc<Hierarchy>>,
    levels: LevelMap,
    members: HashMap<String, MemberRef>,
    measures: Vec<Measure>,
}

impl Cube {
    /// Index a cube definition, assigning member ordinals level by level
    pub fn from_definition(def: &CubeDefinition) -> Result<Self> {
        let mut hierarchies: Vec<Arc<Hierarchy>> = Vec::with_capacity(def.hierarchies.len());
        let mut levels = LevelMap::new();
        let mut members = HashMap::new();

        for hdef in &def.hierarchies {
            let h_unique = bracket(&hdef.name);
            if hdef.levels.is_empty() {
                return Err(Error::InvalidMetadata(format!(
                    "Hierarchy {} has no levels",
                    h_unique
                )));
            }
            if hierarchies.iter().any(|h| h.unique_name == h_unique) {
                return Err(Error::InvalidMetadata(format!(
                    "Duplicate hierarchy {}",
                    h_unique
                )));
            }

            let mut built: Vec<Arc<Level>> = Vec::with_capacity(hdef.levels.len() + 1);
            if hdef.has_all {
                let all = Level::build(
                    &h_unique,
                    format!("{}.{}", h_unique, bracket(ALL_LEVEL_NAME)),
                    ALL_LEVEL_NAME,
                    0,
                    true,
                    vec![(
                        format!("{}.{}", h_unique, bracket(ALL_MEMBER_NAME)),
                        ALL_MEMBER_NAME.to_string(),
                        None,
                    )],
                )?;
                built.push(Arc::new(all));
            }

            for ldef in &hdef.levels {
                let depth = built.len();
                let l_unique = format!("{}.{}", h_unique, bracket(&ldef.name));
                let parent_level = built.last().cloned();
                let parent_names: HashMap<&str, Ordinal> = parent_level
                    .as_ref()
                    .map(|pl| {
                        pl.members
                            .iter()
                            .map(|m| (m.name.as_str(), m.ordinal))
                            .collect()
                    })
                    .unwrap_or_default();

                let mut specs = Vec::with_capacity(ldef.members.len());
                for mdef in &ldef.members {
                    let (parent, prefix) = match (&mdef.parent, &parent_level) {
                        (Some(p), Some(pl)) => {
                            let ordinal = *parent_names.get(p.as_str()).ok_or_else(|| {
                                Error::MemberNotFound(format!(
                                    "parent {} of {} in level {}",
                                    p,
                                    mdef.name,
                                    pl.unique_name()
                                ))
                            })?;
                            (
                                Some(ordinal),
                                pl.members[ordinal as usize].unique_name.clone(),
                            )
                        }
                        (Some(p), None) => {
                            return Err(Error::InvalidMetadata(format!(
                                "Member {} declares parent {} but {} is a top level",
                                mdef.name, p, l_unique
                            )));
                        }
                        (None, Some(pl)) if pl.is_all => (Some(0), h_unique.clone()),
                        (None, Some(_)) => (None, l_unique.clone()),
                        (None, None) => (None, h_unique.clone()),
                    };
                    specs.push((
                        format!("{}.{}", prefix, bracket(&mdef.name)),
                        mdef.name.clone(),
                        parent,
                    ));
                }

                let level = Level::build(&h_unique, l_unique, &ldef.name, depth, false, specs)?;
                built.push(Arc::new(level));
            }

            for level in &built {
                if levels.insert(Arc::clone(level)).is_some() {
                    return Err(Error::InvalidMetadata(format!(
                        "Duplicate level {}",
                        level.unique_name
                    )));
                }
                for member in &level.members {
                    let handle = MemberRef {
                        level: Arc::clone(level),
                        ordinal: member.ordinal,
                    };
                    if members.insert(member.unique_name.clone(), handle).is_some() {
                        return Err(Error::InvalidMetadata(format!(
                            "Duplicate member {}",
                            member.unique_name
                        )));
                    }
                }
            }

            hierarchies.push(Arc::new(Hierarchy {
                unique_name: h_unique,
                name: hdef.name.clone(),
                levels: built,
            }));
        }

        let mut measures = Vec::with_capacity(def.measures.len());
        for mdef in &def.measures {
            let count_distinct_level = match &mdef.count_distinct_level {
                Some(name) => Some(Arc::clone(
                    levels
                        .get(name)
                        .ok_or_else(|| Error::LevelNotFound(name.clone()))?,
                )),
                None => None,
            };
            measures.push(Measure {
                unique_name: format!("[Measures].{}", bracket(&mdef.name)),
                name: mdef.name.clone(),
                count_distinct_level,
            });
        }

        Ok(Self {
            name: def.name.clone(),
            hierarchies,
            levels,
            members,
            measures,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bracketed cube name as used in a `FROM` clause
    pub fn unique_name(&self) -> String {
        bracket(&self.name)
    }

    pub fn hierarchies(&self) -> &[Arc<Hierarchy>] {
        &self.hierarchies
    }

    /// Get a hierarchy by caption or unique name
    pub fn hierarchy(&self, name: &str) -> Result<&Arc<Hierarchy>> {
        self.hierarchies
            .iter()
            .find(|h| h.unique_name == name || h.name == name)
            .ok_or_else(|| Error::HierarchyNotFound(name.to_string()))
    }

    /// Get the hierarchy that owns a level
    pub fn hierarchy_of(&self, level: &Level) -> Result<&Arc<Hierarchy>> {
        self.hierarchy(&level.hierarchy)
    }

    /// Get a level by unique name
    pub fn level(&self, unique_name: &str) -> Result<&Arc<Level>> {
        self.levels
            .get(unique_name)
            .ok_or_else(|| Error::LevelNotFound(unique_name.to_string()))
    }

    /// All levels of this cube keyed by unique name
    pub fn level_map(&self) -> &LevelMap {
        &self.levels
    }

    /// Get a member by unique name
    pub fn member(&self, unique_name: &str) -> Result<MemberRef> {
        self.members
            .get(unique_name)
            .cloned()
            .ok_or_else(|| Error::MemberNotFound(unique_name.to_string()))
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Get a measure by caption or unique name
    pub fn measure(&self, name: &str) -> Result<&Measure> {
        self.measures
            .iter()
            .find(|m| m.unique_name == name || m.name == name)
            .ok_or_else(|| Error::MeasureNotFound(name.to_string()))
    }

    /// Whether `ancestor` is `member` itself or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: &MemberRef, member: &MemberRef) -> bool {
        if ancestor.level.hierarchy != member.level.hierarchy
            || ancestor.level.depth > member.level.depth
        {
            return false;
        }
        let Ok(hierarchy) = self.hierarchy(&member.level.hierarchy) else {
            return false;
        };

        let mut depth = member.level.depth;
        let mut ordinal = member.ordinal;
        while depth > ancestor.level.depth {
            let Some(parent) = hierarchy.levels[depth].members[ordinal as usize].parent else {
                return false;
            };
            depth -= 1;
            ordinal = parent;
        }
        ordinal == ancestor.ordinal
    }

    /// The member followed by each of its ancestors, bottom up
    pub fn ancestors_or_self(&self, member: &MemberRef) -> Vec<MemberRef> {
        let mut chain = vec![member.clone()];
        let Ok(hierarchy) = self.hierarchy(&member.level.hierarchy) else {
            return chain;
        };

        let mut current = member.clone();
        while current.level.depth > 0 {
            let Some(parent) = current.member().parent else {
                break;
            };
            let level = Arc::clone(&hierarchy.levels[current.level.depth - 1]);
            current = MemberRef {
                level,
                ordinal: parent,
            };
            chain.push(current.clone());
        }
        chain
    }
}
