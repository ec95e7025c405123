//! Serializable cube definitions
//!
//! A `CubeDefinition` is the plain-data description of a cube's dimensions
//! as handed over by a cube engine or read from a fixture file. It carries
//! no ordinals; those are assigned when the definition is indexed into a
//! [`Cube`](crate::metadata::Cube).

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Plain-data description of a cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeDefinition {
    /// Cube name
    pub name: String,

    /// Hierarchies in declaration order
    pub hierarchies: Vec<HierarchyDefinition>,

    /// Measures exposed by the cube
    #[serde(default)]
    pub measures: Vec<MeasureDefinition>,
}

/// Plain-data description of a hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyDefinition {
    /// Hierarchy name
    pub name: String,

    /// Whether an `(All)` level with a single all-member is prepended
    #[serde(default = "default_true")]
    pub has_all: bool,

    /// Levels from the top down, excluding the `(All)` level
    pub levels: Vec<LevelDefinition>,
}

/// Plain-data description of a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    /// Level name
    pub name: String,

    /// Members in cube order
    pub members: Vec<MemberDefinition>,
}

/// Plain-data description of a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDefinition {
    /// Member caption
    pub name: String,

    /// Name of the parent member in the level directly above
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Plain-data description of a measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureDefinition {
    /// Measure name
    pub name: String,

    /// Unique name of the level whose distinct members this measure counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_distinct_level: Option<String>,
}

impl CubeDefinition {
    /// Create an empty cube definition
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            hierarchies: Vec::new(),
            measures: Vec::new(),
        }
    }

    /// Builder: add a hierarchy
    pub fn hierarchy(mut self, hierarchy: HierarchyDefinition) -> Self {
        self.hierarchies.push(hierarchy);
        self
    }

    /// Builder: add a count-distinct measure over the given level
    pub fn count_distinct<S: Into<String>, L: Into<String>>(mut self, name: S, level: L) -> Self {
        self.measures.push(MeasureDefinition {
            name: name.into(),
            count_distinct_level: Some(level.into()),
        });
        self
    }

    /// Parse a definition from JSON text
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl HierarchyDefinition {
    /// A hierarchy with a single level named after the hierarchy
    pub fn flat<S, I, M>(name: S, members: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let name = name.into();
        Self {
            levels: vec![LevelDefinition::new(name.clone(), members)],
            name,
            has_all: true,
        }
    }

    /// Builder: append a level
    pub fn level(mut self, level: LevelDefinition) -> Self {
        self.levels.push(level);
        self
    }
}

impl LevelDefinition {
    /// A level whose members have no declared parent
    pub fn new<S, I, M>(name: S, members: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            members: members
                .into_iter()
                .map(|m| MemberDefinition {
                    name: m.into(),
                    parent: None,
                })
                .collect(),
        }
    }

    /// A level whose members are given as `(name, parent)` pairs
    pub fn with_parents<S, I, M, P>(name: S, members: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (M, P)>,
        M: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            members: members
                .into_iter()
                .map(|(m, p)| MemberDefinition {
                    name: m.into(),
                    parent: Some(p.into()),
                })
                .collect(),
        }
    }
}
