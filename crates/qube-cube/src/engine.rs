//! In-memory fact cube
//!
//! [`MemoryCube`] is a small cube engine over a list of fact rows. It
//! executes the query text the reachability helper generates and is what
//! the CLI and the tests connect to.

use crate::connection::{CellMember, CellSet, CubeConnection, Position};
use crate::parser::{parse, Axis, MemberPath, SetExpr};
use qube_core::{Cube, CubeDefinition, Error, Level, LevelId, MemberRef, Ordinal, Result};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Unique name used for the level of measures on result axes
pub const MEASURES_LEVEL: &str = "[Measures].[MeasuresLevel]";

const MEASURES: &str = "Measures";

/// One fact: hierarchy name to the member the fact belongs to
///
/// Members are given by unique name or by caption within the hierarchy's
/// leaf level.
pub type FactRow = BTreeMap<String, String>;

/// A cube definition together with its facts, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeFixture {
    pub cube: CubeDefinition,
    #[serde(default)]
    pub facts: Vec<FactRow>,
}

impl CubeFixture {
    pub fn new(cube: CubeDefinition) -> Self {
        Self {
            cube,
            facts: Vec::new(),
        }
    }

    /// Builder: add a fact from `(hierarchy, member)` pairs
    pub fn fact<I, H, M>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (H, M)>,
        H: Into<String>,
        M: Into<String>,
    {
        self.facts
            .push(pairs.into_iter().map(|(h, m)| (h.into(), m.into())).collect());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

/// Key of a member in the fact index
type MemberKey = (LevelId, Ordinal);

/// An element of a tuple on a result axis
#[derive(Debug, Clone)]
enum Item {
    Member(MemberRef),
    Measure(usize),
}

type Tuple = Vec<Item>;

/// A cube engine holding its facts in memory
pub struct MemoryCube {
    definition: CubeDefinition,
    cube: Arc<Cube>,
    facts: Vec<FactRow>,
    /// Facts at or below each member
    index: HashMap<MemberKey, RoaringBitmap>,
    executions: AtomicU64,
    query_log: Mutex<Vec<String>>,
}

impl MemoryCube {
    /// Create a cube with no facts
    pub fn new(definition: CubeDefinition) -> Result<Self> {
        let cube = Cube::from_definition(&definition)?;
        Ok(Self {
            definition,
            cube: Arc::new(cube),
            facts: Vec::new(),
            index: HashMap::new(),
            executions: AtomicU64::new(0),
            query_log: Mutex::new(Vec::new()),
        })
    }

    /// Create a cube from a fixture, loading every fact
    pub fn from_fixture(fixture: CubeFixture) -> Result<Self> {
        let mut cube = Self::new(fixture.cube)?;
        for fact in fixture.facts {
            cube.add_fact(fact)?;
        }
        info!(
            "Loaded cube {} with {} facts",
            cube.cube.name(),
            cube.facts.len()
        );
        Ok(cube)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_fixture(CubeFixture::from_json(json)?)
    }

    /// Add a fact row
    pub fn add_fact(&mut self, fact: FactRow) -> Result<()> {
        let row = u32::try_from(self.facts.len())
            .map_err(|_| Error::InvalidMetadata("Too many facts".to_string()))?;

        let mut members = Vec::with_capacity(fact.len());
        for (hierarchy_name, member_name) in &fact {
            members.push(self.resolve_fact_member(hierarchy_name, member_name)?);
        }

        for member in &members {
            for ancestor in self.cube.ancestors_or_self(member) {
                self.index
                    .entry((ancestor.level().id(), ancestor.ordinal()))
                    .or_default()
                    .insert(row);
            }
        }
        self.facts.push(fact);
        Ok(())
    }

    fn resolve_fact_member(&self, hierarchy_name: &str, member_name: &str) -> Result<MemberRef> {
        let hierarchy = self.cube.hierarchy(hierarchy_name)?;
        let member = match self.cube.member(member_name) {
            Ok(member) => member,
            Err(_) => {
                let leaf = hierarchy
                    .leaf_level()
                    .ok_or_else(|| Error::LevelNotFound(hierarchy.unique_name().to_string()))?;
                let found = leaf
                    .find(member_name)
                    .ok_or_else(|| Error::MemberNotFound(member_name.to_string()))?;
                MemberRef::new(Arc::clone(leaf), found.ordinal())?
            }
        };
        if !hierarchy.contains_level(member.level()) {
            return Err(Error::InvalidMetadata(format!(
                "Fact member {} does not belong to hierarchy {}",
                member, hierarchy
            )));
        }
        Ok(member)
    }

    /// Open a fresh connection over the same definition and facts
    ///
    /// The new connection has its own metadata objects, as a cube engine
    /// would hand out after a reconnect.
    pub fn reconnect(&self) -> Result<Self> {
        Self::from_fixture(CubeFixture {
            cube: self.definition.clone(),
            facts: self.facts.clone(),
        })
    }

    pub fn definition(&self) -> &CubeDefinition {
        &self.definition
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Number of queries executed so far
    pub fn execute_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Text of every query executed so far, oldest first
    pub fn executed_queries(&self) -> Vec<String> {
        self.query_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_counters(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.query_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn all_facts(&self) -> RoaringBitmap {
        let mut all = RoaringBitmap::new();
        // add_fact keeps the row count within u32
        all.insert_range(0..self.facts.len() as u32);
        all
    }

    /// Facts matching every member of a tuple
    fn facts_of(&self, tuple: &[Item]) -> RoaringBitmap {
        let mut facts = self.all_facts();
        for item in tuple {
            if let Item::Member(member) = item {
                match self.index.get(&(member.level().id(), member.ordinal())) {
                    Some(rows) => facts &= rows,
                    None => return RoaringBitmap::new(),
                }
            }
            if facts.is_empty() {
                break;
            }
        }
        facts
    }

    fn is_measures(path: &MemberPath) -> bool {
        path.segments().first().map(String::as_str) == Some(MEASURES)
    }

    fn measure_item(&self, path: &MemberPath) -> Result<Item> {
        let name = path.segments().get(1).ok_or_else(|| {
            Error::CubeQuery(format!("Expected a measure name in {}", path))
        })?;
        self.cube
            .measures()
            .iter()
            .position(|m| m.name() == name)
            .map(Item::Measure)
            .ok_or_else(|| Error::CubeQuery(format!("Unknown measure {}", path)))
    }

    fn level_items(level: &Arc<Level>) -> Result<Vec<Tuple>> {
        level
            .members()
            .iter()
            .map(|m| Ok(vec![Item::Member(MemberRef::new(Arc::clone(level), m.ordinal())?)]))
            .collect()
    }

    fn eval_set(&self, set: &SetExpr) -> Result<Vec<Tuple>> {
        match set {
            SetExpr::Member(path) if Self::is_measures(path) => {
                Ok(vec![vec![self.measure_item(path)?]])
            }
            SetExpr::Member(path) => {
                let member = self
                    .cube
                    .member(&path.unique_name())
                    .map_err(|_| Error::CubeQuery(format!("Unknown member {}", path)))?;
                Ok(vec![vec![Item::Member(member)]])
            }
            SetExpr::Members(path) if Self::is_measures(path) => Ok((0..self.cube.measures().len())
                .map(|i| vec![Item::Measure(i)])
                .collect()),
            SetExpr::Members(path) => {
                let unique = path.unique_name();
                if let Ok(level) = self.cube.level(&unique) {
                    return Self::level_items(level);
                }
                let hierarchy = self
                    .cube
                    .hierarchy(&unique)
                    .map_err(|_| Error::CubeQuery(format!("Unknown level or hierarchy {}", path)))?;
                let mut tuples = Vec::new();
                for level in hierarchy.levels() {
                    tuples.extend(Self::level_items(level)?);
                }
                Ok(tuples)
            }
            SetExpr::Children(path) => {
                let unique = path.unique_name();
                if let Ok(hierarchy) = self.cube.hierarchy(&unique) {
                    let top = hierarchy.level(0).ok_or_else(|| {
                        Error::CubeQuery(format!("Hierarchy {} has no levels", path))
                    })?;
                    let level = if top.is_all() {
                        hierarchy.children_level().unwrap_or(top)
                    } else {
                        top
                    };
                    return Self::level_items(level);
                }

                let parent = self
                    .cube
                    .member(&unique)
                    .map_err(|_| Error::CubeQuery(format!("Unknown member {}", path)))?;
                let hierarchy = self.cube.hierarchy_of(parent.level())?;
                let Some(level) = hierarchy.level(parent.level().depth() + 1) else {
                    return Ok(Vec::new());
                };
                Ok(Self::level_items(level)?
                    .into_iter()
                    .filter(|tuple| match &tuple[0] {
                        Item::Member(m) => m.member().parent() == Some(parent.ordinal()),
                        Item::Measure(_) => false,
                    })
                    .collect())
            }
            SetExpr::DefaultMember(path) if Self::is_measures(path) => {
                if self.cube.measures().is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![vec![Item::Measure(0)]])
            }
            SetExpr::DefaultMember(path) => {
                let hierarchy = self
                    .cube
                    .hierarchy(&path.unique_name())
                    .map_err(|_| Error::CubeQuery(format!("Unknown hierarchy {}", path)))?;
                let top = hierarchy.level(0).ok_or_else(|| {
                    Error::CubeQuery(format!("Hierarchy {} has no levels", path))
                })?;
                let member = MemberRef::new(Arc::clone(top), 0)
                    .map_err(|_| Error::CubeQuery(format!("Hierarchy {} is empty", path)))?;
                Ok(vec![vec![Item::Member(member)]])
            }
            SetExpr::Set(items) => {
                let mut tuples = Vec::new();
                for item in items {
                    tuples.extend(self.eval_set(item)?);
                }
                Ok(tuples)
            }
            SetExpr::CrossJoin(left, right) => {
                let left = self.eval_set(left)?;
                let right = self.eval_set(right)?;
                let mut tuples = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        let mut tuple = l.clone();
                        tuple.extend(r.iter().cloned());
                        tuples.push(tuple);
                    }
                }
                Ok(tuples)
            }
        }
    }

    fn position(&self, tuple: &[Item]) -> Position {
        tuple
            .iter()
            .map(|item| match item {
                Item::Member(member) => CellMember::from(member),
                Item::Measure(i) => {
                    let measure = &self.cube.measures()[*i];
                    CellMember {
                        level: MEASURES_LEVEL.to_string(),
                        unique_name: measure.unique_name().to_string(),
                        name: measure.name().to_string(),
                    }
                }
            })
            .collect()
    }

    fn run(&self, text: &str) -> Result<CellSet> {
        let query = parse(text)?;
        if query.cube != self.cube.name() {
            return Err(Error::CubeQuery(format!("Unknown cube [{}]", query.cube)));
        }

        let mut cells = CellSet::default();
        for spec in &query.axes {
            let mut tuples = self.eval_set(&spec.set)?;
            if spec.non_empty {
                tuples.retain(|t| !self.facts_of(t).is_empty());
            }
            let positions: Vec<Position> = tuples.iter().map(|t| self.position(t)).collect();
            match spec.axis {
                Axis::Columns => cells.columns = positions,
                Axis::Rows => cells.rows = positions,
            }
        }
        Ok(cells)
    }
}

impl CubeConnection for MemoryCube {
    fn cube(&self) -> &Arc<Cube> {
        &self.cube
    }

    fn execute(&self, query: &str) -> Result<CellSet> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.query_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        debug!("Executing cube query: {}", query);
        let cells = self.run(query)?;
        debug!("Cube query returned {} rows", cells.rows.len());
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qube_core::{HierarchyDefinition, LevelDefinition};

    fn fixture() -> CubeFixture {
        let def = CubeDefinition::new("Study")
            .hierarchy(HierarchyDefinition::flat("Subject", ["S1", "S2", "S3"]))
            .hierarchy(HierarchyDefinition::flat("Visit", ["V1", "V2"]))
            .hierarchy(
                HierarchyDefinition::flat("Site", ["North", "South"]).level(
                    LevelDefinition::with_parents("Clinic", [("N1", "North"), ("X1", "South")]),
                ),
            )
            .count_distinct("SubjectCount", "[Subject].[Subject]");
        CubeFixture::new(def)
            .fact([("Subject", "S1"), ("Visit", "V1"), ("Site", "N1")])
            .fact([("Subject", "S1"), ("Visit", "V2"), ("Site", "N1")])
            .fact([("Subject", "S2"), ("Visit", "V1"), ("Site", "X1")])
    }

    fn names(positions: &[Position]) -> Vec<Vec<&str>> {
        positions
            .iter()
            .map(|p| p.iter().map(|m| m.unique_name.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_non_empty_crossjoin() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let cells = cube
            .execute(
                "SELECT [Measures].DefaultMember ON COLUMNS, \
                 NON EMPTY CROSSJOIN({[Visit].[V2]}, [Subject].[Subject].members) ON ROWS \
                 FROM [Study]",
            )
            .unwrap();

        assert_eq!(names(&cells.columns), vec![vec!["[Measures].[SubjectCount]"]]);
        assert_eq!(names(&cells.rows), vec![vec!["[Visit].[V2]", "[Subject].[S1]"]]);
        assert_eq!(cells.rows[0][1].level, "[Subject].[Subject]");
    }

    #[test]
    fn test_parent_member_matches_descendant_facts() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let cells = cube
            .execute(
                "SELECT NON EMPTY CROSSJOIN([Site].children, [Subject].[Subject].members) ON ROWS \
                 FROM [Study]",
            )
            .unwrap();

        assert_eq!(
            names(&cells.rows),
            vec![
                vec!["[Site].[North]", "[Subject].[S1]"],
                vec!["[Site].[South]", "[Subject].[S2]"],
            ]
        );
    }

    #[test]
    fn test_member_children() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let cells = cube
            .execute("SELECT [Site].[North].children ON ROWS FROM [Study]")
            .unwrap();
        assert_eq!(names(&cells.rows), vec![vec!["[Site].[North].[N1]"]]);
    }

    #[test]
    fn test_empty_rows_without_non_empty() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let cells = cube
            .execute("SELECT [Subject].[Subject].members ON ROWS FROM [Study]")
            .unwrap();
        assert_eq!(cells.rows.len(), 3);
    }

    #[test]
    fn test_execute_counter_and_log() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let text = "SELECT [Measures].DefaultMember ON COLUMNS FROM [Study]";
        cube.execute(text).unwrap();
        cube.execute(text).unwrap();

        assert_eq!(cube.execute_count(), 2);
        assert_eq!(cube.executed_queries(), vec![text.to_string(), text.to_string()]);

        cube.reset_counters();
        assert_eq!(cube.execute_count(), 0);
    }

    #[test]
    fn test_unknown_cube_and_member() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();

        let err = cube
            .execute("SELECT [Subject].[Subject].members ON ROWS FROM [Other]")
            .unwrap_err();
        assert!(matches!(err, Error::CubeQuery(_)));

        let err = cube
            .execute("SELECT {[Subject].[S9]} ON ROWS FROM [Study]")
            .unwrap_err();
        assert!(err.is_cube_error());

        let err = cube.execute("SELECT FROM").unwrap_err();
        assert!(matches!(err, Error::QueryParse(_)));
    }

    #[test]
    fn test_bad_fact_rejected() {
        let mut cube = MemoryCube::new(fixture().cube).unwrap();
        let fact: FactRow = [("Subject".to_string(), "S9".to_string())].into();
        assert!(matches!(cube.add_fact(fact), Err(Error::MemberNotFound(_))));

        let fact: FactRow = [("Subject".to_string(), "[Visit].[V1]".to_string())].into();
        assert!(matches!(cube.add_fact(fact), Err(Error::InvalidMetadata(_))));
    }

    #[test]
    fn test_reconnect_builds_fresh_metadata() {
        let cube = MemoryCube::from_fixture(fixture()).unwrap();
        let again = cube.reconnect().unwrap();

        assert!(!Arc::ptr_eq(cube.cube(), again.cube()));
        assert_eq!(again.fact_count(), 3);
        assert_eq!(again.execute_count(), 0);
    }

    #[test]
    fn test_fixture_json() {
        let json = r#"{
            "cube": {
                "name": "Study",
                "hierarchies": [{"name": "Subject", "levels": [{"name": "Subject", "members": [{"name": "S1"}]}]}]
            },
            "facts": [{"Subject": "S1"}]
        }"#;
        let cube = MemoryCube::from_json(json).unwrap();
        assert_eq!(cube.fact_count(), 1);
        assert_eq!(cube.cube().name(), "Study");
    }
}
