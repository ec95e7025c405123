//! Count grids

use ndarray::Array2;
use qube_core::{Error, MemberRef, Result};
use qube_cube::MEASURES_LEVEL;
use serde::{Deserialize, Serialize};

/// A row or column header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisLabel {
    pub unique_name: String,
    pub name: String,
    pub level: String,
}

impl AxisLabel {
    /// Header for the count itself, used on the missing axis of a one-axis query
    pub fn measure(unique_name: &str) -> Self {
        let name = unique_name
            .rsplit_once(".[")
            .map(|(_, tail)| tail.trim_end_matches(']').replace("]]", "]"))
            .unwrap_or_else(|| unique_name.to_string());
        Self {
            unique_name: unique_name.to_string(),
            name,
            level: MEASURES_LEVEL.to_string(),
        }
    }
}

impl From<&MemberRef> for AxisLabel {
    fn from(member: &MemberRef) -> Self {
        Self {
            unique_name: member.unique_name().to_string(),
            name: member.name().to_string(),
            level: member.level().unique_name().to_string(),
        }
    }
}

/// Row-major grid of distinct-member counts with its headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountGrid {
    pub rows: Vec<AxisLabel>,
    pub columns: Vec<AxisLabel>,
    pub cells: Array2<u64>,
}

impl CountGrid {
    /// Build a grid from row-major counts
    pub fn new(rows: Vec<AxisLabel>, columns: Vec<AxisLabel>, counts: Vec<u64>) -> Result<Self> {
        let cells = Array2::from_shape_vec((rows.len(), columns.len()), counts)
            .map_err(|e| Error::Internal(format!("Grid shape mismatch: {}", e)))?;
        Ok(Self {
            rows,
            columns,
            cells,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, column: usize) -> Option<u64> {
        self.cells.get((row, column)).copied()
    }

    /// Look up a cell by row and column member unique names
    pub fn get_by_name(&self, row: &str, column: &str) -> Option<u64> {
        let r = self.rows.iter().position(|l| l.unique_name == row)?;
        let c = self.columns.iter().position(|l| l.unique_name == column)?;
        self.get(r, c)
    }

    /// Counts as nested rows
    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        self.cells.rows().into_iter().map(|r| r.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> AxisLabel {
        AxisLabel {
            unique_name: format!("[H].[{}]", name),
            name: name.to_string(),
            level: "[H].[H]".to_string(),
        }
    }

    #[test]
    fn test_grid_access() {
        let grid = CountGrid::new(
            vec![label("A"), label("B")],
            vec![label("X"), label("Y"), label("Z")],
            vec![1, 2, 3, 4, 5, 6],
        )
        .unwrap();

        assert_eq!(grid.get(1, 0), Some(4));
        assert_eq!(grid.get(2, 0), None);
        assert_eq!(grid.get_by_name("[H].[A]", "[H].[Z]"), Some(3));
        assert_eq!(grid.to_rows(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = CountGrid::new(vec![label("A")], vec![label("X")], vec![1, 2]).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_measure_label() {
        let label = AxisLabel::measure("[Measures].[SubjectCount]");
        assert_eq!(label.name, "SubjectCount");
        assert_eq!(label.level, MEASURES_LEVEL);
    }

    #[test]
    fn test_grid_json() {
        let grid = CountGrid::new(vec![label("A")], vec![label("X")], vec![7]).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        let back: CountGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);
    }
}
