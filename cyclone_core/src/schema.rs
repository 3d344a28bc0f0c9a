//! Column schema of the track text file.
//!
//! The caller supplies a `name -> column index` map. Columns 0..4 are always
//! the grid position `i j lon lat`, the last four are `year month day hour`,
//! and everything in between is an auxiliary variable in write order.

use crate::storm::{VarKind, VariableSchema, VariableSpec};
use crate::StitchError;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Leading position columns.
pub const POSITION_COLUMNS: [&str; 4] = ["i", "j", "lon", "lat"];

/// Trailing date columns.
pub const TIME_COLUMNS: [&str; 4] = ["year", "month", "day", "hour"];

/// Structural storm fields that are never auxiliary variables.
pub const STRUCTURAL_FIELDS: [&str; 9] = ["i", "j", "lon", "lat", "year", "month", "day", "hour", "length"];

/// Reversible column layout plus the auxiliary variable kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    ordered: Vec<String>,
    variables: Arc<VariableSchema>,
}

impl ColumnSchema {
    /// Build from a `name -> index` map; `profiles` names the variables that
    /// hold a vector per point (all others are scalars).
    pub fn new(columns: &BTreeMap<String, usize>, profiles: &[String]) -> Result<Self, StitchError> {
        let count = columns.len();
        if count < POSITION_COLUMNS.len() + TIME_COLUMNS.len() {
            return Err(StitchError::malformed(format!(
                "column schema has {count} columns, need at least {}",
                POSITION_COLUMNS.len() + TIME_COLUMNS.len()
            )));
        }

        // Reverse the map, requiring indices 0..count with no repeats
        let mut ordered: Vec<Option<String>> = vec![None; count];
        for (name, &index) in columns {
            let slot = ordered.get_mut(index).ok_or_else(|| {
                StitchError::malformed(format!("column '{name}' has index {index} outside 0..{count}"))
            })?;
            if let Some(other) = slot.as_ref() {
                return Err(StitchError::malformed(format!(
                    "columns '{other}' and '{name}' share index {index}"
                )));
            }
            *slot = Some(name.clone());
        }
        let ordered: Vec<String> = ordered.into_iter().flatten().collect();
        Self::from_ordered(ordered, profiles)
    }

    /// Build from column names already in file order.
    pub fn from_ordered(ordered: Vec<String>, profiles: &[String]) -> Result<Self, StitchError> {
        let count = ordered.len();
        if count < POSITION_COLUMNS.len() + TIME_COLUMNS.len() {
            return Err(StitchError::malformed(format!(
                "column schema has {count} columns, need at least {}",
                POSITION_COLUMNS.len() + TIME_COLUMNS.len()
            )));
        }

        let expected_head = POSITION_COLUMNS.iter().enumerate();
        let expected_tail = TIME_COLUMNS
            .iter()
            .enumerate()
            .map(|(k, name)| (count - TIME_COLUMNS.len() + k, name));
        for (index, name) in expected_head.chain(expected_tail) {
            if ordered[index] != *name {
                return Err(StitchError::malformed(format!(
                    "column {index} must be '{name}', found '{}'",
                    ordered[index]
                )));
            }
        }

        let variable_names = &ordered[POSITION_COLUMNS.len()..count - TIME_COLUMNS.len()];
        let mut seen = HashSet::new();
        for name in variable_names {
            if STRUCTURAL_FIELDS.contains(&name.as_str()) {
                return Err(StitchError::malformed(format!(
                    "'{name}' is a structural field and cannot be a variable column"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(StitchError::malformed(format!("duplicate column '{name}'")));
            }
        }
        if let Some(unknown) = profiles.iter().find(|p| !seen.contains(p.as_str())) {
            return Err(StitchError::malformed(format!(
                "profile '{unknown}' is not a variable column"
            )));
        }

        let specs = variable_names
            .iter()
            .map(|name| VariableSpec {
                name: name.clone(),
                kind: if profiles.contains(name) { VarKind::Profile } else { VarKind::Scalar },
            })
            .collect();

        Ok(Self {
            ordered,
            variables: Arc::new(VariableSchema::new(specs)),
        })
    }

    /// Total number of columns on a point line.
    pub fn column_count(&self) -> usize {
        self.ordered.len()
    }

    /// Column names in file order.
    pub fn ordered(&self) -> &[String] {
        &self.ordered
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.ordered.iter().position(|n| n == name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.ordered.get(index).map(String::as_str)
    }

    /// The `name -> index` map this schema was built from.
    pub fn column_names(&self) -> BTreeMap<String, usize> {
        self.ordered
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect()
    }

    /// Auxiliary variables shared by every storm read with this schema.
    pub fn variables(&self) -> &Arc<VariableSchema> {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn column_map(list: &[&str]) -> BTreeMap<String, usize> {
        list.iter().enumerate().map(|(i, s)| (s.to_string(), i)).collect()
    }

    const LAYOUT: [&str; 11] = [
        "i", "j", "lon", "lat", "slp", "sfcWind", "rprof", "year", "month", "day", "hour",
    ];

    #[test]
    fn test_reverses_column_map() {
        let schema = ColumnSchema::new(&column_map(&LAYOUT), &names(&["rprof"])).unwrap();
        assert_eq!(schema.column_count(), 11);
        assert_eq!(schema.name_at(4), Some("slp"));
        assert_eq!(schema.index_of("hour"), Some(10));
        assert_eq!(schema.column_names(), column_map(&LAYOUT));

        let kinds: Vec<VarKind> = schema.variables().specs().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![VarKind::Scalar, VarKind::Scalar, VarKind::Profile]);
    }

    #[test]
    fn test_rejects_gaps_and_collisions() {
        let mut gapped = column_map(&LAYOUT);
        gapped.insert("hour".to_string(), 12);
        assert!(ColumnSchema::new(&gapped, &[]).is_err());

        let mut shared = column_map(&LAYOUT);
        shared.insert("sfcWind".to_string(), 4);
        assert!(ColumnSchema::new(&shared, &[]).is_err());
    }

    #[test]
    fn test_rejects_misplaced_structural_columns() {
        let swapped = names(&["j", "i", "lon", "lat", "year", "month", "day", "hour"]);
        assert!(ColumnSchema::from_ordered(swapped, &[]).is_err());

        let length_column = names(&["i", "j", "lon", "lat", "length", "year", "month", "day", "hour"]);
        assert!(ColumnSchema::from_ordered(length_column, &[]).is_err());
    }

    #[test]
    fn test_rejects_unknown_profile() {
        let err = ColumnSchema::new(&column_map(&LAYOUT), &names(&["zg"])).unwrap_err();
        assert!(err.to_string().contains("zg"));
    }

    #[test]
    fn test_no_variables_is_valid() {
        let schema = ColumnSchema::from_ordered(
            names(&["i", "j", "lon", "lat", "year", "month", "day", "hour"]),
            &[],
        )
        .unwrap();
        assert!(schema.variables().is_empty());
    }
}
