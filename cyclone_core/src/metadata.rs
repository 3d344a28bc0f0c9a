//! Descriptive metadata for auxiliary track variables.
//!
//! Variable columns are named after the tracked field, optionally with a
//! suffix (`psl_min`, `sfcWind_max`). Units and CF-style names are resolved
//! from the base name, the text before the first `_`.

use crate::storm::Storm;
use crate::StitchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Units assumed for well-known fields when none are given.
const KNOWN_UNITS: [(&str, &str); 17] = [
    ("psl", "Pa"),
    ("sfcWind", "m s-1"),
    ("zg", "m"),
    ("orog", "m"),
    ("wind", "m s-1"),
    ("rvT63", "s-1"),
    ("rvT42", "s-1"),
    ("rv", "s-1"),
    ("rh", "%"),
    ("ts", "K"),
    ("rsize", "degrees"),
    ("radius", "degrees"),
    ("ace", "1"),
    ("acepsl", "1"),
    ("ike", "1"),
    ("pdi", "1"),
    ("rprof", "degrees"),
];

/// Text before the first `_`.
pub fn base_name(variable: &str) -> &str {
    variable.split('_').next().unwrap_or(variable)
}

fn known_units(base: &str) -> &'static str {
    KNOWN_UNITS
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, units)| *units)
        .unwrap_or("1")
}

/// Complete `given` with guessed units for every variable's base name.
///
/// Entries already in `given` are kept as they are.
pub fn guess_variable_units<'a, I>(variables: I, given: &BTreeMap<String, String>) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut units = given.clone();
    for variable in variables {
        let base = base_name(variable);
        if !given.contains_key(base) {
            units.insert(base.to_string(), known_units(base).to_string());
        }
    }
    units
}

/// CF-style description of one variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMetadata {
    pub standard_name: String,
    pub long_name: String,
    pub description: String,
    pub units: String,
}

impl VariableMetadata {
    fn new(standard_name: &str, long_name: &str, description: &str, units: impl Into<String>) -> Self {
        Self {
            standard_name: standard_name.to_string(),
            long_name: long_name.to_string(),
            description: description.to_string(),
            units: units.into(),
        }
    }
}

/// Describe a variable column. `units` maps base names to units; fields
/// missing from it fall back to the well-known table.
pub fn describe_variable(variable: &str, units: &BTreeMap<String, String>) -> VariableMetadata {
    let base = base_name(variable);
    let units_of = |field: &str| units.get(field).cloned().unwrap_or_else(|| known_units(field).to_string());

    if base.contains("slp") || base.contains("psl") {
        VariableMetadata::new(
            "air_pressure_at_mean_sea_level",
            "Sea Level Pressure",
            "Sea level pressure for tracked variable",
            units_of("psl"),
        )
    } else if base.contains("sfcWind") {
        VariableMetadata::new(
            "wind_speed",
            "Near-surface Wind Speed",
            "near-surface (usually 10 metres) wind speed",
            units_of("sfcWind"),
        )
    } else if base.contains("orog") {
        VariableMetadata::new(
            "surface_altitude",
            "Surface Altitude",
            "Surface altitude (height above sea level)",
            units_of("orog"),
        )
    } else if base.contains("wind") {
        VariableMetadata::new("wind_speed", "unknown", "unknown", units_of("wind"))
    } else if base.contains("rv") {
        VariableMetadata::new("relative_vorticity", "unknown", "unknown", "s-1")
    } else if base.contains("rh") {
        VariableMetadata::new("relative_humidity", "unknown", "unknown", "%")
    } else if base.contains("ts") {
        VariableMetadata::new("surface_temperature", "unknown", "unknown", units_of("ts"))
    } else if base.contains("zg") {
        VariableMetadata::new(
            "geopotential_height",
            "Geopotential Height",
            "Geopotential height difference",
            "m",
        )
    } else if base.contains("rsize") || base.contains("radius") {
        VariableMetadata::new("radius", "storm radius", "radius of the storm", "degrees")
    } else if base.contains("pace") {
        // Must precede "ace", which it contains
        VariableMetadata::new(
            "ace",
            "Accumulated Cyclone Energy (from psl)",
            "Instantaneous ACE of storm using psl",
            "1",
        )
    } else if base.contains("ace") {
        VariableMetadata::new("ace", "Accumulated Cyclone Energy", "Instantaneous ACE of storm", "1")
    } else if base.contains("ike") {
        VariableMetadata::new("ike", "Integrated Kinetic Energy", "Instantaneous IKE of storm", "1")
    } else if base.contains("pdi") {
        VariableMetadata::new("pdi", "Potential Dissipation Index", "Instantaneous PDI of storm", "1")
    } else if variable.contains("max_core") {
        VariableMetadata::new(
            "max_closed_contour",
            "Maximum closed contour within radius",
            "From TempestExtremes max_closed_contour_delta",
            "1",
        )
    } else if base.contains("rprof") {
        VariableMetadata::new("radial_profile", "storm radial profile", "radial profile of the storm", "degrees")
    } else {
        VariableMetadata::new(base, base, "Unknown variable", "1")
    }
}

/// Check that every storm of a window carries the same variables.
///
/// Writers take the column layout from the first storm, so a mismatch would
/// silently shift columns.
pub fn ensure_uniform_variables(storms: &[Storm]) -> Result<(), StitchError> {
    let Some(first) = storms.first() else {
        return Ok(());
    };
    for storm in &storms[1..] {
        if storm.schema() != first.schema() {
            let expected: Vec<&str> = first.schema().names().collect();
            let found: Vec<&str> = storm.schema().names().collect();
            return Err(StitchError::malformed(format!(
                "track {} has variables {:?}, track {} has {:?}",
                storm.track_id(),
                found,
                first.track_id(),
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storm::{VariableSchema, VariableSpec};
    use std::sync::Arc;

    #[test]
    fn test_guess_units_by_base_name() {
        let mut given = BTreeMap::new();
        given.insert("psl".to_string(), "hPa".to_string());

        let units = guess_variable_units(["psl_min", "sfcWind_max", "vortmean_850", "rvT63"], &given);
        assert_eq!(units["psl"], "hPa");
        assert_eq!(units["sfcWind"], "m s-1");
        assert_eq!(units["vortmean"], "1");
        assert_eq!(units["rvT63"], "s-1");
        assert_eq!(units.len(), 4);
    }

    #[test]
    fn test_describe_known_variables() {
        let units = guess_variable_units(["psl", "sfcWind"], &BTreeMap::new());

        let psl = describe_variable("psl_min", &units);
        assert_eq!(psl.standard_name, "air_pressure_at_mean_sea_level");
        assert_eq!(psl.units, "Pa");

        assert_eq!(describe_variable("sfcWind_max", &units).long_name, "Near-surface Wind Speed");
        assert_eq!(describe_variable("zg_diff", &units).units, "m");
        assert_eq!(describe_variable("rprof", &units).standard_name, "radial_profile");
    }

    #[test]
    fn test_pace_is_distinct_from_ace() {
        let units = BTreeMap::new();
        assert_eq!(
            describe_variable("pace", &units).long_name,
            "Accumulated Cyclone Energy (from psl)"
        );
        assert_eq!(describe_variable("ace", &units).long_name, "Accumulated Cyclone Energy");
    }

    #[test]
    fn test_unknown_variable_falls_back_to_its_name() {
        let meta = describe_variable("qvi_mean", &BTreeMap::new());
        assert_eq!(meta.standard_name, "qvi");
        assert_eq!(meta.description, "Unknown variable");
        assert_eq!(meta.units, "1");
    }

    #[test]
    fn test_uniform_variables() {
        let a = Arc::new(VariableSchema::new(vec![VariableSpec::scalar("psl")]));
        let b = Arc::new(VariableSchema::new(vec![VariableSpec::scalar("sfcWind")]));

        assert!(ensure_uniform_variables(&[]).is_ok());
        assert!(ensure_uniform_variables(&[Storm::new(0, a.clone()), Storm::new(1, a.clone())]).is_ok());

        let err = ensure_uniform_variables(&[Storm::new(0, a), Storm::new(1, b)]).unwrap_err();
        assert!(err.to_string().contains("sfcWind"));
    }
}
