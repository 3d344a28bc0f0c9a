//! Track text file codec.
//!
//! A track file is a sequence of blocks. Each block is a header line
//!
//! ```text
//! start   <length>      <year>    <month>       <day>      <hour>
//! ```
//!
//! followed by `length` point lines holding `i j lon lat`, the auxiliary
//! variables in column order and `year month day hour`. Scalars are written
//! C-style as `%.6e`; profiles as a quoted bracketed list of `%.6e` values.

use crate::schema::ColumnSchema;
use crate::storm::{AuxValue, Storm, TrackPoint, VarKind};
use crate::StitchError;
use cyclone_env::{CalendarDateTime, DataSource};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// First token of every header line.
pub const HEADER_TAG: &str = "start";

// ============================================================================
// FORMATTING
// ============================================================================

/// Format a value like C's `%.6e` (`1.234560e+02`).
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // Rust writes the exponent bare (`1.234560e2`)
    let formatted = format!("{value:.6e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

fn format_value(value: &AuxValue) -> String {
    match value {
        AuxValue::Scalar(v) => format_scientific(*v),
        AuxValue::Profile(values) => {
            let joined: Vec<String> = values.iter().map(|v| format_scientific(*v)).collect();
            format!("\"[{}]\"", joined.join(","))
        }
    }
}

/// Header line for a block of `length` points starting at `start`.
pub fn format_header(length: usize, start: CalendarDateTime) -> String {
    format!(
        "{HEADER_TAG}   {}      {}    {}       {}      {}\n",
        length, start.year, start.month, start.day, start.hour
    )
}

/// One point line, newline included.
pub fn format_point_line(point: &TrackPoint) -> String {
    let mut line = format!(
        "        {}     {}     {:.6}      {:.6}   ",
        point.i, point.j, point.lon, point.lat
    );
    for value in &point.vars {
        line.push_str("    ");
        line.push_str(&format_value(value));
    }
    line.push_str(&format!(
        "   {}    {}       {}      {} \n",
        point.time.year, point.time.month, point.time.day, point.time.hour
    ));
    line
}

/// Header plus the first `count` point lines of `storm`, with the header
/// announcing `length` points.
///
/// Used to write lead-in points ahead of an existing block.
pub fn format_block_prefix(storm: &Storm, count: usize, length: usize) -> Result<(String, Vec<String>), StitchError> {
    let first = storm
        .first()
        .ok_or_else(|| StitchError::malformed(format!("track {} has no points", storm.track_id())))?;
    if count > storm.len() {
        return Err(StitchError::malformed(format!(
            "track {} has {} points, cannot take {count}",
            storm.track_id(),
            storm.len()
        )));
    }
    let lines = storm.points()[..count].iter().map(format_point_line).collect();
    Ok((format_header(length, first.time), lines))
}

// ============================================================================
// PARSING
// ============================================================================

/// Parsed header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeader {
    /// Number of point lines announced
    pub length: usize,

    /// Date of the first point
    pub start: CalendarDateTime,
}

impl TrackHeader {
    /// Whether `line` is a header line.
    pub fn is_header(line: &str) -> bool {
        line.split_whitespace().next() == Some(HEADER_TAG)
    }

    pub fn parse(line: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 6 || tokens[0] != HEADER_TAG {
            return Err(format!("header needs 6 fields starting with '{HEADER_TAG}', found {}", tokens.len()));
        }
        Ok(Self {
            length: parse_token(tokens[1], "length")?,
            start: CalendarDateTime::new(
                parse_token(tokens[2], "year")?,
                parse_token(tokens[3], "month")?,
                parse_token(tokens[4], "day")?,
                parse_token(tokens[5], "hour")?,
            ),
        })
    }
}

/// Fields of one point line, before step and track id are known.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLine {
    pub i: i64,
    pub j: i64,
    pub lon: f64,
    pub lat: f64,
    pub vars: Vec<AuxValue>,
    pub time: CalendarDateTime,
}

impl PointLine {
    pub fn parse(line: &str, schema: &ColumnSchema) -> Result<Self, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let expected = schema.column_count();
        if tokens.len() != expected {
            return Err(format!("point line needs {expected} fields, found {}", tokens.len()));
        }

        let n_vars = schema.variables().len();
        let vars = schema
            .variables()
            .specs()
            .iter()
            .zip(&tokens[4..4 + n_vars])
            .map(|(spec, token)| match spec.kind {
                VarKind::Scalar => parse_token(token, &spec.name).map(AuxValue::Scalar),
                VarKind::Profile => parse_profile(token, &spec.name).map(AuxValue::Profile),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time_at = 4 + n_vars;
        Ok(Self {
            i: parse_grid_index(tokens[0], "i")?,
            j: parse_grid_index(tokens[1], "j")?,
            lon: parse_token(tokens[2], "lon")?,
            lat: parse_token(tokens[3], "lat")?,
            vars,
            time: CalendarDateTime::new(
                parse_token(tokens[time_at], "year")?,
                parse_token(tokens[time_at + 1], "month")?,
                parse_token(tokens[time_at + 2], "day")?,
                parse_token(tokens[time_at + 3], "hour")?,
            ),
        })
    }
}

fn parse_token<T: std::str::FromStr>(token: &str, field: &str) -> Result<T, String> {
    token
        .parse()
        .map_err(|_| format!("cannot parse {field} from '{token}'"))
}

/// Grid indices are integers, but some trackers write them as `12.0`.
fn parse_grid_index(token: &str, field: &str) -> Result<i64, String> {
    token
        .parse::<i64>()
        .or_else(|_| parse_token::<f64>(token, field).map(|v| v.trunc() as i64))
}

fn parse_profile(token: &str, field: &str) -> Result<Vec<f64>, String> {
    let inner = token
        .trim_matches('"')
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| format!("profile {field} must look like \"[v1,v2,...]\", found '{token}'"))?;
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner.split(',').map(|v| parse_token(v.trim(), field)).collect()
}

// ============================================================================
// FILE I/O
// ============================================================================

/// Read every block of a track file into a storm.
///
/// Track ids are block indices; step numbers are derived from each point's
/// date relative to the first time of `source`.
pub fn read_track_file(
    path: &Path,
    schema: &ColumnSchema,
    source: &dyn DataSource,
    time_period: u32,
) -> Result<Vec<Storm>, StitchError> {
    let reader = BufReader::new(File::open(path)?);
    let calendar = source.calendar();

    let mut storms: Vec<Storm> = Vec::new();
    let mut expected = 0usize;
    let mut header_line = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        if TrackHeader::is_header(&line) {
            check_block_complete(path, storms.last(), expected, header_line)?;
            let header = TrackHeader::parse(&line).map_err(|reason| StitchError::format(path, line_no, reason))?;
            expected = header.length;
            header_line = line_no;
            storms.push(Storm::new(storms.len(), schema.variables().clone()));
            continue;
        }

        let storm = storms
            .last_mut()
            .ok_or_else(|| StitchError::format(path, line_no, "point line before any header"))?;
        if storm.len() >= expected {
            return Err(StitchError::format(
                path,
                line_no,
                format!("block starting at line {header_line} announces {expected} points"),
            ));
        }

        let parsed = PointLine::parse(&line, schema).map_err(|reason| StitchError::format(path, line_no, reason))?;
        calendar
            .validate(parsed.time)
            .map_err(|err| StitchError::format(path, line_no, err.to_string()))?;
        let step = source.step_of(parsed.time, time_period)?;
        let point = TrackPoint {
            time: parsed.time,
            lon: parsed.lon,
            lat: parsed.lat,
            i: parsed.i,
            j: parsed.j,
            step,
            track_id: storm.track_id(),
            vars: parsed.vars,
        };
        storm
            .push(point)
            .map_err(|err| StitchError::format(path, line_no, err.to_string()))?;
    }
    check_block_complete(path, storms.last(), expected, header_line)?;

    info!("Read {} tracks from {}", storms.len(), path.display());
    Ok(storms)
}

fn check_block_complete(path: &Path, storm: Option<&Storm>, expected: usize, header_line: usize) -> Result<(), StitchError> {
    match storm {
        Some(storm) if storm.len() != expected => Err(StitchError::format(
            path,
            header_line,
            format!("header announces {expected} points, block has {}", storm.len()),
        )),
        _ => Ok(()),
    }
}

/// Write storms as a track file, replacing `path` atomically.
pub fn write_track_file(path: &Path, storms: &[Storm], schema: &ColumnSchema) -> Result<(), StitchError> {
    for storm in storms {
        if storm.schema().as_ref() != schema.variables().as_ref() {
            return Err(StitchError::malformed(format!(
                "track {} variables do not match the column schema",
                storm.track_id()
            )));
        }
    }

    write_atomically(path, |out| {
        for storm in storms.iter().filter(|s| !s.is_empty()) {
            let (header, lines) = format_block_prefix(storm, storm.len(), storm.len())?;
            out.write_all(header.as_bytes())?;
            for line in lines {
                out.write_all(line.as_bytes())?;
            }
        }
        Ok(())
    })?;

    debug!("Wrote {} tracks to {}", storms.len(), path.display());
    Ok(())
}

/// Run `write` against a temporary file next to `path`, then rename it into
/// place. On error the destination is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), StitchError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), StitchError>,
{
    let staged = stage_file(path, write)?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Write into a temporary file in the directory of `path` without replacing
/// it yet. Dropping the returned file discards the content.
pub(crate) fn stage_file<F>(path: &Path, write: F) -> Result<NamedTempFile, StitchError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), StitchError>,
{
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    Ok(temp)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storm::VariableSchema;
    use cyclone_env::{Calendar, GridSource};
    use std::sync::Arc;

    fn layout() -> ColumnSchema {
        let names = ["i", "j", "lon", "lat", "psl", "rprof", "year", "month", "day", "hour"];
        ColumnSchema::from_ordered(names.iter().map(|s| s.to_string()).collect(), &["rprof".to_string()]).unwrap()
    }

    fn source() -> GridSource {
        GridSource::regular(Calendar::Standard, vec![40, 180, 360], CalendarDateTime::new(1980, 9, 1, 0), 6, 40).unwrap()
    }

    fn sample_point(step: i64) -> TrackPoint {
        TrackPoint {
            time: Calendar::Standard
                .add_hours(CalendarDateTime::new(1980, 9, 1, 0), 6 * (step - 1))
                .unwrap(),
            lon: 120.5,
            lat: -12.25,
            i: 120,
            j: 77,
            step,
            track_id: 0,
            vars: vec![AuxValue::Scalar(100_512.0), AuxValue::Profile(vec![1.0, 0.5])],
        }
    }

    #[test]
    fn test_scientific_matches_c() {
        assert_eq!(format_scientific(123.456), "1.234560e+02");
        assert_eq!(format_scientific(-99.0), "-9.900000e+01");
        assert_eq!(format_scientific(1e-5), "1.000000e-05");
        assert_eq!(format_scientific(0.0), "0.000000e+00");
        assert_eq!(format_scientific(6.02e123), "6.020000e+123");
        assert_eq!(format_scientific(f64::NAN), "nan");
        assert_eq!(format_scientific(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_header_layout() {
        let header = format_header(12, CalendarDateTime::new(1980, 9, 3, 18));
        assert_eq!(header, "start   12      1980    9       3      18\n");
        let parsed = TrackHeader::parse(&header).unwrap();
        assert_eq!(parsed.length, 12);
        assert_eq!(parsed.start, CalendarDateTime::new(1980, 9, 3, 18));
    }

    #[test]
    fn test_point_line_layout() {
        let line = format_point_line(&sample_point(1));
        assert_eq!(
            line,
            "        120     77     120.500000      -12.250000       1.005120e+05    \"[1.000000e+00,5.000000e-01]\"   1980    9       1      0 \n"
        );
    }

    #[test]
    fn test_point_line_parses_back() {
        let line = format_point_line(&sample_point(3));
        let parsed = PointLine::parse(&line, &layout()).unwrap();
        assert_eq!((parsed.i, parsed.j), (120, 77));
        assert_eq!(parsed.vars, sample_point(3).vars);
        assert_eq!(parsed.time, CalendarDateTime::new(1980, 9, 1, 12));
        assert_eq!((parsed.lon, parsed.lat), (120.5, -12.25));
    }

    #[test]
    fn test_header_parse_errors() {
        assert!(TrackHeader::parse("start 3 1980 9 1").is_err());
        assert!(TrackHeader::parse("stop 3 1980 9 1 0").is_err());
        assert!(TrackHeader::parse("start x 1980 9 1 0").is_err());
        assert!(!TrackHeader::is_header("   10 20 100.0 15.0"));
    }

    #[test]
    fn test_profile_requires_brackets() {
        let line = "1 2 3.0 4.0 1.0 1.0,2.0 1980 9 1 0";
        assert!(PointLine::parse(line, &layout()).is_err());
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.txt");
        let schema = layout();
        let storm = Storm::from_points(0, schema.variables().clone(), (2..5).map(sample_point)).unwrap();

        write_track_file(&path, std::slice::from_ref(&storm), &schema).unwrap();
        let storms = read_track_file(&path, &schema, &source(), 6).unwrap();

        assert_eq!(storms.len(), 1);
        assert_eq!(storms[0], storm);
        let steps: Vec<i64> = storms[0].points().iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![2, 3, 4]);
    }

    #[test]
    fn test_read_reports_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        let good = format_point_line(&sample_point(1));
        std::fs::write(&path, format!("{}{}  1 2 3\n", format_header(2, sample_point(1).time), good)).unwrap();

        let err = read_track_file(&path, &layout(), &source(), 6).unwrap_err();
        match err {
            StitchError::TrackFileFormat { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_read_rejects_short_block_and_orphan_points() {
        let dir = tempfile::tempdir().unwrap();
        let point = format_point_line(&sample_point(1));

        let short = dir.path().join("short.txt");
        std::fs::write(&short, format!("{}{}", format_header(2, sample_point(1).time), point)).unwrap();
        assert!(matches!(
            read_track_file(&short, &layout(), &source(), 6),
            Err(StitchError::TrackFileFormat { line: 1, .. })
        ));

        let orphan = dir.path().join("orphan.txt");
        std::fs::write(&orphan, &point).unwrap();
        assert!(matches!(
            read_track_file(&orphan, &layout(), &source(), 6),
            Err(StitchError::TrackFileFormat { line: 1, .. })
        ));
    }

    #[test]
    fn test_write_rejects_foreign_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.txt");
        let storm = Storm::new(0, Arc::new(VariableSchema::default()));
        assert!(write_track_file(&path, &[storm], &layout()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_atomic_write_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.txt");
        std::fs::write(&path, "original\n").unwrap();

        let result = write_atomically(&path, |out| {
            out.write_all(b"partial")?;
            Err(StitchError::Config("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
    }
}
