//! The "MERGE" Engine - Track file reconciliation
//!
//! Applies the decisions of the OverlapDetector to the two window files:
//! 1. **Previous pass**: drop every block that is the `early` copy of a match
//! 2. **Current pass**: prepend lead-in points to blocks classified `Extend`
//!
//! Both inputs are streamed line by line; only the header of the block being
//! examined is held in memory. Every point line is parsed against the column
//! schema, but untouched lines are copied byte for byte. Both outputs are
//! staged next to their destination and only renamed into place once both
//! passes have succeeded.

use crate::overlap::{OverlapMethod, OverlapRecord};
use crate::schema::ColumnSchema;
use crate::storm::{normalize_lon, Storm};
use crate::track_file::{format_block_prefix, stage_file, PointLine, TrackHeader};
use crate::StitchError;
use cyclone_env::CalendarDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Half a unit in the sixth decimal, the precision of lon/lat in track files.
pub const POSITION_TOLERANCE: f64 = 5e-7;

// ============================================================================
// POLICY & SUMMARY
// ============================================================================

/// What to do with an `ExtendOdd` match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendOddPolicy {
    /// Leave the late block unmodified and log the anomaly
    #[default]
    Warn,

    /// Abort the window pair with `OverlapAmbiguity`
    Fatal,
}

impl FromStr for ExtendOddPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "fatal" => Ok(Self::Fatal),
            _ => Err(format!("Unknown extend_odd policy: {}. Use: warn, fatal", s)),
        }
    }
}

/// Counts of what a reconcile changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Blocks read from the previous file
    pub previous_blocks: usize,

    /// Blocks dropped from the previous file
    pub previous_dropped: usize,

    /// Blocks read from the current file
    pub current_blocks: usize,

    /// Current blocks that received lead-in points
    pub current_extended: usize,

    /// Lead-in point lines written in total
    pub lead_in_points: usize,

    /// `ExtendOdd` matches left unmodified
    pub extend_odd: usize,
}

// ============================================================================
// BLOCK STREAMING
// ============================================================================

/// Identity of a block as seen at its first point line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockKey {
    start: CalendarDateTime,
    length: usize,
    /// Folded into [0, 360) like the longitudes of a read `Storm`
    lon: f64,
    lat: f64,
}

impl BlockKey {
    fn new(header: &TrackHeader, point: &PointLine) -> Self {
        Self {
            start: header.start,
            length: header.length,
            lon: normalize_lon(point.lon),
            lat: point.lat,
        }
    }

    fn matches(&self, storm: &Storm) -> bool {
        match storm.first() {
            Some(first) => {
                let dlon = (first.lon - self.lon).abs();
                first.time == self.start
                    && storm.len() == self.length
                    && dlon.min(360.0 - dlon) <= POSITION_TOLERANCE
                    && (first.lat - self.lat).abs() <= POSITION_TOLERANCE
            }
            None => false,
        }
    }
}

/// Fate of one block.
enum BlockAction {
    Keep,
    Drop,
    /// Replace the header and insert lines before the first point
    Prepend { header: String, lines: Vec<String> },
}

/// Block currently being copied.
struct OpenBlock {
    header: TrackHeader,
    header_line: usize,
    /// Raw header text plus blank lines seen before the first point
    held: String,
    /// Blank lines only, kept apart from the header in case it is replaced
    held_blanks: String,
    points: usize,
    action: Option<BlockAction>,
}

impl OpenBlock {
    fn close(self, path: &Path, out: &mut dyn Write) -> Result<(), StitchError> {
        if self.points != self.header.length {
            return Err(StitchError::format(
                path,
                self.header_line,
                format!("header announces {} points, block has {}", self.header.length, self.points),
            ));
        }
        // A block without points is never examined and stays as it was
        if self.action.is_none() {
            out.write_all(self.held.as_bytes())?;
        }
        Ok(())
    }
}

/// Copy `input` into `out` block by block, letting `decide` pick each
/// block's fate at its first point line. Returns the number of blocks.
fn rewrite_blocks<F>(
    input: &Path,
    schema: &ColumnSchema,
    out: &mut dyn Write,
    mut decide: F,
) -> Result<usize, StitchError>
where
    F: FnMut(&BlockKey) -> Result<BlockAction, StitchError>,
{
    let mut reader = BufReader::new(File::open(input)?);
    let mut line = String::new();
    let mut line_no = 0usize;
    let mut blocks = 0usize;
    let mut open: Option<OpenBlock> = None;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;

        if line.trim().is_empty() {
            match open.as_mut() {
                Some(block) if block.action.is_none() => {
                    block.held.push_str(&line);
                    block.held_blanks.push_str(&line);
                }
                Some(OpenBlock { action: Some(BlockAction::Drop), .. }) => {}
                _ => out.write_all(line.as_bytes())?,
            }
            continue;
        }

        if TrackHeader::is_header(&line) {
            if let Some(block) = open.take() {
                block.close(input, out)?;
            }
            let header = TrackHeader::parse(&line).map_err(|reason| StitchError::format(input, line_no, reason))?;
            blocks += 1;
            open = Some(OpenBlock {
                header,
                header_line: line_no,
                held: line.clone(),
                held_blanks: String::new(),
                points: 0,
                action: None,
            });
            continue;
        }

        let block = open
            .as_mut()
            .ok_or_else(|| StitchError::format(input, line_no, "point line before any header"))?;
        let point = PointLine::parse(&line, schema).map_err(|reason| StitchError::format(input, line_no, reason))?;
        block.points += 1;
        if block.points > block.header.length {
            return Err(StitchError::format(
                input,
                line_no,
                format!(
                    "block starting at line {} announces {} points",
                    block.header_line, block.header.length
                ),
            ));
        }

        if block.action.is_some() {
            if !matches!(block.action, Some(BlockAction::Drop)) {
                out.write_all(line.as_bytes())?;
            }
            continue;
        }

        let action = decide(&BlockKey::new(&block.header, &point))?;
        match &action {
            BlockAction::Keep => {
                out.write_all(block.held.as_bytes())?;
                out.write_all(line.as_bytes())?;
            }
            BlockAction::Drop => {}
            BlockAction::Prepend { header, lines } => {
                out.write_all(header.as_bytes())?;
                for lead_in in lines {
                    out.write_all(lead_in.as_bytes())?;
                }
                out.write_all(block.held_blanks.as_bytes())?;
                out.write_all(line.as_bytes())?;
            }
        }
        block.action = Some(action);
    }

    if let Some(block) = open.take() {
        block.close(input, out)?;
    }
    Ok(blocks)
}

// ============================================================================
// MERGER
// ============================================================================

/// Rewrites the previous and current track files of a window pair.
#[derive(Debug, Clone)]
pub struct TrackFileMerger {
    schema: ColumnSchema,
    policy: ExtendOddPolicy,
}

impl TrackFileMerger {
    pub fn new(schema: ColumnSchema) -> Self {
        Self {
            schema,
            policy: ExtendOddPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExtendOddPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ExtendOddPolicy {
        self.policy
    }

    /// Write `previous_out` and `current_out` from their inputs according
    /// to `records`.
    ///
    /// Neither output is touched unless both files are rewritten
    /// successfully. The two renames that publish them are separate steps:
    /// if the second one fails, `previous_out` has already been replaced.
    pub fn reconcile(
        &self,
        previous_in: &Path,
        current_in: &Path,
        previous_out: &Path,
        current_out: &Path,
        records: &[OverlapRecord],
    ) -> Result<MergeSummary, StitchError> {
        for record in records {
            if record.early.schema().as_ref() != self.schema.variables().as_ref() {
                return Err(StitchError::malformed(format!(
                    "early track {} variables do not match the column schema",
                    record.early.track_id()
                )));
            }
        }

        let mut summary = MergeSummary::default();

        let staged_previous = stage_file(previous_out, |out| {
            let blocks = rewrite_blocks(previous_in, &self.schema, out, |key| {
                if records.iter().any(|record| key.matches(&record.early)) {
                    debug!("Dropping previous block starting {} ({} points)", key.start, key.length);
                    summary.previous_dropped += 1;
                    Ok(BlockAction::Drop)
                } else {
                    Ok(BlockAction::Keep)
                }
            })?;
            summary.previous_blocks = blocks;
            Ok(())
        })?;

        let staged_current = stage_file(current_out, |out| {
            let blocks = rewrite_blocks(current_in, &self.schema, out, |key| {
                let Some(record) = records.iter().find(|record| key.matches(&record.late)) else {
                    return Ok(BlockAction::Keep);
                };
                self.current_action(key, record, &mut summary)
            })?;
            summary.current_blocks = blocks;
            Ok(())
        })?;

        staged_previous.persist(previous_out).map_err(|err| err.error)?;
        staged_current.persist(current_out).map_err(|err| err.error)?;

        info!(
            "Reconciled {} records: dropped {}/{} previous blocks, extended {}/{} current blocks",
            records.len(),
            summary.previous_dropped,
            summary.previous_blocks,
            summary.current_extended,
            summary.current_blocks
        );
        Ok(summary)
    }

    fn current_action(
        &self,
        key: &BlockKey,
        record: &OverlapRecord,
        summary: &mut MergeSummary,
    ) -> Result<BlockAction, StitchError> {
        match record.method {
            OverlapMethod::Remove => Ok(BlockAction::Keep),
            OverlapMethod::Extend => {
                let lead_in = usize::try_from(record.offset).map_err(|_| {
                    StitchError::malformed(format!("extend record with negative offset {}", record.offset))
                })?;
                let (header, lines) = format_block_prefix(&record.early, lead_in, key.length + lead_in)?;
                debug!(
                    "Extending current block starting {} by {} points from early track {}",
                    key.start,
                    lead_in,
                    record.early.track_id()
                );
                summary.current_extended += 1;
                summary.lead_in_points += lead_in;
                Ok(BlockAction::Prepend { header, lines })
            }
            OverlapMethod::ExtendOdd => match self.policy {
                ExtendOddPolicy::Warn => {
                    warn!(
                        "Early track {} ({} points) outlasts late track starting {} ({} points); leaving it unmodified",
                        record.early.track_id(),
                        record.early.len(),
                        key.start,
                        record.late.len()
                    );
                    summary.extend_odd += 1;
                    Ok(BlockAction::Keep)
                }
                ExtendOddPolicy::Fatal => Err(StitchError::OverlapAmbiguity {
                    start: key.start,
                    early_len: record.early.len(),
                    late_len: record.late.len(),
                }),
            },
        }
    }
}

/// Reconcile with the default `ExtendOddPolicy`.
pub fn reconcile(
    previous_in: &Path,
    current_in: &Path,
    previous_out: &Path,
    current_out: &Path,
    records: &[OverlapRecord],
    schema: &ColumnSchema,
) -> Result<MergeSummary, StitchError> {
    TrackFileMerger::new(schema.clone()).reconcile(previous_in, current_in, previous_out, current_out, records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::OverlapDetector;
    use crate::storm::{AuxValue, TrackPoint};
    use crate::track_file::{format_header, format_point_line, read_track_file, write_track_file};
    use cyclone_env::{Calendar, GridSource};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const ORIGIN: CalendarDateTime = CalendarDateTime {
        year: 1980,
        month: 9,
        day: 1,
        hour: 0,
    };

    fn layout() -> ColumnSchema {
        let names = ["i", "j", "lon", "lat", "psl", "year", "month", "day", "hour"];
        ColumnSchema::from_ordered(names.iter().map(|s| s.to_string()).collect(), &[]).unwrap()
    }

    /// Source whose first time is `ORIGIN + 6 h * (first_step - 1)`.
    fn source(first_step: i64) -> GridSource {
        let start = Calendar::Standard.add_hours(ORIGIN, 6 * (first_step - 1)).unwrap();
        GridSource::regular(Calendar::Standard, vec![20, 180, 360], start, 6, 20).unwrap()
    }

    /// Storm on the absolute step range `[from, to]`, ids local to the window.
    fn storm(track_id: usize, from: i64, to: i64, lon0: f64) -> Storm {
        let points = (from..=to).map(|s| TrackPoint {
            time: Calendar::Standard.add_hours(ORIGIN, 6 * (s - 1)).unwrap(),
            lon: lon0 + 0.25 * s as f64,
            lat: 14.0 + 0.125 * s as f64,
            i: 200 + s,
            j: 100 + s,
            step: s,
            track_id,
            vars: vec![AuxValue::Scalar(101_000.0 - 100.0 * s as f64)],
        });
        Storm::from_points(track_id, layout().variables().clone(), points).unwrap()
    }

    struct Pair {
        _dir: TempDir,
        previous_in: PathBuf,
        current_in: PathBuf,
        previous_out: PathBuf,
        current_out: PathBuf,
    }

    fn pair(previous: &[Storm], current: &[Storm]) -> Pair {
        let dir = tempfile::tempdir().unwrap();
        let pair = Pair {
            previous_in: dir.path().join("prev.txt"),
            current_in: dir.path().join("curr.txt"),
            previous_out: dir.path().join("prev_adjust.txt"),
            current_out: dir.path().join("curr_adjust.txt"),
            _dir: dir,
        };
        write_track_file(&pair.previous_in, previous, &layout()).unwrap();
        write_track_file(&pair.current_in, current, &layout()).unwrap();
        pair
    }

    fn run(pair: &Pair, records: &[OverlapRecord], policy: ExtendOddPolicy) -> Result<MergeSummary, StitchError> {
        TrackFileMerger::new(layout()).with_policy(policy).reconcile(
            &pair.previous_in,
            &pair.current_in,
            &pair.previous_out,
            &pair.current_out,
            records,
        )
    }

    #[test]
    fn test_zero_records_copies_both_files() {
        let files = pair(&[storm(0, 1, 5, 100.0)], &[storm(0, 9, 12, 50.0)]);
        let summary = run(&files, &[], ExtendOddPolicy::Warn).unwrap();

        assert_eq!(std::fs::read(&files.previous_in).unwrap(), std::fs::read(&files.previous_out).unwrap());
        assert_eq!(std::fs::read(&files.current_in).unwrap(), std::fs::read(&files.current_out).unwrap());
        assert_eq!(summary.previous_blocks, 1);
        assert_eq!(summary.current_blocks, 1);
        assert_eq!(summary.previous_dropped, 0);
    }

    #[test]
    fn test_extend_prepends_lead_in_points() {
        let previous = vec![storm(0, 1, 5, 100.0), storm(1, 2, 4, 200.0)];
        let current = vec![storm(0, 4, 8, 100.0), storm(1, 6, 9, 300.0)];
        let files = pair(&previous, &current);

        let records = OverlapDetector::default().detect(&previous, &current);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, OverlapMethod::Extend);
        assert_eq!(records[0].offset, 3);

        let summary = run(&files, &records, ExtendOddPolicy::Warn).unwrap();
        assert_eq!(summary.previous_dropped, 1);
        assert_eq!(summary.current_extended, 1);
        assert_eq!(summary.lead_in_points, 3);

        // Only the unmatched early storm survives in the previous file
        let remaining = read_track_file(&files.previous_out, &layout(), &source(1), 6).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].first().unwrap().lon, 200.5);

        let text = std::fs::read_to_string(&files.current_out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), format_header(8, ORIGIN).trim_end_matches('\n'));
        for point in &previous[0].points()[..3] {
            assert_eq!(lines.next().unwrap(), format_point_line(point).trim_end_matches('\n'));
        }

        let extended = read_track_file(&files.current_out, &layout(), &source(1), 6).unwrap();
        assert_eq!(extended.len(), 2);
        let steps: Vec<i64> = extended[0].points().iter().map(|p| p.step).collect();
        assert_eq!(steps, (1..=8).collect::<Vec<_>>());
        assert_eq!(extended[1].len(), 4);
    }

    #[test]
    fn test_remove_keeps_current_block() {
        let previous = vec![storm(0, 1, 6, 100.0)];
        let current = vec![storm(0, 1, 6, 100.0)];
        let files = pair(&previous, &current);
        let records = OverlapDetector::default().detect(&previous, &current);
        assert_eq!(records[0].method, OverlapMethod::Remove);

        let summary = run(&files, &records, ExtendOddPolicy::Warn).unwrap();
        assert_eq!(summary.previous_dropped, 1);
        assert_eq!(summary.current_extended, 0);
        assert_eq!(std::fs::read_to_string(&files.previous_out).unwrap(), "");
        assert_eq!(std::fs::read(&files.current_in).unwrap(), std::fs::read(&files.current_out).unwrap());
    }

    #[test]
    fn test_extend_odd_fatal_writes_nothing() {
        let previous = vec![storm(0, 1, 8, 100.0)];
        let current = vec![storm(0, 1, 4, 100.0)];
        let files = pair(&previous, &current);
        let records = OverlapDetector::default().detect(&previous, &current);
        assert_eq!(records[0].method, OverlapMethod::ExtendOdd);

        let err = run(&files, &records, ExtendOddPolicy::Fatal).unwrap_err();
        assert!(matches!(err, StitchError::OverlapAmbiguity { early_len: 8, late_len: 4, .. }));
        assert!(!files.previous_out.exists());
        assert!(!files.current_out.exists());
    }

    #[test]
    fn test_extend_odd_warn_leaves_current_unmodified() {
        let previous = vec![storm(0, 1, 8, 100.0)];
        let current = vec![storm(0, 1, 4, 100.0)];
        let files = pair(&previous, &current);
        let records = OverlapDetector::default().detect(&previous, &current);

        let summary = run(&files, &records, ExtendOddPolicy::Warn).unwrap();
        assert_eq!(summary.extend_odd, 1);
        assert_eq!(std::fs::read(&files.current_in).unwrap(), std::fs::read(&files.current_out).unwrap());
    }

    #[test]
    fn test_blank_lines_are_preserved() {
        let files = pair(&[storm(0, 1, 2, 100.0)], &[]);
        let original = std::fs::read_to_string(&files.previous_in).unwrap();
        let spaced = format!("\n{}\n", original.replacen('\n', "\n\n", 1));
        std::fs::write(&files.previous_in, &spaced).unwrap();

        run(&files, &[], ExtendOddPolicy::Warn).unwrap();
        assert_eq!(std::fs::read_to_string(&files.previous_out).unwrap(), spaced);
    }

    #[test]
    fn test_malformed_blocks_are_rejected() {
        let files = pair(&[storm(0, 1, 3, 100.0)], &[]);
        let text = std::fs::read_to_string(&files.previous_in).unwrap();

        let truncated: String = text.lines().take(3).map(|l| format!("{l}\n")).collect();
        std::fs::write(&files.previous_in, truncated).unwrap();
        let err = run(&files, &[], ExtendOddPolicy::Warn).unwrap_err();
        assert!(matches!(err, StitchError::TrackFileFormat { line: 1, .. }));

        let headless: String = text.lines().skip(1).map(|l| format!("{l}\n")).collect();
        std::fs::write(&files.previous_in, headless).unwrap();
        let err = run(&files, &[], ExtendOddPolicy::Warn).unwrap_err();
        assert!(matches!(err, StitchError::TrackFileFormat { line: 1, .. }));
        assert!(!files.previous_out.exists());
    }

    #[test]
    fn test_bad_point_lines_are_rejected() {
        let files = pair(&[storm(0, 1, 3, 100.0)], &[]);
        let text = std::fs::read_to_string(&files.previous_in).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        // Second point cut down to six fields, third point not a point at all
        let short: Vec<&str> = lines[2].split_whitespace().take(6).collect();
        let corrupt = format!("{}\n{}\n{}\nhello\n", lines[0], lines[1], short.join(" "));
        std::fs::write(&files.previous_in, corrupt).unwrap();

        let err = reconcile(
            &files.previous_in,
            &files.current_in,
            &files.previous_out,
            &files.current_out,
            &[],
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, StitchError::TrackFileFormat { line: 3, .. }));
        assert!(!files.previous_out.exists());

        let unparsable = format!("{}\n{}\n{}\n", lines[0], lines[1], lines[2].replacen("1980", "year", 1));
        std::fs::write(&files.previous_in, format!("{unparsable}{}\n", lines[3])).unwrap();
        let err = run(&files, &[], ExtendOddPolicy::Warn).unwrap_err();
        assert!(matches!(err, StitchError::TrackFileFormat { line: 3, .. }));
    }

    #[test]
    fn test_block_at_seam_longitude_is_matched() {
        // First point sits exactly on 360 in the file; the read storm holds 0
        let points: Vec<TrackPoint> = storm(0, 1, 3, 359.75).points().to_vec();
        let mut text = format_header(points.len(), points[0].time);
        for (n, point) in points.iter().enumerate() {
            let mut written = point.clone();
            if n == 0 {
                written.lon = 360.0;
            }
            text.push_str(&format_point_line(&written));
        }
        assert!(text.contains("360.000000"));

        let files = pair(&[], &[]);
        std::fs::write(&files.previous_in, &text).unwrap();
        std::fs::write(&files.current_in, &text).unwrap();

        let previous = read_track_file(&files.previous_in, &layout(), &source(1), 6).unwrap();
        let current = read_track_file(&files.current_in, &layout(), &source(1), 6).unwrap();
        assert_eq!(previous[0].first().unwrap().lon, 0.0);
        let records = OverlapDetector::default().detect(&previous, &current);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, OverlapMethod::Remove);

        let summary = run(&files, &records, ExtendOddPolicy::Warn).unwrap();
        assert_eq!(summary.previous_dropped, 1);
        assert_eq!(std::fs::read_to_string(&files.previous_out).unwrap(), "");
        assert_eq!(std::fs::read_to_string(&files.current_out).unwrap(), text);
    }

    #[test]
    fn test_failed_publish_reports_io_error() {
        let files = pair(&[storm(0, 1, 3, 100.0)], &[storm(0, 4, 6, 100.0)]);
        // A directory in the way makes the second rename fail
        std::fs::create_dir(&files.current_out).unwrap();

        let err = run(&files, &[], ExtendOddPolicy::Warn).unwrap_err();
        assert!(matches!(err, StitchError::Io(_)));
        assert!(files.current_out.is_dir());
        assert_eq!(std::fs::read(&files.previous_in).unwrap(), std::fs::read(&files.previous_out).unwrap());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("warn".parse::<ExtendOddPolicy>().unwrap(), ExtendOddPolicy::Warn);
        assert_eq!("FATAL".parse::<ExtendOddPolicy>().unwrap(), ExtendOddPolicy::Fatal);
        assert!("ignore".parse::<ExtendOddPolicy>().is_err());
    }
}
