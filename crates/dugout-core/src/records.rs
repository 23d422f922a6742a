// Per-season stat record loading.
//
// Reads FanGraphs-style CSV exports: one row per (Name, Season, Team) with an
// arbitrary set of stat columns. Only the columns a pipeline asks for are
// parsed; percentage cells ("12.5%") are stripped of their suffix first.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

pub const NAME_COLUMN: &str = "Name";
pub const SEASON_COLUMN: &str = "Season";
pub const TEAM_COLUMN: &str = "Team";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Identity of an entity: one player in one season.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub name: String,
    pub season: i32,
}

impl EntityKey {
    pub fn new(name: impl Into<String>, season: i32) -> Self {
        Self {
            name: name.into(),
            season,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.season)
    }
}

/// One unnormalized CSV row.
///
/// `stats` holds only the requested columns that exist in the file. A `None`
/// value is a missing cell; a column absent from the map was never in the
/// header at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    pub name: String,
    pub season: i32,
    pub team: String,
    pub stats: BTreeMap<String, Option<f64>>,
}

impl StatRecord {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.name.clone(), self.season)
    }

    pub fn matches(&self, key: &EntityKey) -> bool {
        self.season == key.season && self.name == key.name
    }

    /// The parsed value of a column, or `None` if missing or not loaded.
    pub fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied().flatten()
    }
}

/// Which columns to parse, and how strictly.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub columns: Vec<String>,
    /// Turn unparseable cells into missing values instead of failing.
    pub coerce_invalid: bool,
}

impl LoadOptions {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            coerce_invalid: false,
        }
    }

    pub fn coerce_invalid(mut self, coerce: bool) -> Self {
        self.coerce_invalid = coerce;
        self
    }
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// Parse a stat cell.
///
/// Returns `Ok(None)` for an empty / NA cell and `Err(())` when the cell has
/// content that is not a finite number after quote and `%` stripping.
fn parse_stat_cell(raw: &str) -> std::result::Result<Option<f64>, ()> {
    let cell = raw.trim().trim_matches('"').trim();
    if cell.is_empty()
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("null")
    {
        return Ok(None);
    }
    let cell = cell.strip_suffix('%').unwrap_or(cell).trim_end();
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(v) if v.is_nan() => Ok(None),
        _ => Err(()),
    }
}

fn parse_season(raw: &str) -> Option<i32> {
    let cell = raw.trim().trim_matches('"').trim();
    if let Ok(year) = cell.parse::<i32>() {
        return Some(year);
    }
    // Spreadsheet exports sometimes write seasons as 2022.0
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i32)
}

fn clean_text(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

// ---------------------------------------------------------------------------
// Reader-based loader (enables testing without temp files)
// ---------------------------------------------------------------------------

pub fn load_records_from_reader<R: Read>(
    rdr: R,
    source: &str,
    options: &LoadOptions,
) -> Result<Vec<StatRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let csv_err = |e: csv::Error| AnalysisError::Csv {
        path: source.to_string(),
        source: e,
    };

    let headers = reader.headers().map_err(csv_err)?.clone();
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (clean_text(h), i))
        .collect();

    let name_idx = *index.get(NAME_COLUMN).ok_or_else(|| {
        AnalysisError::validation(format!("{source}: missing `{NAME_COLUMN}` column"))
    })?;
    let season_idx = *index.get(SEASON_COLUMN).ok_or_else(|| {
        AnalysisError::validation(format!("{source}: missing `{SEASON_COLUMN}` column"))
    })?;
    let team_idx = index.get(TEAM_COLUMN).copied();

    let mut stat_columns = Vec::with_capacity(options.columns.len());
    for column in &options.columns {
        match index.get(column.as_str()) {
            Some(&i) => stat_columns.push((column.as_str(), i)),
            None => warn!("{}: requested column `{}` not in header", source, column),
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        let name = clean_text(row.get(name_idx).unwrap_or(""));
        if name.is_empty() {
            warn!("{}: skipping row at line {}: empty name", source, line);
            continue;
        }
        let Some(season) = row.get(season_idx).and_then(parse_season) else {
            warn!("{}: skipping '{}' at line {}: unreadable season", source, name, line);
            continue;
        };
        let team = team_idx
            .and_then(|i| row.get(i))
            .map(clean_text)
            .unwrap_or_default();

        let mut stats = BTreeMap::new();
        for &(column, i) in &stat_columns {
            let raw = row.get(i).unwrap_or("");
            let value = match parse_stat_cell(raw) {
                Ok(v) => v,
                Err(()) if options.coerce_invalid => {
                    debug!("{}: coercing {:?} in `{}` to missing", source, raw, column);
                    None
                }
                Err(()) => {
                    return Err(AnalysisError::Parse {
                        column: column.to_string(),
                        line,
                        value: raw.to_string(),
                    })
                }
            };
            stats.insert(column.to_string(), value);
        }

        records.push(StatRecord {
            name,
            season,
            team,
            stats,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Public path-based loader
// ---------------------------------------------------------------------------

/// Load stat records from a CSV file. An input with zero usable rows is a
/// validation error since nothing downstream can run on it.
pub fn load_records(path: &Path, options: &LoadOptions) -> Result<Vec<StatRecord>> {
    let source = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| AnalysisError::Io {
        path: source.clone(),
        source: e,
    })?;
    let records = load_records_from_reader(file, &source, options)?;
    if records.is_empty() {
        return Err(AnalysisError::validation(format!(
            "{source} produced zero valid rows"
        )));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Record-set helpers
// ---------------------------------------------------------------------------

/// Keep only the rows for one team code.
pub fn filter_team(records: &[StatRecord], team: &str) -> Vec<StatRecord> {
    records
        .iter()
        .filter(|r| r.team == team)
        .cloned()
        .collect()
}

/// First row matching a key. Duplicate keys (a player traded mid-season)
/// resolve to the earliest row.
pub fn find_record<'a>(records: &'a [StatRecord], key: &EntityKey) -> Option<&'a StatRecord> {
    records.iter().find(|r| r.matches(key))
}

/// Mean of the observed values of a column, skipping missing cells.
pub fn column_mean(records: &[StatRecord], column: &str) -> Option<f64> {
    let values: Vec<f64> = records.iter().filter_map(|r| r.stat(column)).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Number of distinct seasons a player appears in.
pub fn distinct_seasons(records: &[StatRecord], name: &str) -> usize {
    records
        .iter()
        .filter(|r| r.name == name)
        .map(|r| r.season)
        .collect::<BTreeSet<_>>()
        .len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn load(csv_data: &str, columns: &[&str]) -> Result<Vec<StatRecord>> {
        load_records_from_reader(csv_data.as_bytes(), "test.csv", &LoadOptions::new(columns.iter().copied()))
    }

    #[test]
    fn loads_requested_columns() {
        let csv_data = "\
Season,Name,Team,PA,WAR,pythW,WARSHARE
2022,Chris Taylor,LAD,454,1.2,111,0.021
2023,Brent Rooker,OAK,526,2.3,50,0.146";

        let records = load(csv_data, &["PA", "WAR"]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Chris Taylor");
        assert_eq!(records[0].season, 2022);
        assert_eq!(records[0].team, "LAD");
        assert_eq!(records[0].stat("PA"), Some(454.0));
        assert_eq!(records[1].stat("WAR"), Some(2.3));
        // Not requested, so not loaded.
        assert!(!records[0].stats.contains_key("pythW"));
    }

    #[test]
    fn percentage_cells_are_stripped() {
        let csv_data = "\
Season,Name,Team,K-BB%,GB%
2024,Tarik Skubal,DET,24.6%,43.1 %";

        let records = load(csv_data, &["K-BB%", "GB%"]).unwrap();
        assert_eq!(records[0].stat("K-BB%"), Some(24.6));
        assert_eq!(records[0].stat("GB%"), Some(43.1));
    }

    #[test]
    fn quoted_cells_are_cleaned() {
        let csv_data = "Season,Name,Team,WAR\n2001,\"\"\"Barry Bonds\"\"\",SFG,\"\"\"11.9\"\"\"";
        let records = load(csv_data, &["WAR"]).unwrap();
        assert_eq!(records[0].name, "Barry Bonds");
        assert_eq!(records[0].stat("WAR"), Some(11.9));
    }

    #[test]
    fn empty_and_na_cells_are_missing() {
        let csv_data = "\
Season,Name,Team,PA,WAR
2020,A,OAK,,NA
2021,B,OAK,100,NaN";

        let records = load(csv_data, &["PA", "WAR"]).unwrap();
        assert_eq!(records[0].stats.get("PA"), Some(&None));
        assert_eq!(records[0].stat("WAR"), None);
        assert_eq!(records[1].stat("PA"), Some(100.0));
        assert_eq!(records[1].stat("WAR"), None);
    }

    #[test]
    fn non_numeric_cell_is_parse_error() {
        let csv_data = "\
Season,Name,Team,GB%
2024,Good,NYY,40%
2024,Bad,NYY,forty%";

        let err = load(csv_data, &["GB%"]).unwrap_err();
        match err {
            AnalysisError::Parse {
                column,
                line,
                value,
            } => {
                assert_eq!(column, "GB%");
                assert_eq!(line, 3);
                assert_eq!(value, "forty%");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn coerce_turns_bad_cells_into_missing() {
        let csv_data = "\
Season,Name,Team,PA
2024,Bad,NYY,n/a";

        let options = LoadOptions::new(["PA"]).coerce_invalid(true);
        let records = load_records_from_reader(csv_data.as_bytes(), "t", &options).unwrap();
        assert_eq!(records[0].stats.get("PA"), Some(&None));
    }

    #[test]
    fn missing_requested_column_is_absent_not_error() {
        let csv_data = "\
Season,Name,Team,PA
2024,A,NYY,10";

        let records = load(csv_data, &["PA", "WARSHARE"]).unwrap();
        assert!(!records[0].stats.contains_key("WARSHARE"));
    }

    #[test]
    fn missing_name_column_is_validation_error() {
        let csv_data = "Season,Team,PA\n2024,NYY,10";
        assert!(matches!(
            load(csv_data, &["PA"]),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn rows_without_name_or_season_are_skipped() {
        let csv_data = "\
Season,Name,Team,PA
2024,,NYY,10
abc,Someone,NYY,10
2023.0,Valid,NYY,10";

        let records = load(csv_data, &["PA"]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Valid");
        assert_eq!(records[0].season, 2023);
    }

    #[test]
    fn names_and_teams_trimmed() {
        let csv_data = "\
Season,Name,Team,PA
2024,  Aaron Judge  , NYY ,700";

        let records = load(csv_data, &["PA"]).unwrap();
        assert_eq!(records[0].name, "Aaron Judge");
        assert_eq!(records[0].team, "NYY");
    }

    #[test]
    fn load_records_rejects_empty_file() {
        let path = std::env::temp_dir().join("dugout_records_empty.csv");
        std::fs::write(&path, "Season,Name,Team,PA\n").unwrap();
        let err = load_records(&path, &LoadOptions::new(["PA"])).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_records_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("dugout_does_not_exist.csv");
        let err = load_records(&path, &LoadOptions::new(["PA"])).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    // -- Helpers --

    fn sample() -> Vec<StatRecord> {
        let csv_data = "\
Season,Name,Team,PA,WAR
2019,Matt Chapman,OAK,670,6.1
2020,Matt Chapman,OAK,,1.5
2021,Matt Chapman,OAK,622,3.8
2021,Matt Olson,OAK,673,5.1
2021,Max Muncy,LAD,592,4.4";
        load(csv_data, &["PA", "WAR"]).unwrap()
    }

    #[test]
    fn filter_team_keeps_matching_rows() {
        let oak = filter_team(&sample(), "OAK");
        assert_eq!(oak.len(), 4);
        assert!(oak.iter().all(|r| r.team == "OAK"));
    }

    #[test]
    fn find_record_by_key() {
        let records = sample();
        let found = find_record(&records, &EntityKey::new("Matt Chapman", 2021)).unwrap();
        assert_eq!(found.stat("PA"), Some(622.0));
        assert!(find_record(&records, &EntityKey::new("Matt Chapman", 2018)).is_none());
    }

    #[test]
    fn column_mean_skips_missing() {
        let records = sample();
        let mean = column_mean(&records, "PA").unwrap();
        assert!((mean - (670.0 + 622.0 + 673.0 + 592.0) / 4.0).abs() < 1e-9);
        assert!(column_mean(&records, "pythW").is_none());
    }

    #[test]
    fn distinct_seasons_counts_per_name() {
        let records = sample();
        assert_eq!(distinct_seasons(&records, "Matt Chapman"), 3);
        assert_eq!(distinct_seasons(&records, "Matt Olson"), 1);
        assert_eq!(distinct_seasons(&records, "Nobody"), 0);
    }

    #[test]
    fn entity_key_display() {
        assert_eq!(EntityKey::new("Barry Bonds", 2001).to_string(), "Barry Bonds (2001)");
    }
}
