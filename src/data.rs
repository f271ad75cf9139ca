use crate::config::ColumnConfig;
use crate::types::{RosterEntry, School};
use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use geo::Point;
use std::fs::{self, File};
use std::path::Path;
use tracing::{error, info};

/// Logs each required file as found or missing and fails on the first
/// missing one, before anything is read or written.
pub fn check_required_files(files: &[(&str, &Path)]) -> Result<()> {
    info!("Checking for required files...");
    for (kind, path) in files {
        if path.exists() {
            info!("Found {} file: {:?}", kind, path);
        } else {
            let cwd = std::env::current_dir().unwrap_or_default();
            error!("Missing {} file: {:?} (working directory: {:?})", kind, path, cwd);
            bail!("Required {} file not found: {:?}", kind, path);
        }
    }
    Ok(())
}

/// A school spreadsheet kept column-for-column so it can be written back
/// with only the coordinate cells changed.
#[derive(Debug, Clone)]
pub struct SchoolTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    id_col: Option<usize>,
    name_col: Option<usize>,
    lat_col: usize,
    lon_col: usize,
    columns: ColumnConfig,
}

impl SchoolTable {
    pub fn load(path: &Path, columns: &ColumnConfig) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open school table: {:?}", path))?;
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read headers of {:?}", path))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.with_context(|| format!("Malformed row in {:?}", path))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let table = Self::from_parts(headers, rows, columns)
            .with_context(|| format!("Cannot keep every column of {:?}", path))?;
        info!("Loaded {} schools from {:?}", table.len(), path);
        Ok(table)
    }

    /// Builds a table from raw cells, padding short rows and appending the
    /// coordinate columns when the header lacks them. A row with more cells
    /// than the header is an error, since those cells have no column to be
    /// written back under.
    pub fn from_parts(mut headers: Vec<String>, mut rows: Vec<Vec<String>>, columns: &ColumnConfig) -> Result<Self> {
        let width = headers.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, row)| row.len() > width) {
            bail!(
                "Data row {} has {} cells but the header has {} columns",
                idx + 1,
                row.len(),
                width
            );
        }

        let position = |headers: &[String], name: &str| headers.iter().position(|h| h == name);

        let lat_col = match position(&headers, &columns.latitude) {
            Some(idx) => idx,
            None => {
                headers.push(columns.latitude.clone());
                headers.len() - 1
            }
        };
        let lon_col = match position(&headers, &columns.longitude) {
            Some(idx) => idx,
            None => {
                headers.push(columns.longitude.clone());
                headers.len() - 1
            }
        };

        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }

        Ok(Self {
            id_col: position(&headers, &columns.school_id),
            name_col: position(&headers, &columns.search_name),
            headers,
            rows,
            lat_col,
            lon_col,
            columns: columns.clone(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let mut wtr = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("Failed to create school table: {:?}", path))?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        info!("Saved {} schools to {:?}", self.len(), path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fails unless the school id column is present.
    pub fn require_id_column(&self) -> Result<()> {
        self.id_col
            .map(|_| ())
            .ok_or_else(|| anyhow!("Column '{}' not found in school table", self.columns.school_id))
    }

    /// Fails unless the search name column is present.
    pub fn require_name_column(&self) -> Result<()> {
        self.name_col
            .map(|_| ())
            .ok_or_else(|| anyhow!("Column '{}' not found in school table", self.columns.search_name))
    }

    pub fn id(&self, row: usize) -> Option<&str> {
        self.id_col.map(|idx| self.rows[row][idx].as_str())
    }

    pub fn search_name(&self, row: usize) -> Option<&str> {
        self.name_col
            .map(|idx| self.rows[row][idx].trim())
            .filter(|name| !name.is_empty())
    }

    pub fn location(&self, row: usize) -> Option<Point<f64>> {
        let lat = parse_coordinate(&self.rows[row][self.lat_col])?;
        let lon = parse_coordinate(&self.rows[row][self.lon_col])?;
        Some(Point::new(lon, lat))
    }

    pub fn set_location(&mut self, row: usize, location: Option<Point<f64>>) {
        let (lat, lon) = match location {
            Some(pt) => (pt.y().to_string(), pt.x().to_string()),
            None => (String::new(), String::new()),
        };
        self.rows[row][self.lat_col] = lat;
        self.rows[row][self.lon_col] = lon;
    }

    pub fn schools(&self) -> Result<Vec<School>> {
        self.require_id_column()?;
        Ok((0..self.len())
            .map(|row| School {
                id: self.id(row).unwrap_or_default().to_string(),
                name: self.search_name(row).map(str::to_string),
                location: self.location(row),
            })
            .collect())
    }
}

/// Empty, `NaN` and non-numeric cells all read as missing.
pub fn parse_coordinate(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn load_roster(path: &Path, columns: &ColumnConfig) -> Result<Vec<RosterEntry>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open roster CSV: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = rdr.headers()?.clone();

    let id_idx = headers
        .iter()
        .position(|h| h == columns.roster_school_id)
        .ok_or_else(|| anyhow!("Column '{}' not found in roster", columns.roster_school_id))?;
    let group_idx = headers.iter().position(|h| h == columns.member_group);

    let mut entries = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed row in {:?}", path))?;
        let school_id = record.get(id_idx).unwrap_or("").trim();
        if school_id.is_empty() {
            continue;
        }
        let member_group = group_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or("")
            .to_string();
        entries.push(RosterEntry {
            school_id: school_id.to_string(),
            member_group,
        });
    }

    info!("Loaded {} teacher records from {:?}", entries.len(), path);
    Ok(entries)
}

#[cfg(test)]
impl SchoolTable {
    pub(crate) fn headers(&self) -> &[String] {
        &self.headers
    }

    pub(crate) fn row(&self, row: usize) -> &[String] {
        &self.rows[row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn coordinate_cells() {
        assert_eq!(parse_coordinate(" 40.75 "), Some(40.75));
        assert_eq!(parse_coordinate(""), None);
        assert_eq!(parse_coordinate("NaN"), None);
        assert_eq!(parse_coordinate("nan"), None);
        assert_eq!(parse_coordinate("n/a"), None);
    }

    #[test]
    fn load_appends_missing_coordinate_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "schools.csv", "school_id,search_name,borough\nM015,PS 15,M\n");

        let table = SchoolTable::load(&path, &ColumnConfig::default()).unwrap();
        assert_eq!(table.headers(), ["school_id", "search_name", "borough", "Latitude", "Longitude"]);
        assert_eq!(table.row(0), ["M015", "PS 15", "M", "", ""]);
        assert_eq!(table.location(0), None);
        assert_eq!(table.search_name(0), Some("PS 15"));
    }

    #[test]
    fn one_missing_coordinate_means_no_location() {
        let table = SchoolTable::from_parts(
            vec!["school_id".into(), "Latitude".into(), "Longitude".into()],
            vec![
                vec!["A".into(), "40.7".into(), "".into()],
                vec!["B".into(), "40.7".into(), "-73.9".into()],
            ],
            &ColumnConfig::default(),
        )
        .unwrap();
        assert_eq!(table.location(0), None);
        assert_eq!(table.location(1), Some(Point::new(-73.9, 40.7)));
    }

    #[test]
    fn save_keeps_extra_columns_and_writes_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "borough,school_id\nM,\"M015, PS 15\"\n");

        let mut table = SchoolTable::load(&path, &ColumnConfig::default()).unwrap();
        table.set_location(0, Some(Point::new(-73.98, 40.72)));
        let out = dir.path().join("nested").join("out.csv");
        table.save(&out).unwrap();

        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(written, "borough,school_id,Latitude,Longitude\nM,\"M015, PS 15\",40.72,-73.98\n");
    }

    #[test]
    fn row_wider_than_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "wide.csv",
            "school_id,search_name,Latitude,Longitude\nA,Alpha,40.7,-73.9,extra_note\n",
        );

        let err = SchoolTable::load(&path, &ColumnConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("Data row 1 has 5 cells but the header has 4 columns"));
    }

    #[test]
    fn extra_cell_is_not_absorbed_by_appended_columns() {
        // Two header columns, three cells: the third must not land under `Latitude`.
        let result = SchoolTable::from_parts(
            vec!["school_id".into(), "search_name".into()],
            vec![vec!["A".into(), "Alpha".into(), "40.7".into()]],
            &ColumnConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn short_rows_are_padded_and_saved_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "short.csv", "school_id,search_name,note\nA,Alpha\n");

        let table = SchoolTable::load(&path, &ColumnConfig::default()).unwrap();
        assert_eq!(table.row(0), ["A", "Alpha", "", "", ""]);

        let out = dir.path().join("out.csv");
        table.save(&out).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "school_id,search_name,note,Latitude,Longitude\nA,Alpha,,,\n"
        );
    }

    #[test]
    fn schools_requires_id_column() {
        let table = SchoolTable::from_parts(vec!["search_name".into()], vec![], &ColumnConfig::default()).unwrap();
        assert!(table.schools().is_err());
        assert!(table.require_name_column().is_ok());
    }

    #[test]
    fn roster_skips_blank_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "teachers.csv",
            "name,school_id,member_group\nAnn,A01,Active\nBob,,Retired\nCy, A02 ,Substitute\n",
        );

        let roster = load_roster(&path, &ColumnConfig::default()).unwrap();
        assert_eq!(
            roster,
            vec![
                RosterEntry { school_id: "A01".into(), member_group: "Active".into() },
                RosterEntry { school_id: "A02".into(), member_group: "Substitute".into() },
            ]
        );
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let present = write_file(dir.path(), "schools.csv", "school_id\n");
        let absent = dir.path().join("teacherslist.csv");

        assert!(check_required_files(&[("schools", present.as_path())]).is_ok());
        let err = check_required_files(&[("schools", present.as_path()), ("teachers", absent.as_path())])
            .unwrap_err();
        assert!(err.to_string().contains("teachers"));
    }
}
