use crate::config::InputConfig;
use crate::geocode::{location_query, GeocodeCache, Geocoder};
use crate::types::{columns, Coordinates, FacilityRecord, UNAVAILABLE};
use csv::{ReaderBuilder, WriterBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("base data file not found: expected {}", .path.display())]
    MissingBaseFile { path: PathBuf },
    #[error("failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed table {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write geocoded table {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A facility table exactly as read from disk. Cells are kept verbatim so the
/// geocoded copy written back only differs by its coordinate columns.
#[derive(Debug, Clone)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Rows that could not become renderable records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DroppedRows {
    pub blank_name: usize,
    pub missing_coordinates: usize,
}

impl RawTable {
    /// Returns `Ok(None)` when there is no file at `path`.
    pub fn open(path: &Path) -> Result<Option<Self>, LoadError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let csv_err = |source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = rdr
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(csv_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Some(Self { headers, rows }))
    }

    pub fn write(&self, path: &Path) -> Result<(), LoadError> {
        let persist_err = |source| LoadError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persist_err(e.into()))?;
        }

        let mut wtr = WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(persist_err)?;
        wtr.write_record(&self.headers).map_err(persist_err)?;
        for row in &self.rows {
            wtr.write_record(row).map_err(persist_err)?;
        }
        wtr.flush().map_err(|e| persist_err(e.into()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        self.column(name).unwrap_or_else(|| {
            self.headers.push(name.to_string());
            self.headers.len() - 1
        })
    }

    /// One geocoding query per row, in row order. Rows without a name get `None`.
    pub fn location_queries(&self, country: &str) -> Vec<Option<String>> {
        let name = self.column(columns::NAME);
        let region = self.column(columns::REGION);
        self.rows
            .iter()
            .map(|row| {
                let facility_name = cell(row, name).filter(|n| !is_blank(n))?;
                Some(location_query(
                    facility_name,
                    cell(row, region).unwrap_or_default(),
                    country,
                ))
            })
            .collect()
    }

    /// Writes resolved coordinates into the `Latitud`/`Longitud` columns, adding them if needed.
    /// Unresolved rows get empty cells.
    pub fn set_coordinates(&mut self, resolved: &[Option<Coordinates>]) {
        let lat = self.ensure_column(columns::LATITUDE);
        let lon = self.ensure_column(columns::LONGITUDE);
        let width = self.headers.len();

        for (row, coordinates) in self.rows.iter_mut().zip(resolved) {
            if row.len() < width {
                row.resize(width, String::new());
            }
            let (latitude, longitude) = match coordinates {
                Some(c) => (c.latitude.to_string(), c.longitude.to_string()),
                None => (String::new(), String::new()),
            };
            row[lat] = latitude;
            row[lon] = longitude;
        }
    }

    /// Normalizes every row into a [`FacilityRecord`], keeping only rows with a name and coordinates.
    pub fn to_records(&self) -> (Vec<FacilityRecord>, DroppedRows) {
        let name = self.column(columns::NAME);
        let company = self.column(columns::COMPANY);
        let region = self.column(columns::REGION);
        let primary_mineral = self.column(columns::PRIMARY_MINERAL);
        let secondary_minerals = self.column(columns::SECONDARY_MINERALS);
        let deposit_type = self.column(columns::DEPOSIT_TYPE);
        let link = self.column(columns::LINK);
        let client_type = self.column(columns::CLIENT_TYPE);
        let latitude = self.column(columns::LATITUDE);
        let longitude = self.column(columns::LONGITUDE);

        if latitude.is_none() || longitude.is_none() {
            warn!("Table has no {}/{} columns", columns::LATITUDE, columns::LONGITUDE);
        }

        let mut records = Vec::with_capacity(self.rows.len());
        let mut dropped = DroppedRows::default();

        for row in &self.rows {
            let Some(facility_name) = cell(row, name).filter(|n| !is_blank(n)) else {
                dropped.blank_name += 1;
                continue;
            };

            let coordinates = parse_coordinate(cell(row, latitude))
                .zip(parse_coordinate(cell(row, longitude)))
                .and_then(|(lat, lon)| Coordinates::new(lat, lon));
            if coordinates.is_none() {
                dropped.missing_coordinates += 1;
                continue;
            }

            records.push(FacilityRecord {
                name: facility_name.to_string(),
                company: normalize_text(cell(row, company)),
                region: normalize_text(cell(row, region)),
                primary_mineral: normalize_text(cell(row, primary_mineral)),
                secondary_minerals: normalize_text(cell(row, secondary_minerals)),
                deposit_type: normalize_text(cell(row, deposit_type)),
                client_type: normalize_text(cell(row, client_type)),
                link: normalize_text(cell(row, link)),
                coordinates,
            });
        }

        (records, dropped)
    }
}

fn cell(row: &[String], column: Option<usize>) -> Option<&str> {
    column.and_then(|idx| row.get(idx)).map(|value| value.trim())
}

/// Spreadsheet exports write `nan` for empty cells.
fn is_blank(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("nan")
}

/// Blank cells, absent columns and spreadsheet `nan` all collapse to [`UNAVAILABLE`].
fn normalize_text(value: Option<&str>) -> String {
    match value {
        Some(v) if !is_blank(v) => v.to_string(),
        _ => UNAVAILABLE.to_string(),
    }
}

fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.parse::<f64>().ok())
}

/// Resolves coordinates for every row of `table` through `geocoder` and stores them in the table.
/// Returns how many rows were resolved.
pub fn enrich<G: Geocoder>(
    table: &mut RawTable,
    geocoder: &mut GeocodeCache<G>,
    country: &str,
) -> usize {
    let queries = table.location_queries(country);

    let progress = ProgressBar::new(queries.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} [{elapsed_precise}]") {
        progress.set_style(style);
    }
    progress.set_message("Obtaining coordinates");

    let resolved: Vec<Option<Coordinates>> = queries
        .iter()
        .map(|query| {
            let coordinates = query.as_deref().and_then(|q| geocoder.resolve(q));
            progress.inc(1);
            coordinates
        })
        .collect();
    progress.finish_and_clear();

    let found = resolved.iter().flatten().count();
    info!(
        "Resolved {} of {} locations ({} provider requests)",
        found,
        resolved.len(),
        geocoder.provider_calls()
    );

    table.set_coordinates(&resolved);
    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Coordinates were already present in the geocoded table.
    Geocoded,
    /// The raw table was geocoded during this load.
    Enriched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub source: LoadSource,
    pub total_rows: usize,
    pub loaded: usize,
    pub dropped: DroppedRows,
}

impl LoadSummary {
    pub fn log(&self) {
        info!(
            "Loaded {} facilities from {} rows ({:?}); dropped {} without coordinates and {} without a name",
            self.loaded,
            self.total_rows,
            self.source,
            self.dropped.missing_coordinates,
            self.dropped.blank_name
        );
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub records: Vec<FacilityRecord>,
    pub summary: LoadSummary,
}

impl LoadedDataset {
    fn from_table(table: &RawTable, source: LoadSource) -> Self {
        let (records, dropped) = table.to_records();
        warn_duplicate_names(&records);
        let summary = LoadSummary {
            source,
            total_rows: table.len(),
            loaded: records.len(),
            dropped,
        };
        Self { records, summary }
    }
}

fn warn_duplicate_names(records: &[FacilityRecord]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.name.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicates.sort_unstable();
    for (name, count) in duplicates {
        warn!("{count} facilities share the name '{name}'");
    }
}

/// One way of obtaining the record set. Strategies are tried in order.
#[derive(Debug, Clone)]
pub enum LoadStrategy {
    Geocoded { path: PathBuf },
    Raw { path: PathBuf, persist_to: PathBuf },
}

impl LoadStrategy {
    pub fn path(&self) -> &Path {
        match self {
            LoadStrategy::Geocoded { path } | LoadStrategy::Raw { path, .. } => path,
        }
    }

    /// `Ok(None)` when this strategy's file is absent.
    fn run<G: Geocoder>(
        &self,
        geocoder: &mut GeocodeCache<G>,
        country: &str,
    ) -> Result<Option<LoadedDataset>, LoadError> {
        match self {
            LoadStrategy::Geocoded { path } => {
                let Some(table) = RawTable::open(path)? else {
                    return Ok(None);
                };
                info!("Loaded table with existing coordinates from {:?}", path);
                Ok(Some(LoadedDataset::from_table(&table, LoadSource::Geocoded)))
            }
            LoadStrategy::Raw { path, persist_to } => {
                let Some(mut table) = RawTable::open(path)? else {
                    return Ok(None);
                };
                if table.is_empty() {
                    warn!("Raw table {:?} has no rows", path);
                }
                info!(
                    "Geocoding {} rows from {:?}, this may take a while",
                    table.len(),
                    path
                );
                enrich(&mut table, geocoder, country);
                table.write(persist_to)?;
                info!("Coordinates saved to {:?}", persist_to);
                Ok(Some(LoadedDataset::from_table(&table, LoadSource::Enriched)))
            }
        }
    }
}

pub struct RecordStore {
    strategies: Vec<LoadStrategy>,
    country: String,
}

impl RecordStore {
    pub fn new(strategies: Vec<LoadStrategy>, country: impl Into<String>) -> Self {
        Self {
            strategies,
            country: country.into(),
        }
    }

    /// Geocoded table first, then the raw table enriched and persisted to the geocoded path.
    pub fn from_config(input: &InputConfig, country: impl Into<String>) -> Self {
        Self::new(
            vec![
                LoadStrategy::Geocoded {
                    path: input.geocoded_file.clone(),
                },
                LoadStrategy::Raw {
                    path: input.raw_file.clone(),
                    persist_to: input.geocoded_file.clone(),
                },
            ],
            country,
        )
    }

    pub fn load<G: Geocoder>(
        &self,
        geocoder: &mut GeocodeCache<G>,
    ) -> Result<LoadedDataset, LoadError> {
        let mut last_missing = None;
        for strategy in &self.strategies {
            match strategy.run(geocoder, &self.country)? {
                Some(dataset) => return Ok(dataset),
                None => {
                    info!("No table at {:?}", strategy.path());
                    last_missing = Some(strategy.path().to_path_buf());
                }
            }
        }
        Err(LoadError::MissingBaseFile {
            path: last_missing.unwrap_or_default(),
        })
    }

    /// Geocodes the raw table again even when a geocoded table already exists.
    pub fn refresh<G: Geocoder>(
        &self,
        geocoder: &mut GeocodeCache<G>,
    ) -> Result<LoadedDataset, LoadError> {
        let raw = self
            .strategies
            .iter()
            .rev()
            .find(|s| matches!(s, LoadStrategy::Raw { .. }));
        let Some(raw) = raw else {
            return Err(LoadError::MissingBaseFile {
                path: PathBuf::new(),
            });
        };
        raw.run(geocoder, &self.country)?
            .ok_or_else(|| LoadError::MissingBaseFile {
                path: raw.path().to_path_buf(),
            })
    }
}
