//! Kit metadata rows prepared for weather lookup.

use crate::table::{CsvTable, TableError};
use crate::types::station::LatLon;
use crate::types::weather_field::WeatherField;
use crate::weather::client::TimeSeries;
use crate::weather::locate_station::CandidateStation;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Asia::Jerusalem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

pub const KIT_ID_COLUMN: &str = "Kit ID";
pub const DATE_COLUMN: &str = "Date";
pub const COORDINATE_COLUMN: &str = "Coordination";

/// Written into weather cells no station could supply.
pub const MISSING_VALUE: &str = "__";

/// Israel summer offset, used for wall clock times skipped by the spring transition.
const SUMMER_OFFSET_SECONDS: i32 = 3 * 3600;

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0[1-9]|1[0-2])/(0[1-9]|[12][0-9]|3[01])/(19|20)\d{2}$")
        .expect("date pattern is a valid regex")
});

/// Parses a metadata `Date` cell: an `MM/DD/YYYY` date, optionally followed
/// by `HH:MM` or `HH:MM:SS`. A missing time means noon.
///
/// # Examples
///
/// ```
/// use kit_data_merger::parse_sample_datetime;
///
/// let parsed = parse_sample_datetime("02/01/2024 08:15").unwrap();
/// assert_eq!(parsed.to_string(), "2024-02-01 08:15:00");
/// assert_eq!(parse_sample_datetime("02/01/2024").unwrap().to_string(), "2024-02-01 12:00:00");
/// assert!(parse_sample_datetime("13/02/2024").is_none());
/// ```
pub fn parse_sample_datetime(text: &str) -> Option<NaiveDateTime> {
    let mut parts = text.split_whitespace();
    let date = parse_date(parts.next()?)?;
    let time = match parts.next() {
        None => NaiveTime::from_hms_opt(12, 0, 0)?,
        Some(time) => NaiveTime::parse_from_str(time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
            .ok()?,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(date.and_time(time))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if !DATE_REGEX.is_match(text) {
        return None;
    }
    // The pattern admits days like 02/31 that do not exist.
    NaiveDate::parse_from_str(text, "%m/%d/%Y").ok()
}

/// The instant the provider reports for a local Israel wall clock time:
/// seconds are dropped and the offset is +02:00 in winter, +03:00 in summer.
///
/// The hour repeated when summer time ends resolves to winter time, and a
/// time skipped when it starts gets +03:00.
pub fn israel_timestamp(local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    let local = local.with_second(0)?.with_nanosecond(0)?;
    match Jerusalem.from_local_datetime(&local).latest() {
        Some(time) => Some(time.fixed_offset()),
        None => FixedOffset::east_opt(SUMMER_OFFSET_SECONDS)?
            .from_local_datetime(&local)
            .single(),
    }
}

/// Whether a weather cell still has to be fetched.
pub fn is_missing(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(value) => {
            let value = value.trim();
            value.is_empty() || value.eq_ignore_ascii_case("nan")
        }
    }
}

/// Column indices of the metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataColumns {
    pub kit_id: usize,
    pub date: usize,
    pub coordinate: usize,
    pub weather: [usize; WeatherField::COUNT],
}

impl MetadataColumns {
    /// Locates the required columns and adds the weather columns the table lacks.
    ///
    /// A table without any weather column gets all of them at their usual
    /// position after the identifying columns; a table with only some of them
    /// gets the rest appended.
    pub fn prepare(table: &mut CsvTable, path: &Path) -> Result<Self, TableError> {
        let present = WeatherField::ALL
            .iter()
            .filter(|field| table.column_index(field.name()).is_some())
            .count();
        if present == 0 {
            for (offset, field) in WeatherField::ALL.iter().enumerate() {
                table.insert_column(WeatherField::FIRST_COLUMN_POSITION + offset, field.name());
            }
        } else {
            for field in WeatherField::ALL {
                table.ensure_column(field.name());
            }
        }

        let mut weather = [0; WeatherField::COUNT];
        for field in WeatherField::ALL {
            weather[field.index()] = table.require_column(field.name(), path)?;
        }
        Ok(Self {
            kit_id: table.require_column(KIT_ID_COLUMN, path)?,
            date: table.require_column(DATE_COLUMN, path)?,
            coordinate: table.require_column(COORDINATE_COLUMN, path)?,
            weather,
        })
    }
}

/// Why a metadata row takes no part in weather lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    InvalidDate(String),
    InvalidCoordinate(String),
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRejection::InvalidDate(date) => write!(f, "Date is not valid: {date}"),
            RowRejection::InvalidCoordinate(coordinate) => {
                write!(f, "Coordination is not valid: {coordinate}")
            }
        }
    }
}

/// One metadata row being enriched with station readings.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSample {
    pub row: usize,
    pub kit_id: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<FixedOffset>,
    pub location: LatLon,
    /// `None` while a channel is still missing.
    pub values: [Option<String>; WeatherField::COUNT],
    /// Stations still worth asking, nearest first.
    pub candidates: VecDeque<CandidateStation>,
}

impl WeatherSample {
    /// Reads row `row` of the metadata table. Candidates are left empty.
    pub fn from_row(
        table: &CsvTable,
        columns: &MetadataColumns,
        row: usize,
    ) -> Result<Self, RowRejection> {
        let date_text = table.get(row, columns.date).unwrap_or_default();
        let local = parse_sample_datetime(date_text)
            .ok_or_else(|| RowRejection::InvalidDate(date_text.to_string()))?;
        let timestamp =
            israel_timestamp(local).ok_or_else(|| RowRejection::InvalidDate(date_text.to_string()))?;

        let coordinate_text = table.get(row, columns.coordinate).unwrap_or_default();
        let location = LatLon::parse(coordinate_text)
            .ok_or_else(|| RowRejection::InvalidCoordinate(coordinate_text.to_string()))?;

        let values = std::array::from_fn(|i| {
            let cell = table.get(row, columns.weather[i]);
            if is_missing(cell) {
                None
            } else {
                cell.map(str::to_string)
            }
        });

        Ok(Self {
            row,
            kit_id: table
                .get(row, columns.kit_id)
                .unwrap_or_default()
                .trim()
                .to_string(),
            date: local.date(),
            timestamp,
            location,
            values,
            candidates: VecDeque::new(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// No channel has been filled.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn nearest_station(&self) -> Option<u32> {
        self.candidates.front().map(|c| c.station_id)
    }

    /// Fills missing channels from valid readings taken at exactly this
    /// sample's timestamp. Returns the number of channels filled.
    pub fn fill_from(&mut self, series: &TimeSeries) -> usize {
        let mut filled = 0;
        for entry in &series.data {
            let Ok(datetime) = DateTime::parse_from_rfc3339(&entry.datetime) else {
                continue;
            };
            if datetime != self.timestamp {
                continue;
            }
            for reading in entry.channels.iter().filter(|r| r.valid) {
                let (Some(field), Some(value)) = (WeatherField::from_name(&reading.name), reading.value)
                else {
                    continue;
                };
                let slot = &mut self.values[field.index()];
                if slot.is_none() {
                    *slot = Some(value.to_string());
                    filled += 1;
                }
            }
        }
        filled
    }

    /// Copies every channel into the table; missing ones become [`MISSING_VALUE`].
    pub fn write_back(&self, table: &mut CsvTable, columns: &MetadataColumns) {
        for (value, column) in self.values.iter().zip(columns.weather) {
            let cell = value.clone().unwrap_or_else(|| MISSING_VALUE.to_string());
            table.set(self.row, column, Some(cell));
        }
    }
}
