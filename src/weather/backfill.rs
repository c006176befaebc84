//! Fills the weather columns of the kit metadata sheet from nearby stations.
//!
//! Each metadata row becomes a [`WeatherSample`] with a queue of candidate
//! stations, nearest first. Samples are grouped by their nearest remaining
//! station so each station is asked once per pass for the whole date range of
//! its group. A sample for which a station supplied nothing at all drops that
//! station and is retried against the next one in the following pass; a
//! sample that got at least one value, or that ran out of stations, is done.
//! Every pass removes a station from each retried sample, so the loop ends.

use crate::progress::{ProgressSink, StageProgress};
use crate::table::CsvTable;
use crate::weather::client::WeatherProvider;
use crate::weather::error::WeatherError;
use crate::weather::locate_station::StationLocator;
use crate::weather::sample::{parse_sample_datetime, MetadataColumns, WeatherSample};
use bon::Builder;
use chrono::NaiveDate;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::path::Path;

/// Stations further than this from a kit are not considered by default.
pub const DEFAULT_RADIUS_KM: f64 = 32.0;

const PARSE_STATUS: &str = "Parsing Table";
const FETCH_STATUS: &str = "Getting Information";

/// Counts gathered while backfilling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Data rows in the metadata sheet.
    pub rows: usize,
    /// Rows excluded for an invalid date or coordinate.
    pub rejected_rows: usize,
    /// Rows that already had every weather value.
    pub already_complete: usize,
    /// Samples with every weather value after the run.
    pub completed: usize,
    /// Samples with some but not all weather values after the run.
    pub partial: usize,
    /// Samples no station could supply any value for.
    pub abandoned: usize,
    /// Time series requests made.
    pub station_requests: usize,
    /// Passes over the worklist.
    pub passes: usize,
}

/// The weather backfill engine.
///
/// ```no_run
/// use kit_data_merger::{ImsClient, SilentProgress, WeatherBackfill};
/// use std::path::Path;
///
/// # async fn run() -> Result<(), kit_data_merger::WeatherError> {
/// let backfill = WeatherBackfill::builder()
///     .provider(ImsClient::new(ImsClient::DEFAULT_BASE_URL, Some("token".into())))
///     .radius_km(20.0)
///     .build();
/// let report = backfill.run(Path::new("meta_data.csv"), &SilentProgress).await?;
/// println!("{} kits completed", report.completed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Builder)]
pub struct WeatherBackfill<P: WeatherProvider> {
    provider: P,
    #[builder(default = DEFAULT_RADIUS_KM)]
    radius_km: f64,
}

impl<P: WeatherProvider> WeatherBackfill<P> {
    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Backfills the metadata sheet at `path` in place.
    ///
    /// The station list is fetched first; failing to get it aborts before the
    /// sheet is touched. The sheet is written back after every pass, and a
    /// provider failure mid-run saves what has been filled so far before the
    /// error is returned.
    pub async fn run(
        &self,
        path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<BackfillReport, WeatherError> {
        let stations = self.provider.stations().await?;
        let locator = StationLocator::new(&stations);
        info!(
            "Indexed {} of {} stations for a {} km search radius",
            locator.len(),
            stations.len(),
            self.radius_km
        );

        let mut table = read_sheet(path).await?;
        let columns = MetadataColumns::prepare(&mut table, path)?;
        let date_column = columns.date;
        table.sort_rows_by_key(|row| {
            let parsed = row
                .get(date_column)
                .and_then(|cell| cell.as_deref())
                .and_then(parse_sample_datetime);
            (parsed.is_none(), parsed)
        });

        let mut report = BackfillReport {
            rows: table.height(),
            ..Default::default()
        };
        let mut samples = self.parse_samples(&table, &columns, &locator, &mut report, progress);

        let mut pending = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            if sample.is_complete() {
                report.already_complete += 1;
            } else if sample.candidates.is_empty() {
                debug!("Kit {} has no station within {} km", sample.kit_id, self.radius_km);
                sample.write_back(&mut table, &columns);
            } else {
                pending.push(i);
            }
        }

        while !pending.is_empty() {
            report.passes += 1;
            let groups = group_by_nearest_station(&samples, &pending);
            let mut stage = StageProgress::start(progress, FETCH_STATUS, groups.len());

            for (station_id, members) in &groups {
                let (from, to) = date_window(&samples, members);
                let series = match self.provider.station_data(*station_id, from, to).await {
                    Ok(series) => series,
                    Err(e) => {
                        error!(
                            "Request for station {} failed: {}. Saving what was filled so far to {}",
                            station_id,
                            e,
                            path.display()
                        );
                        if let Err(save) = write_sheet(&table, path).await {
                            error!("Could not save partial weather data: {}", save);
                        }
                        return Err(e);
                    }
                };
                report.station_requests += 1;

                for &i in members {
                    let filled = samples[i].fill_from(&series);
                    if filled > 0 {
                        debug!(
                            "Station {} filled {} values for kit {}",
                            station_id, filled, samples[i].kit_id
                        );
                    }
                    samples[i].write_back(&mut table, &columns);
                }
                stage.advance();
            }

            let mut retry = Vec::new();
            for i in groups.into_values().flatten() {
                let sample = &mut samples[i];
                if !sample.is_empty() {
                    continue;
                }
                sample.candidates.pop_front();
                if !sample.candidates.is_empty() {
                    retry.push(i);
                }
            }
            write_sheet(&table, path).await?;
            info!(
                "Pass {} done, {} kits move on to their next station",
                report.passes,
                retry.len()
            );
            pending = retry;
        }

        if report.passes == 0 {
            write_sheet(&table, path).await?;
        }

        for sample in &samples {
            if sample.is_complete() {
                report.completed += 1;
            } else if sample.is_empty() {
                report.abandoned += 1;
            } else {
                report.partial += 1;
            }
        }
        report.completed -= report.already_complete;
        info!(
            "Weather backfill finished: {} completed, {} partial, {} without data, {} rejected rows",
            report.completed, report.partial, report.abandoned, report.rejected_rows
        );
        Ok(report)
    }

    fn parse_samples(
        &self,
        table: &CsvTable,
        columns: &MetadataColumns,
        locator: &StationLocator,
        report: &mut BackfillReport,
        progress: &dyn ProgressSink,
    ) -> Vec<WeatherSample> {
        let mut stage = StageProgress::start(progress, PARSE_STATUS, table.height());
        let mut samples = Vec::with_capacity(table.height());
        for row in 0..table.height() {
            match WeatherSample::from_row(table, columns, row) {
                Ok(mut sample) => {
                    sample.candidates = locator
                        .within_radius(sample.location, self.radius_km)
                        .into();
                    samples.push(sample);
                }
                Err(rejection) => {
                    let kit_id = table.get(row, columns.kit_id).unwrap_or_default();
                    error!("Kit ID {}: {}", kit_id, rejection);
                    report.rejected_rows += 1;
                }
            }
            stage.advance();
        }
        samples
    }
}

async fn read_sheet(path: &Path) -> Result<CsvTable, WeatherError> {
    let path = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || CsvTable::read(&path)).await??)
}

async fn write_sheet(table: &CsvTable, path: &Path) -> Result<(), WeatherError> {
    let table = table.clone();
    let path = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || table.write(&path)).await??)
}

/// Pending samples keyed by the station each one should ask next.
fn group_by_nearest_station(samples: &[WeatherSample], pending: &[usize]) -> BTreeMap<u32, Vec<usize>> {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for &i in pending {
        if let Some(station_id) = samples[i].nearest_station() {
            groups.entry(station_id).or_default().push(i);
        }
    }
    groups
}

/// From the earliest sample date to the day after the latest one.
fn date_window(samples: &[WeatherSample], members: &[usize]) -> (NaiveDate, NaiveDate) {
    let dates = members.iter().map(|&i| samples[i].date);
    let first = dates.clone().min().unwrap_or_default();
    let last = dates.max().unwrap_or_default();
    (first, last.succ_opt().unwrap_or(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::types::station::{Station, StationLocation};
    use crate::types::weather_field::WeatherField;
    use crate::weather::client::{ChannelReading, TimeSeries, TimeSeriesEntry};
    use crate::weather::sample::MISSING_VALUE;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeProvider {
        stations: Vec<Station>,
        series: HashMap<u32, TimeSeries>,
        failing_station: Option<u32>,
        // Replaced by a directory when the failing station is asked.
        sheet_to_block: Option<PathBuf>,
        unreachable: bool,
        requests: Mutex<Vec<(u32, NaiveDate, NaiveDate)>>,
    }

    impl FakeProvider {
        fn with_station(mut self, id: u32, latitude: f64, longitude: f64) -> Self {
            self.stations.push(Station {
                station_id: id,
                name: format!("station {id}"),
                location: StationLocation {
                    latitude: Some(latitude),
                    longitude: Some(longitude),
                },
                active: true,
            });
            self
        }

        fn with_readings(mut self, id: u32, datetime: &str, readings: &[(&str, f64)]) -> Self {
            let entry = TimeSeriesEntry {
                datetime: datetime.to_string(),
                channels: readings
                    .iter()
                    .map(|(name, value)| ChannelReading {
                        name: name.to_string(),
                        value: Some(*value),
                        valid: true,
                    })
                    .collect(),
            };
            self.series.entry(id).or_default().data.push(entry);
            self
        }

        fn requested_stations(&self) -> Vec<u32> {
            self.requests.lock().unwrap().iter().map(|r| r.0).collect()
        }
    }

    impl WeatherProvider for FakeProvider {
        async fn stations(&self) -> Result<Vec<Station>, WeatherError> {
            if self.unreachable {
                return Err(WeatherError::Provider("unreachable".into()));
            }
            Ok(self.stations.clone())
        }

        async fn station_data(
            &self,
            station_id: u32,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<TimeSeries, WeatherError> {
            self.requests.lock().unwrap().push((station_id, from, to));
            if self.failing_station == Some(station_id) {
                if let Some(sheet) = &self.sheet_to_block {
                    fs::remove_file(sheet).unwrap();
                    fs::create_dir(sheet).unwrap();
                }
                return Err(WeatherError::Provider("connection reset".into()));
            }
            Ok(self.series.get(&station_id).cloned().unwrap_or_default())
        }
    }

    fn write_metadata(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("meta_data.csv");
        fs::write(&path, contents).unwrap();
        path
    }

    fn weather_cell(table: &CsvTable, kit: &str, field: WeatherField) -> Option<String> {
        let kit_column = table.column_index("Kit ID").unwrap();
        let column = table.column_index(field.name()).unwrap();
        let row = (0..table.height())
            .find(|&r| table.get(r, kit_column) == Some(kit))
            .unwrap();
        table.get(row, column).map(str::to_string)
    }

    fn backfill(provider: FakeProvider) -> WeatherBackfill<FakeProvider> {
        WeatherBackfill::builder().provider(provider).build()
    }

    #[tokio::test]
    async fn sample_without_match_at_only_station_is_abandoned_with_sentinels() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(&dir, "Kit ID,Date,Coordination\n12,02/01/2024,\"32.0, 34.8\"\n");
        // Station 1 is ~5 km away, station 2 ~40 km away.
        let engine = backfill(
            FakeProvider::default()
                .with_station(1, 32.045, 34.8)
                .with_station(2, 32.36, 34.8)
                .with_readings(1, "2024-02-01T11:00:00+02:00", &[("TD", 10.0)]),
        );

        let report = engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(engine.provider.requested_stations(), [1]);
        assert_eq!(report.abandoned, 1);
        let table = CsvTable::read(&path).unwrap();
        for field in WeatherField::ALL {
            assert_eq!(weather_cell(&table, "12", field).as_deref(), Some(MISSING_VALUE));
        }
    }

    #[tokio::test]
    async fn invalid_date_is_excluded_from_sampling() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(
            &dir,
            "Kit ID,Date,Coordination\n3,13/02/2024,\"32.0, 34.8\"\n4,02/13/2024,\"32.0, 34.8\"\n",
        );
        let engine = backfill(
            FakeProvider::default()
                .with_station(1, 32.01, 34.8)
                .with_readings(1, "2024-02-13T12:00:00+02:00", &[("TD", 15.0)]),
        );

        let report = engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(report.rejected_rows, 1);
        assert_eq!(report.rows, 2);
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(weather_cell(&table, "3", WeatherField::Td), None);
        assert_eq!(weather_cell(&table, "4", WeatherField::Td).as_deref(), Some("15"));
    }

    #[tokio::test]
    async fn falls_back_to_the_next_station() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(&dir, "Kit ID,Date,Coordination\n5,07/15/2023 09:30,32.0 34.8\n");
        let engine = backfill(
            FakeProvider::default()
                .with_station(1, 32.01, 34.8)
                .with_station(2, 32.09, 34.8)
                .with_readings(2, "2023-07-15T09:30:00+03:00", &[("TD", 28.5), ("RH", 61.0)]),
        );

        let report = engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(engine.provider.requested_stations(), [1, 2]);
        assert_eq!(report.passes, 2);
        assert_eq!(report.partial, 1);
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(weather_cell(&table, "5", WeatherField::Td).as_deref(), Some("28.5"));
        assert_eq!(weather_cell(&table, "5", WeatherField::Rh).as_deref(), Some("61"));
        assert_eq!(weather_cell(&table, "5", WeatherField::Rain).as_deref(), Some(MISSING_VALUE));
    }

    #[tokio::test]
    async fn partially_filled_sample_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(&dir, "Kit ID,Date,Coordination\n6,02/01/2024,\"32.0,34.8\"\n");
        let engine = backfill(
            FakeProvider::default()
                .with_station(1, 32.01, 34.8)
                .with_station(2, 32.02, 34.8)
                .with_readings(1, "2024-02-01T12:00:00+02:00", &[("Rain", 0.0)])
                .with_readings(2, "2024-02-01T12:00:00+02:00", &[("TD", 11.0)]),
        );

        engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(engine.provider.requested_stations(), [1]);
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(weather_cell(&table, "6", WeatherField::Rain).as_deref(), Some("0"));
        assert_eq!(weather_cell(&table, "6", WeatherField::Td).as_deref(), Some(MISSING_VALUE));
    }

    #[tokio::test]
    async fn terminates_when_no_station_ever_has_data() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(
            &dir,
            "Kit ID,Date,Coordination\n1,02/01/2024,\"32.0,34.8\"\n2,02/03/2024,\"32.0,34.8\"\n",
        );
        let mut provider = FakeProvider::default();
        for id in 0..6 {
            provider = provider.with_station(id, 32.0 + id as f64 * 0.01, 34.8);
        }
        let engine = backfill(provider);

        let report = engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(report.passes, 6);
        assert_eq!(report.station_requests, 6);
        assert_eq!(report.abandoned, 2);
        let requests = engine.provider.requests.lock().unwrap().clone();
        let first = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let after_last = NaiveDate::from_ymd_opt(2024, 2, 4).unwrap();
        assert!(requests.iter().all(|r| r.1 == first && r.2 == after_last));
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(weather_cell(&table, "2", WeatherField::Wd).as_deref(), Some(MISSING_VALUE));
    }

    #[tokio::test]
    async fn provider_failure_saves_filled_values_before_returning() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(
            &dir,
            "Kit ID,Date,Coordination\n1,02/01/2024,\"32.0,34.8\"\n2,02/01/2024,\"31.0,34.8\"\n",
        );
        let engine = backfill(FakeProvider {
            failing_station: Some(2),
            ..FakeProvider::default()
                .with_station(1, 32.01, 34.8)
                .with_station(2, 31.01, 34.8)
                .with_readings(1, "2024-02-01T12:00:00+02:00", &[("TD", 9.5)])
        });

        let result = engine.run(&path, &SilentProgress).await;

        assert!(matches!(result, Err(WeatherError::Provider(_))));
        let table = CsvTable::read(&path).unwrap();
        assert_eq!(weather_cell(&table, "1", WeatherField::Td).as_deref(), Some("9.5"));
        assert_eq!(weather_cell(&table, "2", WeatherField::Td), None);
    }

    #[tokio::test]
    async fn provider_error_is_returned_when_the_partial_save_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_metadata(&dir, "Kit ID,Date,Coordination\n1,02/01/2024,\"32.0,34.8\"\n");
        let engine = backfill(FakeProvider {
            failing_station: Some(1),
            sheet_to_block: Some(path.clone()),
            ..FakeProvider::default().with_station(1, 32.01, 34.8)
        });

        let result = engine.run(&path, &SilentProgress).await;

        match result {
            Err(WeatherError::Provider(message)) => assert_eq!(message, "connection reset"),
            other => panic!("expected the provider error, got {other:?}"),
        }
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn unreachable_provider_leaves_the_sheet_untouched() {
        let dir = TempDir::new().unwrap();
        let contents = "Kit ID,Date,Coordination\n1,02/01/2024,\"32.0,34.8\"\n";
        let path = write_metadata(&dir, contents);
        let engine = backfill(FakeProvider {
            unreachable: true,
            ..FakeProvider::default()
        });

        assert!(engine.run(&path, &SilentProgress).await.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), contents);
    }

    #[tokio::test]
    async fn complete_rows_are_not_requested() {
        let dir = TempDir::new().unwrap();
        let values = vec!["1"; WeatherField::COUNT].join(",");
        let header: Vec<&str> = WeatherField::ALL.iter().map(|f| f.name()).collect();
        let path = write_metadata(
            &dir,
            &format!(
                "Kit ID,Date,Coordination,{}\n1,02/01/2024,\"32.0,34.8\",{}\n",
                header.join(","),
                values
            ),
        );
        let engine = backfill(FakeProvider::default().with_station(1, 32.01, 34.8));

        let report = engine.run(&path, &SilentProgress).await.unwrap();

        assert_eq!(report.already_complete, 1);
        assert_eq!(report.completed, 0);
        assert!(engine.provider.requested_stations().is_empty());
    }
}
