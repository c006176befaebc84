mod bulk;
mod error;
mod joiner;
mod pipeline;
mod progress;
mod samples;
mod table;
mod types;
mod weather;

pub use error::KitMergerError;
pub use pipeline::*;

pub use progress::{ProgressSink, SilentProgress};
pub use table::{CsvTable, TableError};

pub use types::channel::{Channel, SampleType};
pub use types::station::{LatLon, Station, StationLocation};
pub use types::weather_field::WeatherField;

pub use samples::classifier::{classify, SampleFileName};
pub use samples::error::SampleError;
pub use samples::filter::{filter_samples, FilterReport};
pub use samples::merger::{merge_samples, merged_file_name, merged_width, KitTaxa, MergeReport, TaxonMerger};
pub use samples::taxonomy::{parse_lineage, taxon_key, Lineage, MISSING_RANK, NO_TAXONOMY, RANK_COLUMNS};

pub use weather::backfill::{BackfillReport, WeatherBackfill, DEFAULT_RADIUS_KM};
pub use weather::client::{ChannelReading, ImsClient, TimeSeries, TimeSeriesEntry, WeatherProvider};
pub use weather::error::WeatherError;
pub use weather::locate_station::{CandidateStation, StationLocator};
pub use weather::sample::{
    israel_timestamp, is_missing, parse_sample_datetime, MetadataColumns, RowRejection,
    WeatherSample, COORDINATE_COLUMN, DATE_COLUMN, KIT_ID_COLUMN, MISSING_VALUE,
};

pub use joiner::{broadcast_metadata, join_metadata, kit_id_from_file_name, JoinError, JoinReport, MetadataIndex};
pub use bulk::{
    cell_value, documents, export_bulk, export_bulk_with_separator, BulkError, BulkReport,
    DEFAULT_CHUNK_SIZE,
};
