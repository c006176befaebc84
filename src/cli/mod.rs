//! Command line interface.

pub mod command;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use kit_data_merger::{ProgressSink, SampleType};
use std::path::PathBuf;

/// Progress bar resolution; stage fractions are scaled to this many steps.
const BAR_STEPS: u64 = 1000;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Merges microbiome kit samples and enriches them with kit metadata and weather
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Filter, merge, backfill weather and join
    Run(PipelineArgs),
    /// Copy the raw sample files into the staging directory
    Filter(PipelineArgs),
    /// Merge staged files into one table per kit
    Merge(PipelineArgs),
    /// Fill the weather columns of the metadata sheet
    Weather(PipelineArgs),
    /// Join merged kit tables with the metadata sheet
    Join(PipelineArgs),
    /// Write bulk-index payloads from the joined tables
    Bulk(PipelineArgs),
    /// Copy the merged kit tables into <DEST>/merged_asv_data
    Export {
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Destination folder
        dest: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Raw sample folder
    #[arg(long, default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Kit metadata CSV, rewritten in place by the weather stage
    #[arg(long, default_value = "data/meta_data.csv")]
    pub metadata: PathBuf,

    /// Bacteria or Fungi
    #[arg(long, default_value = "Fungi")]
    pub sample_type: SampleType,

    /// Folder for intermediate and output tables
    #[arg(long, default_value = "data/work")]
    pub work_dir: PathBuf,

    /// Station search radius in km
    #[arg(long, default_value_t = 32.0)]
    pub radius: f64,

    /// Weather API base URL
    #[arg(long, default_value = "https://api.ims.gov.il")]
    pub base_url: String,

    /// Weather API token
    #[arg(long, env = "IMS_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Field separator of the joined tables
    #[arg(long, default_value_t = ',')]
    pub separator: char,

    /// Index named in the bulk payloads
    #[arg(long, default_value = "kit_taxonomy")]
    pub index: String,

    /// Documents per bulk payload file
    #[arg(long, default_value_t = 1250)]
    pub chunk_size: usize,
}

/// Shows stage progress on a terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        Self {
            bar: ProgressBar::new(BAR_STEPS).with_style(style),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, fraction: f64, message: &str) {
        let position = (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(message.to_string());
    }
}
