use crate::cli::{BarProgress, Cli, Commands, PipelineArgs};
use anyhow::{Context, Result};
use kit_data_merger::{KitDataMerger, PipelineConfig};
use std::sync::Arc;

fn config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let separator = u8::try_from(args.separator)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("Separator '{}' is not a single ASCII character", args.separator))?;
    Ok(PipelineConfig::builder()
        .raw_dir(&args.raw_dir)
        .metadata_path(&args.metadata)
        .sample_type(args.sample_type)
        .work_dir(&args.work_dir)
        .radius_km(args.radius)
        .base_url(&args.base_url)
        .maybe_api_token(args.token.clone())
        .joined_separator(separator)
        .bulk_index(&args.index)
        .bulk_chunk_size(args.chunk_size)
        .build())
}

pub async fn execute(cli: Cli) -> Result<()> {
    let args = match &cli.command {
        Commands::Run(args)
        | Commands::Filter(args)
        | Commands::Merge(args)
        | Commands::Weather(args)
        | Commands::Join(args)
        | Commands::Bulk(args) => args,
        Commands::Export { pipeline, .. } => pipeline,
    };
    let progress = Arc::new(BarProgress::new());
    let merger = KitDataMerger::new(config(args)?).with_progress(progress.clone());

    let result = run_command(&cli.command, &merger).await;
    progress.finish();
    let summary = result?;
    println!("{summary}");
    Ok(())
}

async fn run_command(command: &Commands, merger: &KitDataMerger) -> Result<String> {
    let summary = match command {
        Commands::Run(_) => {
            let report = merger.run().await?;
            format!(
                "{} files staged, {} kits merged, {} kits completed with weather ({} partial, {} without data), {} joined kit files in `{}`",
                report.filter.copied,
                report.merge.kits_written,
                report.weather.completed,
                report.weather.partial,
                report.weather.abandoned,
                report.join.files_joined,
                merger.config().joined_dir().display()
            )
        }
        Commands::Filter(_) => {
            let report = merger.filter_only().await?;
            format!("{} of {} files staged", report.copied, report.candidates)
        }
        Commands::Merge(_) => {
            let report = merger.merge_only().await?;
            format!(
                "{} kit files saved to `{}`",
                report.kits_written,
                merger.config().merged_dir().display()
            )
        }
        Commands::Weather(_) => {
            let report = merger.backfill_only().await?;
            format!(
                "{} kits completed, {} partial, {} without data, {} rows rejected; saved to `{}`",
                report.completed,
                report.partial,
                report.abandoned,
                report.rejected_rows,
                merger.config().metadata_path().display()
            )
        }
        Commands::Join(_) => {
            let report = merger.join_only().await?;
            format!(
                "{} joined kit files saved to `{}`",
                report.files_joined,
                merger.config().joined_dir().display()
            )
        }
        Commands::Bulk(_) => {
            let report = merger.bulk_only().await?;
            format!(
                "{} documents in {} files saved to `{}`",
                report.documents,
                report.files_written,
                merger.config().bulk_dir().display()
            )
        }
        Commands::Export { dest, .. } => {
            let copied = merger
                .export_to(dest)
                .context("Export failed, choose a different directory")?;
            format!("{} kit files exported to `{}`", copied, dest.display())
        }
    };
    Ok(summary)
}
