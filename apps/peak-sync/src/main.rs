use anyhow::{Context, Result};
use clap::Parser;
use peak_sync::cli::{Cli, Commands, EpisodesArgs, EventArgs, MatrixArgs};
use peak_sync::config::AnalysisConfig;
use peak_sync::dataset::DailyDataset;
use peak_sync::services::analysis::episodes::{episode_report, EpisodeReport, ThresholdMethod};
use peak_sync::services::analysis::peaks::LocalMaximaDetector;
use peak_sync::services::analysis::reports::{
    compare_pair, contrast_event, explore_trends, EventContrast, EventWindow,
};
use peak_sync::services::analysis::synchrony::{synchrony_matrices, SeriesFeatureCache};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = AnalysisConfig::from_env()?;
    cli.overrides.apply(&mut config);
    config.validate().context("invalid analysis configuration")?;

    let dataset = DailyDataset::from_csv_path(&cli.data)?;
    let detector = LocalMaximaDetector;
    let mut cache = SeriesFeatureCache::new();

    let output = match cli.command {
        Commands::Matrix(args) => {
            let scoped = scope_matrix_dataset(&dataset, &args)?;
            let matrices =
                synchrony_matrices(&scoped, &config.synchrony_params(), &detector, &mut cache)?;
            serde_json::to_value(matrices)?
        }
        Commands::Compare(args) => {
            let report = compare_pair(
                &dataset,
                &args.master,
                &args.slave,
                &config,
                &detector,
                &mut cache,
            )?;
            serde_json::to_value(report)?
        }
        Commands::Event(args) => serde_json::to_value(run_event(&dataset, &config, &args)?)?,
        Commands::Episodes(args) => serde_json::to_value(run_episodes(&dataset, &args)?)?,
        Commands::Trends(args) => {
            let report = explore_trends(&dataset, &args.series, args.start, args.end)?;
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn scope_matrix_dataset(dataset: &DailyDataset, args: &MatrixArgs) -> Result<DailyDataset> {
    let mut scoped = if args.series.is_empty() {
        dataset.clone()
    } else {
        dataset.select(&args.series)?
    };
    if args.start.is_some() || args.end.is_some() {
        let start = args.start.or(scoped.dates.first().copied());
        let end = args.end.or(scoped.dates.last().copied());
        if let (Some(start), Some(end)) = (start, end) {
            let window = EventWindow::new(start, end);
            scoped = scoped.slice(window.start, window.end);
        }
    }
    Ok(scoped)
}

fn run_event(
    dataset: &DailyDataset,
    config: &AnalysisConfig,
    args: &EventArgs,
) -> Result<EventContrast> {
    let window = EventWindow::new(args.start, args.end);
    let contrast = contrast_event(
        dataset,
        &args.master,
        &args.slave,
        window,
        args.reference,
        config,
        &LocalMaximaDetector,
    )?;
    Ok(contrast)
}

fn run_episodes(
    dataset: &DailyDataset,
    args: &EpisodesArgs,
) -> Result<EpisodeReport> {
    let method = match (args.percentile, args.threshold) {
        (_, Some(value)) => ThresholdMethod::Manual(value),
        (Some(p), None) => ThresholdMethod::Percentile(p),
        (None, None) => anyhow::bail!("either --percentile or --threshold is required"),
    };
    let series = dataset.series(&args.series)?;
    let report = episode_report(
        &series.label,
        &dataset.dates,
        &series.values,
        method,
        args.min_days,
    )?;
    Ok(report)
}
