use std::path::PathBuf;

use anyhow::Context;
use railpulse_dataset::{
    master::MasterDatasetBuilder,
    normalize::Normalizer,
    region::RegionAliases,
    source::SourceTable,
    store::DatasetStore,
};
use serde::Serialize;

use crate::{command::CommonArg, util};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct BuildDatasetArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Write the build report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BuildSummary<'a> {
    version: u32,
    path: PathBuf,
    records: usize,
    report: &'a railpulse_dataset::master::BuildReport,
}

pub(crate) fn run(arg: &BuildDatasetArg) -> anyhow::Result<()> {
    let config = arg.common.load()?;
    let dataset_config = &config.dataset;
    anyhow::ensure!(
        !dataset_config.sources.is_empty(),
        "No source tables configured in {}",
        arg.common.config.display()
    );

    let normalizer = Normalizer::new(RegionAliases::with_extra(&dataset_config.region_aliases));
    let mut rows = vec![];
    for source in &dataset_config.sources {
        let table = SourceTable::from_csv_path(&source.path)
            .with_context(|| format!("Failed to read source table {}", source.path.display()))?;
        let normalized = normalizer
            .normalize(&table, &source.mapping)
            .with_context(|| format!("Failed to normalize source table {}", table.id))?;
        tracing::info!(table = %table.id, rows = normalized.len(), "normalized source table");
        rows.extend(normalized);
    }

    let dataset = MasterDatasetBuilder::new(dataset_config)
        .build(rows)
        .context("Failed to build master dataset")?;
    let store = DatasetStore::new(&config.output.dataset_dir);
    let version = store
        .publish(&dataset)
        .context("Failed to publish master dataset")?;

    let summary = BuildSummary {
        version,
        path: store.path_of(version),
        records: dataset.len(),
        report: dataset.report(),
    };
    util::emit_json(&summary, arg.output.as_deref())
}
