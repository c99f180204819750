use anyhow::Context;
use clap::Parser;
use log::debug;
use yawn_dataset::config::Args;
use yawn_dataset::dataset::DatasetAssembler;
use yawn_dataset::extraction::Extractor;
use yawn_dataset::output::{write_dataset_cbor, write_summary_csv};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let config = args.pipeline_config()?;
    debug!("Effective configuration: {:?}", config);

    let extractor = Extractor::new(args.extractor, config.clone())?;
    let assembler = DatasetAssembler::new(config.clone())?;

    let dataset = assembler
        .from_directory(&args.input_dir, &extractor)
        .with_context(|| format!("Failed to build dataset from {}", args.input_dir.display()))?;

    println!(
        "Train: {:?} ({} positive, {} negative)",
        dataset.train.examples().shape(),
        dataset.train.positives(),
        dataset.train.negatives()
    );
    println!(
        "Test:  {:?} ({} positive, {} negative)",
        dataset.test.examples().shape(),
        dataset.test.positives(),
        dataset.test.negatives()
    );

    if let Some(path) = &args.output {
        write_dataset_cbor(path, args.extractor, &config, &dataset)?;
    }
    if let Some(path) = &args.summary {
        write_summary_csv(path, &dataset.files)?;
    }

    Ok(())
}
