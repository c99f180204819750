use anyhow::Result;
use std::path::Path;
use yawn_dataset::config::PipelineConfig;
use yawn_dataset::data_loading::load_session;
use yawn_dataset::labeling::Labeler;
use yawn_dataset::output::read_dataset_cbor;
use yawn_dataset::windowing::Windower;

fn inspect_dataset(path: &Path) -> Result<()> {
    let record = read_dataset_cbor(path)?;
    println!("\nExtractor: {:?}", record.extractor);
    println!("Axes: {}", record.axes.join(", "));
    for (name, split) in [("train", record.train), ("test", record.test)] {
        let positives = split.labels.iter().filter(|&&l| l != 0).count();
        println!(
            "{}: shape {:?}, {} positive of {}",
            name,
            split.shape,
            positives,
            split.labels.len()
        );
    }
    Ok(())
}

fn inspect_session(path: &Path) -> Result<()> {
    let config = PipelineConfig::default();
    let session = load_session(path, None)?;

    println!("\nVersion: {}", session.version());
    println!("Sample rate: {} Hz", session.sample_rate());
    println!(
        "Readings: {} ({:.1} s)",
        session.len(),
        session.len() as f64 / session.sample_rate() as f64
    );

    println!("\nMarkers:");
    for marker in session.markers() {
        println!("  {:>8}  {}", marker.index, marker.kind);
    }

    let windower = Windower::new(&config);
    let labeler = Labeler::new(&config);

    let plan = windower.time_domain(&session)?;
    let windows = labeler.label_windows(&session, &plan);
    println!(
        "\nTime-domain windows: {} ({} positive)",
        windows.len(),
        windows.iter().filter(|w| w.label).count()
    );

    match windower.spectral(&session) {
        Ok(chunks) => {
            let labelled = labeler.label_chunks(&session, &chunks);
            println!(
                "Spectral chunks: {} ({} positive)",
                labelled.len(),
                labelled.iter().filter(|w| w.label).count()
            );
        }
        Err(e) => println!("Spectral chunks: none ({})", e),
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <session_or_dataset_file>", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    if path.extension().and_then(|s| s.to_str()) == Some("cbor") {
        inspect_dataset(path)
    } else {
        inspect_session(path)
    }
}
