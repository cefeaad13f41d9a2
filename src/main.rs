use std::path::PathBuf;

use log::info;

use hoa_features::{Pipeline, PipelineConfig, PriceReference, Result};

fn main() -> Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config = PipelineConfig {
        input_dir: args.next().map_or_else(|| PathBuf::from("data"), PathBuf::from),
        output_dir: args.next().map_or_else(|| PathBuf::from("data"), PathBuf::from),
        ..PipelineConfig::default()
    };
    let zip_prices = args
        .next()
        .map_or_else(|| config.input_dir.join("listing_price_by_zip.txt"), PathBuf::from);
    let state_prices = args
        .next()
        .map_or_else(|| config.input_dir.join("listing_price_by_state.txt"), PathBuf::from);

    info!(
        "Preprocessing HOA dumps from {} into {}",
        config.input_dir.display(),
        config.output_dir.display()
    );

    let prices = PriceReference::from_files(&zip_prices, &state_prices, config.delimiter)?;
    let output = Pipeline::new(config).run(&prices)?;
    info!("Feature table ready at {}", output.display());
    Ok(())
}
