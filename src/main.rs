mod config;
mod db;
mod dedup;
mod event;
mod pipeline;
mod plate;
mod recognition;
mod recorder;
mod types;
mod webhook;

use config::Config;
use db::SqliteStore;
use dedup::SystemClock;
use env_logger::Env;
use log::{error, info};
use pipeline::{selector_for, Pipeline};
use recognition::HttpRecognizer;
use std::process;
use std::sync::Arc;

#[macro_use]
extern crate failure;

fn build_pipeline(config: &Config) -> Result<Pipeline, failure::Error> {
    let store = SqliteStore::open(&config.db_path, &config.table)?;
    let recognizer = HttpRecognizer::new(&config.recognition_url)?;
    Ok(Pipeline::new(
        Arc::new(recognizer),
        Arc::new(store),
        selector_for(config.strategy),
        Arc::new(SystemClock),
        config.duplicate_window_minutes,
        config.max_labels,
    ))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-recorder");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Bad configuration: {}", e);
            process::exit(1);
        }
    };
    info!(
        "Using {:?} selection, table {}, {} minute duplicate window",
        config.strategy, config.table, config.duplicate_window_minutes
    );
    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Unable to start pipeline: {}", e);
            process::exit(1);
        }
    };

    webhook::run(Arc::new(pipeline), config.listen_port).await;
    info!("Exiting main");
}
