// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use pcb_defect_detector::{
    api::{start_server, AppState},
    cli::Cli,
    version,
    vision::DetectionModelManager,
};
use std::{env, sync::Arc};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("Starting {}", version::get_version_string());

    let config = Cli::parse().into_config()?;
    info!(
        "Model: {} on {}, {} classes",
        config.model.model_path.display(),
        config.model.device.as_str(),
        config.model.class_names.len()
    );

    // Load once; every request shares this manager
    let manager = DetectionModelManager::load(&config)?;
    info!(
        "Detection model ready, max {} concurrent inferences",
        manager.limits().max_concurrent
    );

    let state = AppState::new(Arc::new(manager), &config);
    start_server(&config, state).await
}
