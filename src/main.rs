use std::env;
use std::sync::Arc;

use anyhow::Result;
use hearthbind::bridge::Bridge;
use hearthbind::config::BridgeConfig;
use hearthbind::scheduler::SystemClock;
use hearthbind::sim::SimWorld;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/bridge.json";

fn main() {
    if let Err(err) = run() {
        eprintln!("Application error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = BridgeConfig::load_or_default(&path);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (bridge, registered) = Bridge::from_config(&config, SimWorld::new(0), Arc::new(SystemClock::default()))?;
    for event in &registered {
        tracing::info!(target: "bridge", interface = %event.interface, id = event.id, "{}:{}", event.file, event.event);
    }
    let reports = bridge.env().with(|env| env.diagnostics().len()).unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&registered)?);
    if reports > 0 {
        tracing::warn!(target: "bridge", reports, "scripts reported errors while loading");
    }
    Ok(())
}
