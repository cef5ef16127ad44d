use std::sync::Arc;

use galeria_web::config::{Config, DEFAULT_CONFIG_PATH};
use galeria_web::server::{create_listener, start_server_loop};
use galeria_web::{app, logger};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Size the Tokio runtime from the workers setting
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.socket_addr()?;
    let listener = create_listener(addr, cfg.server.backlog)?;

    logger::log_server_start(&addr, &cfg);
    let kernel = Arc::new(app::kernel(cfg)?);
    logger::log_route_table(&kernel.router().describe());
    logger::log_container_bindings(&kernel.container_bindings());

    start_server_loop(listener, kernel, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger::log_error(&format!("Failed to listen for shutdown signal: {e}"));
            std::future::pending::<()>().await;
        }
    })
    .await;

    Ok(())
}
