use std::path::Path;

use world_server::config::{config_path_from_args, ServerConfig, Settings};
use world_server::server::GameServer;
use world_server::shutdown;

#[tokio::main]
async fn main() {
    observability::init_logging();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match config_path_from_args(&args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let settings = match Settings::load(config_path.as_deref().map(Path::new)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    let config = ServerConfig::from_settings(&settings);

    tracing::info!(
        world = %config.world_name,
        addr = %config.listen_addr(),
        max_players = config.max_players,
        "world server starting"
    );

    let mut server = match GameServer::initialize(config.clone()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "initialization failed");
            std::process::exit(1);
        }
    };

    let output_rx = server.take_output_rx().expect("output channel already taken");
    let (register_tx, register_rx) = tokio::sync::mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(net::output_router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));

    let intake_config = config.to_intake_config();
    let intake_queue = server.queue();
    let intake_shutdown = server.shutdown_watch();
    tokio::spawn(async move {
        if let Err(e) = net::run_intake_loop(
            intake_config,
            intake_queue,
            register_tx,
            unregister_tx,
            intake_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "intake loop failed");
        }
    });

    server.start();

    shutdown::wait_for_signal().await;
    tracing::info!("shutting down");
    server.shutdown();
    tracing::info!("server stopped");
}
