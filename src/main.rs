use expense_tracker_api::{Config, build_rocket, init_tracing};

#[rocket::main]
async fn main() {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.json_format);
    tracing::info!(port = config.server.port, address = %config.server.address, "starting expense tracker api");

    let rocket = match build_rocket(config) {
        Ok(rocket) => rocket,
        Err(e) => {
            tracing::error!(error = ?e, "failed to build server");
            std::process::exit(1);
        }
    };

    if let Err(e) = rocket.launch().await {
        tracing::error!(error = %e, "server stopped with error");
        std::process::exit(1);
    }
}
