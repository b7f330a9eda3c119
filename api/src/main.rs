mod generate_payload;
mod generate_response;
mod handlers;

use curriculum_generator::GeneratorConfig;
use handlers::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::init();

    let config = GeneratorConfig::from_env()?;
    let state = AppState::from_config(&config);
    if state.generator.is_some() {
        log::info!("Generator initialized with model {}", config.model);
    } else {
        log::warn!("No model credential configured; /generate will answer 500");
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
