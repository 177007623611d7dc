#[macro_use]
extern crate log;

use actix_web::{middleware, web, App, HttpServer};

use deployer_api::{routes, AppState, Config};

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("building orchestrator for primary context '{}'", cfg.primary_context);
    let state = match AppState::new(cfg).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            error!("failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    info!("starting deployerd on 0.0.0.0:8080");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default().exclude("/health"))
            .route("/start", web::post().to(routes::start))
            .route("/stop", web::post().to(routes::stop))
            .route("/inventory", web::get().to(routes::inventory))
            .route("/dump", web::get().to(routes::dump))
            .route("/health", web::get().to(routes::health))
    })
    .bind("0.0.0.0:8080")?
    .shutdown_timeout(0)
    .run()
    .await
}
