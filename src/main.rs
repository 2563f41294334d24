// src/main.rs
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};

use metheu::config::Config;
use metheu::{AppState, handlers};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting METHEU production-order service...");

    let config = Config::from_env();
    if config.api_key.is_none() {
        warn!(
            "No API key configured for provider {}; analyses will fail with a configuration error",
            config.provider.as_str()
        );
    }

    let app_state = AppState::from_config(&config);
    info!(
        "Using {}/{} with a {:?} timeout, {} fabrics",
        app_state.analyzer.provider(),
        app_state.analyzer.model_name(),
        config.request_timeout,
        app_state.analyzer.fabrics().all().len()
    );

    let max_upload_bytes = config.max_upload_bytes;
    let static_dir = config.static_dir.clone();
    let serve_static = static_dir.is_dir();
    if serve_static {
        info!("Serving front-end from {}", static_dir.display());
    }

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(handlers::api_scope(max_upload_bytes))
            .route("/health", web::get().to(handlers::health_check))
            .configure(|cfg| {
                if serve_static {
                    cfg.service(Files::new("/", &static_dir).index_file("index.html"));
                }
            })
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
