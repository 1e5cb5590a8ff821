use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;

use client_portal_server::config::AppSettings;
use client_portal_server::db::{create_pool, run_migrations, verify_connection};
use client_portal_server::middleware::SessionAuthentication;
use client_portal_server::models::AppState;
use client_portal_server::routes::{configure_protected_routes, configure_public_routes};
use client_portal_server::services::SessionStore;
use client_portal_server::views::templates;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_settings = match AppSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load application settings: {}", e);
            log::error!("Cannot start server without valid settings");
            std::process::exit(1);
        }
    };

    // Database connection setup
    let db_pool = match create_pool(&app_settings.database).await {
        Ok(pool) => {
            if let Err(e) = verify_connection(&pool).await {
                log::error!("Database connection verification failed: {}", e);
                log::error!("Cannot start server without a working database connection");
                std::process::exit(1);
            }
            log::info!("Database connection established successfully");
            pool
        }
        Err(e) => {
            log::error!("Failed to create database connection pool: {}", e);
            std::process::exit(1);
        }
    };

    if app_settings.database.run_migrations {
        if let Err(e) = run_migrations(&db_pool).await {
            log::error!("{}", e);
            std::process::exit(1);
        }
    } else {
        log::info!("RUN_MIGRATIONS=false; skipping schema migrations");
    }

    let sessions = SessionStore::new(chrono::Duration::minutes(app_settings.session.ttl_minutes));
    let _cleanup = sessions
        .clone()
        .start_cleanup_task(std::time::Duration::from_secs(app_settings.session.cleanup_interval_secs.max(1)));
    log::info!(
        "Session store ready (ttl {} min, cleanup every {}s)",
        app_settings.session.ttl_minutes,
        app_settings.session.cleanup_interval_secs
    );

    let host = app_settings.server.host.clone();
    let port = app_settings.server.port;

    let state = match AppState::new(db_pool, app_settings, sessions.clone()) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = state.storage.ensure_root() {
        log::error!("Upload directory unusable: {}", e);
        std::process::exit(1);
    }

    match state.users.bootstrap_admin(&state.settings.bootstrap).await {
        Ok(Some(id)) => log::info!("Bootstrap admin {} ready", id),
        Ok(None) => {}
        Err(e) => log::error!("Bootstrap admin could not be created: {}", e),
    }

    let templates = match templates::build() {
        Ok(tera) => web::Data::new(tera),
        Err(e) => {
            log::error!("Failed to load page templates: {}", e);
            std::process::exit(1);
        }
    };

    let state = web::Data::new(state);
    let sessions = web::Data::new(sessions);
    let max_upload = state.settings.uploads.max_bytes;

    log::info!("Starting server at http://{}:{}", host, port);
    let listener = TcpListener::bind(format!("{}:{}", host, port))?;

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(sessions.clone())
            .app_data(templates.clone())
            .app_data(web::PayloadConfig::new(max_upload))
            .app_data(web::FormConfig::default().limit(64 * 1024))
            .configure(configure_public_routes)
            .service(
                web::scope("")
                    .wrap(SessionAuthentication)
                    .configure(configure_protected_routes),
            )
    })
    .listen(listener)?
    .run()
    .await
}
