//! HR Forms
//!
//! A multi-tenant HR records service. Administrators define form templates
//! made of typed fields; employee records are instances of a template holding
//! one value per field.
//!
//! ## Features
//!
//! - **Templates**: typed fields, ordering, deactivation
//! - **Employees**: validated create/update/delete, search, credentials
//! - **Audit trail**: every lifecycle action on an employee, per owner
//! - **Self-service**: employees register, log in and edit their own record

mod config;
mod db;
mod engine;
mod handlers;
mod models;
mod store;
mod validation;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use engine::{Argon2Hasher, Engine, LocalFileStorage, SystemClock};
use handlers::middleware::{require_admin, require_employee, security_headers};
use handlers::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::postgres::PostgresStore;
use tokio::fs;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hr_forms=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Starting HR Forms");
    tracing::info!("Environment: {:?}", config.environment);

    // Create database pool
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Ensure upload directory exists
    let upload_dir = PathBuf::from(&config.upload_dir);
    fs::create_dir_all(&upload_dir).await?;
    tracing::info!("Upload directory: {:?}", upload_dir);

    let engine = Engine::new(
        Arc::new(PostgresStore::new(pool.clone())),
        Arc::new(Argon2Hasher),
        Arc::new(LocalFileStorage::new(upload_dir)),
        Arc::new(SystemClock),
    );

    if config.admin_registration {
        tracing::warn!("Administrator registration is open");
    }

    // Create application state
    let state = AppState {
        pool,
        engine,
        max_upload_size: config.max_upload_size,
        is_production: config.is_production(),
        trusted_proxies: config.trusted_proxies.clone(),
        session_expiry_hours: config.session_expiry_hours,
        employee_session_hours: config.employee_session_hours,
        admin_registration: config.admin_registration,
    };

    // Build CORS layer
    let cors = if config.is_production() {
        CorsLayer::new()
            .allow_origin(
                config
                    .cors_origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        CorsLayer::permissive()
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_upload_size))
        .layer(cors);

    // Start server
    let addr = config.server_addr();
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    // Administrator endpoints, behind the admin session
    let admin_routes = Router::new()
        .route("/admin/me", get(handlers::get_current_admin))
        .route("/admin/dashboard", get(handlers::get_dashboard_stats))
        .route(
            "/admin/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/admin/templates/:id",
            get(handlers::get_template).delete(handlers::delete_template),
        )
        .route(
            "/admin/templates/:id/deactivate",
            post(handlers::deactivate_template),
        )
        .route(
            "/admin/templates/:id/fields",
            post(handlers::add_template_field),
        )
        .route(
            "/admin/templates/:id/fields/order",
            put(handlers::reorder_template_fields),
        )
        .route(
            "/admin/employees",
            get(handlers::list_employees).post(handlers::create_employee),
        )
        .route(
            "/admin/employees/by-uuid/:uuid",
            get(handlers::get_employee_by_uuid),
        )
        .route(
            "/admin/employees/:id",
            get(handlers::get_employee)
                .put(handlers::update_employee)
                .delete(handlers::delete_employee),
        )
        .route(
            "/admin/employees/:id/credentials",
            put(handlers::set_employee_credentials),
        )
        .route("/admin/audit", get(handlers::list_audit))
        .route("/admin/uploads", post(handlers::upload_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Employee self-service, behind the employee session
    let employee_routes = Router::new()
        .route(
            "/employee/me",
            get(handlers::get_current_employee).put(handlers::update_current_employee),
        )
        .route(
            "/employee/change-password",
            post(handlers::change_employee_password),
        )
        .route("/employee/uploads", post(handlers::employee_upload_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_employee,
        ));

    let public_routes = Router::new()
        .route("/field-types", get(handlers::list_field_types))
        .route("/public/templates", get(handlers::list_public_templates))
        .route("/public/templates/:id", get(handlers::get_public_template))
        .route("/admin/register", post(handlers::admin_register))
        .route("/admin/login", post(handlers::admin_login))
        .route("/admin/logout", post(handlers::admin_logout))
        .route("/employee/register", post(handlers::employee_register))
        .route("/employee/login", post(handlers::employee_login))
        .route("/employee/logout", post(handlers::employee_logout));

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(employee_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), security_headers))
        .with_state(state)
}
