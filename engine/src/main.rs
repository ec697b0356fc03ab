use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod classifier;
mod config;
mod database;
mod error;
mod handlers;
mod integrations;
mod jobs;
mod sequences;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

use classifier::{ScoreWeights, ServiceCatalog};
use integrations::{CrmAdapter, CrmClient, EmailAdapter, EmailClient};
use jobs::{JobConfig, JobScheduler};
use sequences::{store::postgres::PgSequenceStore, SequenceScheduler, SequenceStore};
use workflows::{presets, DispatchTable, WorkflowDefinition, WorkflowRunner};

pub struct AppState {
    pub runner: WorkflowRunner,
    pub sequences: Arc<SequenceScheduler>,
    pub store: Arc<dyn SequenceStore>,
    pub crm: CrmClient,
    pub jobs: Arc<JobScheduler>,
    pub intake: WorkflowDefinition,
    pub catalog: ServiceCatalog,
    pub weights: ScoreWeights,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let env = config.env_snapshot();
    let crm = CrmClient::new(&config.crm);
    let email = EmailClient::new(&config.email);

    let table = Arc::new(
        DispatchTable::new()
            .with(Arc::new(CrmAdapter::new(crm.clone())))
            .with(Arc::new(EmailAdapter::new(email))),
    );

    let store: Arc<dyn SequenceStore> = Arc::new(PgSequenceStore::new(db_pool.clone()));
    let sequences = Arc::new(SequenceScheduler::new(
        store.clone(),
        table.clone(),
        env.clone(),
    ));

    let job_scheduler = Arc::new(
        JobScheduler::new(
            sequences.clone(),
            JobConfig {
                sequence_tick_interval_minutes: config.sequence_tick_interval_minutes,
            },
        )
        .await?,
    );
    job_scheduler.start().await?;

    let app_state = Arc::new(AppState {
        runner: WorkflowRunner::new(table, env),
        sequences,
        store,
        crm,
        jobs: job_scheduler,
        intake: presets::lead_intake(),
        catalog: ServiceCatalog::default(),
        weights: ScoreWeights::default(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Leadline Automation Engine v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/leads", handlers::lead_routes())
        .nest("/api/v1/sequences", handlers::sequence_routes())
        .nest("/api/v1/jobs", handlers::job_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
