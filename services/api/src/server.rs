use crate::cli::ServeArgs;
use crate::infra::{load_fixtures, AppState, LoggingAlertPublisher};
use crate::routes::with_lead_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use flowpilot::config::AppConfig;
use flowpilot::error::AppError;
use flowpilot::telemetry;
use flowpilot::workflows::leads::{HttpWebhookPublisher, InMemoryLeadRepository, LeadIntakeService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let fixtures = load_fixtures(args.fixtures.as_deref())?;
    let repository = Arc::new(InMemoryLeadRepository::from_fixtures(fixtures));
    let alerts = Arc::new(LoggingAlertPublisher::default());
    let webhooks = Arc::new(HttpWebhookPublisher::from_config(&config.automation)?);
    let lead_service = Arc::new(LeadIntakeService::new(
        repository,
        alerts,
        webhooks,
        config.automation.clone(),
    ));

    let app = with_lead_routes(lead_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "flowpilot lead service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
