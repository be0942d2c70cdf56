//! # Server Configuration
//!
//! Application state, router assembly and the serve loop with its background
//! collaborators (token refresh, live update notifier).

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::{CryptoError, CryptoKey};
use crate::dispatcher::ResponseDispatcher;
use crate::handlers;
use crate::notifier::{NotifierHandle, notifier};
use crate::pipeline::AutomationEngine;
use crate::platform::{GraphApiClient, PlatformApi};
use crate::recorder::InteractionRecorder;
use crate::repositories::{
    AutomationRepository, ChannelRepository, EventRepository, ReportRepository,
};
use crate::rules::RuleMatcher;
use crate::telemetry::trace_context_middleware;
use crate::token_refresh::TokenRefreshService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub channels: ChannelRepository,
    pub automations: AutomationRepository,
    pub reports: ReportRepository,
    pub engine: AutomationEngine,
}

impl AppState {
    /// Wires repositories and the automation pipeline over one pool.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        platform: Arc<dyn PlatformApi>,
        notifier: NotifierHandle,
    ) -> Result<Self, CryptoError> {
        let crypto_key = CryptoKey::new(config.crypto_key.clone().unwrap_or_default())?;
        let shared = Arc::new(db.clone());

        let channels = ChannelRepository::new(shared.clone(), crypto_key);
        let automations = AutomationRepository::new(shared.clone());
        let events = EventRepository::new(shared.clone());
        let reports = ReportRepository::new(shared);

        let engine = AutomationEngine::new(
            channels.clone(),
            events.clone(),
            RuleMatcher::new(automations.clone()),
            ResponseDispatcher::new(platform),
            InteractionRecorder::new(reports.clone(), events),
            notifier,
        );

        Ok(Self {
            config,
            db,
            channels,
            automations,
            reports,
            engine,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/channels",
            get(handlers::channels::list_channels).post(handlers::channels::create_channel),
        )
        .route(
            "/channels/{id}",
            get(handlers::channels::get_channel).delete(handlers::channels::delete_channel),
        )
        .route(
            "/channels/{id}/credential",
            put(handlers::channels::attach_credential),
        )
        .route(
            "/automations",
            get(handlers::automations::list_automations)
                .post(handlers::automations::create_automation),
        )
        .route(
            "/automations/{id}",
            get(handlers::automations::get_automation)
                .patch(handlers::automations::update_automation)
                .delete(handlers::automations::delete_automation),
        )
        .route("/reports", get(handlers::reports::list_reports))
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhook/{route}",
            get(handlers::webhooks::verify_subscription)
                .post(handlers::webhooks::receive_delivery)
                // Deliveries of any size are acknowledged, never answered with 413
                .layer(DefaultBodyLimit::disable()),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until ctrl-c, then stops background tasks.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let addr = config.bind_addr()?;

    let platform: Arc<dyn PlatformApi> = Arc::new(GraphApiClient::new(&config.graph_api)?);
    let (notifier_handle, notifier_worker) = notifier(&config.notifier)?;
    let state = AppState::new(config.clone(), db, platform.clone(), notifier_handle)?;

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    if let Some(worker) = notifier_worker {
        background.push(tokio::spawn(worker.run(shutdown.child_token())));
    }

    let refresher = TokenRefreshService::new(
        config.token_refresh.clone(),
        state.channels.clone(),
        platform,
    );
    let refresh_shutdown = shutdown.child_token();
    background.push(tokio::spawn(async move {
        refresher.run(refresh_shutdown).await;
    }));

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %error, "Failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for handle in background {
        if let Err(error) = handle.await {
            tracing::warn!(error = %error, "Background task ended abnormally");
        }
    }

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhooks::verify_subscription,
        crate::handlers::webhooks::receive_delivery,
        crate::handlers::channels::create_channel,
        crate::handlers::channels::list_channels,
        crate::handlers::channels::get_channel,
        crate::handlers::channels::attach_credential,
        crate::handlers::channels::delete_channel,
        crate::handlers::automations::create_automation,
        crate::handlers::automations::list_automations,
        crate::handlers::automations::get_automation,
        crate::handlers::automations::update_automation,
        crate::handlers::automations::delete_automation,
        crate::handlers::reports::list_reports,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::models::channel::ChannelStatus,
            crate::models::automation::InteractionKind,
            crate::models::automation::TriggerKind,
            crate::models::automation::ResponseKind,
            crate::models::interaction_report::ReportStatus,
            crate::rules::SequenceStep,
            crate::rules::SequenceStepInput,
            crate::rules::StepKind,
            crate::handlers::channels::CreateChannelRequest,
            crate::handlers::channels::AttachCredentialRequest,
            crate::handlers::channels::ChannelInfo,
            crate::handlers::channels::ChannelsResponse,
            crate::handlers::automations::CreateAutomationRequest,
            crate::handlers::automations::UpdateAutomationRequest,
            crate::handlers::automations::AutomationInfo,
            crate::handlers::automations::AutomationsResponse,
            crate::handlers::reports::ReportInfo,
            crate::handlers::reports::ReportsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information"),
        (name = "webhooks", description = "Platform webhook intake"),
        (name = "operators", description = "Channel, automation and report management"),
    ),
    info(
        title = "Poblysh Automations API",
        description = "Webhook-driven messaging automations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
