pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::bson::DateTime;
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use config::{Config, PolicyConfig};
use services::{
    AdminOverrideService, AuditStore, DebtProjector, InvoiceService, InvoiceStore,
    MongoAuditStore, MongoInvoiceStore, MongoPaymentStore, MongoUserStore, PaymentService,
    PaymentStore, ReconciliationService, UserStore,
};

#[derive(Clone)]
pub struct AppState {
    pub invoices: Arc<dyn InvoiceStore>,
    pub users: Arc<dyn UserStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub audit: Arc<dyn AuditStore>,
    pub invoice_service: InvoiceService,
    pub payment_service: PaymentService,
    pub admin_service: AdminOverrideService,
    pub reconciliation: ReconciliationService,
}

impl AppState {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        audit: Arc<dyn AuditStore>,
        policy: &PolicyConfig,
    ) -> Self {
        let projector = DebtProjector::new(users.clone());
        let invoice_service = InvoiceService::new(invoices.clone(), projector.clone());
        let payment_service = PaymentService::new(
            payments.clone(),
            invoices.clone(),
            users.clone(),
            projector.clone(),
        );
        let admin_service = AdminOverrideService::new(
            invoices.clone(),
            users.clone(),
            payments.clone(),
            audit.clone(),
            projector.clone(),
            policy.strict_bookkeeping,
        );
        let reconciliation = ReconciliationService::new(
            invoices.clone(),
            users.clone(),
            payments.clone(),
            audit.clone(),
            projector,
            policy.drift_tolerance,
        );

        Self {
            invoices,
            users,
            payments,
            audit,
            invoice_service,
            payment_service,
            admin_service,
            reconciliation,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Invoice endpoints
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route(
            "/invoices/:id/status",
            axum::routing::patch(handlers::invoices::update_invoice_status),
        )
        // Payment endpoints
        .route("/payments", post(handlers::payments::register_payment))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/payments/:id/complete",
            post(handlers::payments::complete_payment),
        )
        .route("/payments/:id/fail", post(handlers::payments::fail_payment))
        // Debt endpoints
        .route("/users/:id/debt", get(handlers::debt::user_debt))
        // Admin endpoints
        .route(
            "/admin/invoices/status",
            post(handlers::invoices::bulk_update_status),
        )
        .route(
            "/admin/invoices/sweep",
            post(handlers::invoices::sweep_overdue),
        )
        .route("/admin/debt/statistics", get(handlers::debt::statistics))
        .route("/admin/debt/consistency", get(handlers::debt::consistency))
        .route("/admin/debt/resync", post(handlers::debt::resync))
        .route("/admin/audit", get(handlers::debt::audit_log))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    actor_id = tracing::field::Empty,
                    actor_role = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    router: Router,
    sweep_interval: Option<Duration>,
    invoice_service: InvoiceService,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let invoice_store = MongoInvoiceStore::new(&db);
        let user_store = MongoUserStore::new(&db);
        let payment_store = MongoPaymentStore::new(&db);
        let audit_store = MongoAuditStore::new(&db);

        invoice_store.init_indexes().await?;
        user_store.init_indexes().await?;
        payment_store.init_indexes().await?;
        audit_store.init_indexes().await?;

        let state = AppState::new(
            Arc::new(invoice_store),
            Arc::new(user_store),
            Arc::new(payment_store),
            Arc::new(audit_store),
            &config.policy,
        );
        let invoice_service = state.invoice_service.clone();
        let router = router(state);

        Ok(Self {
            port: config.server.port,
            router,
            sweep_interval: config.jobs.sweep_interval_secs.map(Duration::from_secs),
            invoice_service,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        if let Some(interval) = self.sweep_interval {
            let service = self.invoice_service.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick fires immediately; skip it so startup stays
                // quiet.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(err) = service.sweep_overdue(DateTime::now()).await {
                        tracing::error!(error = %err, "scheduled overdue sweep failed");
                    }
                }
            });
            tracing::info!(interval_secs = interval.as_secs(), "Overdue sweep scheduled");
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
