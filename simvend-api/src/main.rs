use anyhow::Context;
use simvend_api::{app, worker, AppState};
use simvend_core::{PaymentGateway, ProvisioningClient};
use simvend_gateway::{
    FiveSimClient, HttpSettings, MockPaymentGateway, MockProvisioningClient, XenditGateway,
};
use simvend_order::{
    FulfillmentSettings, InMemoryOrderStore, OrderStateMachine, OrderStore, ReconciliationSweep,
};
use simvend_api::middleware::{CallbackScheme, SignatureVerifier};
use simvend_store::app_config::{
    CallbackAuth, Config, PaymentDriver, ProvisioningDriver, StorageBackend,
};
use simvend_store::{DbClient, PgOrderStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "simvend_api=debug,simvend_order=debug,simvend_gateway=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting SimVend API on port {}", config.server.port);

    let store = order_store(&config).await?;
    let gateway = payment_gateway(&config)?;
    let provisioning = provisioning_client(&config)?;

    let machine = Arc::new(OrderStateMachine::new(
        store,
        gateway,
        provisioning,
        FulfillmentSettings {
            gateway_timeout: config.payment.timeout(),
            provisioning_timeout: config.provisioning.timeout(),
        },
    ));

    let sweep = ReconciliationSweep::new(
        machine.clone(),
        config.fulfillment.sweep_batch_size,
        Duration::from_secs(config.fulfillment.stale_provisioning_seconds),
    );
    let every = Duration::from_secs(config.fulfillment.sweep_interval_seconds.max(1));
    tokio::spawn(worker::start_reconciliation_worker(sweep, every));

    if config.payment.webhook_secret.expose().is_empty() {
        tracing::error!("payment.webhook_secret is empty, every payment callback will be rejected");
    }

    let scheme = match config.payment.callback_auth {
        CallbackAuth::Token => CallbackScheme::Token,
        CallbackAuth::Hmac => CallbackScheme::HmacSha256,
    };
    let app_state = AppState::new(
        machine,
        SignatureVerifier::with_scheme(config.payment.webhook_secret.clone(), scheme),
        config.auth.jwt_secret.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn order_store(config: &Config) -> anyhow::Result<Arc<dyn OrderStore>> {
    match config.database.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(config.database.url.expose(), config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok(Arc::new(PgOrderStore::new(db.pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory order store; orders are lost on restart");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

fn payment_gateway(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    let payment = &config.payment;
    match payment.driver {
        PaymentDriver::Xendit => {
            let settings = HttpSettings {
                api_url: payment.api_url.clone(),
                api_key: payment.api_key.clone(),
                timeout: payment.timeout(),
            };
            Ok(Arc::new(XenditGateway::new(settings).context("Failed to build Xendit client")?))
        }
        PaymentDriver::Mock => {
            tracing::warn!("Using the mock payment gateway");
            Ok(Arc::new(MockPaymentGateway))
        }
    }
}

fn provisioning_client(config: &Config) -> anyhow::Result<Arc<dyn ProvisioningClient>> {
    let provisioning = &config.provisioning;
    match provisioning.driver {
        ProvisioningDriver::Fivesim => {
            let settings = HttpSettings {
                api_url: provisioning.api_url.clone(),
                api_key: provisioning.api_key.clone(),
                timeout: provisioning.timeout(),
            };
            Ok(Arc::new(FiveSimClient::new(settings).context("Failed to build 5sim client")?))
        }
        ProvisioningDriver::Mock => {
            tracing::warn!("Using the mock provisioning client");
            Ok(Arc::new(MockProvisioningClient::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
