use anyhow::Result;
use axum::{Router, middleware, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use reward_gate::{
    ActionGateway, ActivityGuard, AuditLogger, CodeInventory, DatabasePool, GatewayPolicy,
    GuardPolicy, InventoryStore, LedgerStore, MemoryStore, RewardLedger, RiskAssessor,
    api::{
        AdminApiState, GatewayApiState, SecurityMiddlewareConfig, SecurityState,
        body_size_middleware, create_actions_router, create_admin_router, create_risk_router,
        create_store_router, logging_middleware, security_headers_middleware,
    },
    config::{GateConfig, RiskMode, sanitize_for_logging},
};

/// How often stale origins and idle identities are swept
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

const AUDIT_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(GateConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check REWARD_* environment variables.");
        e
    })?);

    init_logging(&config)?;

    info!("Starting reward gate");
    info!(
        "Risk mode: {:?}, high-risk threshold: {}, origin cache TTL: {}s",
        config.risk.mode, config.risk.high_risk_threshold, config.risk.cache_ttl_secs
    );
    if config.risk.mode == RiskMode::Block {
        info!(
            "High-risk origins will be blocked (threshold {})",
            config.risk.high_risk_threshold
        );
    }

    let (ledger_store, inventory_store) = open_stores(&config).await?;

    let assessor = Arc::new(RiskAssessor::from_config(&config.risk));
    let guard = Arc::new(ActivityGuard::new(GuardPolicy::from(&config.guard)));
    let gateway = Arc::new(ActionGateway::new(
        assessor,
        guard,
        Arc::new(RewardLedger::new(ledger_store)),
        Arc::new(CodeInventory::new(inventory_store)),
        Arc::new(AuditLogger::new(AUDIT_CAPACITY)),
        GatewayPolicy::from(config.as_ref()),
    ));

    spawn_housekeeping(gateway.clone(), config.guard.idle_eviction_secs);

    match config.security.admin_api_key.as_deref() {
        Some(key) if config.logging.sanitize_logs => {
            info!("Admin API enabled with key {}", sanitize_for_logging(key))
        }
        Some(_) => info!("Admin API enabled"),
        None => warn!("REWARD_ADMIN_API_KEY not set - admin endpoints will refuse all requests"),
    }

    let security_state = SecurityState::new(SecurityMiddlewareConfig::from(config.as_ref()));
    let api_state = GatewayApiState {
        gateway: gateway.clone(),
    };

    let app = Router::new()
        .nest("/actions", create_actions_router(api_state.clone()))
        .nest("/risk", create_risk_router(api_state.clone()))
        .nest("/store", create_store_router(api_state))
        .nest(
            "/admin",
            create_admin_router(AdminApiState {
                gateway,
                admin_api_key: config.security.admin_api_key.clone(),
            }),
        )
        .route("/health", get(|| async { "OK" }))
        // Apply security middleware layers (order matters!)
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state,
            logging_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Reward gate listening on {}", bind_addr);

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Reward gate stopped");
    Ok(())
}

/// PostgreSQL when enabled, otherwise the in-memory store
async fn open_stores(
    config: &GateConfig,
) -> Result<(Arc<dyn LedgerStore>, Arc<dyn InventoryStore>)> {
    if config.database.postgres_enabled {
        let db = DatabasePool::new(&config.database).await?;
        db.init_schema().await?;
        let ledger: Arc<dyn LedgerStore> = db.balances();
        let inventory: Arc<dyn InventoryStore> = db.inventory();
        return Ok((ledger, inventory));
    }

    warn!("PostgreSQL disabled - balances and codes are kept in memory and lost on restart");
    let store = Arc::new(MemoryStore::new());
    let ledger: Arc<dyn LedgerStore> = store.clone();
    let inventory: Arc<dyn InventoryStore> = store;
    Ok((ledger, inventory))
}

fn spawn_housekeeping(gateway: Arc<ActionGateway>, idle_eviction_secs: u64) {
    let idle = chrono::Duration::seconds(idle_eviction_secs as i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            ticker.tick().await;
            let (origins, identities) = gateway.housekeep(chrono::Utc::now(), idle);
            if origins > 0 || identities > 0 {
                info!(origins, identities, "Housekeeping evicted stale entries");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Initialize logging with the configured level
fn init_logging(config: &GateConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with identity and address masking");
    }

    Ok(())
}
