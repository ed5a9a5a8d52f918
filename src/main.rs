use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use usage_tracker::{
    AppState,
    cache::{BackingStore, RedisStore, RedisTimeouts},
    config::Config,
    router::create_router,
    usage::MemoryUsageSource,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env();

    // Redis 连接是惰性的，启动时不可用也能以降级模式运行
    let timeouts = RedisTimeouts {
        connect: config.redis_connect_timeout(),
        command: config.redis_command_timeout(),
    };
    let store: Arc<dyn BackingStore> =
        Arc::new(RedisStore::open(&config.redis_url, timeouts).expect("Invalid REDIS_URL"));

    // 用量数据暂存在进程内，重启即丢失，只保留最近 7 天
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(
        config.clone(),
        store.clone(),
        Arc::new(MemoryUsageSource::new()),
        shutdown_rx,
    );

    if state.cache.is_available().await {
        tracing::info!(url = %config.redis_url, "Connected to Redis");
    } else {
        tracing::warn!(url = %config.redis_url, "Redis unavailable, running without cache");
    }

    let router = create_router(state.clone());

    // 开发模式允许所有来源
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
            // 结束所有实时会话
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("Failed to start server");

    if !state.tasks.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!(dropped = state.tasks.dropped(), "Background tasks abandoned at shutdown");
    }
    store.close().await;
    tracing::info!(
        background_failures = state.tasks.failures(),
        "Server stopped"
    );
}
