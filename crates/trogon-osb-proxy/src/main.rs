use trogon_osb_proxy::env::SystemEnv;
use trogon_osb_proxy::{
    ConsumerInterceptor, InterceptorKind, MemoryRouteStore, NoOpInterceptor, ProxyConfig, serve,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env(&SystemEnv);
    tracing::info!(
        port = config.port,
        interceptor = ?config.interceptor_kind,
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        "OSB proxy starting"
    );

    let result = match config.interceptor_kind {
        InterceptorKind::Consumer => {
            let interceptor =
                ConsumerInterceptor::new(config.interceptor.clone(), MemoryRouteStore::new());
            serve(config, interceptor).await
        }
        InterceptorKind::NoOp => serve(config, NoOpInterceptor).await,
    };
    result.expect("Server failed");
}
