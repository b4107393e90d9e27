use std::time::Duration;

use crate::env::ReadEnv;

const DEFAULT_SERVICE_NAME_PREFIX: &str = "istio-";
const DEFAULT_SERVICE_DOMAIN: &str = "svc.cluster.local";
const DEFAULT_SERVICE_PORT: u16 = 5555;
const DEFAULT_PROXY_PORT: u16 = 8080;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Settings of the mesh consumer interceptor.
///
/// Resolved from environment variables:
/// - `ISTIO_SERVICE_NAME_PREFIX`: prefix stripped from catalog service names (default: `istio-`)
/// - `ISTIO_CONSUMER_ID`: consumer id injected into bind requests (default: none)
/// - `ISTIO_NETWORK_PROFILE`: network profile requested on bind (default: none)
/// - `ISTIO_SERVICE_DOMAIN`: domain of the mesh-local service hosts (default: `svc.cluster.local`)
/// - `ISTIO_SERVICE_PORT`: port of the mesh-local services (default: 5555)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub service_name_prefix: String,
    pub consumer_id: String,
    pub network_profile: String,
    pub service_domain: String,
    pub service_port: u16,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            service_name_prefix: DEFAULT_SERVICE_NAME_PREFIX.to_string(),
            consumer_id: String::new(),
            network_profile: String::new(),
            service_domain: DEFAULT_SERVICE_DOMAIN.to_string(),
            service_port: DEFAULT_SERVICE_PORT,
        }
    }
}

impl InterceptorConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            service_name_prefix: env
                .var("ISTIO_SERVICE_NAME_PREFIX")
                .unwrap_or_else(|_| DEFAULT_SERVICE_NAME_PREFIX.to_string()),
            consumer_id: env.var("ISTIO_CONSUMER_ID").unwrap_or_default(),
            network_profile: env.var("ISTIO_NETWORK_PROFILE").unwrap_or_default(),
            service_domain: env
                .var("ISTIO_SERVICE_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_SERVICE_DOMAIN.to_string()),
            service_port: env
                .var("ISTIO_SERVICE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SERVICE_PORT),
        }
    }
}

/// Which interceptor the proxy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterceptorKind {
    #[default]
    Consumer,
    NoOp,
}

impl InterceptorKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consumer" => Some(Self::Consumer),
            "noop" | "no-op" => Some(Self::NoOp),
            _ => None,
        }
    }
}

/// Configuration of the proxy binary.
///
/// Resolved from environment variables:
/// - `OSB_PROXY_PORT`: HTTP listening port (default: 8080)
/// - `OSB_BROKER_URL`: base URL of the service broker behind the proxy (required to serve)
/// - `OSB_UPSTREAM_TIMEOUT_SECS`: timeout of each call to the broker (default: 30)
/// - `OSB_INTERCEPTOR`: `consumer` or `noop` (default: `consumer`)
/// - the `ISTIO_*` variables of [`InterceptorConfig`]
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub broker_url: Option<String>,
    pub upstream_timeout: Duration,
    pub interceptor_kind: InterceptorKind,
    pub interceptor: InterceptorConfig,
}

impl ProxyConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            port: env
                .var("OSB_PROXY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PROXY_PORT),
            broker_url: env
                .var("OSB_BROKER_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            upstream_timeout: Duration::from_secs(
                env.var("OSB_UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            interceptor_kind: env
                .var("OSB_INTERCEPTOR")
                .ok()
                .and_then(|v| InterceptorKind::parse(&v))
                .unwrap_or_default(),
            interceptor: InterceptorConfig::from_env(env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::InMemoryEnv;

    #[test]
    fn defaults_when_no_env_vars() {
        let env = InMemoryEnv::new();
        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.port, 8080);
        assert!(config.broker_url.is_none());
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.interceptor_kind, InterceptorKind::Consumer);
        assert_eq!(config.interceptor, InterceptorConfig::default());
        assert_eq!(config.interceptor.service_name_prefix, "istio-");
    }

    #[test]
    fn reads_all_env_vars() {
        let env = InMemoryEnv::new();
        env.set("ISTIO_SERVICE_NAME_PREFIX", "hello-");
        env.set("ISTIO_CONSUMER_ID", "myconsumer-id");
        env.set("ISTIO_NETWORK_PROFILE", "urn:com.sap.istio:public");
        env.set("ISTIO_SERVICE_DOMAIN", "mesh.local");
        env.set("ISTIO_SERVICE_PORT", "9000");
        env.set("OSB_PROXY_PORT", "9090");
        env.set("OSB_BROKER_URL", "http://broker:8080/");
        env.set("OSB_UPSTREAM_TIMEOUT_SECS", "5");
        env.set("OSB_INTERCEPTOR", "noop");

        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.port, 9090);
        assert_eq!(config.broker_url.as_deref(), Some("http://broker:8080"));
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.interceptor_kind, InterceptorKind::NoOp);
        assert_eq!(config.interceptor.service_name_prefix, "hello-");
        assert_eq!(config.interceptor.consumer_id, "myconsumer-id");
        assert_eq!(config.interceptor.network_profile, "urn:com.sap.istio:public");
        assert_eq!(config.interceptor.service_domain, "mesh.local");
        assert_eq!(config.interceptor.service_port, 9000);
    }

    #[test]
    fn empty_prefix_is_kept() {
        let env = InMemoryEnv::new();
        env.set("ISTIO_SERVICE_NAME_PREFIX", "");

        let config = InterceptorConfig::from_env(&env);

        assert_eq!(config.service_name_prefix, "");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let env = InMemoryEnv::new();
        env.set("OSB_PROXY_PORT", "not-a-number");
        env.set("OSB_UPSTREAM_TIMEOUT_SECS", "-1");
        env.set("ISTIO_SERVICE_PORT", "70000");

        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.port, DEFAULT_PROXY_PORT);
        assert_eq!(config.upstream_timeout, Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS));
        assert_eq!(config.interceptor.service_port, DEFAULT_SERVICE_PORT);
    }

    #[test]
    fn unknown_interceptor_kind_falls_back_to_consumer() {
        let env = InMemoryEnv::new();
        env.set("OSB_INTERCEPTOR", "provider");

        assert_eq!(ProxyConfig::from_env(&env).interceptor_kind, InterceptorKind::Consumer);
    }
}
