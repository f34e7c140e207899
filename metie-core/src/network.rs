//! How the database connection reaches its host.
//!
//! By default the writer dials the host directly. When a SOCKS5 proxy is set the
//! connection is tunnelled through it, and hosts under the mesh domain suffix are
//! resolved against the mesh resolver first (the system resolver cannot see them).

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use hickory_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, WriteError};

pub const DEFAULT_MESH_SUFFIX: &str = ".ts.net";
pub const DEFAULT_MESH_RESOLVER: &str = "100.100.100.100:53";

/// Per-attempt lookup timeout against the mesh resolver.
const MESH_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPolicy {
    /// `host:port` of a SOCKS5 proxy. Unset means direct connections.
    pub socks_proxy: Option<String>,
    /// Resolve mesh hosts through `mesh_resolver` when proxying.
    pub mesh_dns: bool,
    pub mesh_suffix: String,
    pub mesh_resolver: SocketAddr,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            socks_proxy: None,
            mesh_dns: true,
            mesh_suffix: DEFAULT_MESH_SUFFIX.to_string(),
            mesh_resolver: SocketAddr::from(([100, 100, 100, 100], 53)),
        }
    }
}

/// Where the proxy should be asked to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTarget {
    /// Let the proxy resolve the name.
    Host(String, u16),
    /// Already resolved through the mesh resolver.
    Addr(SocketAddr),
}

impl NetworkPolicy {
    pub fn direct() -> Self {
        Self::default()
    }

    /// Same policy, routed through `proxy`.
    pub fn with_socks_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.socks_proxy = Some(proxy.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(addr) = &self.socks_proxy else {
            return Ok(());
        };

        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidProxy { addr: addr.clone() })
        }
    }

    /// Whether `host` must be looked up through the mesh resolver.
    pub fn uses_mesh_dns(&self, host: &str) -> bool {
        self.socks_proxy.is_some() && self.mesh_dns && host.ends_with(&self.mesh_suffix)
    }

    /// Decide the address handed to the proxy for `host:port`.
    pub async fn proxy_target(&self, host: &str, port: u16) -> Result<ProxyTarget, WriteError> {
        if !self.uses_mesh_dns(host) {
            return Ok(ProxyTarget::Host(host.to_string(), port));
        }

        let ip = self.resolve_mesh(host).await?;
        debug!(%host, %ip, resolver = %self.mesh_resolver, "resolved mesh host");
        Ok(ProxyTarget::Addr(SocketAddr::new(ip, port)))
    }

    async fn resolve_mesh(&self, host: &str) -> Result<IpAddr, WriteError> {
        let servers = NameServerConfigGroup::from_ips_clear(
            &[self.mesh_resolver.ip()],
            self.mesh_resolver.port(),
            true,
        );
        let mut opts = ResolverOpts::default();
        opts.timeout = MESH_LOOKUP_TIMEOUT;
        opts.attempts = 1;
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, vec![], servers), opts);

        let lookup = resolver.lookup_ip(host).await.map_err(|e| WriteError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        lookup.iter().next().ok_or_else(|| WriteError::Resolve {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_policy_never_uses_mesh_dns() {
        let policy = NetworkPolicy::direct();
        assert!(!policy.uses_mesh_dns("db.example.ts.net"));
    }

    #[test]
    fn mesh_dns_only_for_mesh_hosts() {
        let policy = NetworkPolicy::direct().with_socks_proxy("localhost:1055");

        assert!(policy.uses_mesh_dns("db.example.ts.net"));
        assert!(!policy.uses_mesh_dns("db.example.com"));
    }

    #[test]
    fn mesh_dns_can_be_switched_off() {
        let policy = NetworkPolicy { mesh_dns: false, ..NetworkPolicy::direct().with_socks_proxy("localhost:1055") };
        assert!(!policy.uses_mesh_dns("db.example.ts.net"));
    }

    #[test]
    fn default_resolver_matches_constant() {
        let parsed: SocketAddr = DEFAULT_MESH_RESOLVER.parse().expect("valid address");
        assert_eq!(NetworkPolicy::default().mesh_resolver, parsed);
    }

    #[test]
    fn proxy_address_needs_a_port() {
        assert!(NetworkPolicy::direct().with_socks_proxy("localhost:1055").validate().is_ok());
        assert!(NetworkPolicy::direct().with_socks_proxy("localhost").validate().is_err());
        assert!(NetworkPolicy::direct().with_socks_proxy(":1055").validate().is_err());
    }

    #[tokio::test]
    async fn non_mesh_hosts_are_resolved_by_the_proxy() {
        let policy = NetworkPolicy::direct().with_socks_proxy("localhost:1055");
        let target = policy.proxy_target("db.example.com", 5432).await.expect("no lookup needed");

        assert_eq!(target, ProxyTarget::Host("db.example.com".into(), 5432));
    }

    #[tokio::test]
    async fn unreachable_mesh_resolver_is_a_resolve_error() {
        // Nothing answers DNS on port 1.
        let policy = NetworkPolicy {
            mesh_resolver: SocketAddr::from(([127, 0, 0, 1], 1)),
            ..NetworkPolicy::direct().with_socks_proxy("localhost:1055")
        };

        let err = tokio::time::timeout(
            Duration::from_secs(20),
            policy.proxy_target("db.example.ts.net", 5432),
        )
        .await
        .expect("lookup must give up")
        .unwrap_err();

        assert!(matches!(err, WriteError::Resolve { ref host, .. } if host == "db.example.ts.net"), "got {err:?}");
        assert_eq!(err.reason(), "connection");
    }

    #[test]
    fn network_table_parses_from_toml() {
        let policy: NetworkPolicy = toml::from_str(
            "socks_proxy = \"localhost:1055\"\nmesh_suffix = \".mesh.internal\"\nmesh_resolver = \"10.0.0.53:53\"\n",
        )
        .expect("valid policy");

        assert!(policy.uses_mesh_dns("db.mesh.internal"));
        assert_eq!(policy.mesh_resolver, SocketAddr::from(([10, 0, 0, 53], 53)));
    }
}
