//! Host name to address resolution.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tracing::debug;
use url::Host;

use crate::error::{Error, Result};

/// DNS lookup service.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// IPv4 addresses for `host`.
    async fn lookup_a(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>>;

    /// IPv6 addresses for `host`.
    async fn lookup_aaaa(&self, host: &str) -> std::io::Result<Vec<Ipv6Addr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    async fn lookup(host: &str) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, 0)).await?.collect())
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_a(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        Ok(Self::lookup(host)
            .await?
            .into_iter()
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect())
    }

    async fn lookup_aaaa(&self, host: &str) -> std::io::Result<Vec<Ipv6Addr>> {
        Ok(Self::lookup(host)
            .await?
            .into_iter()
            .filter_map(|addr| match addr.ip() {
                IpAddr::V6(ip) => Some(ip),
                IpAddr::V4(_) => None,
            })
            .collect())
    }
}

/// Resolve the host of a URL to one address.
///
/// IP literals are used as-is and `localhost` maps to `127.0.0.1`. Other
/// names are looked up for A and AAAA records concurrently; the first A
/// record wins, then the first AAAA record.
///
/// # Errors
///
/// Returns `Error::Resolution` if no address is found.
pub async fn resolve_host(resolver: &dyn Resolver, host: Host<&str>) -> Result<IpAddr> {
    let name = match host {
        Host::Ipv4(ip) => return Ok(IpAddr::V4(ip)),
        Host::Ipv6(ip) => return Ok(IpAddr::V6(ip)),
        Host::Domain(name) => name,
    };

    if name.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    let (v4, v6) = tokio::join!(resolver.lookup_a(name), resolver.lookup_aaaa(name));

    let v4 = v4.unwrap_or_else(|e| {
        debug!(host = name, error = %e, "A lookup failed");
        Vec::new()
    });
    if let Some(ip) = v4.first() {
        return Ok(IpAddr::V4(*ip));
    }

    let v6 = v6.unwrap_or_else(|e| {
        debug!(host = name, error = %e, "AAAA lookup failed");
        Vec::new()
    });
    v6.first()
        .map(|ip| IpAddr::V6(*ip))
        .ok_or_else(|| Error::Resolution(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FixedResolver {
        a: Vec<Ipv4Addr>,
        aaaa: Vec<Ipv6Addr>,
        fail_a: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn lookup_a(&self, _host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_a {
                return Err(std::io::Error::other("servfail"));
            }
            Ok(self.a.clone())
        }

        async fn lookup_aaaa(&self, _host: &str) -> std::io::Result<Vec<Ipv6Addr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.aaaa.clone())
        }
    }

    #[tokio::test]
    async fn test_ip_literals_skip_lookup() {
        let resolver = FixedResolver::default();

        let ip = resolve_host(&resolver, Host::Ipv4(Ipv4Addr::new(10, 0, 0, 1)))
            .await
            .unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let ip = resolve_host(&resolver, Host::Ipv6(Ipv6Addr::LOCALHOST))
            .await
            .unwrap();
        assert_eq!(ip, IpAddr::V6(Ipv6Addr::LOCALHOST));

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_localhost_shortcut() {
        let resolver = FixedResolver::default();
        let ip = resolve_host(&resolver, Host::Domain("LocalHost")).await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prefers_a_record() {
        let resolver = FixedResolver {
            a: vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)],
            aaaa: vec![Ipv6Addr::LOCALHOST],
            ..Default::default()
        };
        let ip = resolve_host(&resolver, Host::Domain("example.test")).await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_aaaa() {
        let resolver = FixedResolver {
            aaaa: vec![Ipv6Addr::LOCALHOST],
            fail_a: true,
            ..Default::default()
        };
        let ip = resolve_host(&resolver, Host::Domain("example.test")).await.unwrap();
        assert_eq!(ip, IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let resolver = FixedResolver::default();
        let result = resolve_host(&resolver, Host::Domain("nowhere.test")).await;
        assert!(matches!(result, Err(Error::Resolution(name)) if name == "nowhere.test"));
    }
}
