//! Connectivity planner (Module C), grounded in
//! `athena_ai/executors/connectivity.py`.
//!
//! Decides whether a target host should be reached directly or through a
//! jump host, without ever touching the knowledge store's storage format
//! directly — callers supply a [`RouteLookup`] implementation instead.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStrategy {
    Direct,
    Jump { jump_host: String },
}

/// Abstraction over the persistent route table (longest-prefix-match CIDR
/// lookup), so `merlya-ssh` doesn't depend on `merlya-store`'s schema.
pub trait RouteLookup: Send + Sync {
    fn get_route_for_host(&self, ip: &str) -> Option<String>;
}

pub struct ConnectivityPlanner<'a> {
    route_lookup: &'a dyn RouteLookup,
}

impl<'a> ConnectivityPlanner<'a> {
    pub fn new(route_lookup: &'a dyn RouteLookup) -> Self {
        Self { route_lookup }
    }

    /// Checks TCP reachability on `port` with a 2s timeout, dispatched onto
    /// a blocking thread since `std::net::TcpStream` has no async API.
    pub async fn is_port_open(&self, host: &str, port: u16) -> bool {
        let target = format!("{host}:{port}");
        tokio::task::spawn_blocking(move || {
            let Ok(mut addrs) = target.to_socket_addrs() else {
                return false;
            };
            let Some(addr) = addrs.next() else {
                return false;
            };
            TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok()
        })
        .await
        .unwrap_or(false)
    }

    /// Determines how to connect to `target_host`. Tries a direct TCP
    /// check on :22 first (fastest path); on failure, resolves `target_ip`
    /// if absent and looks up a route; falls back to direct so the
    /// eventual SSH attempt can fail naturally rather than the planner
    /// pre-emptively giving up.
    pub async fn get_connection_strategy(
        &self,
        target_host: &str,
        target_ip: Option<&str>,
    ) -> ConnectionStrategy {
        let check_target = target_ip.filter(|ip| *ip != "unknown").unwrap_or(target_host);

        if self.is_port_open(check_target, 22).await {
            tracing::debug!(host = target_host, "direct connection is possible");
            return ConnectionStrategy::Direct;
        }

        let resolved_ip = match target_ip.filter(|ip| *ip != "unknown") {
            Some(ip) => Some(ip.to_string()),
            None => resolve_ipv4(target_host).await,
        };

        if let Some(ip) = resolved_ip {
            if let Some(gateway) = self.route_lookup.get_route_for_host(&ip) {
                tracing::info!(host = target_host, ip, gateway, "found route via jump host");
                return ConnectionStrategy::Jump { jump_host: gateway };
            }
        }

        ConnectionStrategy::Direct
    }
}

async fn resolve_ipv4(host: &str) -> Option<String> {
    let target = format!("{host}:0");
    tokio::task::spawn_blocking(move || {
        target
            .to_socket_addrs()
            .ok()?
            .find(|a| a.is_ipv4())
            .map(|a| a.ip().to_string())
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoRoutes;
    impl RouteLookup for NoRoutes {
        fn get_route_for_host(&self, _ip: &str) -> Option<String> {
            None
        }
    }

    struct FixedRoute(&'static str, &'static str);
    impl RouteLookup for FixedRoute {
        fn get_route_for_host(&self, ip: &str) -> Option<String> {
            if ip == self.0 {
                Some(self.1.to_string())
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn unreachable_host_without_route_falls_back_to_direct() {
        let lookup = NoRoutes;
        let planner = ConnectivityPlanner::new(&lookup);
        let strategy = planner
            .get_connection_strategy("203.0.113.1", Some("203.0.113.1"))
            .await;
        assert_eq!(strategy, ConnectionStrategy::Direct);
    }

    #[tokio::test]
    async fn unreachable_host_with_known_route_goes_via_jump() {
        let lookup = FixedRoute("203.0.113.5", "bastion.internal");
        let planner = ConnectivityPlanner::new(&lookup);
        let strategy = planner
            .get_connection_strategy("db01.internal", Some("203.0.113.5"))
            .await;
        assert_eq!(
            strategy,
            ConnectionStrategy::Jump {
                jump_host: "bastion.internal".to_string()
            }
        );
    }
}
