//! 网卡地址与路由操作
//!
//! Thin abstraction over the host network stack so the VIP and route
//! handling in [`crate::system`] can be exercised without root.

use crate::command;
use crate::error::{HealthError, Result};
use async_trait::async_trait;
use ha_common::IpCidr;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// Route attached to the traffic interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Route selector without `dev` and `src`, e.g. `default via 10.0.0.1 proto static`.
    pub spec: String,
    pub src: Option<IpAddr>,
    pub ipv6: bool,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

#[async_trait]
pub trait InterfaceNetwork: Send + Sync {
    async fn addresses(&self, iface: &str) -> Result<Vec<IpCidr>>;

    async fn add_address(&self, iface: &str, addr: &IpCidr) -> Result<()>;

    async fn remove_address(&self, iface: &str, addr: &IpCidr) -> Result<()>;

    async fn routes(&self, iface: &str) -> Result<Vec<Route>>;

    /// Replace `route` so that its preferred source becomes `src`.
    async fn set_route_source(&self, iface: &str, route: &Route, src: IpAddr) -> Result<()>;

    /// Announce ownership of `addr` to the local segment (gratuitous ARP).
    async fn announce(&self, iface: &str, addr: IpAddr) -> Result<()>;
}

/// Flags printed by `ip route show` that `ip route replace` does not accept.
const ROUTE_STATUS_FLAGS: &[&str] = &["linkdown", "dead", "offload", "trap", "rt_offload"];

fn parse_addresses(output: &str) -> Vec<IpCidr> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|t| *t == "inet" || *t == "inet6")?;
            tokens.next()?.parse().ok()
        })
        .collect()
}

fn parse_routes(output: &str, ipv6: bool) -> Vec<Route> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut spec = Vec::new();
            let mut src = None;
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                match token {
                    "src" => src = tokens.next().and_then(|s| s.parse().ok()),
                    "dev" => {
                        tokens.next();
                    }
                    flag if ROUTE_STATUS_FLAGS.contains(&flag) => {}
                    other => spec.push(other),
                }
            }
            Route {
                spec: spec.join(" "),
                src,
                ipv6,
            }
        })
        .collect()
}

/// [`InterfaceNetwork`] backed by iproute2 and iputils `arping`.
#[derive(Debug, Clone, Default)]
pub struct IpCommand;

impl IpCommand {
    async fn ip(&self, args: &[&str]) -> Result<String> {
        command::run("ip", args).await
    }

    fn family(ipv6: bool) -> &'static str {
        if ipv6 { "-6" } else { "-4" }
    }
}

#[async_trait]
impl InterfaceNetwork for IpCommand {
    async fn addresses(&self, iface: &str) -> Result<Vec<IpCidr>> {
        let output = self.ip(&["-o", "addr", "show", "dev", iface]).await?;
        Ok(parse_addresses(&output))
    }

    async fn add_address(&self, iface: &str, addr: &IpCidr) -> Result<()> {
        let cidr = addr.to_string();
        self.ip(&["addr", "add", &cidr, "dev", iface]).await.map(|_| ())
    }

    async fn remove_address(&self, iface: &str, addr: &IpCidr) -> Result<()> {
        let cidr = addr.to_string();
        self.ip(&["addr", "del", &cidr, "dev", iface]).await.map(|_| ())
    }

    async fn routes(&self, iface: &str) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        for ipv6 in [false, true] {
            let output = self
                .ip(&[Self::family(ipv6), "-o", "route", "show", "dev", iface])
                .await?;
            routes.extend(parse_routes(&output, ipv6));
        }
        Ok(routes)
    }

    async fn set_route_source(&self, iface: &str, route: &Route, src: IpAddr) -> Result<()> {
        let src = src.to_string();
        let mut args = vec![Self::family(route.ipv6), "route", "replace"];
        args.extend(route.spec.split_whitespace());
        args.extend(["dev", iface, "src", src.as_str()]);
        self.ip(&args).await.map(|_| ())
    }

    async fn announce(&self, iface: &str, addr: IpAddr) -> Result<()> {
        if addr.is_ipv6() {
            debug!("Skipping gratuitous ARP for IPv6 address {}", addr);
            return Ok(());
        }
        let target = addr.to_string();
        command::run("arping", &["-U", "-c", "3", "-I", iface, &target])
            .await
            .map(|_| ())
            .map_err(|e| HealthError::Network(format!("gratuitous ARP for {addr} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        let output = "3: eth1    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth1\\       valid_lft forever preferred_lft forever\n\
                      3: eth1    inet 10.10.10.5/24 scope global secondary eth1\\       valid_lft forever preferred_lft forever\n\
                      3: eth1    inet6 fe80::1/64 scope link \\       valid_lft forever preferred_lft forever\n";
        let addrs = parse_addresses(output);
        let rendered: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["10.0.0.5/24", "10.10.10.5/24", "fe80::1/64"]);
    }

    #[test]
    fn test_parse_routes() {
        let output = "default via 10.0.0.1 proto static src 10.0.0.5 metric 100\n\
                      10.0.0.0/24 proto kernel scope link src 10.0.0.5 linkdown\n\
                      192.168.50.0/24 via 10.0.0.254\n";
        let routes = parse_routes(output, false);
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].spec, "default via 10.0.0.1 proto static metric 100");
        assert_eq!(routes[0].src, Some("10.0.0.5".parse().unwrap()));
        assert_eq!(routes[1].spec, "10.0.0.0/24 proto kernel scope link");
        assert_eq!(routes[2].src, None);
        assert!(!routes[2].ipv6);
    }
}
