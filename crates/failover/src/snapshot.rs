//! Assembling a [`NodeSnapshot`] from the cluster API and local network state.

use crate::cluster::{ClusterApi, HOST_CIDRS_ANNOTATION, NodeInfo, PRIMARY_IFADDR_ANNOTATION};
use crate::types::{Backend, FailoverMode, NodeSnapshot, RecordType, RouterIds};
use async_trait::async_trait;
use common::{Error, Result};
use netstate::{IpFamily, NetworkInspector, NodeAddressSelector, Prefix};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fletcher checksum over the nibbles of `input`, folded into one byte.
pub fn fletcher8(input: &str) -> u8 {
    let mut low: u8 = 0;
    let mut high: u8 = 0;
    for byte in input.bytes() {
        low = (low + (byte & 0x0f)) % 0x0f;
        low = (low + (byte >> 4)) % 0x0f;
        high = (high + low) % 0x0f;
    }
    (high << 4) | low
}

/// Virtual router IDs for the api, ingress and dns instances of `cluster`.
///
/// IDs are never zero and never collide; a colliding ID is bumped upward,
/// wrapping past 255 to 1.
pub fn router_ids(cluster: &str) -> RouterIds {
    let mut taken: Vec<u8> = Vec::with_capacity(3);
    let mut next = |suffix: &str| {
        let mut id = fletcher8(&format!("{}-{}", cluster, suffix)).max(1);
        while taken.contains(&id) {
            id = id.checked_add(1).unwrap_or(1);
        }
        taken.push(id);
        id
    };

    let api = next("api");
    let ingress = next("ingress");
    let dns = next("dns");
    RouterIds { api, ingress, dns }
}

/// Address a node serves `vip` from, in the VIP's family.
///
/// Tries the node's InternalIP, then the primary interface annotation, then
/// the host CIDR annotation (preferring a CIDR that contains the VIP).
pub fn resolve_node_address(node: &NodeInfo, vip: &IpAddr) -> Option<IpAddr> {
    let family = IpFamily::of(vip);

    if let Some(ip) = node.internal_ips.iter().find(|ip| IpFamily::of(ip) == family) {
        return Some(*ip);
    }

    if let Some(raw) = node.annotations.get(PRIMARY_IFADDR_ANNOTATION) {
        let key = match family {
            IpFamily::V4 => "ipv4",
            IpFamily::V6 => "ipv6",
        };
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                if let Some(prefix) = value.get(key).and_then(|v| v.as_str()).and_then(Prefix::parse_cidr) {
                    return Some(prefix.address);
                }
            }
            Err(e) => debug!(node = %node.name, error = %e, "Ignoring malformed primary ifaddr annotation"),
        }
    }

    if let Some(raw) = node.annotations.get(HOST_CIDRS_ANNOTATION) {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(cidrs) => {
                let prefixes: Vec<Prefix> = cidrs
                    .iter()
                    .filter_map(|c| Prefix::parse_cidr(c))
                    .filter(|p| IpFamily::of(&p.address) == family)
                    .collect();
                return prefixes
                    .iter()
                    .find(|p| p.contains(vip))
                    .or_else(|| prefixes.first())
                    .map(|p| p.address);
            }
            Err(e) => debug!(node = %node.name, error = %e, "Ignoring malformed host cidrs annotation"),
        }
    }

    None
}

/// Where DNS upstreams come from.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn upstreams(&self) -> Result<Vec<String>>;
}

/// `nameserver` lines of a resolv.conf-format file.
pub struct ResolvConf {
    path: PathBuf,
}

impl ResolvConf {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(contents: &str) -> Vec<String> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                match (fields.next(), fields.next()) {
                    (Some("nameserver"), Some(server)) => Some(server.to_string()),
                    _ => None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl UpstreamSource for ResolvConf {
    async fn upstreams(&self) -> Result<Vec<String>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(Self::parse(&contents))
    }
}

/// Fixed upstream list.
#[async_trait]
impl UpstreamSource for Vec<String> {
    async fn upstreams(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

/// Static inputs to the builder
#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// This node's name as registered in the cluster
    pub node_name: String,
    pub api_vips: Vec<IpAddr>,
    pub ingress_vips: Vec<IpAddr>,
    pub dns_vip: Option<IpAddr>,
    /// Label selector matching control plane nodes
    pub control_plane_selector: String,
}

impl SnapshotSettings {
    fn api_vip(&self) -> Result<IpAddr> {
        self.api_vips
            .first()
            .copied()
            .ok_or_else(|| Error::config("no API VIP configured"))
    }

    fn ingress_vip(&self) -> Result<IpAddr> {
        self.ingress_vips
            .first()
            .copied()
            .ok_or_else(|| Error::config("no ingress VIP configured"))
    }
}

/// Source of snapshots for the engine.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Build this tick's snapshot for the mode in force; failures skip the tick.
    async fn build(&self, mode: FailoverMode) -> Result<NodeSnapshot>;
}

pub struct SnapshotBuilder<I, C, U> {
    settings: SnapshotSettings,
    selector: NodeAddressSelector<I>,
    cluster: C,
    upstreams: U,
}

impl<I, C, U> SnapshotBuilder<I, C, U>
where
    I: NetworkInspector,
    C: ClusterApi,
    U: UpstreamSource,
{
    pub fn new(settings: SnapshotSettings, inspector: I, cluster: C, upstreams: U) -> Self {
        Self {
            settings,
            selector: NodeAddressSelector::new(inspector),
            cluster,
            upstreams,
        }
    }

    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Control plane backends for `vip`, sorted by name then address.
    pub async fn api_backends(&self, vip: &IpAddr) -> Result<Vec<Backend>> {
        let nodes = self.cluster.list_nodes(&self.settings.control_plane_selector).await?;
        let mut backends: Vec<Backend> = nodes
            .iter()
            .filter_map(|node| match resolve_node_address(node, vip) {
                Some(address) => Some(Backend {
                    name: node.name.clone(),
                    address,
                }),
                None => {
                    warn!(node = %node.name, family = %IpFamily::of(vip), "Node has no usable address, skipping");
                    None
                }
            })
            .collect();
        backends.sort();
        backends.dedup();
        Ok(backends)
    }

    /// Addresses of every node except this one, sorted.
    pub async fn ingress_peers(&self, vip: &IpAddr) -> Result<Vec<String>> {
        let nodes = self.cluster.list_nodes("").await?;
        let mut peers: Vec<IpAddr> = nodes
            .iter()
            .filter(|node| node.name != self.settings.node_name)
            .filter_map(|node| resolve_node_address(node, vip))
            .collect();
        peers.sort();
        peers.dedup();
        Ok(peers.iter().map(IpAddr::to_string).collect())
    }
}

#[async_trait]
impl<I, C, U> SnapshotSource for SnapshotBuilder<I, C, U>
where
    I: NetworkInspector,
    C: ClusterApi,
    U: UpstreamSource,
{
    async fn build(&self, mode: FailoverMode) -> Result<NodeSnapshot> {
        let api_vip = self.settings.api_vip()?;
        let ingress_vip = self.settings.ingress_vip()?;
        let dns_vip = self.settings.dns_vip.unwrap_or(api_vip);

        let identity = self.cluster.cluster_identity().await?;

        let mut vips = self.settings.api_vips.clone();
        vips.extend(self.settings.ingress_vips.iter().copied());
        let selected = self.selector.select(&vips)?;
        let primary = selected
            .first()
            .ok_or_else(|| Error::no_suitable_address("selector returned no addresses"))?;

        let (api_backends, ingress_peers) = if mode.is_unicast() {
            (self.api_backends(&api_vip).await?, self.ingress_peers(&ingress_vip).await?)
        } else {
            (Vec::new(), Vec::new())
        };

        let dns_upstreams = self.upstreams.upstreams().await?;
        let ids = router_ids(&identity.name);

        Ok(NodeSnapshot {
            cluster_name: identity.name,
            cluster_domain: identity.domain,
            api_vip: api_vip.to_string(),
            api_vip_record_type: RecordType::for_address(&api_vip),
            ingress_vip: ingress_vip.to_string(),
            ingress_vip_record_type: RecordType::for_address(&ingress_vip),
            dns_vip: dns_vip.to_string(),
            dns_vip_record_type: RecordType::for_address(&dns_vip),
            api_vrid: ids.api,
            ingress_vrid: ids.ingress,
            dns_vrid: ids.dns,
            non_virtual_ip: primary.address.to_string(),
            interface: primary.interface.clone(),
            api_backends,
            dns_upstreams,
            enable_unicast: mode.is_unicast(),
            ingress_peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterIdentity, MockClusterApi};
    use netstate::{InterfaceAddress, StaticInspector};

    fn settings() -> SnapshotSettings {
        SnapshotSettings {
            node_name: "master-0".to_string(),
            api_vips: vec!["192.168.111.5".parse().unwrap()],
            ingress_vips: vec!["192.168.111.4".parse().unwrap()],
            dns_vip: None,
            control_plane_selector: "node-role.kubernetes.io/master=".to_string(),
        }
    }

    fn inspector() -> StaticInspector {
        StaticInspector::new(
            vec![InterfaceAddress::new(
                2,
                "ens3",
                "192.168.111.20".parse().unwrap(),
                24,
            )],
            Vec::new(),
        )
    }

    fn nodes() -> Vec<NodeInfo> {
        vec![
            NodeInfo::new("master-2", vec!["192.168.111.22".parse().unwrap()]),
            NodeInfo::new("master-0", vec!["192.168.111.20".parse().unwrap()]),
            NodeInfo::new("master-1", vec!["192.168.111.21".parse().unwrap()]),
        ]
    }

    #[test]
    fn test_fletcher8_known_values() {
        assert_eq!(fletcher8(""), 0);
        // 'a' = 0x61: low = 1, then 7; high = 7
        assert_eq!(fletcher8("a"), 0x77);
    }

    #[test]
    fn test_router_ids_are_distinct_and_nonzero() {
        for cluster in ["ostest", "cluster", "a", "", "very-long-cluster-name-0123456789"] {
            let ids = router_ids(cluster);
            let values = [ids.api, ids.ingress, ids.dns];
            assert!(values.iter().all(|v| *v != 0), "{cluster}: {values:?}");
            assert_ne!(ids.api, ids.ingress);
            assert_ne!(ids.api, ids.dns);
            assert_ne!(ids.ingress, ids.dns);
        }
    }

    #[test]
    fn test_router_ids_are_stable() {
        assert_eq!(router_ids("ostest"), router_ids("ostest"));
        assert_eq!(router_ids("ostest").api, fletcher8("ostest-api").max(1));
    }

    #[test]
    fn test_resolve_prefers_internal_ip() {
        let node = NodeInfo::new("n", vec!["fd00::20".parse().unwrap(), "10.0.0.20".parse().unwrap()])
            .with_annotation(PRIMARY_IFADDR_ANNOTATION, r#"{"ipv4":"10.0.0.99/24"}"#);
        let vip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(resolve_node_address(&node, &vip), Some("10.0.0.20".parse().unwrap()));
    }

    #[test]
    fn test_resolve_falls_back_to_annotations() {
        let vip: IpAddr = "10.0.0.5".parse().unwrap();

        let node = NodeInfo::new("n", vec!["fd00::20".parse().unwrap()])
            .with_annotation(PRIMARY_IFADDR_ANNOTATION, r#"{"ipv4":"10.0.0.21/24","ipv6":"fd00::21/64"}"#);
        assert_eq!(resolve_node_address(&node, &vip), Some("10.0.0.21".parse().unwrap()));

        let node = NodeInfo::new("n", Vec::new())
            .with_annotation(PRIMARY_IFADDR_ANNOTATION, "not json")
            .with_annotation(HOST_CIDRS_ANNOTATION, r#"["172.16.0.3/16","10.0.0.22/24","fd00::22/64"]"#);
        assert_eq!(resolve_node_address(&node, &vip), Some("10.0.0.22".parse().unwrap()));

        let other: IpAddr = "192.168.0.1".parse().unwrap();
        assert_eq!(resolve_node_address(&node, &other), Some("172.16.0.3".parse().unwrap()));

        assert_eq!(resolve_node_address(&NodeInfo::new("n", Vec::new()), &vip), None);
    }

    #[test]
    fn test_resolv_conf_parse() {
        let contents = "# generated\nsearch example.com\nnameserver 10.0.0.1\nnameserver  fd00::1 \n;nameserver 1.1.1.1\n";
        assert_eq!(ResolvConf::parse(contents), vec!["10.0.0.1", "fd00::1"]);
    }

    #[tokio::test]
    async fn test_build_multicast_skips_node_listing() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_cluster_identity()
            .returning(|| Ok(ClusterIdentity::new("ostest", "example.com")));
        cluster.expect_list_nodes().never();

        let builder = SnapshotBuilder::new(settings(), inspector(), cluster, vec!["10.0.0.1".to_string()]);
        let snapshot = builder.build(FailoverMode::Multicast).await.unwrap();

        assert_eq!(snapshot.cluster_name, "ostest");
        assert_eq!(snapshot.non_virtual_ip, "192.168.111.20");
        assert_eq!(snapshot.interface, "ens3");
        assert_eq!(snapshot.dns_vip, snapshot.api_vip);
        assert!(snapshot.api_backends.is_empty());
        assert_eq!(snapshot.dns_upstreams, vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_build_unicast_sorts_backends_and_peers() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_cluster_identity()
            .returning(|| Ok(ClusterIdentity::new("ostest", "example.com")));
        cluster.expect_list_nodes().returning(|_| Ok(nodes()));

        let builder = SnapshotBuilder::new(settings(), inspector(), cluster, Vec::new());
        let snapshot = builder.build(FailoverMode::Unicast).await.unwrap();
        assert!(snapshot.enable_unicast);

        let names: Vec<&str> = snapshot.api_backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["master-0", "master-1", "master-2"]);
        assert_eq!(snapshot.ingress_peers, vec!["192.168.111.21", "192.168.111.22"]);
    }

    #[tokio::test]
    async fn test_build_propagates_api_failure() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_cluster_identity()
            .returning(|| Err(Error::api("unreachable")));

        let builder = SnapshotBuilder::new(settings(), inspector(), cluster, Vec::new());
        assert!(matches!(builder.build(FailoverMode::Multicast).await, Err(Error::Api(_))));
    }
}
