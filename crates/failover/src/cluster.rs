//! Control-plane API collaborator.
//!
//! The loop only needs three reads: the node list, the cluster identity and
//! whether an upgrade is rolling out. [`KubeClusterApi`] serves them from the
//! Kubernetes API; tests substitute their own implementation.

use async_trait::async_trait;
use common::{Error, Result};
use k8s_openapi::api::core::v1::Node;
use kube::api::{ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Node annotation carrying `{"ipv4": cidr, "ipv6": cidr}`
pub const PRIMARY_IFADDR_ANNOTATION: &str = "k8s.ovn.org/node-primary-ifaddr";

/// Node annotation carrying a JSON array of host CIDRs
pub const HOST_CIDRS_ANNOTATION: &str = "k8s.ovn.org/host-cidrs";

/// The parts of a Node the snapshot builder reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub internal_ips: Vec<IpAddr>,
    pub annotations: BTreeMap<String, String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, internal_ips: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            internal_ips,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: &str, value: impl Into<String>) -> Self {
        self.annotations.insert(key.to_string(), value.into());
        self
    }
}

/// Cluster name and base domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub name: String,
    pub domain: String,
}

impl ClusterIdentity {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// Parse `api.<name>.<domain>`, the conventional API server host.
    pub fn from_api_host(host: &str) -> Option<Self> {
        let rest = host.strip_prefix("api.")?;
        let (name, domain) = rest.split_once('.')?;
        if name.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self::new(name, domain))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Nodes matching a label selector; an empty selector lists every node.
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeInfo>>;

    async fn cluster_identity(&self) -> Result<ClusterIdentity>;

    async fn is_upgrade_in_progress(&self) -> Result<bool>;
}

#[async_trait]
impl<T: ClusterApi + ?Sized> ClusterApi for Arc<T> {
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeInfo>> {
        (**self).list_nodes(label_selector).await
    }

    async fn cluster_identity(&self) -> Result<ClusterIdentity> {
        (**self).cluster_identity().await
    }

    async fn is_upgrade_in_progress(&self) -> Result<bool> {
        (**self).is_upgrade_in_progress().await
    }
}

/// [`ClusterApi`] backed by the Kubernetes API.
pub struct KubeClusterApi {
    client: Client,
    identity: Option<ClusterIdentity>,
}

impl KubeClusterApi {
    /// Client from kubeconfig or in-cluster config.
    ///
    /// Without an explicit identity the cluster name and domain are taken
    /// from the API server host.
    pub async fn infer(identity: Option<ClusterIdentity>) -> Result<Self> {
        let config = kube::Config::infer()
            .await
            .map_err(|e| Error::api(format!("Failed to infer kube config: {}", e)))?;

        let identity = identity.or_else(|| {
            config
                .cluster_url
                .host()
                .and_then(ClusterIdentity::from_api_host)
        });

        let client = Client::try_from(config)
            .map_err(|e| Error::api(format!("Failed to create kube client: {}", e)))?;

        Ok(Self { client, identity })
    }

    pub fn new(client: Client, identity: Option<ClusterIdentity>) -> Self {
        Self { client, identity }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };

        let nodes = api
            .list(&params)
            .await
            .map_err(|e| Error::api(format!("Failed to list nodes: {}", e)))?;

        debug!(selector = label_selector, count = nodes.items.len(), "Listed nodes");
        Ok(nodes.items.iter().map(node_info).collect())
    }

    async fn cluster_identity(&self) -> Result<ClusterIdentity> {
        self.identity
            .clone()
            .ok_or_else(|| Error::api("cluster identity is not configured and the API host is not api.<name>.<domain>"))
    }

    async fn is_upgrade_in_progress(&self) -> Result<bool> {
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "ClusterVersion");
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);

        let version = api
            .get("version")
            .await
            .map_err(|e| Error::api(format!("Failed to read cluster version: {}", e)))?;

        Ok(progressing(&version.data))
    }
}

fn node_info(node: &Node) -> NodeInfo {
    let internal_ips = node
        .status
        .as_ref()
        .and_then(|status| status.addresses.as_ref())
        .map(|addresses| {
            addresses
                .iter()
                .filter(|a| a.type_ == "InternalIP")
                .filter_map(|a| a.address.parse().ok())
                .collect()
        })
        .unwrap_or_default();

    NodeInfo {
        name: node.metadata.name.clone().unwrap_or_default(),
        internal_ips,
        annotations: node.metadata.annotations.clone().unwrap_or_default(),
    }
}

/// Whether a ClusterVersion body reports `Progressing=True`.
fn progressing(data: &serde_json::Value) -> bool {
    data.pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Progressing")
                    && c.get("status").and_then(|s| s.as_str()) == Some("True")
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_identity_from_api_host() {
        assert_eq!(
            ClusterIdentity::from_api_host("api.ostest.test.metalkube.org"),
            Some(ClusterIdentity::new("ostest", "test.metalkube.org"))
        );
        assert_eq!(ClusterIdentity::from_api_host("10.0.0.1"), None);
        assert_eq!(ClusterIdentity::from_api_host("api.ostest"), None);
    }

    #[test]
    fn test_node_info_reads_internal_ips() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("master-0".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                addresses: Some(vec![
                    NodeAddress {
                        address: "master-0".to_string(),
                        type_: "Hostname".to_string(),
                    },
                    NodeAddress {
                        address: "192.168.111.20".to_string(),
                        type_: "InternalIP".to_string(),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = node_info(&node);
        assert_eq!(info.name, "master-0");
        assert_eq!(info.internal_ips, vec!["192.168.111.20".parse::<IpAddr>().unwrap()]);
        assert!(info.annotations.is_empty());
    }

    #[test]
    fn test_progressing_condition() {
        let body = serde_json::json!({
            "status": {
                "conditions": [
                    {"type": "Available", "status": "True"},
                    {"type": "Progressing", "status": "True"}
                ]
            }
        });
        assert!(progressing(&body));

        let body = serde_json::json!({
            "status": {"conditions": [{"type": "Progressing", "status": "False"}]}
        });
        assert!(!progressing(&body));
        assert!(!progressing(&serde_json::json!({})));
    }
}
