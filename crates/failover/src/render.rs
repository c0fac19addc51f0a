//! Rendering the daemon configuration from a snapshot.

use crate::types::NodeSnapshot;
use async_trait::async_trait;
use common::{Error, Result};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Render collaborator.
#[async_trait]
pub trait ConfigRenderer: Send + Sync {
    /// Render `template` against `snapshot` and write the result to `output`.
    async fn render_file(&self, output: &Path, template: &Path, snapshot: &NodeSnapshot) -> Result<()>;
}

/// Substitutes `{{ field }}` placeholders with snapshot fields.
///
/// List fields expand to one item per line, keeping the indentation of the
/// placeholder. `{{ list.field }}` picks one field from each element of a
/// list of records, e.g. `{{ api_backends.address }}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    pub fn render(template: &str, snapshot: &NodeSnapshot) -> Result<String> {
        let fields = serde_json::to_value(snapshot)?;
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::render("unterminated placeholder"))?;
            let key = after[..end].trim();

            let indent = line_indent(&out);
            out.push_str(&expand(&fields, key, &indent)?);
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

#[async_trait]
impl ConfigRenderer for PlaceholderRenderer {
    async fn render_file(&self, output: &Path, template: &Path, snapshot: &NodeSnapshot) -> Result<()> {
        let source = tokio::fs::read_to_string(template).await.map_err(|e| {
            Error::render(format!("Failed to read template {}: {}", template.display(), e))
        })?;
        let rendered = Self::render(&source, snapshot)?;

        let staging = staging_path(output);
        tokio::fs::write(&staging, rendered).await?;
        tokio::fs::rename(&staging, output).await?;

        debug!(output = %output.display(), template = %template.display(), "Rendered configuration");
        Ok(())
    }
}

/// Whitespace between the last newline and the end of `out`, if that is all there is.
fn line_indent(out: &str) -> String {
    let line = out.rsplit('\n').next().unwrap_or("");
    if line.chars().all(char::is_whitespace) {
        line.to_string()
    } else {
        String::new()
    }
}

fn expand(fields: &Value, key: &str, indent: &str) -> Result<String> {
    let (name, sub) = match key.split_once('.') {
        Some((name, sub)) => (name, Some(sub)),
        None => (key, None),
    };

    let value = fields
        .get(name)
        .ok_or_else(|| Error::render(format!("unknown placeholder: {}", key)))?;

    match value {
        Value::Array(items) => {
            let lines = items
                .iter()
                .map(|item| match sub {
                    Some(sub) => item
                        .get(sub)
                        .ok_or_else(|| Error::render(format!("unknown placeholder: {}", key)))
                        .and_then(|v| scalar(v, key)),
                    None => scalar(item, key),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(lines.join(&format!("\n{}", indent)))
        }
        other if sub.is_none() => scalar(other, key),
        _ => Err(Error::render(format!("unknown placeholder: {}", key))),
    }
}

fn scalar(value: &Value, key: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(Error::render(format!(
            "placeholder {} does not name a scalar field",
            key
        ))),
    }
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("config"));
    name.push(".tmp");
    output.with_file_name(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Backend, RecordType};

    pub(crate) fn snapshot() -> NodeSnapshot {
        NodeSnapshot {
            cluster_name: "ostest".to_string(),
            cluster_domain: "example.com".to_string(),
            api_vip: "192.168.111.5".to_string(),
            api_vip_record_type: RecordType::A,
            ingress_vip: "192.168.111.4".to_string(),
            ingress_vip_record_type: RecordType::A,
            dns_vip: "192.168.111.5".to_string(),
            dns_vip_record_type: RecordType::A,
            api_vrid: 12,
            ingress_vrid: 34,
            dns_vrid: 56,
            non_virtual_ip: "192.168.111.20".to_string(),
            interface: "ens3".to_string(),
            api_backends: vec![
                Backend { name: "master-0".to_string(), address: "192.168.111.20".parse().unwrap() },
                Backend { name: "master-1".to_string(), address: "192.168.111.21".parse().unwrap() },
            ],
            dns_upstreams: vec!["10.0.0.1".to_string()],
            enable_unicast: true,
            ingress_peers: vec!["192.168.111.21".to_string(), "192.168.111.22".to_string()],
        }
    }

    #[test]
    fn test_render_scalars() {
        let out = PlaceholderRenderer::render(
            "vrrp_instance {{cluster_name}}_API {\n    interface {{ interface }}\n    virtual_router_id {{ api_vrid }}\n}\n",
            &snapshot(),
        )
        .unwrap();
        assert_eq!(
            out,
            "vrrp_instance ostest_API {\n    interface ens3\n    virtual_router_id 12\n}\n"
        );
    }

    #[test]
    fn test_render_lists_one_per_line() {
        let out = PlaceholderRenderer::render(
            "unicast_peer {\n    {{ ingress_peers }}\n}\nbackends:\n  {{ api_backends.address }}\n",
            &snapshot(),
        )
        .unwrap();
        assert_eq!(
            out,
            "unicast_peer {\n    192.168.111.21\n    192.168.111.22\n}\nbackends:\n  192.168.111.20\n  192.168.111.21\n"
        );
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let err = PlaceholderRenderer::render("{{ nope }}", &snapshot()).unwrap_err();
        assert!(matches!(err, Error::Render(_)));

        assert!(PlaceholderRenderer::render("{{ api_backends }}", &snapshot()).is_err());
        assert!(PlaceholderRenderer::render("{{ interface.x }}", &snapshot()).is_err());
        assert!(PlaceholderRenderer::render("{{ interface", &snapshot()).is_err());
    }

    #[tokio::test]
    async fn test_render_file_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("keepalived.conf.tmpl");
        let output = dir.path().join("keepalived.conf");
        std::fs::write(&template, "unicast_src_ip {{ non_virtual_ip }}\n").unwrap();
        std::fs::write(&output, "stale").unwrap();

        PlaceholderRenderer
            .render_file(&output, &template, &snapshot())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "unicast_src_ip 192.168.111.20\n");
        assert!(!dir.path().join("keepalived.conf.tmp").exists());
    }
}
