//! Manifest parsing and pre-network validation
//!
//! A manifest is one declarative resource document. The engine treats the
//! document body as opaque and passes it through to the remote API
//! unmodified, but extracts the addressing fields (apiVersion, kind,
//! metadata.name, metadata.namespace) and validates them before any network
//! call is made.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Addressable identity of one resource
///
/// Used in outcomes, failures, and log fields wherever a resource must be
/// named without carrying its full body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// Full apiVersion string (e.g. "apps/v1", "v1")
    pub api_version: String,
    /// Resource kind (e.g. "ConfigMap")
    pub kind: String,
    /// Namespace, if the resource is namespaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// The unit of declarative intent: one resource to be applied
///
/// Immutable for the duration of a reconciliation run. The `body` holds the
/// complete document (including apiVersion/kind/metadata) exactly as parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceManifest {
    /// Full apiVersion string, optionally "group/version"
    pub api_version: String,
    /// Resource kind
    pub kind: String,
    /// Resource name from metadata.name
    pub name: String,
    /// Namespace from metadata.namespace, if present
    pub namespace: Option<String>,
    /// The complete document, passed through to the remote API unmodified
    pub body: Value,
}

impl ResourceManifest {
    /// Build a manifest from a parsed document, extracting addressing fields.
    ///
    /// `index` is the document's position in the input set, used for error
    /// reporting. Fails with [`Error::ManifestInvalid`] when apiVersion,
    /// kind, or metadata.name is missing or empty, checked here so no
    /// network call is ever attempted for a malformed document.
    pub fn from_value(body: Value, index: usize) -> Result<Self> {
        if !body.is_object() {
            return Err(Error::manifest_invalid(index, "document is not a mapping"));
        }

        let api_version = body
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = body
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let namespace = body
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let manifest = Self {
            api_version,
            kind,
            name,
            namespace,
            body,
        };
        manifest.validate(index)?;
        Ok(manifest)
    }

    /// Check the non-empty invariants on the addressing fields.
    ///
    /// Already enforced by [`from_value`](Self::from_value); re-run by the
    /// driver over hand-constructed manifests so a malformed one is caught
    /// before any network call.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.api_version.is_empty() {
            return Err(Error::manifest_invalid(index, "missing apiVersion"));
        }
        if self.kind.is_empty() {
            return Err(Error::manifest_invalid(index, "missing kind"));
        }
        if self.name.is_empty() {
            return Err(Error::manifest_invalid(index, "missing metadata.name"));
        }
        Ok(())
    }

    /// The addressable identity of this manifest's resource
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Parse a multi-document YAML (or JSON) string into manifests.
///
/// Documents separated by `---` are parsed independently; empty documents
/// are skipped. JSON input parses as well since YAML is a superset.
pub fn parse_documents(input: &str) -> Result<Vec<ResourceManifest>> {
    let mut manifests = Vec::new();
    for de in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(de)
            .map_err(|e| Error::serialization(format!("invalid manifest document: {}", e)))?;
        if value.is_null() {
            continue;
        }
        let index = manifests.len();
        manifests.push(ResourceManifest::from_value(value, index)?);
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_yaml_document() {
        let yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: default
data:
  key: value
"#;
        let manifests = parse_documents(yaml).unwrap();
        assert_eq!(manifests.len(), 1);
        let m = &manifests[0];
        assert_eq!(m.api_version, "v1");
        assert_eq!(m.kind, "ConfigMap");
        assert_eq!(m.name, "app-config");
        assert_eq!(m.namespace.as_deref(), Some("default"));
        // Body is passed through untouched
        assert_eq!(m.body["data"]["key"], "value");
    }

    #[test]
    fn parses_multi_document_yaml() {
        let yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
apiVersion: database.example.io/v1beta1
kind: DatabaseInstance
metadata:
  name: second
  namespace: prod
"#;
        let manifests = parse_documents(yaml).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].name, "first");
        assert_eq!(manifests[1].kind, "DatabaseInstance");
        assert_eq!(manifests[1].api_version, "database.example.io/v1beta1");
    }

    #[test]
    fn parses_json_document() {
        let json = r#"{"apiVersion":"v1","kind":"Secret","metadata":{"name":"creds"}}"#;
        let manifests = parse_documents(json).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].kind, "Secret");
        assert!(manifests[0].namespace.is_none());
    }

    #[test]
    fn skips_empty_documents() {
        let yaml = "---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: only\n";
        let manifests = parse_documents(yaml).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "only");
    }

    #[test]
    fn missing_kind_is_invalid_before_any_network_call() {
        let doc = serde_json::json!({
            "apiVersion": "v1",
            "metadata": { "name": "no-kind" }
        });
        let err = ResourceManifest::from_value(doc, 2).unwrap_err();
        match err {
            Error::ManifestInvalid { index, reason } => {
                assert_eq!(index, 2);
                assert!(reason.contains("kind"));
            }
            _ => panic!("Expected ManifestInvalid"),
        }
    }

    #[test]
    fn missing_name_is_invalid() {
        let doc = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {}
        });
        let err = ResourceManifest::from_value(doc, 0).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn empty_api_version_is_invalid() {
        let doc = serde_json::json!({
            "apiVersion": "",
            "kind": "ConfigMap",
            "metadata": { "name": "x" }
        });
        let err = ResourceManifest::from_value(doc, 0).unwrap_err();
        assert!(err.to_string().contains("apiVersion"));
    }

    #[test]
    fn scalar_document_is_invalid() {
        let err = parse_documents("just a string").unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
    }

    #[test]
    fn resource_ref_display_includes_namespace_when_present() {
        let doc = serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web", "namespace": "prod" }
        });
        let m = ResourceManifest::from_value(doc, 0).unwrap();
        assert_eq!(m.resource_ref().to_string(), "Deployment/prod/web");

        let doc = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "prod" }
        });
        let m = ResourceManifest::from_value(doc, 0).unwrap();
        assert_eq!(m.resource_ref().to_string(), "Namespace/prod");
    }
}
