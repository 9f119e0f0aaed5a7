//! Resource kind resolution
//!
//! Maps a `(group/version, Kind)` pair to the API path segment used to
//! address resources of that kind. Pluralization uses an explicit override
//! table for irregular kinds: silent mis-pluralization addresses a
//! resource that does not exist, which the server reports as a confusing
//! 404 long after the real mistake. Any kind not covered by the table falls
//! back to naive lowercase + trailing `s`.
//!
//! Pure functions, no network access.

use kube::discovery::ApiResource;

use crate::manifest::ResourceManifest;
use crate::{Error, Result};

/// Irregular kind pluralizations
///
/// Keys are lowercased kinds. The table must stay total for every irregular
/// kind the engine is configured to handle; regular kinds take the naive
/// `lowercase + "s"` form and must NOT appear here.
const KIND_PLURALS: &[(&str, &str)] = &[
    // -s / -ss endings take "es"
    ("ingress", "ingresses"),
    ("ingressclass", "ingressclasses"),
    ("storageclass", "storageclasses"),
    ("priorityclass", "priorityclasses"),
    ("runtimeclass", "runtimeclasses"),
    ("clusterclass", "clusterclasses"),
    // consonant-y endings take "ies"
    ("networkpolicy", "networkpolicies"),
    ("authorizationpolicy", "authorizationpolicies"),
    ("servicepolicy", "servicepolicies"),
    ("backuppolicy", "backuppolicies"),
    // fixed-form kinds
    ("endpoints", "endpoints"),
    ("ipaddress", "ipaddresses"),
    ("redis", "redises"),
];

/// Target addressing information for one resource
///
/// Carries everything the client needs to address the resource: the
/// `ApiResource` for dynamic API construction plus name and namespace.
#[derive(Clone, Debug)]
pub struct ResourceTarget {
    /// API resource definition (group, version, kind, plural)
    pub api_resource: ApiResource,
    /// Resource name
    pub name: String,
    /// Namespace, if the resource is namespaced
    pub namespace: Option<String>,
}

impl ResourceTarget {
    /// The REST path addressing this resource.
    ///
    /// Core-group resources live under `/api/{version}`, grouped resources
    /// under `/apis/{group}/{version}`; a namespace segment is added for
    /// namespaced resources.
    pub fn url_path(&self) -> String {
        let ar = &self.api_resource;
        let root = if ar.group.is_empty() {
            format!("/api/{}", ar.version)
        } else {
            format!("/apis/{}/{}", ar.group, ar.version)
        };
        match &self.namespace {
            Some(ns) => format!("{}/namespaces/{}/{}/{}", root, ns, ar.plural, self.name),
            None => format!("{}/{}/{}", root, ar.plural, self.name),
        }
    }
}

/// Parse apiVersion into (group, version)
///
/// A value containing `/` yields both parts; otherwise the group is empty
/// (core-group convention) and the whole value is the version. An empty
/// apiVersion is the only error this module produces.
pub fn parse_api_version(api_version: &str) -> Result<(String, String)> {
    if api_version.is_empty() {
        return Err(Error::resolve("empty apiVersion"));
    }
    match api_version.split_once('/') {
        Some((group, version)) => Ok((group.to_string(), version.to_string())),
        None => Ok((String::new(), api_version.to_string())),
    }
}

/// Pluralize a resource kind into its collection path segment
///
/// Consults the irregular-override table first, then falls back to naive
/// lowercase + trailing `s`.
pub fn plural_of(kind: &str) -> String {
    let lower = kind.to_lowercase();
    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }
    format!("{}s", lower)
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version given is used exactly: the engine addresses resources at
/// the version the manifest declares, matching what the synthesizer
/// produced.
pub fn api_resource(api_version: &str, kind: &str) -> Result<ApiResource> {
    let (group, version) = parse_api_version(api_version)?;
    Ok(ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: plural_of(kind),
    })
}

/// Resolve a manifest into its addressable target
pub fn target_for(manifest: &ResourceManifest) -> Result<ResourceTarget> {
    Ok(ResourceTarget {
        api_resource: api_resource(&manifest.api_version, &manifest.kind)?,
        name: manifest.name.clone(),
        namespace: manifest.namespace.clone(),
    })
}
