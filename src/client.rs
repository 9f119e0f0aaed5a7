//! The remote API boundary
//!
//! The cluster-management API is the engine's only collaborator, reduced to
//! the two operations reconciliation needs: an ownership-tagged merge write
//! and a status-conditions read. The trait allows mocking the remote API in
//! tests while using the real client in production.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::DynamicObject;
use kube::{Client, Config};
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::gate::{conditions_from_status, ReadinessCondition};
use crate::resolver::ResourceTarget;
use crate::{Error, Result};

/// Parameters controlling one apply call
#[derive(Clone, Debug)]
pub struct ApplyParams {
    /// Field owner identifier tagging this engine's writes
    pub field_manager: String,
    /// Validate server-side without persisting
    pub dry_run: bool,
    /// Resolve field-ownership conflicts in this writer's favor
    pub force: bool,
}

impl Default for ApplyParams {
    fn default() -> Self {
        Self {
            field_manager: crate::DEFAULT_FIELD_MANAGER.to_string(),
            dry_run: false,
            force: false,
        }
    }
}

/// Trait abstracting the two cluster-management API operations the engine
/// requires
///
/// Implementations must issue exactly one remote call per invocation: no
/// local caching, no retries (retries, if any, belong to the transport).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Apply one manifest body via ownership-tagged merge.
    ///
    /// # Arguments
    ///
    /// * `target` - Resolved addressing for the resource
    /// * `body` - The full manifest document, passed through unmodified
    /// * `params` - Field owner, force, and dry-run flags
    async fn apply_with_ownership(
        &self,
        target: &ResourceTarget,
        body: &Value,
        params: &ApplyParams,
    ) -> Result<()>;

    /// Fetch the resource's current status conditions.
    ///
    /// Returns an empty list when the resource reports no conditions yet.
    async fn read_conditions(&self, target: &ResourceTarget) -> Result<Vec<ReadinessCondition>>;
}

/// Real implementation backed by the Kubernetes API
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, target: &ResourceTarget) -> Api<DynamicObject> {
        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &target.api_resource),
            None => Api::all_with(self.client.clone(), &target.api_resource),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn apply_with_ownership(
        &self,
        target: &ResourceTarget,
        body: &Value,
        params: &ApplyParams,
    ) -> Result<()> {
        let mut patch_params = PatchParams::apply(&params.field_manager);
        if params.force {
            patch_params = patch_params.force();
        }
        patch_params.dry_run = params.dry_run;

        debug!(
            path = %target.url_path(),
            dry_run = params.dry_run,
            force = params.force,
            "server-side apply"
        );

        let api = self.dynamic_api(target);
        api.patch(&target.name, &patch_params, &Patch::Apply(body))
            .await?;
        Ok(())
    }

    async fn read_conditions(&self, target: &ResourceTarget) -> Result<Vec<ReadinessCondition>> {
        let api = self.dynamic_api(target);
        let obj = api.get(&target.name).await?;
        Ok(conditions_from_status(obj.data.get("status")))
    }
}

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default
/// timeouts.
///
/// Without a path, configuration is inferred (in-cluster service account or
/// the environment's default kubeconfig). Credential resolution stays in
/// the environment, never in engine state.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from an optional kubeconfig path with custom
/// timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::client(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::client(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::client(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| Error::client(format!("failed to create client: {}", e)))
}
