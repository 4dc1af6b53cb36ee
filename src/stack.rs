//! Stack descriptors, deployment requests, and results.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target account/region for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

/// Everything that identifies and parameterizes one stack deployment.
/// Immutable once a deployment begins.
#[derive(Debug, Clone)]
pub struct StackDescriptor {
    pub name: String,
    /// Desired template as a structured document. Compared by deep structural
    /// equality against the currently-applied template, so serialization
    /// differences never trigger a deployment on their own.
    pub template: Value,
    pub environment: Option<Environment>,
    pub tags: BTreeMap<String, String>,
    /// Caller-supplied parameter overrides. Empty values are dropped before
    /// the changeset is submitted.
    pub parameters: BTreeMap<String, String>,
    /// Service role assumed by the provisioning service for this stack.
    pub role_arn: Option<String>,
    pub notification_arns: Vec<String>,
}

impl StackDescriptor {
    pub fn new(name: impl Into<String>, template: Value) -> Self {
        Self {
            name: name.into(),
            template,
            environment: None,
            tags: BTreeMap::new(),
            parameters: BTreeMap::new(),
            role_arn: None,
            notification_arns: Vec::new(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }
}

/// Publishes stack artifacts and reports the parameter entries the deployment
/// must carry to reference them. Encapsulates all artifact side effects.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    async fn publish_assets(
        &self,
        stack_name: &str,
        reuse: &[String],
    ) -> Result<Vec<(String, String)>>;
}

/// Outcome of a deploy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub stack_name: String,
    /// True when no remote mutation was necessary or performed.
    pub no_op: bool,
    pub outputs: HashMap<String, String>,
    /// Opaque stack identifier; empty only when the stack never came to exist
    /// (e.g. a CREATE changeset that stabilized empty).
    pub stack_arn: String,
}

/// One deploy invocation.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub stack: StackDescriptor,
    /// Deploy even when the desired template matches the applied one.
    pub force: bool,
    /// Execute the changeset (default). When false the changeset is left
    /// pending for manual review.
    pub execute: bool,
    /// Suppress background event monitoring.
    pub quiet: bool,
    /// Asset ids the publisher may reuse instead of republishing.
    pub reuse_assets: Vec<String>,
}

impl DeployRequest {
    pub fn new(stack: StackDescriptor) -> Self {
        Self {
            stack,
            force: false,
            execute: true,
            quiet: false,
            reuse_assets: Vec::new(),
        }
    }
}

/// One destroy invocation.
#[derive(Debug, Clone)]
pub struct DestroyRequest {
    pub stack_name: String,
    pub role_arn: Option<String>,
    pub quiet: bool,
}

impl DestroyRequest {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            role_arn: None,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deploy_request_defaults_to_execute() {
        let stack = StackDescriptor::new("orders", json!({}));
        let request = DeployRequest::new(stack);
        assert!(request.execute);
        assert!(!request.force);
        assert!(!request.quiet);
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = StackDescriptor::new("orders", json!({}))
            .with_environment(Environment::new("123456789012", "us-east-1"))
            .with_parameter("TableName", "orders")
            .with_tag("team", "platform")
            .with_role_arn("arn:aws:iam::123456789012:role/deploy");

        assert_eq!(descriptor.environment.as_ref().unwrap().region, "us-east-1");
        assert_eq!(descriptor.parameters["TableName"], "orders");
        assert_eq!(descriptor.tags["team"], "platform");
        assert!(descriptor.role_arn.is_some());
    }
}
