//! Template body resolution: inline bodies versus uploaded references.
//!
//! CloudFormation rejects inline template bodies over 50 KiB. When a template
//! store is configured the body is always uploaded, content-addressed under a
//! per-stack namespace, and referenced by URL; that path has no size limit.
//! Without a store an oversized template is a hard error before any remote
//! call is attempted.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::DeployError;

/// Largest template body CloudFormation accepts inline.
pub const MAX_INLINE_TEMPLATE_BYTES: usize = 50 * 1024;

/// How the template body travels to the service: exactly one of an inline
/// body or an external reference URL, enforced by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateBodyParam {
    Inline(String),
    Url(String),
}

/// Auxiliary storage for template bodies.
///
/// Uploads are idempotent on unchanged content: re-uploading identical bytes
/// must be a no-op at the storage layer.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Upload `content` under `namespace`, returning the object key. Skips
    /// the write when an object with identical content already exists.
    async fn upload_if_changed(
        &self,
        content: &[u8],
        namespace: &str,
        suffix: &str,
        content_type: &str,
    ) -> Result<String>;

    /// Base URL for composing references to uploaded objects.
    fn base_url(&self) -> String;
}

/// Serialize the desired template and decide between an inline body and an
/// uploaded reference.
pub async fn resolve_template_body(
    template: &Value,
    stack_name: &str,
    store: Option<&dyn TemplateStore>,
) -> Result<TemplateBodyParam, DeployError> {
    let body = serde_json::to_string(template)
        .with_context(|| format!("failed to serialize template for stack '{stack_name}'"))?;

    match store {
        Some(store) => {
            debug!(
                "Uploading template for stack {} ({} bytes) to the template store",
                stack_name,
                body.len()
            );
            let key = store
                .upload_if_changed(body.as_bytes(), stack_name, ".json", "application/json")
                .await?;
            let url = format!("{}/{}", store.base_url().trim_end_matches('/'), key);
            Ok(TemplateBodyParam::Url(url))
        }
        None if body.len() > MAX_INLINE_TEMPLATE_BYTES => Err(DeployError::TemplateTooLarge {
            stack: stack_name.to_string(),
            size: body.len(),
            limit: MAX_INLINE_TEMPLATE_BYTES,
        }),
        None => Ok(TemplateBodyParam::Inline(body)),
    }
}

/// Content-addressed template store backed by an S3 bucket.
///
/// Objects are keyed `[prefix/]<namespace>/<sha256>.json`, so identical
/// content always lands on the same key and a HEAD probe is enough to skip
/// the re-upload.
pub struct S3TemplateStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3TemplateStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
        }
    }

    /// Place all objects under a key prefix within the bucket.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn object_key(&self, namespace: &str, digest: &str, suffix: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{namespace}/{digest}{suffix}")
        } else {
            format!("{prefix}/{namespace}/{digest}{suffix}")
        }
    }
}

#[async_trait]
impl TemplateStore for S3TemplateStore {
    async fn upload_if_changed(
        &self,
        content: &[u8],
        namespace: &str,
        suffix: &str,
        content_type: &str,
    ) -> Result<String> {
        let digest = hex::encode(Sha256::digest(content));
        let key = self.object_key(namespace, &digest, suffix);

        let already_present = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .is_ok();
        if already_present {
            debug!(
                "Template object s3://{}/{} already present, skipping upload",
                self.bucket, key
            );
            return Ok(key);
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(aws_sdk_s3::primitives::ByteStream::from(content.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload template to s3://{}/{}: {}", self.bucket, key, e))?;
        info!("Uploaded template to s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    fn base_url(&self) -> String {
        format!("https://{}.s3.amazonaws.com", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store observing the upload-if-changed contract.
    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        uploads: Mutex<usize>,
    }

    #[async_trait]
    impl TemplateStore for MemoryStore {
        async fn upload_if_changed(
            &self,
            content: &[u8],
            namespace: &str,
            suffix: &str,
            _content_type: &str,
        ) -> Result<String> {
            let digest = hex::encode(Sha256::digest(content));
            let key = format!("{namespace}/{digest}{suffix}");
            let mut objects = self.objects.lock().unwrap();
            if !objects.contains_key(&key) {
                objects.insert(key.clone(), content.to_vec());
                *self.uploads.lock().unwrap() += 1;
            }
            Ok(key)
        }

        fn base_url(&self) -> String {
            "https://templates.example.com".to_string()
        }
    }

    fn oversized_template() -> Value {
        json!({ "Resources": { "Big": { "Type": "AWS::S3::Bucket", "Metadata": "x".repeat(MAX_INLINE_TEMPLATE_BYTES) } } })
    }

    #[tokio::test]
    async fn test_small_template_resolves_inline() {
        let template = json!({ "Resources": { "Bucket": { "Type": "AWS::S3::Bucket" } } });
        let body = resolve_template_body(&template, "orders", None)
            .await
            .unwrap();
        match body {
            TemplateBodyParam::Inline(text) => {
                assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), template);
            }
            TemplateBodyParam::Url(url) => panic!("expected inline body, got url {url}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_template_without_store_fails_fast() {
        let err = resolve_template_body(&oversized_template(), "orders", None)
            .await
            .unwrap_err();
        match err {
            DeployError::TemplateTooLarge { stack, size, limit } => {
                assert_eq!(stack, "orders");
                assert!(size > limit);
                assert_eq!(limit, MAX_INLINE_TEMPLATE_BYTES);
            }
            other => panic!("expected TemplateTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_always_wins_even_for_small_templates() {
        let template = json!({ "Resources": {} });
        let store = MemoryStore::default();
        let body = resolve_template_body(&template, "orders", Some(&store))
            .await
            .unwrap();
        match body {
            TemplateBodyParam::Url(url) => {
                assert!(url.starts_with("https://templates.example.com/orders/"));
                assert!(url.ends_with(".json"));
            }
            TemplateBodyParam::Inline(_) => panic!("expected url reference"),
        }
    }

    #[tokio::test]
    async fn test_oversized_template_with_store_uploads() {
        let store = MemoryStore::default();
        let body = resolve_template_body(&oversized_template(), "orders", Some(&store))
            .await
            .unwrap();
        assert!(matches!(body, TemplateBodyParam::Url(_)));
        assert_eq!(*store.uploads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_content_uploads_once() {
        let template = json!({ "Resources": { "Queue": { "Type": "AWS::SQS::Queue" } } });
        let store = MemoryStore::default();
        let first = resolve_template_body(&template, "orders", Some(&store))
            .await
            .unwrap();
        let second = resolve_template_body(&template, "orders", Some(&store))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(*store.uploads.lock().unwrap(), 1);
    }
}
