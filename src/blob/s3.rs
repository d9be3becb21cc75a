use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    types::ObjectCannedAcl,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;

use super::{public_uri, BlobStore, PNG_CONTENT_TYPE};
use crate::config::BlobConfig;

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
    public_read_acl: bool,
}

impl S3BlobStore {
    pub async fn new(config: &BlobConfig) -> anyhow::Result<Self> {
        let mut loader =
            defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.as_str(),
                secret_key.as_str(),
                None,
                None,
                "static",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.as_str());
        }

        let shared = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            // MinIO and most S3-compatible stores only serve path-style requests
            builder = builder.endpoint_url(endpoint.as_str()).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
            public_read_acl: config.public_read_acl,
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_png(&self, key: &str, body: Bytes) -> anyhow::Result<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(PNG_CONTENT_TYPE);
        if self.public_read_acl {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request
            .send()
            .await
            .with_context(|| format!("s3 put_object {key}"))?;

        Ok(public_uri(&self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {key}"))?;
        Ok(())
    }
}
