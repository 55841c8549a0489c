use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use log::info;
use url::Url;

use crate::storage::publisher::{ArtifactPublisher, PublishError, content_type_for};
use crate::storage::temp_store::ScratchFile;

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    public_base_url: Option<Url>,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String, public_base_url: Option<Url>) -> Self {
        Self {
            client,
            bucket_name,
            public_base_url,
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        public_url_for(&self.bucket_name, self.public_base_url.as_ref(), key)
    }

    pub async fn upload_object(
        &self,
        data: Vec<u8>,
        key: &str,
        mime_type: &str,
    ) -> Result<(), PublishError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(mime_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| PublishError::S3(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ArtifactPublisher for S3Service {
    async fn publish(&self, file: &ScratchFile, key: &str) -> Result<String, PublishError> {
        let data = tokio::fs::read(file.path()).await?;
        let size = data.len();

        self.upload_object(data, key, content_type_for(file.file_name()))
            .await?;

        let url = self.public_url(key);
        info!("Uploaded {} bytes to s3://{}/{}", size, self.bucket_name, key);
        Ok(url)
    }
}

fn public_url_for(bucket: &str, base: Option<&Url>, key: &str) -> String {
    match base {
        Some(base) => format!("{}/{}", base.as_str().trim_end_matches('/'), key),
        None => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_is_virtual_hosted_bucket_address() {
        assert_eq!(
            public_url_for("vending-bucket", None, "vending/original/x.png"),
            "https://vending-bucket.s3.amazonaws.com/vending/original/x.png"
        );
    }

    #[test]
    fn configured_base_url_wins_and_slash_is_not_doubled() {
        let base = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(
            public_url_for("ignored", Some(&base), "vending/label/87_x.png"),
            "https://cdn.example.com/vending/label/87_x.png"
        );
    }
}
