//! Bucket provisioning.
//!
//! OpenDAL addresses objects inside an existing bucket and has no bucket
//! management API, so S3 buckets are checked and created with `aws-sdk-s3`.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::{debug, info};

use super::config::StorageProvider;
use super::error::StorageError;

/// Result of ensuring the bucket exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// Bucket was already there.
    Existing,
    /// Bucket was created during startup.
    Created,
}

/// Check that the provider's bucket exists, creating it when absent.
///
/// # Errors
///
/// Returns a provisioning error if the check or the creation fails.
pub async fn ensure_bucket(provider: &StorageProvider) -> Result<BucketStatus, StorageError> {
    match provider {
        StorageProvider::S3 {
            endpoint,
            bucket,
            access_key_id,
            secret_access_key,
            region,
        } => {
            let client = s3_client(endpoint, access_key_id, secret_access_key, region);
            ensure_s3_bucket(&client, bucket, region).await
        }
        StorageProvider::LocalFs { root } => {
            let exists = tokio::fs::try_exists(root).await.map_err(|e| {
                StorageError::provisioning(format!("failed to inspect {}: {e}", root.display()))
            })?;
            if exists {
                return Ok(BucketStatus::Existing);
            }
            tokio::fs::create_dir_all(root).await.map_err(|e| {
                StorageError::provisioning(format!("failed to create {}: {e}", root.display()))
            })?;
            Ok(BucketStatus::Created)
        }
        StorageProvider::Memory => Ok(BucketStatus::Existing),
    }
}

fn s3_client(
    endpoint: &str,
    access_key_id: &str,
    secret_access_key: &str,
    region: &str,
) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "mediarelay");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(Region::new(region.to_string()))
        .credentials_provider(credentials)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

async fn ensure_s3_bucket(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    region: &str,
) -> Result<BucketStatus, StorageError> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => {
            debug!(bucket, "Bucket exists");
            return Ok(BucketStatus::Existing);
        }
        Err(err) if err.as_service_error().is_some_and(HeadBucketError::is_not_found) => {}
        Err(err) => {
            return Err(StorageError::provisioning(format!(
                "failed to check if bucket exists: {}",
                DisplayErrorContext(&err)
            )));
        }
    }

    let mut request = client.create_bucket().bucket(bucket);
    // us-east-1 is the implicit location and must not be sent as a constraint.
    if region != StorageProvider::DEFAULT_REGION {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            info!(bucket, region, "Created bucket");
            Ok(BucketStatus::Created)
        }
        Err(err)
            if err
                .as_service_error()
                .is_some_and(CreateBucketError::is_bucket_already_owned_by_you) =>
        {
            Ok(BucketStatus::Existing)
        }
        Err(err) => Err(StorageError::provisioning(format!(
            "failed to create bucket: {}",
            DisplayErrorContext(&err)
        ))),
    }
}
