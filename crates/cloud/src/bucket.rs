//! Anonymous access to the public NOAA S3 buckets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{CloudError, Result};

/// BlueTopo bucket of the National Bathymetric Source.
pub const NBS_BUCKET: &str = "noaa-ocs-nationalbathymetry-pds";

/// DCDB bathymetry bucket holding the CSB point files.
pub const DCDB_BUCKET: &str = "noaa-dcdb-bathymetry-pds";

/// Region both buckets live in.
pub const DEFAULT_REGION: &str = "us-east-1";

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// One bucket behind an [`ObjectStore`].
#[derive(Clone)]
pub struct Bucket {
    name: String,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket").field("name", &self.name).finish()
    }
}

impl Bucket {
    /// Unsigned S3 client for a public bucket.
    ///
    /// `endpoint` points at an S3-compatible mirror instead of AWS.
    pub fn anonymous(name: &str, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(name)
            .with_region(region)
            .with_skip_signature(true);

        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(Self {
            name: name.to_string(),
            store: Arc::new(builder.build()?),
        })
    }

    /// Bucket named `name` backed by an arbitrary store.
    pub fn with_store(name: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every object under `prefix`, sorted by key.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let prefix = ObjectPath::from(prefix.trim_end_matches('/'));
        let metas: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;

        let mut entries: Vec<ObjectEntry> = metas
            .into_iter()
            .map(|m| ObjectEntry {
                key: m.location.to_string(),
                size: m.size as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(bucket = %self.name, prefix = %prefix, objects = entries.len(), "list");
        Ok(entries)
    }

    /// Size of `key`, or `None` when the object does not exist.
    pub async fn head(&self, key: &str) -> Result<Option<u64>> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(meta.size as u64)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream `key` into `target`, returning the bytes written.
    ///
    /// Data lands in `<target>.part` first and is renamed once complete, so an
    /// interrupted download never leaves a truncated file under the real name.
    /// A failed download removes its part file.
    pub async fn download(&self, key: &str, target: &Path) -> Result<u64> {
        let result = match self.store.get(&ObjectPath::from(key)).await {
            Ok(r) => r,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(CloudError::NotFound(self.s3_url(key)))
            }
            Err(e) => return Err(e.into()),
        };

        let written = stream_to_file(result.into_stream(), target).await?;
        debug!(key, target = %target.display(), bytes = written, "downloaded");
        Ok(written)
    }

    /// `s3://<bucket>/<key>`
    pub fn s3_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.name, key.trim_start_matches('/'))
    }

    /// Rewrite an HTTP(S) object URL as an `s3://` URL in this bucket,
    /// keeping its path.
    pub fn to_s3_url(&self, http_url: &str) -> Result<String> {
        let url = url::Url::parse(http_url)
            .map_err(|e| CloudError::Network(format!("invalid object URL '{http_url}': {e}")))?;
        Ok(format!("s3://{}{}", self.name, url.path()))
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut part = target.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Write `stream` to the part file of `target`, then move it into place.
async fn stream_to_file<S>(stream: S, target: &Path) -> Result<u64>
where
    S: Stream<Item = object_store::Result<Bytes>> + Unpin,
{
    let part = part_path(target);
    match write_part(stream, &part).await {
        Ok(written) => {
            tokio::fs::rename(&part, target).await?;
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&part).await {
                debug!(part = %part.display(), error = %rm, "could not remove part file");
            }
            Err(e)
        }
    }
}

async fn write_part<S>(mut stream: S, part: &Path) -> Result<u64>
where
    S: Stream<Item = object_store::Result<Bytes>> + Unpin,
{
    let mut file = tokio::fs::File::create(part).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    async fn bucket_with(objects: &[(&str, &[u8])]) -> Bucket {
        let store = InMemory::new();
        for (key, data) in objects {
            store
                .put(&ObjectPath::from(*key), PutPayload::from_bytes(Bytes::copy_from_slice(data)))
                .await
                .unwrap();
        }
        Bucket::with_store(NBS_BUCKET, Arc::new(store))
    }

    #[tokio::test]
    async fn list_under_prefix() {
        let bucket = bucket_with(&[
            ("BlueTopo/T2/b.tiff", b"22"),
            ("BlueTopo/T1/a.tiff", b"1"),
            ("BlueTopo/T10/c.tiff", b"333"),
        ])
        .await;

        let entries = bucket.list("BlueTopo/T1/").await.unwrap();
        assert_eq!(
            entries,
            vec![ObjectEntry {
                key: "BlueTopo/T1/a.tiff".into(),
                size: 1
            }]
        );
        assert_eq!(bucket.list("BlueTopo/").await.unwrap().len(), 3);
        assert!(bucket.list("BlueTopo/T3/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn head_missing_is_none() {
        let bucket = bucket_with(&[("csb/a.csv", b"abcd")]).await;
        assert_eq!(bucket.head("csb/a.csv").await.unwrap(), Some(4));
        assert_eq!(bucket.head("csb/b.csv").await.unwrap(), None);
    }

    #[tokio::test]
    async fn download_renames_part_file() {
        let bucket = bucket_with(&[("csb/a.csv", b"x,y,z\n1,2,3\n")]).await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.csv");

        let n = bucket.download("csb/a.csv", &target).await.unwrap();
        assert_eq!(n, 12);
        assert_eq!(std::fs::read(&target).unwrap(), b"x,y,z\n1,2,3\n");
        assert!(!dir.path().join("a.csv.part").exists());

        let missing = bucket.download("csb/none.csv", &dir.path().join("none.csv")).await;
        assert!(matches!(missing, Err(CloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.csv");
        let chunks: Vec<object_store::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"x,y,z\n")),
            Err(object_store::Error::Generic {
                store: "test",
                source: "connection reset".into(),
            }),
        ];

        let res = stream_to_file(futures::stream::iter(chunks), &target).await;
        assert!(matches!(res, Err(CloudError::ObjectStore(_))));
        assert!(!target.exists());
        assert!(!dir.path().join("a.csv.part").exists());
    }

    #[test]
    fn urls() {
        let bucket = Bucket::with_store(NBS_BUCKET, Arc::new(InMemory::new()));
        assert_eq!(
            bucket.s3_url("BlueTopo/T1/a.tiff"),
            "s3://noaa-ocs-nationalbathymetry-pds/BlueTopo/T1/a.tiff"
        );
        assert_eq!(
            bucket
                .to_s3_url("https://noaa-ocs-nationalbathymetry-pds.s3.amazonaws.com/BlueTopo/T1/a.tiff")
                .unwrap(),
            "s3://noaa-ocs-nationalbathymetry-pds/BlueTopo/T1/a.tiff"
        );
        assert!(bucket.to_s3_url("not a url").is_err());
    }
}
