//! Path-based object store session.
//!
//! [`Session`] wraps object store requests behind fully-qualified
//! `s3://container/key` paths. A path that names an object acts on that
//! object; a container root, a path ending in `/`, or a key that only
//! prefixes other objects acts on everything beneath it.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info, instrument};

use drover_core::config::DroverConfig;
use drover_core::error::DroverError;
use drover_core::location::{parse_path, Location};
use drover_core::Result;

use crate::provider::{map_store_error, StoreProvider};
use crate::s3::S3StoreProvider;

/// High-level, path-based client for the object store.
///
/// Holds no state besides the provider; every call round-trips to the
/// store. Cloning is cheap.
#[derive(Clone)]
pub struct Session {
    provider: Arc<dyn StoreProvider>,
}

/// What a path resolved to.
enum Resolved {
    /// The key names one object.
    Object(ObjectPath),
    /// The key is a prefix; these objects live beneath it.
    Prefix(Vec<ObjectPath>),
}

impl Resolved {
    fn into_paths(self) -> Vec<ObjectPath> {
        match self {
            Resolved::Object(path) => vec![path],
            Resolved::Prefix(paths) => paths,
        }
    }
}

impl Session {
    /// Create a session over any store provider.
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        Self { provider }
    }

    /// Create a session against S3 using the configured region and retry policy.
    pub fn s3(config: &DroverConfig) -> Self {
        Self::new(Arc::new(S3StoreProvider::new(config)))
    }

    /// Download an object into memory.
    ///
    /// Objects larger than available memory cannot be loaded this way.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get(&self, path: &str) -> Result<Bytes> {
        let location = parse_path(path)?;
        let key = object_key(&location)?;
        let store = self.provider.store(location.container())?;

        let result = store
            .get(&key)
            .await
            .map_err(|e| map_store_error(path, e))?;
        let bytes = result.bytes().await.map_err(|e| map_store_error(path, e))?;
        debug!("Get {} bytes from {}", bytes.len(), path);
        Ok(bytes)
    }

    /// Download an object and decode it as UTF-8.
    pub async fn get_string(&self, path: &str) -> Result<String> {
        let bytes = self.get(path).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DroverError::format(format!("{path} is not valid UTF-8"), e))
    }

    /// Write an object, overwriting it if it exists.
    #[instrument(skip(self, data), fields(path = %path, size = data.len()))]
    pub async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let location = parse_path(path)?;
        let key = object_key(&location)?;
        let store = self.provider.store(location.container())?;

        store
            .put(&key, PutPayload::from(data))
            .await
            .map_err(|e| map_store_error(path, e))?;
        Ok(())
    }

    /// List every object at or beneath `path` as fully-qualified paths.
    ///
    /// A container root lists the whole container. The listing is streamed
    /// page by page from the store and returned sorted.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        let location = parse_path(path)?;
        let store = self.provider.store(location.container())?;

        let mut keys = Vec::new();
        if !location.is_directory_like() {
            if let Some(key) = head_object(store.as_ref(), &location).await? {
                keys.push(key);
            }
        }
        keys.extend(list_prefix(store.as_ref(), &location).await?);
        keys.sort();
        keys.dedup();

        let paths: Vec<String> = keys
            .iter()
            .map(|k| format!("s3://{}/{}", location.container(), k.as_ref()))
            .collect();
        debug!("Listed {} objects under {}", paths.len(), path);
        Ok(paths)
    }

    /// Delete the object at `path`, or everything beneath a directory-like path.
    ///
    /// Recursive deletes are sent as one batched delete stream over a single
    /// store handle. Deleting an empty prefix is a no-op; deleting a single
    /// object that does not exist fails with [`DroverError::NotFound`].
    ///
    /// Returns the number of objects deleted.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete(&self, path: &str) -> Result<usize> {
        let location = parse_path(path)?;
        let store = self.provider.store(location.container())?;

        let targets = match resolve(store.as_ref(), &location).await? {
            Resolved::Prefix(paths) if paths.is_empty() && !location.is_directory_like() => {
                return Err(DroverError::not_found(path));
            }
            resolved => resolved.into_paths(),
        };

        let deleted = delete_paths(store.as_ref(), &location, targets).await?;
        info!(path = %path, deleted, "Deleted objects");
        Ok(deleted)
    }

    /// Copy `src` to `dst` on the server side.
    ///
    /// Within one container the store copies directly; across containers the
    /// bytes pass through this process. A directory-like or prefix `src`
    /// copies every object beneath it to the same relative key beneath `dst`.
    ///
    /// Returns the number of objects copied.
    #[instrument(skip(self), fields(src = %src, dst = %dst))]
    pub async fn copy(&self, src: &str, dst: &str) -> Result<usize> {
        let src_loc = parse_path(src)?;
        let dst_loc = parse_path(dst)?;
        let src_store = self.provider.store(src_loc.container())?;

        let copied = self.copy_resolved(src_store.as_ref(), &src_loc, &dst_loc).await?;
        info!(src = %src, dst = %dst, copied = copied.len(), "Copied objects");
        Ok(copied.len())
    }

    /// Copy `src` to `dst`, then delete `src`.
    ///
    /// If the copy succeeds but the delete fails, returns
    /// [`DroverError::PartialMove`]: the copy is kept and the delete is not
    /// retried, so both paths exist until the caller cleans up.
    #[instrument(skip(self), fields(src = %src, dst = %dst))]
    pub async fn move_path(&self, src: &str, dst: &str) -> Result<usize> {
        let src_loc = parse_path(src)?;
        let dst_loc = parse_path(dst)?;
        let src_store = self.provider.store(src_loc.container())?;
        let copied = self.copy_resolved(src_store.as_ref(), &src_loc, &dst_loc).await?;
        let count = copied.len();

        delete_paths(src_store.as_ref(), &src_loc, copied)
            .await
            .map_err(|e| DroverError::PartialMove {
                src: src.to_string(),
                dst: dst.to_string(),
                source: Box::new(e),
            })?;

        info!(src = %src, dst = %dst, moved = count, "Moved objects");
        Ok(count)
    }

    /// Whether anything exists at `path`.
    ///
    /// Object keys are probed with a `HEAD`; directory-like paths exist when
    /// at least one object lives beneath them. Only transport and permission
    /// failures are errors.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        let location = parse_path(path)?;
        let store = self.provider.store(location.container())?;

        let exists = if location.is_directory_like() {
            let prefix = prefix_of(&location)?;
            let mut listing = store.list(prefix.as_ref());
            match listing.next().await {
                Some(Ok(_)) => true,
                Some(Err(e)) => return Err(map_store_error(path, e)),
                None => false,
            }
        } else {
            head_object(store.as_ref(), &location).await?.is_some()
        };
        debug!("exists {} → {}", path, exists);
        Ok(exists)
    }

    /// Copy whatever `src` resolves to and return the source keys copied.
    ///
    /// Every source/target pair is planned before anything is written; a
    /// plan that would copy an object onto itself is rejected up front.
    async fn copy_resolved(
        &self,
        src_store: &dyn ObjectStore,
        src: &Location,
        dst: &Location,
    ) -> Result<Vec<ObjectPath>> {
        let resolved = resolve(src_store, src).await?;
        let targets: Vec<(ObjectPath, Location)> = match resolved {
            Resolved::Object(key) => {
                let target = if dst.is_directory_like() {
                    dst.join(key.filename().unwrap_or_default())
                } else {
                    dst.clone()
                };
                vec![(key, target)]
            }
            Resolved::Prefix(keys) if keys.is_empty() => {
                return Err(DroverError::not_found(src.full_path()));
            }
            Resolved::Prefix(keys) => {
                let base = key_path(src)?;
                keys.into_iter()
                    .map(|key| {
                        let relative = relative_key(&base, &key);
                        let target = dst.join(&relative);
                        (key, target)
                    })
                    .collect()
            }
        };

        let same_container = src.container() == dst.container();
        let mut pairs = Vec::with_capacity(targets.len());
        for (from, to) in targets {
            let to_key = object_key(&to)?;
            if same_container && from == to_key {
                return Err(DroverError::InvalidPath {
                    path: to.full_path().to_string(),
                    reason: format!("{} would be copied onto itself", to.full_path()),
                });
            }
            pairs.push((from, to, to_key));
        }

        let dst_store = if same_container {
            None
        } else {
            Some(self.provider.store(dst.container())?)
        };

        let mut copied = Vec::with_capacity(pairs.len());
        for (from, to, to_key) in pairs {
            let from_path = format!("s3://{}/{}", src.container(), from.as_ref());
            match &dst_store {
                None => src_store
                    .copy(&from, &to_key)
                    .await
                    .map_err(|e| map_store_error(&from_path, e))?,
                Some(dst_store) => {
                    let data = src_store
                        .get(&from)
                        .await
                        .map_err(|e| map_store_error(&from_path, e))?
                        .bytes()
                        .await
                        .map_err(|e| map_store_error(&from_path, e))?;
                    dst_store
                        .put(&to_key, PutPayload::from(data))
                        .await
                        .map_err(|e| map_store_error(to.full_path(), e))?;
                }
            }
            debug!("Copied {} to {}", from_path, to);
            copied.push(from);
        }
        Ok(copied)
    }
}

/// The object key for operations that need exactly one object.
fn object_key(location: &Location) -> Result<ObjectPath> {
    if location.is_directory_like() {
        return Err(DroverError::InvalidPath {
            path: location.full_path().to_string(),
            reason: "path must name an object, not a container or directory".to_string(),
        });
    }
    key_path(location)
}

/// The key of `location` exactly as written.
///
/// Keys are taken verbatim, never percent-encoded. A trailing `/` is
/// dropped; empty segments and `.`/`..` segments are rejected.
fn key_path(location: &Location) -> Result<ObjectPath> {
    ObjectPath::parse(location.key()).map_err(|e| DroverError::InvalidPath {
        path: location.full_path().to_string(),
        reason: e.to_string(),
    })
}

/// The listing prefix for a location; `None` lists the whole container.
fn prefix_of(location: &Location) -> Result<Option<ObjectPath>> {
    if location.is_container_root() {
        Ok(None)
    } else {
        key_path(location).map(Some)
    }
}

/// `HEAD` the object named by `location`, returning its key if it exists.
async fn head_object(store: &dyn ObjectStore, location: &Location) -> Result<Option<ObjectPath>> {
    match store.head(&key_path(location)?).await {
        Ok(meta) => Ok(Some(meta.location)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(map_store_error(location.full_path(), e)),
    }
}

/// Every object beneath `location`, streamed from the store.
async fn list_prefix(store: &dyn ObjectStore, location: &Location) -> Result<Vec<ObjectPath>> {
    let prefix = prefix_of(location)?;
    let mut results = Vec::new();
    let mut listing = store.list(prefix.as_ref());
    while let Some(meta) = listing
        .try_next()
        .await
        .map_err(|e| map_store_error(location.full_path(), e))?
    {
        results.push(meta.location);
    }
    results.sort();
    Ok(results)
}

/// Decide whether `location` names one object or a prefix of many.
async fn resolve(store: &dyn ObjectStore, location: &Location) -> Result<Resolved> {
    if !location.is_directory_like() {
        if let Some(key) = head_object(store, location).await? {
            return Ok(Resolved::Object(key));
        }
    }
    Ok(Resolved::Prefix(list_prefix(store, location).await?))
}

/// Delete `paths` through one batched delete stream.
async fn delete_paths(
    store: &dyn ObjectStore,
    location: &Location,
    paths: Vec<ObjectPath>,
) -> Result<usize> {
    if paths.is_empty() {
        return Ok(0);
    }
    let locations = stream::iter(paths.into_iter().map(Ok)).boxed();
    let deleted: Vec<ObjectPath> = store
        .delete_stream(locations)
        .try_collect()
        .await
        .map_err(|e| map_store_error(location.full_path(), e))?;
    Ok(deleted.len())
}

/// `key` relative to `base`, e.g. `logs/a/b` under `logs` → `a/b`.
fn relative_key(base: &ObjectPath, key: &ObjectPath) -> String {
    match key.prefix_match(base) {
        Some(parts) => parts
            .map(|part| part.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("/"),
        None => key.as_ref().to_string(),
    }
}
