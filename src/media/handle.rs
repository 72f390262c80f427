use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::media::engine::Engine;
use crate::media::types::MediaInfo;

/// Shared, immutable reference to a probed media resource
///
/// Probing happens once in [`MediaHandle::open`]; clones share the cached
/// metadata. The resource is released when the last timeline segment or
/// filter stage referencing it is dropped.
#[derive(Clone, PartialEq)]
pub struct MediaHandle {
    info: Arc<MediaInfo>,
}

impl MediaHandle {
    /// Probe `path` and cache its metadata
    pub fn open(engine: &Engine, path: impl AsRef<Path>) -> Result<Self> {
        let info = engine.probe(path.as_ref())?;
        Ok(Self::from_info(info))
    }

    /// Wrap metadata obtained elsewhere
    pub fn from_info(info: MediaInfo) -> Self {
        Self { info: Arc::new(info) }
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Whether two handles share the same probe result
    pub fn same_resource(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.info, &other.info)
    }
}

impl Deref for MediaHandle {
    type Target = MediaInfo;

    fn deref(&self) -> &MediaInfo {
        &self.info
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MediaHandle").field(&self.info.path).finish()
    }
}
