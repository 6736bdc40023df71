//! *Object Store* abstraction: a "storage service" client capable of issuing
//! readers and writers for a given object URL. The import pipeline writes its
//! segments, cut-point dumps, key files and bad-record reports through it.

pub mod local_store;
pub mod url;

use std::sync::Arc;

use rangeload_io::{ReadAt, SealingWrite};
use url::ObjectUrl;

/// The `ObjectStore` trait represents a "storage service" abstraction.
/// It provides the ability to obtain readers for existing objects
/// via their URLs, as well as writers for creating new objects.
pub trait ObjectStore: Send + Sync + 'static {
    /// Opens a reader for an existing object specified by the given URL.
    fn open(&self, url: &ObjectUrl) -> std::io::Result<Arc<dyn ReadAt>>;

    /// Creates a writer for a new object at the specified URL.
    ///
    /// Fails if the object already exists: artifacts produced by the pipeline
    /// are immutable once sealed.
    fn create(&self, url: &ObjectUrl) -> std::io::Result<Box<dyn SealingWrite>>;

    /// Creates a writer whose object replaces any existing object at `url`
    /// once sealed. Readers see either the old or the new content.
    fn replace(&self, url: &ObjectUrl) -> std::io::Result<Box<dyn SealingWrite>>;
}
