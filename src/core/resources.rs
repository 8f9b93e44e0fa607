//! # Node-local managed resources.
//!
//! A [`ResourceTable`] maps a resource name to a scoped handle that is released
//! when the owning coordinator stops or closes.
//!
//! ## Rules
//! - Creating a resource under an existing name releases the old one first.
//! - Release is idempotent: a handle is released at most once.
//! - [`ResourceTable::release_all`] releases in **reverse creation order** and
//!   keeps going when a single release fails (the failure is logged).
//!
//! ## Example
//! ```rust
//! use tilevisor::{ResourceFn, ResourceTable};
//!
//! let mut table = ResourceTable::new();
//! table.keep("socket", || Ok(ResourceFn::new(|| {
//!     // close the socket
//!     Ok(())
//! }))).unwrap();
//! assert!(table.contains("socket"));
//! table.release_all();
//! assert!(table.is_empty());
//! ```

use tracing::{debug, warn};

use crate::error::{BoxError, ResourceError};

/// A resource whose lifetime is scoped to one run of a coordinator.
pub trait ScopedResource: Send + 'static {
    /// Releases the resource. Called at most once.
    fn release(&mut self) -> Result<(), BoxError>;
}

/// Closure-backed [`ScopedResource`]: runs the closure on release.
pub struct ResourceFn<F> {
    release: Option<F>,
}

impl<F> ResourceFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send + 'static,
{
    /// Wraps a release action.
    pub fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }
}

impl<F> ScopedResource for ResourceFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send + 'static,
{
    fn release(&mut self) -> Result<(), BoxError> {
        match self.release.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

struct Entry {
    name: String,
    resource: Box<dyn ScopedResource>,
    released: bool,
}

impl Entry {
    fn release(&mut self) -> Result<(), ResourceError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.resource
            .release()
            .map_err(|e| ResourceError::Release {
                name: self.name.clone(),
                error: e.to_string().into(),
            })
    }
}

/// Ordered table of managed resources owned by one coordinator.
#[derive(Default)]
pub struct ResourceTable {
    entries: Vec<Entry>,
}

impl ResourceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resource under `name` with `factory`.
    ///
    /// An existing resource with the same name is released first; if the
    /// factory then fails, the name stays vacant.
    pub fn keep<R, F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), ResourceError>
    where
        R: ScopedResource,
        F: FnOnce() -> Result<R, BoxError>,
    {
        let name = name.into();
        if let Err(e) = self.release(&name) {
            warn!(resource = %name, error = %e, "failed to release replaced resource");
        }

        let resource = factory().map_err(|e| ResourceError::Create {
            name: name.clone(),
            error: e.to_string().into(),
        })?;
        debug!(resource = %name, "resource created");
        self.entries.push(Entry {
            name,
            resource: Box::new(resource),
            released: false,
        });
        Ok(())
    }

    /// Releases and forgets the resource under `name`, if any.
    pub fn release(&mut self, name: &str) -> Result<(), ResourceError> {
        match self.entries.iter().position(|e| e.name == name) {
            Some(idx) => {
                let mut entry = self.entries.remove(idx);
                entry.release()
            }
            None => Ok(()),
        }
    }

    /// Releases every resource in reverse creation order.
    ///
    /// Failures are logged and do not prevent later releases.
    pub fn release_all(&mut self) {
        while let Some(mut entry) = self.entries.pop() {
            match entry.release() {
                Ok(()) => debug!(resource = %entry.name, "resource released"),
                Err(e) => warn!(resource = %entry.name, error = %e, "resource release failed"),
            }
        }
    }

    /// Returns `true` if a resource named `name` is held.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Names of held resources, in creation order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of held resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no resources are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for ResourceTable {
    fn drop(&mut self) {
        self.release_all();
    }
}
