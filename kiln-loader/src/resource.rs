use downcast_rs::{impl_downcast, Downcast};
use kiln_base::ResourceKey;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Payload of a resource. Anything `Send + Sync + 'static` qualifies, the concrete type is
/// recovered with `Resource::with_data()`.
pub trait ResourceData: Downcast + Send + Sync {}

impl_downcast!(ResourceData);

impl<T: Downcast + Send + Sync> ResourceData for T {}

/// A named, shareable asset. The payload is filled in by the loader's commit step, which may happen
/// several times for progressive loads. `commit_count` tells how many commits have been applied.
pub struct Resource {
    key: ResourceKey,
    commit_count: AtomicU32,
    data: RwLock<Box<dyn ResourceData>>,
}

pub type ResourcePtr = Arc<Resource>;
pub type ResourceWeakPtr = Weak<Resource>;

impl Resource {
    pub fn new<T: ResourceData>(
        key: impl Into<ResourceKey>,
        data: T,
    ) -> Self {
        Resource {
            key: key.into(),
            commit_count: AtomicU32::new(0),
            data: RwLock::new(Box::new(data)),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn commit_count(&self) -> u32 {
        self.commit_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_commit_count(&self) -> u32 {
        self.commit_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is<T: ResourceData>(&self) -> bool {
        (**self.data.read().unwrap()).is::<T>()
    }

    /// Runs `f` on the payload if it is a `T`
    pub fn with_data<T: ResourceData, R>(
        &self,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let data = self.data.read().unwrap();
        (**data).downcast_ref::<T>().map(f)
    }

    /// Mutable access to the payload, normally only used from `ResourceLoader::commit()`
    pub fn with_data_mut<T: ResourceData, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut data = self.data.write().unwrap();
        (**data).downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for Resource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Resource")
            .field("key", &self.key)
            .field("commit_count", &self.commit_count())
            .finish()
    }
}
