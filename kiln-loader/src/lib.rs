mod callback;
mod config;
mod io;
mod loader;
mod manager;
mod resource;
mod worker_pool;

pub use callback::{fulfill_requirement, CallbackEntry, CallbackRegistry, CallbackTarget};
pub use config::ResourceManagerConfig;
pub use io::{DiskResourceIO, NullResourceIO, ResourceIO};
pub use loader::{Loader, LoaderPtr, ResourceLoader};
pub use manager::{BlockingMode, DecodeContext, LoadOptions, ResourceFactory, ResourceManager};
pub use resource::{Resource, ResourceData, ResourcePtr, ResourceWeakPtr};

pub use kiln_base::{LoadArgs, LoadingState, ResourceKey};
