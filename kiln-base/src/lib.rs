pub mod error;
pub mod hashing;
mod key;
mod load_state;
pub mod nvp;

pub use error::{KilnError, KilnResult};
pub use key::ResourceKey;
pub use load_state::LoadingState;
pub use nvp::{LoadArgs, NvpParser};
