#[cfg(feature = "kiln-base")]
pub use kiln_base as base;

#[cfg(feature = "kiln-loader")]
pub use kiln_loader as loader;
