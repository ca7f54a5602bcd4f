// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ImageOps, ContainerOps, NetworkOps, ExecOps and the Runtime bundle.

mod container;
mod exec;
mod image;
mod network;
pub(crate) mod sealed;
mod shared_types;

pub use container::{
    ContainerError, ContainerFilters, ContainerOps, ContainerSummary, RemoveOptions,
};
pub use exec::{ExecError, ExecOps};
pub use image::{ImageError, ImageOps};
pub use network::{NetworkError, NetworkOps};
pub use shared_types::*;

/// Every capability the update engine needs from a container engine.
pub trait Runtime: ContainerOps + ImageOps + NetworkOps + ExecOps {}

impl<T> Runtime for T where T: ContainerOps + ImageOps + NetworkOps + ExecOps {}
