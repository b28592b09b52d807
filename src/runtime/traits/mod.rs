// ABOUTME: Composable capability traits for container engines.
// ABOUTME: Defines ImageOps, ContainerOps, RegistryOps and the combined Engine.

mod container;
mod image;
mod registry;
mod shared_types;

pub use container::ContainerOps;
pub use image::ImageOps;
pub use registry::RegistryOps;
pub use shared_types::*;

/// Every capability the image services need from one connection.
pub trait Engine: ImageOps + ContainerOps + RegistryOps {}

impl<T: ImageOps + ContainerOps + RegistryOps> Engine for T {}
