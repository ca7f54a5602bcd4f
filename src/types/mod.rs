// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;
mod image_ref;

pub use id::{ContainerId, Id, ImageId, short_id};
pub use image_ref::{DOCKER_HUB_HOST, ImageRef, ParseImageRefError, normalize_registry};
