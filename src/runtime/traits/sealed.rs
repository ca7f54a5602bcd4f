// ABOUTME: Sealed trait pattern for runtime traits.
// ABOUTME: Only the bollard backend and the in-memory engine may implement them.

/// Sealed trait to prevent external implementations.
///
/// New capability methods can be added without breaking downstream code,
/// because only types inside this crate implement the runtime traits.
pub trait Sealed {}
