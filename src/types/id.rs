// ABOUTME: Phantom-typed identifiers for containers and images.
// ABOUTME: Keeps engine ids from being swapped and derives their 12-character short form.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
pub enum ContainerMarker {}
pub enum ImageMarker {}

const SHORT_ID_LEN: usize = 12;

/// A type-safe identifier that prevents accidental mixing of different ID types.
///
/// A `ContainerId` cannot be passed where an `ImageId` is expected, even though
/// both are plain engine hashes underneath.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The 12-character form used in logs and reports.
    pub fn short_id(&self) -> &str {
        short_id(&self.value)
    }
}

/// Returns the 12-character short form of an engine hash.
///
/// A `sha256:` prefix is stripped; any other algorithm prefix is kept and the
/// window grows to include it. Inputs shorter than the window come back whole.
pub fn short_id(id: &str) -> &str {
    let mut offset = 0;
    let mut length = SHORT_ID_LEN;

    if let Some(sep) = id.find(':') {
        if &id[..sep] == "sha256" {
            offset = sep + 1;
        } else {
            length += sep + 1;
        }
    }

    match id.get(offset..offset + length) {
        Some(short) => short,
        None => id,
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Id").field("value", &self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

pub type ContainerId = Id<ContainerMarker>;
pub type ImageId = Id<ImageMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sha256_prefix() {
        assert_eq!(
            short_id("sha256:0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
    }

    #[test]
    fn keeps_other_algorithm_prefixes() {
        assert_eq!(
            short_id("sha512:0123456789abcdef0123456789abcdef"),
            "sha512:0123456789ab"
        );
    }

    #[test]
    fn short_inputs_are_returned_whole() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("sha256:abc"), "sha256:abc");
    }

    #[test]
    fn unprefixed_ids_are_truncated() {
        let id = ContainerId::new("a1b2c3d4e5f6a7b8c9d0");
        assert_eq!(id.short_id(), "a1b2c3d4e5f6");
    }
}
