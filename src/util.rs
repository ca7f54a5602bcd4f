// ABOUTME: Small collection helpers and the random container name generator.
// ABOUTME: Used by create-config reconstruction and the self-update rename.

use rand::Rng;
use std::collections::BTreeMap;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the temporary name given to the running watchtower container.
pub const RANDOM_NAME_LEN: usize = 32;

/// Draws a 32-letter name from `[A-Za-z]`.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDOM_NAME_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Elements of `a` that do not appear in `b`, in their original order.
pub fn slice_subtract(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|e| !b.contains(e)).cloned().collect()
}

/// Entries of `a` whose key is missing from `b` or maps to a different value.
pub fn map_subtract(
    a: &BTreeMap<String, String>,
    b: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    a.iter()
        .filter(|(k, v)| b.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn random_name_is_32_letters() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = random_name(&mut rng);
        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn seeded_names_are_reproducible() {
        let a = random_name(&mut StdRng::seed_from_u64(42));
        let b = random_name(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn slice_subtract_keeps_order() {
        let a = strings(&["A=1", "B=2", "C=3"]);
        let b = strings(&["B=2"]);
        assert_eq!(slice_subtract(&a, &b), strings(&["A=1", "C=3"]));
    }

    #[test]
    fn map_subtract_keeps_changed_values() {
        let a: BTreeMap<_, _> = [("a", "1"), ("b", "2"), ("c", "3")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let b: BTreeMap<_, _> = [("a", "1"), ("b", "x")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let diff = map_subtract(&a, &b);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.get("b").map(String::as_str), Some("2"));
        assert_eq!(diff.get("c").map(String::as_str), Some("3"));
    }
}
