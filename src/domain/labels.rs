//! Label sets and the helpers every backend shares.
//!
//! Labels are kept in a [`BTreeMap`] so iteration order is always sorted by
//! key, which keeps fingerprints, LogQL filters and annotation text
//! deterministic.

use std::collections::BTreeMap;
use std::hash::Hasher;

use fnv::FnvHasher;

/// A set of label name/value pairs, sorted by name.
pub type Labels = BTreeMap<String, String>;

const PRIVATE_MARKER: &str = "__";
const FINGERPRINT_SEPARATOR: u8 = 0xff;

/// Returns `true` if the label name is private (starts or ends with `__`).
#[must_use]
pub fn is_private_label(name: &str) -> bool {
    name.starts_with(PRIVATE_MARKER) || name.ends_with(PRIVATE_MARKER)
}

/// Returns a copy of `labels` without private labels.
///
/// An empty input yields an empty map.
#[must_use]
pub fn remove_private_labels(labels: &Labels) -> Labels {
    labels
        .iter()
        .filter(|(name, _)| !is_private_label(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Computes the 64-bit FNV-1a fingerprint of a label set, rendered as 16
/// lowercase hex digits.
#[must_use]
pub fn fingerprint(labels: &Labels) -> String {
    let mut hasher = FnvHasher::default();
    for (name, value) in labels {
        hasher.write(name.as_bytes());
        hasher.write_u8(FINGERPRINT_SEPARATOR);
        hasher.write(value.as_bytes());
        hasher.write_u8(FINGERPRINT_SEPARATOR);
    }
    format!("{:016x}", hasher.finish())
}

/// Renders labels as `name=value, name=value`.
#[must_use]
pub fn labels_to_string(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rewrites a label name so it matches `[a-zA-Z_][a-zA-Z0-9_]*`.
///
/// Invalid characters become `_`; a leading digit gets a `_` prefix.
#[must_use]
pub fn sanitize_label_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for (i, ch) in name.chars().enumerate() {
        if i == 0 && ch.is_ascii_digit() {
            out.push('_');
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Strips private labels and sanitizes the remaining names.
///
/// When two names collide after sanitizing, the value of the
/// lexicographically first original name wins.
#[must_use]
pub fn sanitize_labels(labels: &Labels) -> Labels {
    let mut out = Labels::new();
    for (name, value) in labels {
        if is_private_label(name) {
            continue;
        }
        out.entry(sanitize_label_name(name))
            .or_insert_with(|| value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn removes_prefixed_and_suffixed_private_labels() {
        let input = labels(&[
            ("__name__", "up"),
            ("__alert_rule_uid__", "abc"),
            ("trailing__", "x"),
            ("__leading", "y"),
            ("instance", "server1"),
            ("mid__dle", "kept"),
        ]);
        let out = remove_private_labels(&input);
        assert_eq!(out, labels(&[("instance", "server1"), ("mid__dle", "kept")]));
    }

    #[test]
    fn empty_labels_stay_empty() {
        assert!(remove_private_labels(&Labels::new()).is_empty());
        assert!(remove_private_labels(&Labels::default()).is_empty());
    }

    #[test]
    fn fingerprint_is_stable_and_order_independent() {
        let a = labels(&[("a", "1"), ("b", "2")]);
        let mut b = Labels::new();
        b.insert("b".to_string(), "2".to_string());
        b.insert("a".to_string(), "1".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 16);
        assert_ne!(fingerprint(&a), fingerprint(&labels(&[("a", "1")])));
    }

    #[test]
    fn fingerprint_of_empty_set_is_fnv_offset_basis() {
        assert_eq!(fingerprint(&Labels::new()), "cbf29ce484222325");
    }

    #[test]
    fn renders_labels_sorted() {
        let out = labels_to_string(&labels(&[("b", "2"), ("a", "1")]));
        assert_eq!(out, "a=1, b=2");
    }

    #[test]
    fn sanitizes_label_names() {
        assert_eq!(sanitize_label_name("instance"), "instance");
        assert_eq!(sanitize_label_name("host.name"), "host_name");
        assert_eq!(sanitize_label_name("1st"), "_1st");
        assert_eq!(sanitize_label_name("ünï"), "_n_");
        assert_eq!(sanitize_label_name(""), "_");
    }

    #[test]
    fn sanitize_labels_drops_private_and_resolves_collisions() {
        let out = sanitize_labels(&labels(&[
            ("__name__", "up"),
            ("a-b", "first"),
            ("a.b", "second"),
        ]));
        assert_eq!(out, labels(&[("a_b", "first")]));
    }
}
