// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache key composition.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use xxhash_rust::xxh3::xxh3_64;

/// Optional parts appended around a raw key by [`build_cache_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// Prefix separated from the raw key by `:`.
    pub namespace: Option<&'a str>,
    /// Rendered as a `:vN` suffix.
    pub version: Option<u32>,
    /// Rendered as a final `:hash` suffix.
    pub params_hash: Option<&'a str>,
}

/// Composes `namespace:raw_key[:vN][:hash]`.
///
/// Absent parts are omitted together with their separator, so a key with no
/// parts is the raw key itself.
///
/// # Examples
///
/// ```
/// use strata::{KeyParts, build_cache_key};
///
/// let parts = KeyParts {
///     namespace: Some("donor-list"),
///     version: Some(2),
///     params_hash: None,
/// };
/// assert_eq!(build_cache_key("region=NG", &parts), "donor-list:region=NG:v2");
/// assert_eq!(build_cache_key("region=NG", &KeyParts::default()), "region=NG");
/// ```
#[must_use]
pub fn build_cache_key(raw_key: &str, parts: &KeyParts<'_>) -> String {
    let mut key = String::with_capacity(raw_key.len() + 32);
    if let Some(namespace) = parts.namespace {
        key.push_str(namespace);
        key.push(':');
    }
    key.push_str(raw_key);
    if let Some(version) = parts.version {
        let _ = write!(key, ":v{version}");
    }
    if let Some(hash) = parts.params_hash {
        key.push(':');
        key.push_str(hash);
    }
    key
}

/// Hashes request parameters into a short, order-independent token.
///
/// Returns `None` when there are no parameters.
#[must_use]
pub fn params_hash(params: &BTreeMap<String, String>) -> Option<String> {
    if params.is_empty() {
        return None;
    }

    let mut canonical = String::new();
    for (name, value) in params {
        // Length prefixes keep ("a", "bc") and ("ab", "c") apart.
        let _ = write!(canonical, "{}:{name}={}:{value};", name.len(), value.len());
    }

    Some(format!("{:016x}", xxh3_64(canonical.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn composes_every_part() {
        let parts = KeyParts {
            namespace: Some("inventory"),
            version: Some(3),
            params_hash: Some("abc"),
        };
        assert_eq!(build_cache_key("type=O+", &parts), "inventory:type=O+:v3:abc");
    }

    #[test]
    fn omits_missing_parts() {
        let parts = KeyParts {
            namespace: None,
            version: None,
            params_hash: Some("ff"),
        };
        assert_eq!(build_cache_key("k", &parts), "k:ff");
    }

    #[test]
    fn params_hash_is_deterministic_and_order_free() {
        let a = params(&[("region", "NG"), ("type", "O+")]);
        let b = params(&[("type", "O+"), ("region", "NG")]);
        assert_eq!(params_hash(&a), params_hash(&b));
        assert_eq!(params_hash(&a).map(|hash| hash.len()), Some(16));
    }

    #[test]
    fn params_hash_separates_boundaries() {
        let a = params(&[("a", "bc")]);
        let b = params(&[("ab", "c")]);
        assert_ne!(params_hash(&a), params_hash(&b));
        assert_eq!(params_hash(&BTreeMap::new()), None);
    }
}
