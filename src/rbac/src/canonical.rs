//! Resource name canonicalization
//!
//! Role tags attach to a *resource name* derived from the request path.
//! Canonicalization is a pure function of the path shape:
//!
//! | segments | result |
//! |----------|--------|
//! | 1        | the account itself (`/acct`) |
//! | 2-3      | the path verbatim (`/acct/machines`, `/acct/machines/m1`) |
//! | 4+       | truncated to the first three segments |
//!
//! Sub-user key paths (`/acct/users/u1/keys[/k1]`) are never truncated so
//! tags on individual keys stay addressable. Everything beneath an instance
//! (`/acct/machines/m1/...`) collapses to the instance.
//!
//! Only the account segment is normalized here. Callers must pass the
//! remaining segments with identifiers already resolved to UUIDs, so that
//! `/acct/machines/web01` and the same instance addressed by UUID agree.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const INSTANCE_COLLECTION: &str = "machines";
pub const USER_COLLECTION: &str = "users";
pub const KEY_COLLECTION: &str = "keys";

/// Canonical resource name, always starting with `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The instance identifier when this names a compute instance
    pub fn instance_id(&self) -> Option<&str> {
        let segments: Vec<&str> = self.segments().collect();
        match segments.as_slice() {
            [_, collection, id] if *collection == INSTANCE_COLLECTION => Some(*id),
            _ => None,
        }
    }

    pub fn is_instance(&self) -> bool {
        self.instance_id().is_some()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_user_key_path(segments: &[&str]) -> bool {
    segments.len() >= 4 && segments[1] == USER_COLLECTION && segments[3] == KEY_COLLECTION
}

/// Canonicalize decoded path segments
///
/// `account` replaces the first segment, so a request that addressed the
/// account by UUID and one that used its login produce the same name.
/// Never fails; an empty path names the account.
pub fn canonicalize<S: AsRef<str>>(account: &str, segments: &[S]) -> ResourceName {
    let mut parts: Vec<&str> = Vec::with_capacity(segments.len().max(1));
    parts.push(account);
    parts.extend(segments.iter().skip(1).map(|s| s.as_ref()));

    let keep = match parts.len() {
        1..=3 => parts.len(),
        _ if is_user_key_path(&parts) => parts.len(),
        _ => 3,
    };

    ResourceName(format!("/{}", parts[..keep].join("/")))
}

/// Canonicalize a raw request path such as `/my/machines/m1/tags`
///
/// Empty segments are ignored.
pub fn canonicalize_path(account: &str, path: &str) -> ResourceName {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    canonicalize(account, &segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_account_resource() {
        assert_eq!(canonicalize("acct", &["acct"]).as_str(), "/acct");
        assert_eq!(canonicalize::<&str>("acct", &[]).as_str(), "/acct");
    }

    #[test]
    fn test_instance_named_by_caller_resolved_id() {
        // Only the account segment is rewritten; item identifiers pass through
        let by_name = canonicalize("acct", &["acct", "machines", "web01"]);
        let by_id = canonicalize("acct", &["acct-uuid", "machines", "web01", "tags"]);
        assert_eq!(by_name, by_id);
        assert_ne!(by_name, canonicalize("acct", &["acct", "machines", "0f3c"]));
    }

    #[test]
    fn test_collection_and_item_verbatim() {
        assert_eq!(canonicalize("acct", &["acct", "users"]).as_str(), "/acct/users");
        assert_eq!(canonicalize("acct", &["acct", "users", "u1"]).as_str(), "/acct/users/u1");
    }

    #[test]
    fn test_instance_subpaths_truncate() {
        assert_eq!(canonicalize("acct", &["acct", "machines", "m1", "tags"]).as_str(), "/acct/machines/m1");
        assert_eq!(
            canonicalize("acct", &["acct", "machines", "m1", "snapshots", "s1"]).as_str(),
            "/acct/machines/m1"
        );
        assert_eq!(
            canonicalize("acct", &["acct", "machines", "m1", "metadata", "k", "extra"]).as_str(),
            "/acct/machines/m1"
        );
    }

    #[test]
    fn test_user_keys_kept_whole() {
        assert_eq!(
            canonicalize("acct", &["acct", "users", "u1", "keys"]).as_str(),
            "/acct/users/u1/keys"
        );
        assert_eq!(
            canonicalize("acct", &["acct", "users", "u1", "keys", "k1"]).as_str(),
            "/acct/users/u1/keys/k1"
        );
    }

    #[test]
    fn test_other_subcollections_truncate() {
        assert_eq!(canonicalize("acct", &["acct", "users", "u1", "roles"]).as_str(), "/acct/users/u1");
        assert_eq!(
            canonicalize("acct", &["acct", "images", "i1", "acl", "x"]).as_str(),
            "/acct/images/i1"
        );
    }

    #[test]
    fn test_account_segment_normalized() {
        let by_uuid = canonicalize("acct", &["2c1b5c4e-0000-4000-8000-000000000001", "machines"]);
        let by_login = canonicalize("acct", &["acct", "machines"]);
        assert_eq!(by_uuid, by_login);
    }

    #[test]
    fn test_raw_path() {
        assert_eq!(canonicalize_path("acct", "/my/machines/m1/tags/").as_str(), "/acct/machines/m1");
        assert_eq!(canonicalize_path("acct", "//").as_str(), "/acct");
    }

    #[test]
    fn test_instance_detection() {
        assert_eq!(canonicalize("acct", &["acct", "machines", "m1", "tags"]).instance_id(), Some("m1"));
        assert!(!canonicalize("acct", &["acct", "machines"]).is_instance());
        assert!(!canonicalize("acct", &["acct", "users", "u1"]).is_instance());
    }

    proptest! {
        #[test]
        fn prop_instance_subresources_collapse(id in "[a-z0-9-]{1,12}", tail in prop::collection::vec("[a-z0-9]{1,8}", 1..5)) {
            let mut segments = vec!["x".to_string(), "machines".to_string(), id.clone()];
            segments.extend(tail);
            let name = canonicalize("acct", &segments);
            prop_assert_eq!(name.as_str(), format!("/acct/machines/{}", id));
        }

        #[test]
        fn prop_account_addressing_does_not_matter(first in "[a-zA-Z0-9-]{1,36}", rest in prop::collection::vec("[a-z0-9]{1,8}", 0..6)) {
            let mut a = vec![first];
            a.extend(rest.iter().cloned());
            let mut b = vec!["acct".to_string()];
            b.extend(rest);
            prop_assert_eq!(canonicalize("acct", &a), canonicalize("acct", &b));
        }

        #[test]
        fn prop_never_longer_than_input(segments in prop::collection::vec("[a-z0-9]{1,8}", 1..8)) {
            let name = canonicalize("acct", &segments);
            prop_assert!(name.segments().count() <= segments.len());
            prop_assert!(name.as_str().starts_with("/acct"));
        }
    }
}
