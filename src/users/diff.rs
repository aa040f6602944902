//! User list diffing for incremental sync.

use serde::Serialize;
use std::collections::HashMap;

use crate::node::descriptor::UserInfo;

/// Changes between two user lists. A user whose attributes changed
/// appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserDiff {
    pub added: Vec<UserInfo>,
    pub removed: Vec<UserInfo>,
}

impl UserDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_users(old: &[UserInfo], new: &[UserInfo]) -> UserDiff {
    let old_by_id: HashMap<&str, &UserInfo> = old.iter().map(|u| (u.id.as_str(), u)).collect();
    let new_by_id: HashMap<&str, &UserInfo> = new.iter().map(|u| (u.id.as_str(), u)).collect();

    let removed = old
        .iter()
        .filter(|u| new_by_id.get(u.id.as_str()) != Some(u))
        .cloned()
        .collect();
    let added = new
        .iter()
        .filter(|u| old_by_id.get(u.id.as_str()) != Some(u))
        .cloned()
        .collect();

    UserDiff { added, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff() {
        let old = vec![UserInfo::new("u1"), UserInfo::new("u2")];
        let mut changed = UserInfo::new("u2");
        changed.speed_limit = 100;
        let new = vec![changed.clone(), UserInfo::new("u3")];

        let diff = diff_users(&old, &new);
        assert_eq!(diff.removed, vec![UserInfo::new("u1"), UserInfo::new("u2")]);
        assert_eq!(diff.added, vec![changed, UserInfo::new("u3")]);
    }

    #[test]
    fn test_identical_lists() {
        let users = vec![UserInfo::new("u1")];
        assert!(diff_users(&users, &users).is_empty());
    }
}
