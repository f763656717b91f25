//! Admin group/member model, parsed from the file format in §6:
//! `Group=<name>:<permCsv>` / `Admin=<steamID|eosID>:<groupName>`.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminGroup {
    pub name: String,
    pub permissions: HashSet<String>,
}

/// `steamID|eosID -> groupName`. A single identifier may appear in more
/// than one `Admin=` line, in which case its effective permission set is
/// the union across every group it belongs to (SPEC_FULL.md §C.4).
#[derive(Debug, Clone, Default)]
pub struct AdminRoster {
    groups: HashMap<String, AdminGroup>,
    memberships: HashMap<String, Vec<String>>,
}

impl AdminRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: AdminGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn add_membership(&mut self, identity: String, group_name: String) {
        self.memberships.entry(identity).or_default().push(group_name);
    }

    /// Union of permissions across every group the identity belongs to.
    pub fn has_permission(&self, identity: &str, permission: &str) -> bool {
        let Some(group_names) = self.memberships.get(identity) else {
            return false;
        };
        group_names.iter().any(|name| {
            self.groups
                .get(name)
                .is_some_and(|g| g.permissions.contains(permission))
        })
    }

    pub fn group(&self, name: &str) -> Option<&AdminGroup> {
        self.groups.get(name)
    }

    pub fn groups_for(&self, identity: &str) -> Vec<&AdminGroup> {
        self.memberships
            .get(identity)
            .into_iter()
            .flatten()
            .filter_map(|name| self.groups.get(name))
            .collect()
    }

    /// Every declared group, for callers that need to merge rosters from
    /// multiple sources (§4.11's "one or more sources").
    pub fn all_groups(&self) -> impl Iterator<Item = &AdminGroup> {
        self.groups.values()
    }

    /// Every `identity -> groupName` membership line, flattened.
    pub fn all_memberships(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.memberships
            .iter()
            .flat_map(|(identity, groups)| groups.iter().map(move |group| (identity.clone(), group.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_is_union_across_memberships() {
        let mut roster = AdminRoster::new();
        roster.add_group(AdminGroup {
            name: "mod".into(),
            permissions: ["kick".into()].into_iter().collect(),
        });
        roster.add_group(AdminGroup {
            name: "banner".into(),
            permissions: ["ban".into()].into_iter().collect(),
        });
        roster.add_membership("76561198012345678".into(), "mod".into());
        roster.add_membership("76561198012345678".into(), "banner".into());

        assert!(roster.has_permission("76561198012345678", "kick"));
        assert!(roster.has_permission("76561198012345678", "ban"));
        assert!(!roster.has_permission("76561198012345678", "cameraman"));
    }
}
