//! Permission evaluation
//!
//! Answers "may this user do X" and "may this user touch this resource"
//! without any I/O; role data arrives already loaded. The admin fast path is
//! encoded in the grant type so it is enforced in exactly one place.

use hd_core::Id;
use std::collections::HashSet;

use crate::store::{RoleRecord, UserRecord};

/// Permission names used across the application
pub mod names {
    // Ticket permissions
    pub const VIEW_TICKETS: &str = "view_tickets";
    pub const VIEW_ALL_TICKETS: &str = "view_all_tickets";
    pub const ADD_TICKETS: &str = "add_tickets";
    pub const EDIT_TICKETS: &str = "edit_tickets";
    pub const EDIT_ALL_TICKETS: &str = "edit_all_tickets";
    pub const DELETE_TICKETS: &str = "delete_tickets";

    // Quality scorecard permissions
    pub const VIEW_SCORECARDS: &str = "view_scorecards";
    pub const VIEW_ALL_SCORECARDS: &str = "view_all_scorecards";
    pub const MANAGE_SCORECARDS: &str = "manage_scorecards";

    // Knowledge-check permissions
    pub const VIEW_QUIZZES: &str = "view_quizzes";
    pub const MANAGE_QUIZZES: &str = "manage_quizzes";

    // Administration permissions
    pub const MANAGE_USERS: &str = "manage_users";
    pub const MANAGE_ROLES: &str = "manage_roles";
}

/// What a role grants: everything, or an explicit permission set.
#[derive(Debug, Clone)]
pub enum Grant {
    Admin,
    Explicit(HashSet<String>),
}

impl Grant {
    pub fn allows(&self, permission: &str) -> bool {
        match self {
            Grant::Admin => true,
            Grant::Explicit(set) => set.contains(permission),
        }
    }

    /// Grant carrying no permissions at all
    pub fn none() -> Self {
        Grant::Explicit(HashSet::new())
    }
}

impl From<&RoleRecord> for Grant {
    fn from(role: &RoleRecord) -> Self {
        if role.admin {
            Grant::Admin
        } else {
            Grant::Explicit(role.permissions.clone())
        }
    }
}

/// The authenticated identity attached to a request, with its grant
/// materialized from the live role.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Id,
    pub login: String,
    pub mail: String,
    pub role_id: Id,
    grant: Grant,
}

impl CurrentUser {
    /// Materialize from a live user record and its (possibly missing) role.
    ///
    /// A dangling `role_id` yields an empty grant: fail closed.
    pub fn from_parts(user: &UserRecord, role: Option<&RoleRecord>) -> Self {
        let grant = role.map(Grant::from).unwrap_or_else(Grant::none);
        Self {
            id: user.id,
            login: user.login.clone(),
            mail: user.mail.clone(),
            role_id: user.role_id,
            grant,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.grant, Grant::Admin)
    }

    /// Permission check with the admin fast path
    pub fn has_permission(&self, permission: &str) -> bool {
        self.grant.allows(permission)
    }

    /// Resource access check: the wide permission sees every row, otherwise
    /// only ownership grants access.
    pub fn can_access_resource(&self, wide_permission: &str, resource_owner: Id) -> bool {
        if self.has_permission(wide_permission) {
            return true;
        }
        resource_owner == self.id
    }

    /// All explicitly granted permission names, sorted; empty for admins,
    /// whose grant is unconditional.
    pub fn permission_names(&self) -> Vec<String> {
        match &self.grant {
            Grant::Admin => Vec::new(),
            Grant::Explicit(set) => {
                let mut names: Vec<String> = set.iter().cloned().collect();
                names.sort();
                names
            }
        }
    }

}

/// Would at least one active admin-role user remain if `candidate_id` were
/// deleted or deactivated?
///
/// Guards the delete/deactivate paths for admin users: the system must never
/// lose its last administrator.
pub fn last_admin_survives(candidate_id: Id, users: &[UserRecord], roles: &[RoleRecord]) -> bool {
    let admin_role_ids: HashSet<Id> = roles.iter().filter(|r| r.admin).map(|r| r.id).collect();

    users
        .iter()
        .filter(|u| u.id != candidate_id && u.active)
        .any(|u| admin_role_ids.contains(&u.role_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: Id, admin: bool, permissions: &[&str]) -> RoleRecord {
        RoleRecord {
            id,
            name: format!("role-{id}"),
            admin,
            system: false,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn user(id: Id, role_id: Id, active: bool) -> UserRecord {
        UserRecord {
            id,
            login: format!("user{id}"),
            mail: format!("user{id}@example.com"),
            hashed_password: None,
            role_id,
            active,
            last_login_at: None,
        }
    }

    #[test]
    fn test_admin_fast_path() {
        let admin_role = role(1, true, &[]);
        let current = CurrentUser::from_parts(&user(1, 1, true), Some(&admin_role));

        assert!(current.is_admin());
        assert!(current.has_permission("anything_not_in_permission_set"));
        assert!(current.has_permission(names::MANAGE_ROLES));
    }

    #[test]
    fn test_explicit_grant() {
        let agent_role = role(2, false, &[names::VIEW_TICKETS, names::EDIT_TICKETS]);
        let current = CurrentUser::from_parts(&user(5, 2, true), Some(&agent_role));

        assert!(!current.is_admin());
        assert!(current.has_permission(names::VIEW_TICKETS));
        assert!(!current.has_permission(names::DELETE_TICKETS));
    }

    #[test]
    fn test_dangling_role_fails_closed() {
        let current = CurrentUser::from_parts(&user(5, 99, true), None);

        assert!(!current.is_admin());
        assert!(!current.has_permission(names::VIEW_TICKETS));
        assert!(!current.has_permission(names::MANAGE_USERS));
    }

    #[test]
    fn test_can_access_resource_wide_permission() {
        let manager_role = role(3, false, &[names::VIEW_ALL_TICKETS]);
        let current = CurrentUser::from_parts(&user(5, 3, true), Some(&manager_role));

        // Manager sees rows owned by anyone.
        assert!(current.can_access_resource(names::VIEW_ALL_TICKETS, 5));
        assert!(current.can_access_resource(names::VIEW_ALL_TICKETS, 42));
    }

    #[test]
    fn test_can_access_resource_ownership_only() {
        let agent_role = role(2, false, &[names::VIEW_TICKETS]);
        let current = CurrentUser::from_parts(&user(5, 2, true), Some(&agent_role));

        assert!(current.can_access_resource(names::VIEW_ALL_TICKETS, 5));
        assert!(!current.can_access_resource(names::VIEW_ALL_TICKETS, 42));
    }

    #[test]
    fn test_last_admin_does_not_survive() {
        let roles = vec![role(1, true, &[]), role(2, false, &[])];
        let users = vec![user(1, 1, true), user(2, 2, true)];

        // User 1 is the only active admin; removing them is rejected.
        assert!(!last_admin_survives(1, &users, &roles));
    }

    #[test]
    fn test_second_admin_makes_removal_safe() {
        let roles = vec![role(1, true, &[])];
        let mut users = vec![user(1, 1, true), user(2, 1, false)];

        assert!(!last_admin_survives(1, &users, &roles));

        // Activate the second admin and the first becomes removable.
        users[1].active = true;
        assert!(last_admin_survives(1, &users, &roles));
    }

    #[test]
    fn test_inactive_admins_do_not_count() {
        let roles = vec![role(1, true, &[])];
        let users = vec![user(1, 1, true), user(2, 1, false), user(3, 1, false)];

        assert!(!last_admin_survives(1, &users, &roles));
    }

    #[test]
    fn test_non_admin_removal_always_safe_for_invariant() {
        let roles = vec![role(1, true, &[]), role(2, false, &[])];
        let users = vec![user(1, 1, true), user(2, 2, true)];

        // Removing the non-admin leaves the admin untouched.
        assert!(last_admin_survives(2, &users, &roles));
    }

    #[test]
    fn test_permission_names_sorted() {
        let r = role(2, false, &["b_perm", "a_perm"]);
        let current = CurrentUser::from_parts(&user(1, 2, true), Some(&r));
        assert_eq!(current.permission_names(), vec!["a_perm", "b_perm"]);
    }
}
