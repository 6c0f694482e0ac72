//! Role-based authorization policy.
//!
//! Rules, in order of precedence:
//! - admins may create, edit and delete any project or task and manage users;
//! - managers may create projects and tasks, and edit or delete only the projects they
//!   manage and the tasks they authored;
//! - users are read-only.

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
};

#[derive(Debug, Clone, Copy)]
pub struct Permissions<'a> {
    user_id: &'a str,
    role: Role,
}

impl<'a> Permissions<'a> {
    pub fn new(user_id: &'a str, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn of(user: &'a AuthUser) -> Self {
        Self::new(&user.id, user.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_manager_or_above(&self) -> bool {
        self.role >= Role::Manager
    }

    pub fn can_create_project(&self) -> bool {
        self.is_manager_or_above()
    }

    pub fn can_edit_project(&self, manager_id: &str) -> bool {
        self.is_admin() || (self.role == Role::Manager && self.user_id == manager_id)
    }

    pub fn can_delete_project(&self, manager_id: &str) -> bool {
        self.can_edit_project(manager_id)
    }

    pub fn can_create_task(&self) -> bool {
        self.is_manager_or_above()
    }

    pub fn can_edit_task(&self, author_id: &str) -> bool {
        self.is_admin() || (self.role == Role::Manager && self.user_id == author_id)
    }

    pub fn can_delete_task(&self, author_id: &str) -> bool {
        self.can_edit_task(author_id)
    }

    pub fn can_assign_tasks(&self) -> bool {
        self.is_manager_or_above()
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    /// Comments belong to their author; admins may moderate any of them.
    pub fn can_modify_comment(&self, author_id: &str) -> bool {
        self.is_admin() || self.user_id == author_id
    }
}

/// Turns a failed check into `Forbidden`.
pub fn ensure(allowed: bool, message: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ME: &str = "me";
    const OTHER: &str = "other";

    #[rstest]
    #[case(Role::User, false)]
    #[case(Role::Manager, true)]
    #[case(Role::Admin, true)]
    fn creating_needs_manager_or_above(#[case] role: Role, #[case] allowed: bool) {
        let permissions = Permissions::new(ME, role);
        assert_eq!(permissions.can_create_project(), allowed);
        assert_eq!(permissions.can_create_task(), allowed);
        assert_eq!(permissions.can_assign_tasks(), allowed);
    }

    #[rstest]
    #[case(Role::User, ME, false)]
    #[case(Role::User, OTHER, false)]
    #[case(Role::Manager, ME, true)]
    #[case(Role::Manager, OTHER, false)]
    #[case(Role::Admin, ME, true)]
    #[case(Role::Admin, OTHER, true)]
    fn editing_follows_ownership(#[case] role: Role, #[case] owner: &str, #[case] allowed: bool) {
        let permissions = Permissions::new(ME, role);
        assert_eq!(permissions.can_edit_project(owner), allowed);
        assert_eq!(permissions.can_delete_project(owner), allowed);
        assert_eq!(permissions.can_edit_task(owner), allowed);
        assert_eq!(permissions.can_delete_task(owner), allowed);
    }

    #[rstest]
    #[case(Role::User, false)]
    #[case(Role::Manager, false)]
    #[case(Role::Admin, true)]
    fn only_admins_manage_users(#[case] role: Role, #[case] allowed: bool) {
        assert_eq!(Permissions::new(ME, role).can_manage_users(), allowed);
    }

    #[test]
    fn comment_authors_and_admins_may_modify_comments() {
        assert!(Permissions::new(ME, Role::User).can_modify_comment(ME));
        assert!(!Permissions::new(ME, Role::Manager).can_modify_comment(OTHER));
        assert!(Permissions::new(ME, Role::Admin).can_modify_comment(OTHER));
    }

    #[test]
    fn ensure_maps_denial_to_forbidden() {
        assert!(ensure(true, "nope").is_ok());
        assert!(matches!(ensure(false, "nope"), Err(AppError::Forbidden(m)) if m == "nope"));
    }
}
