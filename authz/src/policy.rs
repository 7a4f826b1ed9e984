//! Authorization rules of the content resources
//!
//! The rules are pure functions of the caller's standing in their active team, the
//! [Regulator](crate::Regulator) is in charge of fetching that standing.

use crate::Action;
use crate::Authorization;
use crate::Role;

/// What the policies know about the user performing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    /// Role held in the caller's active team, if they have one and are a member of it
    pub role: Option<Role>,
}

impl Caller {
    pub fn is_team_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Posts can be listed, read and created by any authenticated user.
/// Changing a post requires to be its author or an admin of the active team.
pub fn post_policy(action: Action, caller: &Caller, author_id: i64) -> Authorization<()> {
    if !action.is_modification() || caller.user_id == author_id {
        return Authorization::Granted(());
    }
    if caller.is_team_admin() {
        return Authorization::Bypassed;
    }
    Authorization::Denied {
        reason: "only team admins or the post author can modify this post",
    }
}

/// Managing users is reserved to the admins of the active team
pub fn user_policy(_action: Action, caller: &Caller) -> Authorization<()> {
    if caller.is_team_admin() {
        Authorization::Granted(())
    } else {
        Authorization::Denied {
            reason: "only team admins can manage users",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use strum::IntoEnumIterator as _;

    use super::*;

    const AUTHOR: i64 = 1;
    const OTHER: i64 = 2;

    fn caller(user_id: i64, role: Option<Role>) -> Caller {
        Caller { user_id, role }
    }

    #[rstest]
    #[case::view_any(Action::ViewAny)]
    #[case::view(Action::View)]
    #[case::create(Action::Create)]
    fn anyone_can_read_and_create_posts(#[case] action: Action) {
        for role in [None, Some(Role::Guest), Some(Role::Member), Some(Role::Admin)] {
            post_policy(action, &caller(OTHER, role), AUTHOR).expect_allowed("read access");
        }
    }

    #[rstest]
    #[case::update(Action::Update)]
    #[case::delete(Action::Delete)]
    #[case::restore(Action::Restore)]
    #[case::force_delete(Action::ForceDelete)]
    fn post_modifications(#[case] action: Action) {
        post_policy(action, &caller(AUTHOR, Some(Role::Guest)), AUTHOR)
            .expect_allowed("the author owns the post");
        post_policy(action, &caller(AUTHOR, None), AUTHOR)
            .expect_allowed("authors don't need a team");
        post_policy(action, &caller(OTHER, Some(Role::Member)), AUTHOR)
            .expect_denied("members can't modify posts of others");
        post_policy(action, &caller(OTHER, None), AUTHOR)
            .expect_denied("teamless users can't modify posts of others");
        assert!(matches!(
            post_policy(action, &caller(OTHER, Some(Role::Admin)), AUTHOR),
            Authorization::Bypassed
        ));
    }

    #[test]
    fn only_admins_manage_users() {
        for action in Action::iter() {
            user_policy(action, &caller(OTHER, Some(Role::Admin))).expect_allowed("admin");
            for role in [None, Some(Role::Guest), Some(Role::Member)] {
                user_policy(action, &caller(OTHER, role)).expect_denied("not an admin");
            }
        }
    }
}
