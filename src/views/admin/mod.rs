//! Back office endpoints, every operation goes through the post or user policy

pub(super) mod dashboard;
pub(super) mod posts;
pub(super) mod teams;
pub(super) mod users;

use authz::Action;
use authz::Authorizer;

use crate::error::Result;

/// Applies the post policy, a denied decision is a 403
fn authorize_post(authorizer: &Authorizer, action: Action, author_id: i64) -> Result<()> {
    authorizer.authorize_post(action, author_id).allowed()?;
    Ok(())
}

/// Applies the user policy, a denied decision is a 403
fn authorize_user(authorizer: &Authorizer, action: Action) -> Result<()> {
    authorizer.authorize_user(action).allowed()?;
    Ok(())
}
