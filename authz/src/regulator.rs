use std::future::Future;

use tracing::Level;

use crate::Error;
use crate::Role;
use crate::identity::User;
use crate::identity::UserIdentity;
use crate::identity::UserInfo;

/// Entry point for authorization decisions about any user
///
/// Resolves the standing of a user in their active team through a [StorageDriver].
///
/// It differs from an [Authorizer](crate::authorizer::Authorizer) in that the latter's API targets a single authenticated user.
#[derive(Clone)]
pub struct Regulator<S: StorageDriver> {
    pub(crate) driver: S,
}

/// A sans-IO style interface the [Regulator] uses to interact with the user and team storage layer
pub trait StorageDriver: Clone {
    type Error: std::error::Error;

    fn get_user_id(
        &self,
        user_identity: &UserIdentity,
    ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send;

    fn get_user_info(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<UserInfo>, Self::Error>> + Send;

    async fn get_user_info_by_identity(
        &self,
        user_identity: &UserIdentity,
    ) -> Result<Option<User>, Self::Error> {
        let Some(user_id) = self.get_user_id(user_identity).await? else {
            return Ok(None);
        };
        Ok(self
            .get_user_info(user_id)
            .await?
            .map(|info| User { id: user_id, info }))
    }

    /// Role of the user in the team, `None` if they are not a member of it
    fn team_role(
        &self,
        user_id: i64,
        team_id: i64,
    ) -> impl Future<Output = Result<Option<Role>, Self::Error>> + Send;
}

impl<S: StorageDriver> Regulator<S> {
    pub fn new(driver: S) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &S {
        &self.driver
    }

    /// Role of the user in their active team
    ///
    /// A user without active team, or who isn't a member of it, has no role.
    #[tracing::instrument(skip_all, fields(user_id = user.id), ret(level = Level::DEBUG), err)]
    pub async fn active_team_role(&self, user: &User) -> Result<Option<Role>, Error<S::Error>> {
        let Some(team_id) = user.info.current_team_id else {
            return Ok(None);
        };
        self.driver
            .team_role(user.id, team_id)
            .await
            .map_err(Error::Storage)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Action;
    use crate::mock_driver::MockAuthDriver;
    use crate::policy;
    use crate::policy::Caller;

    #[tokio::test]
    async fn active_team_role_is_resolved_from_the_membership() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let alice = regulator.alice();
        let walter = regulator.walter();

        assert_eq!(
            regulator.active_team_role(&alice).await.unwrap(),
            Some(Role::Member)
        );
        assert_eq!(
            regulator.active_team_role(&walter).await.unwrap(),
            Some(Role::Admin)
        );
    }

    #[tokio::test]
    async fn no_team_or_no_membership_means_no_role() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let teamless = regulator.create_user("nomad@example.com", "Nomad", None);
        assert_eq!(regulator.active_team_role(&teamless).await.unwrap(), None);

        // active team set but the membership was never created
        let stranger = regulator.create_user("stranger@example.com", "Stranger", Some(42));
        assert_eq!(regulator.active_team_role(&stranger).await.unwrap(), None);
        let caller = Caller {
            user_id: stranger.id,
            role: None,
        };
        policy::user_policy(Action::ViewAny, &caller)
            .expect_denied("not a member of the active team");
    }

    #[tokio::test]
    async fn the_role_follows_the_active_team() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let mut bob = regulator.bob();
        regulator.set_role(bob.id, 2, Role::Admin);
        assert_eq!(
            regulator.active_team_role(&bob).await.unwrap(),
            Some(Role::Member)
        );

        bob.info.current_team_id = Some(2);
        assert_eq!(
            regulator.active_team_role(&bob).await.unwrap(),
            Some(Role::Admin)
        );
    }
}
