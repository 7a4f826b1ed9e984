use strum::IntoEnumIterator as _;
use tracing::Level;
use tracing::debug;

use crate::Ability;
use crate::Action;
use crate::Authorization;
use crate::Error;
use crate::Regulator;
use crate::Role;
use crate::StorageDriver;
use crate::identity::User;
use crate::identity::UserIdentity;
use crate::policy;
use crate::policy::Caller;

/// Represents how an authenticated user can interact with the authorization system
///
/// The standing of the user in their active team is resolved once, when the authorizer
/// is initialized, so that authorization decisions never hit the storage again.
#[derive(Debug, Clone)]
pub struct Authorizer {
    user: User,
    role: Option<Role>,
    /// What the credentials of the request allow, every ability for a session
    abilities: Vec<Ability>,
}

impl Authorizer {
    /// Initialize an authorizer for the user with the given email.
    /// If the user doesn't exist, an error is returned.
    #[tracing::instrument(skip_all, fields(%user), ret(level = Level::DEBUG), err)]
    pub async fn try_initialize<S: StorageDriver>(
        user: UserIdentity,
        regulator: &Regulator<S>,
    ) -> Result<Self, Error<S::Error>> {
        let user = regulator
            .driver
            .get_user_info_by_identity(&user)
            .await
            .map_err(Error::Storage)?
            .ok_or(Error::UnknownUser { identity: user })?;
        Self::for_user(user, regulator).await
    }

    /// Initialize an authorizer for a user resolved by other means (API tokens)
    #[tracing::instrument(skip(regulator), ret(level = Level::DEBUG), err)]
    pub async fn try_initialize_by_id<S: StorageDriver>(
        user_id: i64,
        regulator: &Regulator<S>,
    ) -> Result<Self, Error<S::Error>> {
        let info = regulator
            .driver
            .get_user_info(user_id)
            .await
            .map_err(Error::Storage)?
            .ok_or(Error::UnknownUserId(user_id))?;
        Self::for_user(User { id: user_id, info }, regulator).await
    }

    async fn for_user<S: StorageDriver>(
        user: User,
        regulator: &Regulator<S>,
    ) -> Result<Self, Error<S::Error>> {
        let role = regulator.active_team_role(&user).await?;
        debug!(%user, ?role, "user authenticated");
        Ok(Self {
            user,
            role,
            abilities: Ability::iter().collect(),
        })
    }

    /// Narrows what the authorizer allows to the given abilities, those of an API token
    pub fn restricted_to(mut self, abilities: impl IntoIterator<Item = Ability>) -> Self {
        let granted: Vec<_> = abilities.into_iter().collect();
        self.abilities.retain(|ability| granted.contains(ability));
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn user_name(&self) -> &str {
        &self.user.info.name
    }

    pub fn user_email(&self) -> &str {
        &self.user.info.identity
    }

    pub fn current_team_id(&self) -> Option<i64> {
        self.user.info.current_team_id
    }

    /// Role held in the active team when the request was authenticated
    pub fn team_role(&self) -> Option<Role> {
        self.role
    }

    pub fn abilities(&self) -> &[Ability] {
        &self.abilities
    }

    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user.id,
            role: self.role,
        }
    }

    fn check_ability(&self, action: Action) -> Authorization<()> {
        if self.abilities.contains(&action.required_ability()) {
            Authorization::Granted(())
        } else {
            Authorization::Denied {
                reason: "the credentials of the request do not allow this action",
            }
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = self.user.id), ret(level = Level::DEBUG))]
    pub fn authorize_post(&self, action: Action, author_id: i64) -> Authorization<()> {
        match self.check_ability(action) {
            denied @ Authorization::Denied { .. } => denied,
            _ => policy::post_policy(action, &self.caller(), author_id),
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = self.user.id), ret(level = Level::DEBUG))]
    pub fn authorize_user(&self, action: Action) -> Authorization<()> {
        match self.check_ability(action) {
            denied @ Authorization::Denied { .. } => denied,
            _ => policy::user_policy(action, &self.caller()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock_driver::MockAuthDriver;

    #[tokio::test]
    async fn initialize_by_identity_or_id() {
        common::setup_tracing_for_test();
        let regulator = Regulator::new(MockAuthDriver::default());
        let alice = regulator.alice();

        let by_identity = Authorizer::try_initialize(alice.info.identity.clone(), &regulator)
            .await
            .expect("alice exists");
        let by_id = Authorizer::try_initialize_by_id(alice.id, &regulator)
            .await
            .expect("alice exists");
        assert_eq!(by_identity.user(), by_id.user());
        assert_eq!(by_id.user_email(), "alice@example.com");
        assert_eq!(by_id.current_team_id(), Some(1));
        assert_eq!(by_id.team_role(), Some(Role::Member));
        assert_eq!(by_id.abilities().len(), Ability::iter().count());
    }

    #[tokio::test]
    async fn unknown_users_are_rejected() {
        let regulator = Regulator::new(MockAuthDriver::default());
        assert!(matches!(
            Authorizer::try_initialize("ghost@example.com".to_owned(), &regulator).await,
            Err(Error::UnknownUser { .. })
        ));
        assert!(matches!(
            Authorizer::try_initialize_by_id(i64::MAX, &regulator).await,
            Err(Error::UnknownUserId(i64::MAX))
        ));
    }

    async fn authorizer(regulator: &Regulator<MockAuthDriver>, user: User) -> Authorizer {
        Authorizer::try_initialize_by_id(user.id, regulator)
            .await
            .expect("the user exists")
    }

    /// Alice writes a post, Bob (member of the same team) can't change it but
    /// Walter (admin of the team) can.
    #[tokio::test]
    async fn post_edition_within_a_team() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let alice = authorizer(&regulator, regulator.alice()).await;
        let bob = authorizer(&regulator, regulator.bob()).await;
        let walter = authorizer(&regulator, regulator.walter()).await;
        let post_author = alice.user_id();

        for action in [Action::Update, Action::Delete] {
            alice
                .authorize_post(action, post_author)
                .expect_allowed("alice wrote the post");
            bob.authorize_post(action, post_author)
                .expect_denied("bob is a member who didn't write the post");
            assert!(!walter.authorize_post(action, post_author).denied());
        }
        bob.authorize_post(Action::View, post_author)
            .expect_allowed("members can read posts");
        assert!(walter.caller().is_team_admin());
        assert!(!bob.caller().is_team_admin());
    }

    #[tokio::test]
    async fn read_only_credentials_cannot_write() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let alice = authorizer(&regulator, regulator.alice())
            .await
            .restricted_to([Ability::Read]);
        let walter = authorizer(&regulator, regulator.walter())
            .await
            .restricted_to([Ability::Read]);
        let own_post = alice.user_id();

        alice
            .authorize_post(Action::ViewAny, own_post)
            .expect_allowed("reading is granted");
        for action in [
            Action::Create,
            Action::Update,
            Action::Delete,
            Action::Restore,
            Action::ForceDelete,
        ] {
            alice
                .authorize_post(action, own_post)
                .expect_denied("the token only reads, even its owner's posts");
            walter
                .authorize_post(action, own_post)
                .expect_denied("admins are bound by their token too");
            walter
                .authorize_user(action)
                .expect_denied("user management needs a write ability");
        }
        walter
            .authorize_user(Action::View)
            .expect_allowed("an admin may read users with a read token");
    }

    #[tokio::test]
    async fn restrictions_only_narrow() {
        let regulator = Regulator::new(MockAuthDriver::default());
        let bob = authorizer(&regulator, regulator.bob())
            .await
            .restricted_to([Ability::Read, Ability::Create])
            .restricted_to([Ability::Create, Ability::Delete]);
        assert_eq!(bob.abilities(), [Ability::Create]);
        bob.authorize_post(Action::Create, bob.user_id())
            .expect_allowed("create survived both restrictions");
        bob.authorize_post(Action::Delete, bob.user_id())
            .expect_denied("delete was never granted by the first restriction");
    }
}
