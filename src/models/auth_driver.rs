use std::sync::Arc;

use authz::Role;
use authz::StorageDriver;
use authz::identity::User;
use authz::identity::UserIdentity;
use authz::identity::UserInfo;
use cms_models::Membership;
use database::DbConnectionPoolV2;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum AuthDriverError {
    #[error(transparent)]
    Database(#[from] cms_models::Error),
    #[error(transparent)]
    DatabaseUnavailable(#[from] database::db_connection_pool::DatabasePoolError),
}

/// Resolves users and their team roles from the `users` and `team_user` tables
#[derive(Clone)]
pub struct PgAuthDriver {
    pool: Arc<DbConnectionPoolV2>,
}

impl PgAuthDriver {
    pub fn new(pool: Arc<DbConnectionPoolV2>) -> Self {
        Self { pool }
    }
}

fn user_info(user: cms_models::User) -> UserInfo {
    UserInfo {
        identity: user.email,
        name: user.name,
        current_team_id: user.current_team_id,
    }
}

impl StorageDriver for PgAuthDriver {
    type Error = AuthDriverError;

    #[tracing::instrument(skip_all, fields(%user_identity), ret(level = Level::DEBUG), err)]
    async fn get_user_info_by_identity(
        &self,
        user_identity: &UserIdentity,
    ) -> Result<Option<User>, Self::Error> {
        let mut conn = self.pool.get().await?;
        let user = cms_models::User::retrieve_by_email(&mut conn, user_identity)
            .await?
            .map(|user| User {
                id: user.id,
                info: user_info(user),
            });
        Ok(user)
    }

    #[tracing::instrument(skip_all, fields(%user_identity), ret(level = Level::DEBUG), err)]
    async fn get_user_id(&self, user_identity: &UserIdentity) -> Result<Option<i64>, Self::Error> {
        let mut conn = self.pool.get().await?;
        let user = cms_models::User::retrieve_by_email(&mut conn, user_identity).await?;
        Ok(user.map(|user| user.id))
    }

    #[tracing::instrument(skip_all, fields(%user_id), ret(level = Level::DEBUG), err)]
    async fn get_user_info(&self, user_id: i64) -> Result<Option<UserInfo>, Self::Error> {
        let mut conn = self.pool.get().await?;
        let user = cms_models::User::retrieve(&mut conn, user_id).await?;
        Ok(user.map(user_info))
    }

    #[tracing::instrument(skip(self), ret(level = Level::DEBUG), err)]
    async fn team_role(&self, user_id: i64, team_id: i64) -> Result<Option<Role>, Self::Error> {
        let mut conn = self.pool.get().await?;
        Ok(Membership::role(&mut conn, user_id, team_id).await?)
    }
}
