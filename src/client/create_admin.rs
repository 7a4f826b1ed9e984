use std::sync::Arc;

use anyhow::bail;
use authz::Role;
use chrono::Utc;
use clap::Args;
use cms_models::Membership;
use cms_models::Team;
use cms_models::User;
use cms_models::password;
use cms_models::team::NewTeam;
use cms_models::team::personal_team_name;
use cms_models::user::NewUser;
use colored::Colorize as _;
use database::DbConnection;
use database::DbConnectionPoolV2;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use educe::Educe;

use super::app_config::ADMIN_EMAIL;

pub const DEFAULT_PASSWORD: &str = "Simplicity!";

#[derive(Args, Debug, Clone, Educe)]
#[educe(Default)]
pub struct CreateAdminArgs {
    #[educe(Default = ADMIN_EMAIL.into())]
    #[arg(long, default_value = ADMIN_EMAIL)]
    pub email: String,
    #[educe(Default = DEFAULT_PASSWORD.into())]
    #[arg(long, default_value = DEFAULT_PASSWORD, hide_default_value = true)]
    pub password: String,
    #[educe(Default = "Admin".into())]
    #[arg(long, default_value = "Admin")]
    pub name: String,
}

/// Creates a verified user administrating its own personal team
///
/// Returns `None` if the email is already taken.
pub async fn create_admin_user(
    conn: &mut DbConnection,
    CreateAdminArgs {
        email,
        password,
        name,
    }: CreateAdminArgs,
) -> Result<Option<(User, Team)>, cms_models::Error> {
    if User::email_taken(conn, &email, None).await? {
        return Ok(None);
    }
    let new_user = NewUser {
        name,
        email,
        email_verified_at: Some(Utc::now()),
        password: password::hash(&password),
        phone: None,
        data: None,
    };
    let created = conn
        .transaction(|mut conn| {
            async move {
                let mut user = User::create(&mut conn, new_user).await?;
                let team = Team::create(
                    &mut conn,
                    NewTeam {
                        user_id: user.id,
                        name: personal_team_name(&user.name),
                        personal_team: true,
                    },
                )
                .await?;
                User::set_current_team(&mut conn, user.id, Some(team.id)).await?;
                Membership::upsert_role(&mut conn, team.id, user.id, Role::Admin).await?;
                user.current_team_id = Some(team.id);
                Ok::<_, cms_models::Error>((user, team))
            }
            .scope_boxed()
        })
        .await?;
    Ok(Some(created))
}

pub async fn create_admin(
    args: CreateAdminArgs,
    db_pool: Arc<DbConnectionPoolV2>,
) -> anyhow::Result<()> {
    let email = args.email.clone();
    let conn = &mut db_pool.get().await?;
    let Some((user, team)) = create_admin_user(conn, args).await? else {
        bail!("a user with email '{email}' already exists");
    };
    println!(
        "✅ Admin {}[{}] created with the team {}[{}]",
        user.email.bold(),
        user.id,
        team.name.bold(),
        team.id
    );
    Ok(())
}
