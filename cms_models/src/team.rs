use std::ops::DerefMut;
use std::str::FromStr;

use authz::Role;
use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::team_user;
use database::tables::teams;
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use tracing::Level;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = teams)]
#[diesel(check_for_backend(Pg))]
pub struct Team {
    pub id: i64,
    /// Owner of the team
    pub user_id: i64,
    pub name: String,
    pub personal_team: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = teams)]
pub struct NewTeam {
    pub user_id: i64,
    pub name: String,
    pub personal_team: bool,
}

/// A user belonging to a team with a role
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = team_user)]
#[diesel(check_for_backend(Pg))]
pub struct Membership {
    pub id: i64,
    pub team_id: i64,
    pub user_id: i64,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name of the team created along with a user, e.g. `Ada's Team`
pub fn personal_team_name(user_name: &str) -> String {
    let first_name = user_name.split_whitespace().next().unwrap_or(user_name);
    format!("{first_name}'s Team")
}

/// Parses a stored role, unknown values grant no role
pub fn parse_role(role: Option<&str>) -> Option<Role> {
    let role = role?;
    match Role::from_str(role) {
        Ok(role) => Some(role),
        Err(_) => {
            tracing::warn!(role, "ignoring unknown team role");
            None
        }
    }
}

impl Team {
    #[tracing::instrument(skip_all, fields(name = %new_team.name), err)]
    pub async fn create(conn: &mut DbConnection, new_team: NewTeam) -> Result<Team, Error> {
        let team = dsl::insert_into(teams::table)
            .values(&new_team)
            .returning(Team::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(team)
    }

    #[tracing::instrument(skip(conn), ret(level = Level::DEBUG), err)]
    pub async fn retrieve(conn: &mut DbConnection, team_id: i64) -> Result<Option<Team>, Error> {
        let team = teams::table
            .find(team_id)
            .select(Team::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(team)
    }

    /// Teams the user owns or is a member of, sorted by name
    #[tracing::instrument(skip(conn), err)]
    pub async fn list_for_user(conn: &mut DbConnection, user_id: i64) -> Result<Vec<Team>, Error> {
        let member_of = team_user::table
            .filter(team_user::user_id.eq(user_id))
            .select(team_user::team_id);
        let teams = teams::table
            .filter(
                teams::user_id
                    .eq(user_id)
                    .or(teams::id.eq_any(member_of)),
            )
            .order((teams::name, teams::id))
            .select(Team::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(teams)
    }

    /// Whether the user owns the team or is one of its members
    pub async fn belongs_to(
        conn: &mut DbConnection,
        team_id: i64,
        user_id: i64,
    ) -> Result<bool, Error> {
        let owner = teams::table
            .filter(teams::id.eq(team_id))
            .filter(teams::user_id.eq(user_id))
            .select(teams::id);
        let member = team_user::table
            .filter(team_user::team_id.eq(team_id))
            .filter(team_user::user_id.eq(user_id))
            .select(team_user::id);
        let belongs = dsl::select(dsl::exists(owner).or(dsl::exists(member)))
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(belongs)
    }

    /// Ids of the teams the user owns or is a member of
    pub async fn ids_for_user(conn: &mut DbConnection, user_id: i64) -> Result<Vec<i64>, Error> {
        Ok(Team::list_for_user(conn, user_id)
            .await?
            .into_iter()
            .map(|team| team.id)
            .collect())
    }
}

impl Membership {
    /// Role of the user in the team, `None` when not a member
    #[tracing::instrument(skip(conn), ret(level = Level::DEBUG), err)]
    pub async fn role(
        conn: &mut DbConnection,
        user_id: i64,
        team_id: i64,
    ) -> Result<Option<Role>, Error> {
        let role: Option<Option<String>> = team_user::table
            .filter(team_user::team_id.eq(team_id))
            .filter(team_user::user_id.eq(user_id))
            .select(team_user::role)
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(role.and_then(|role| parse_role(role.as_deref())))
    }

    /// Adds the user to the team, or changes its role if already a member
    #[tracing::instrument(skip(conn), err)]
    pub async fn upsert_role(
        conn: &mut DbConnection,
        team_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<Membership, Error> {
        let now = Utc::now();
        let membership = dsl::insert_into(team_user::table)
            .values((
                team_user::team_id.eq(team_id),
                team_user::user_id.eq(user_id),
                team_user::role.eq(Some(role.as_str())),
                team_user::created_at.eq(now),
                team_user::updated_at.eq(now),
            ))
            .on_conflict((team_user::team_id, team_user::user_id))
            .do_update()
            .set((
                team_user::role.eq(excluded(team_user::role)),
                team_user::updated_at.eq(excluded(team_user::updated_at)),
            ))
            .returning(Membership::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(membership)
    }

    /// Distinct users holding each role, across all teams
    pub async fn users_per_role(conn: &mut DbConnection) -> Result<Vec<(Role, i64)>, Error> {
        let counts: Vec<(Option<String>, i64)> = team_user::table
            .group_by(team_user::role)
            .select((
                team_user::role,
                dsl::count(team_user::user_id).aggregate_distinct(),
            ))
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(counts
            .into_iter()
            .filter_map(|(role, count)| parse_role(role.as_deref()).map(|role| (role, count)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::full_name("Ada Lovelace", "Ada's Team")]
    #[case::single_word("Walter", "Walter's Team")]
    #[case::padded("  Grace  Hopper ", "Grace's Team")]
    fn personal_team_names(#[case] user_name: &str, #[case] expected: &str) {
        assert_eq!(personal_team_name(user_name), expected);
    }

    #[rstest]
    #[case::admin(Some("admin"), Some(Role::Admin))]
    #[case::member(Some("member"), Some(Role::Member))]
    #[case::guest(Some("guest"), Some(Role::Guest))]
    #[case::unknown(Some("owner"), None)]
    #[case::missing(None, None)]
    fn stored_roles(#[case] stored: Option<&str>, #[case] expected: Option<Role>) {
        assert_eq!(parse_role(stored), expected);
    }
}
