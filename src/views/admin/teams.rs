use axum::Extension;
use axum::Json;
use axum::extract::State;
use cms_derive::CmsError;
use cms_models::Team;
use cms_models::User;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::error::InternalError;
use crate::error::Result;
use crate::views::AppState;
use crate::views::AuthenticationExt;
use crate::views::ServerConfig;

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "team", default_status = 404)]
pub(in crate::views) enum TeamError {
    #[error("Teams are disabled")]
    Disabled,
    #[error("Team '{team_id}' could not be found")]
    NotFound { team_id: i64 },
}

#[derive(Debug, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct TeamResource {
    id: i64,
    name: String,
    /// Created along with the user owning it
    personal_team: bool,
    /// Id of the owner
    user_id: i64,
}

impl From<Team> for TeamResource {
    fn from(team: Team) -> Self {
        Self {
            id: team.id,
            name: team.name,
            personal_team: team.personal_team,
            user_id: team.user_id,
        }
    }
}

/// Teams the caller can switch to
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct TeamList {
    teams: Vec<TeamResource>,
    #[schema(required)]
    current_team_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(in crate::views) struct TeamSwitch {
    team_id: i64,
}

fn ensure_enabled(config: &ServerConfig) -> Result<(), TeamError> {
    if config.teams_enabled {
        Ok(())
    } else {
        Err(TeamError::Disabled)
    }
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "teams"],
    responses(
        (status = 200, body = TeamList, description = "Teams owned by the caller or joined, sorted by name"),
        (status = 404, body = InternalError, description = "Teams are disabled"),
    )
)]
pub(in crate::views) async fn list(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
) -> Result<Json<TeamList>> {
    ensure_enabled(&config)?;
    let authorizer = auth.authorizer()?;
    let conn = &mut db_pool.get().await?;
    let teams = Team::list_for_user(conn, authorizer.user_id()).await?;
    Ok(Json(TeamList {
        teams: teams.into_iter().map(TeamResource::from).collect(),
        current_team_id: authorizer.current_team_id(),
    }))
}

#[cms_derive::route]
#[utoipa::path(
    put, path = "",
    tags = ["admin", "teams"],
    request_body = TeamSwitch,
    responses(
        (status = 200, body = TeamList, description = "The caller's teams, the requested one being current"),
        (status = 404, body = InternalError, description = "The caller does not belong to the team, or teams are disabled"),
    )
)]
pub(in crate::views) async fn switch(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Json(TeamSwitch { team_id }): Json<TeamSwitch>,
) -> Result<Json<TeamList>> {
    ensure_enabled(&config)?;
    let authorizer = auth.authorizer()?;
    let user_id = authorizer.user_id();
    let conn = &mut db_pool.get().await?;
    if !Team::belongs_to(conn, team_id, user_id).await? {
        return Err(TeamError::NotFound { team_id }.into());
    }
    User::set_current_team(conn, user_id, Some(team_id)).await?;
    tracing::info!(user_id, team_id, "switched team");
    let teams = Team::list_for_user(conn, user_id).await?;
    Ok(Json(TeamList {
        teams: teams.into_iter().map(TeamResource::from).collect(),
        current_team_id: Some(team_id),
    }))
}
