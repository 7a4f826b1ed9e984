use axum::Extension;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Result;
use crate::views::AuthenticationExt;

/// The authenticated caller
#[derive(Debug, Serialize, ToSchema)]
pub(in crate::views) struct CurrentUser {
    id: i64,
    name: String,
    email: String,
    #[schema(required)]
    current_team_id: Option<i64>,
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["api"],
    responses(
        (status = 200, body = CurrentUser, description = "The user the request is authenticated as"),
    )
)]
pub(in crate::views) async fn show(Extension(auth): AuthenticationExt) -> Result<Json<CurrentUser>> {
    let authorizer = auth.authorizer()?;
    Ok(Json(CurrentUser {
        id: authorizer.user_id(),
        name: authorizer.user_name().to_owned(),
        email: authorizer.user_email().to_owned(),
        current_team_id: authorizer.current_team_id(),
    }))
}
