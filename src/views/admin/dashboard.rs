use authz::Role;
use axum::Extension;
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use cms_models::TeamScope;
use cms_models::stats;
use cms_models::stats::UserStats;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Result;
use crate::views::AppState;
use crate::views::AuthenticationExt;

#[derive(Debug, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct RoleCount {
    role: Role,
    users: i64,
}

/// Overview of the registered users
#[derive(Debug, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct UserStatsWidget {
    total: i64,
    /// New users of each of the last 7 days, oldest first
    daily_new: Vec<i64>,
    verified: i64,
    /// Rounded share of verified users
    #[schema(minimum = 0, maximum = 100)]
    verified_percentage: i64,
    new_this_month: i64,
    /// Distinct users per team role, empty when teams are disabled
    per_role: Vec<RoleCount>,
}

impl From<UserStats> for UserStatsWidget {
    fn from(stats: UserStats) -> Self {
        Self {
            total: stats.total,
            daily_new: stats.daily_new,
            verified: stats.verified,
            verified_percentage: stats.verified_percentage,
            new_this_month: stats.new_this_month,
            per_role: stats
                .per_role
                .into_iter()
                .map(|(role, users)| RoleCount { role, users })
                .collect(),
        }
    }
}

/// A single series chart
#[derive(Debug, Default, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct Chart {
    labels: Vec<String>,
    data: Vec<i64>,
}

impl FromIterator<(String, i64)> for Chart {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        let (labels, data) = iter.into_iter().unzip();
        Self { labels, data }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct DashboardWidgets {
    user_stats: UserStatsWidget,
    /// Users created per month over the last 6 months
    users_chart: Chart,
    /// Posts of the current team per category, top 6
    posts_chart: Chart,
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "dashboard"],
    responses(
        (status = 200, body = DashboardWidgets, description = "Data of the dashboard widgets"),
    )
)]
pub(in crate::views) async fn widgets(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
) -> Result<Json<DashboardWidgets>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let today = Utc::now().date_naive();
    let conn = &mut db_pool.get().await?;
    let user_stats = UserStats::compute(conn, today, config.teams_enabled).await?;
    let users_chart = stats::users_per_month(conn, today).await?;
    let posts_chart = stats::posts_per_category(conn, scope).await?;
    Ok(Json(DashboardWidgets {
        user_stats: user_stats.into(),
        users_chart: users_chart.into_iter().collect(),
        posts_chart: posts_chart.into_iter().collect(),
    }))
}
