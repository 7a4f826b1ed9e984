use authz::Action;
use authz::Role;
use axum::Extension;
use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::DateTime;
use chrono::Utc;
use cms_derive::CmsError;
use cms_models::Membership;
use cms_models::Page;
use cms_models::Team;
use cms_models::User;
use cms_models::password;
use cms_models::team::NewTeam;
use cms_models::user::NewUser;
use cms_models::user::UserChangeset;
use cms_models::user::data_column;
use database::DbConnection;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use super::authorize_user;
use crate::error::InternalError;
use crate::error::Result;
use crate::views::AppState;
use crate::views::AuthenticationExt;
use crate::views::pagination::PaginationQueryParams;
use crate::views::pagination::PaginationStats;
use crate::views::validation::FieldErrors;
use crate::views::validation::Validate;
use crate::views::validation::ValidJson;
use crate::views::validation::ValidQuery;
use crate::views::validation::ValidationError;
use crate::views::validation::present;

const EMAIL_CONSTRAINT: &str = "users_email_key";
const ROLES: &[&str] = &["admin", "member", "guest"];

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "user")]
pub(in crate::views) enum UserError {
    #[error("User '{user_id}' could not be found")]
    #[cms_error(status = 404)]
    NotFound { user_id: i64 },
}

/// A user as listed in the back office
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct UserResource {
    id: i64,
    name: String,
    email: String,
    #[schema(required)]
    phone: Option<String>,
    /// Free form attributes
    #[schema(value_type = Object)]
    data: serde_json::Map<String, serde_json::Value>,
    #[schema(required)]
    email_verified_at: Option<DateTime<Utc>>,
    #[schema(required)]
    current_team_id: Option<i64>,
    /// Role of the user in its current team
    #[schema(required)]
    role: Option<Role>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserResource {
    fn new(user: User, role: Option<Role>) -> Self {
        let data = match user.data {
            Some(serde_json::Value::Object(data)) => data,
            _ => Default::default(),
        };
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            data,
            email_verified_at: user.email_verified_at,
            current_team_id: user.current_team_id,
            role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    async fn load(conn: &mut DbConnection, user: User) -> Result<Self, cms_models::Error> {
        let role = current_role(conn, &user).await?;
        Ok(Self::new(user, role))
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct UserPage {
    results: Vec<UserResource>,
    #[serde(flatten)]
    stats: PaginationStats,
}

async fn current_role(conn: &mut DbConnection, user: &User) -> Result<Option<Role>, cms_models::Error> {
    match user.current_team_id {
        Some(team_id) => Membership::role(conn, user.id, team_id).await,
        None => Ok(None),
    }
}

/// Gives the user a personal team when it has no current one, then sets its role there
async fn assign_role(conn: &mut DbConnection, user: User, role: Role) -> Result<User, cms_models::Error> {
    let team_id = match user.current_team_id {
        Some(team_id) => team_id,
        None => {
            let team = Team::create(
                conn,
                NewTeam {
                    user_id: user.id,
                    name: format!("{}'s Team", user.name),
                    personal_team: true,
                },
            )
            .await?;
            User::set_current_team(conn, user.id, Some(team.id)).await?;
            team.id
        }
    };
    Membership::upsert_role(conn, team_id, user.id, role).await?;
    Ok(User {
        current_team_id: Some(team_id),
        ..user
    })
}

fn email_taken() -> InternalError {
    FieldErrors::single("email", "The email has already been taken.").into()
}

fn email_conflict(error: cms_models::Error) -> InternalError {
    if error.is_unique_violation_of(EMAIL_CONSTRAINT) {
        email_taken()
    } else {
        error.into()
    }
}

async fn find_user(conn: &mut DbConnection, user_id: i64) -> Result<User> {
    User::retrieve(conn, user_id)
        .await?
        .ok_or_else(|| UserError::NotFound { user_id }.into())
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(in crate::views) struct UserListParams {
    /// Text contained in the name or the email
    search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(in crate::views) struct RawUserListQuery {
    #[serde(flatten)]
    params: UserListParams,
    #[serde(flatten)]
    pagination: PaginationQueryParams,
}

#[derive(Debug, PartialEq)]
pub(in crate::views) struct UserListRequest {
    search: Option<String>,
    page: Page,
}

impl Validate for UserListRequest {
    type Raw = RawUserListQuery;

    fn validate(RawUserListQuery { params, pagination }: RawUserListQuery) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let search = present(&params.search);
        errors.max_length("search", search, 255);
        let page = pagination.validate(&mut errors);
        errors.check(UserListRequest {
            search: search.map(ToOwned::to_owned),
            page,
        })
    }
}

/// Fields of a user as submitted in the back office
#[derive(Debug, Default, Deserialize, ToSchema)]
pub(in crate::views) struct UserForm {
    #[schema(min_length = 3, max_length = 255)]
    name: Option<String>,
    #[schema(max_length = 255)]
    email: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, min_length = 10, max_length = 20)]
    phone: Option<Option<String>>,
    /// Required on creation, kept when absent on update
    #[schema(min_length = 8, max_length = 255, format = Password)]
    password: Option<String>,
    /// Role in the user's current team, created as its personal team when missing
    #[schema(value_type = Option<Role>)]
    role: Option<String>,
    /// Free form attributes, an empty map clears them
    #[schema(value_type = Option<Object>)]
    data: Option<serde_json::Map<String, serde_json::Value>>,
}

fn check_common(form: &UserForm, errors: &mut FieldErrors) -> Option<Role> {
    errors.length_between("name", present(&form.name), 3, 255);
    let email = present(&form.email);
    errors.email("email", email);
    errors.max_length("email", email, 255);
    if let Some(Some(phone)) = &form.phone {
        errors.length_between("phone", Some(phone.trim()), 10, 20);
    }
    errors.length_between("password", form.password.as_deref(), 8, 255);
    errors.one_of("role", present(&form.role), ROLES)
}

#[derive(Debug)]
pub(in crate::views) struct NewUserForm {
    new_user: NewUser,
    role: Role,
}

impl Validate for NewUserForm {
    type Raw = UserForm;

    fn validate(form: UserForm) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let role = check_common(&form, &mut errors);
        let name = errors.required("name", form.name.as_deref()).map(ToOwned::to_owned);
        let email = errors.required("email", form.email.as_deref()).map(ToOwned::to_owned);
        if form.password.is_none() {
            errors.push("password", "The password field is required.");
        }
        errors.check(())?;
        Ok(NewUserForm {
            new_user: NewUser {
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                email_verified_at: None,
                password: password::hash(form.password.as_deref().unwrap_or_default()),
                phone: form.phone.flatten().map(|phone| phone.trim().to_owned()),
                data: form.data.and_then(data_column),
            },
            role: role.unwrap_or(Role::Member),
        })
    }
}

#[derive(Debug)]
pub(in crate::views) struct UserPatch {
    changeset: UserChangeset,
    role: Option<Role>,
}

impl Validate for UserPatch {
    type Raw = UserForm;

    fn validate(form: UserForm) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let role = check_common(&form, &mut errors);
        if form.name.is_some() {
            errors.required("name", form.name.as_deref());
        }
        if form.email.is_some() {
            errors.required("email", form.email.as_deref());
        }
        errors.check(UserPatch {
            changeset: UserChangeset {
                name: present(&form.name).map(ToOwned::to_owned),
                email: present(&form.email).map(ToOwned::to_owned),
                password: form.password.as_deref().map(password::hash),
                phone: form
                    .phone
                    .map(|phone| phone.map(|phone| phone.trim().to_owned())),
                data: form.data.map(data_column),
                ..Default::default()
            },
            role,
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub(in crate::views) struct UserIdParam {
    user_id: i64,
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "users"],
    params(UserListParams, PaginationQueryParams),
    responses(
        (status = 200, body = UserPage, description = "Users sorted by name"),
        (status = 403, body = InternalError, description = "Only team admins manage users"),
    )
)]
pub(in crate::views) async fn list(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    ValidQuery(UserListRequest { search, page }): ValidQuery<UserListRequest>,
) -> Result<Json<UserPage>> {
    let authorizer = auth.authorizer()?;
    authorize_user(&authorizer, Action::ViewAny)?;
    let conn = &mut db_pool.get().await?;
    let (users, count) = User::list(conn, search.as_deref(), page).await?;
    let mut results = Vec::with_capacity(users.len());
    for user in users {
        results.push(UserResource::load(conn, user).await?);
    }
    Ok(Json(UserPage {
        results,
        stats: PaginationStats::new(count, page),
    }))
}

#[cms_derive::route]
#[utoipa::path(
    post, path = "",
    tags = ["admin", "users"],
    request_body = UserForm,
    responses(
        (status = 201, body = UserResource, description = "The created user, member of its personal team"),
        (status = 403, body = InternalError, description = "Only team admins manage users"),
        (status = 422, body = InternalError, description = "Invalid user"),
    )
)]
pub(in crate::views) async fn create(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    ValidJson(NewUserForm { new_user, role }): ValidJson<NewUserForm>,
) -> Result<(StatusCode, Json<UserResource>)> {
    let authorizer = auth.authorizer()?;
    authorize_user(&authorizer, Action::Create)?;
    let conn = &mut db_pool.get().await?;
    if User::email_taken(conn, &new_user.email, None).await? {
        return Err(email_taken());
    }

    let user = conn
        .transaction(|mut conn| {
            async move {
                let user = User::create(&mut conn, new_user)
                    .await
                    .map_err(email_conflict)?;
                Ok::<_, InternalError>(assign_role(&mut conn, user, role).await?)
            }
            .scope_boxed()
        })
        .await?;
    tracing::info!(user_id = user.id, %role, "user created");
    Ok((StatusCode::CREATED, Json(UserResource::new(user, Some(role)))))
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "users"],
    params(UserIdParam),
    responses(
        (status = 200, body = UserResource, description = "The user"),
        (status = 403, body = InternalError, description = "Only team admins manage users"),
        (status = 404, body = InternalError, description = "No such user"),
    )
)]
pub(in crate::views) async fn show(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(UserIdParam { user_id }): Path<UserIdParam>,
) -> Result<Json<UserResource>> {
    let authorizer = auth.authorizer()?;
    authorize_user(&authorizer, Action::View)?;
    let conn = &mut db_pool.get().await?;
    let user = find_user(conn, user_id).await?;
    Ok(Json(UserResource::load(conn, user).await?))
}

#[cms_derive::route]
#[utoipa::path(
    patch, path = "",
    tags = ["admin", "users"],
    params(UserIdParam),
    request_body = UserForm,
    responses(
        (status = 200, body = UserResource, description = "The updated user"),
        (status = 403, body = InternalError, description = "Only team admins manage users"),
        (status = 404, body = InternalError, description = "No such user"),
        (status = 422, body = InternalError, description = "Invalid changes"),
    )
)]
pub(in crate::views) async fn update(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(UserIdParam { user_id }): Path<UserIdParam>,
    ValidJson(UserPatch { changeset, role }): ValidJson<UserPatch>,
) -> Result<Json<UserResource>> {
    let authorizer = auth.authorizer()?;
    authorize_user(&authorizer, Action::Update)?;
    let conn = &mut db_pool.get().await?;
    let user = find_user(conn, user_id).await?;
    if let Some(email) = &changeset.email
        && User::email_taken(conn, email, Some(user.id)).await?
    {
        return Err(email_taken());
    }
    let role = match role {
        Some(role) => role,
        None => current_role(conn, &user).await?.unwrap_or(Role::Guest),
    };

    let user = conn
        .transaction(|mut conn| {
            async move {
                let user = User::update(&mut conn, user.id, changeset)
                    .await
                    .map_err(email_conflict)?;
                Ok::<_, InternalError>(assign_role(&mut conn, user, role).await?)
            }
            .scope_boxed()
        })
        .await?;
    Ok(Json(UserResource::new(user, Some(role))))
}

#[cms_derive::route]
#[utoipa::path(
    delete, path = "",
    tags = ["admin", "users"],
    params(UserIdParam),
    responses(
        (status = 204, description = "The user was deleted"),
        (status = 403, body = InternalError, description = "Only team admins manage users"),
        (status = 404, body = InternalError, description = "No such user"),
    )
)]
pub(in crate::views) async fn delete(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(UserIdParam { user_id }): Path<UserIdParam>,
) -> Result<StatusCode> {
    let authorizer = auth.authorizer()?;
    authorize_user(&authorizer, Action::Delete)?;
    let conn = &mut db_pool.get().await?;
    if !User::delete(conn, user_id).await? {
        return Err(UserError::NotFound { user_id }.into());
    }
    tracing::info!(user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn form(body: serde_json::Value) -> UserForm {
        serde_json::from_value(body).expect("valid user form")
    }

    #[test]
    fn creation_defaults_to_member() {
        let NewUserForm { new_user, role } = NewUserForm::validate(form(json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "password": "analytical",
            "data": {},
        })))
        .unwrap();
        assert_eq!(role, Role::Member);
        assert_eq!(new_user.data, None);
        assert_eq!(new_user.phone, None);
        assert_ne!(new_user.password, "analytical");
        assert!(password::verify("analytical", &new_user.password));
    }

    #[rstest]
    #[case::short_name(json!({"name": "Al", "email": "al@example.com", "password": "password"}), "name")]
    #[case::bad_email(json!({"name": "Alan", "email": "alan", "password": "password"}), "email")]
    #[case::missing_password(json!({"name": "Alan", "email": "alan@example.com"}), "password")]
    #[case::short_password(json!({"name": "Alan", "email": "alan@example.com", "password": "short"}), "password")]
    #[case::short_phone(json!({"name": "Alan", "email": "alan@example.com", "password": "password", "phone": "123"}), "phone")]
    #[case::unknown_role(json!({"name": "Alan", "email": "alan@example.com", "password": "password", "role": "owner"}), "role")]
    fn invalid_creations(#[case] body: serde_json::Value, #[case] field: &str) {
        let Err(ValidationError::Invalid { fields }) = NewUserForm::validate(form(body)) else {
            panic!("creation should be rejected");
        };
        assert!(fields.get(field).is_some(), "{field} not reported: {fields:?}");
    }

    #[test]
    fn updates_keep_absent_fields() {
        let UserPatch { changeset, role } = UserPatch::validate(form(json!({
            "phone": null,
            "data": {"company": "Analytical Engines"},
        })))
        .unwrap();
        assert_eq!(role, None);
        assert_eq!(changeset.name, None);
        assert_eq!(changeset.password, None);
        assert_eq!(changeset.phone, Some(None));
        assert_eq!(
            changeset.data,
            Some(Some(json!({"company": "Analytical Engines"})))
        );
    }

    #[test]
    fn updates_may_change_the_role() {
        let UserPatch { role, changeset } =
            UserPatch::validate(form(json!({"role": "admin", "password": "new password"}))).unwrap();
        assert_eq!(role, Some(Role::Admin));
        assert!(changeset.password.is_some_and(|hash| password::verify("new password", &hash)));
    }

    #[test]
    fn resource_exposes_data_as_a_map() {
        let now = Utc::now();
        let user = User {
            id: 3,
            name: "Grace".to_owned(),
            email: "grace@example.com".to_owned(),
            email_verified_at: None,
            password: password::hash("secret password"),
            phone: None,
            data: None,
            current_team_id: Some(2),
            created_at: now,
            updated_at: now,
        };
        let body = serde_json::to_value(UserResource::new(user, Some(Role::Guest))).unwrap();
        assert_eq!(body["data"], json!({}));
        assert_eq!(body["role"], json!("guest"));
        assert!(body.get("password").is_none());
    }

    #[test]
    fn email_conflicts_are_validation_errors() {
        let error = email_conflict(cms_models::Error::UniqueViolation {
            constraint: EMAIL_CONSTRAINT.to_owned(),
            column: "email".to_owned(),
            value: "ada@example.com".to_owned(),
        });
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
