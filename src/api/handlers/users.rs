use crate::AppState;
use crate::api::error::AppError;
use crate::entities::{prelude::*, users, users::Role};
use crate::services::authorization::Authorization;
use crate::utils::auth::{create_jwt, hash_password, verify_password};
use crate::utils::validation::validate_username;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<Role>,
    pub root_path: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub username: String,
    pub role: Role,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub root_path: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub root_path: Option<String>,
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub root_path: Option<String>,
}

impl From<users::Model> for UserSummary {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            root_path: user.root_path,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserSummary>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/v1/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Unknown user or wrong password")
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = Users::find()
        .filter(users::Column::Username.eq(payload.username.as_str()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let token = create_jwt(
        &user.username,
        user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
    )?;

    // The stored token is the only one accepted from now on
    let mut active: users::ActiveModel = user.into();
    active.token = Set(Some(token.clone()));
    let user = active.update(&state.db).await?;

    info!("User '{}' logged in", user.username);
    Ok(Json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/v1/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "User already exists")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "users"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut duplicate = Condition::any().add(users::Column::Username.eq(payload.username.as_str()));
    if let Some(email) = &payload.email {
        duplicate = duplicate.add(users::Column::Email.eq(email.as_str()));
    }
    if Users::find()
        .filter(duplicate)
        .one(&state.db)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let role = payload.role.unwrap_or(Role::User);
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        username: Set(payload.username),
        email: Set(payload.email),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(role),
        root_path: Set(payload.root_path),
        token: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await?;

    info!("User '{}' registered with role {}", user.username, user.role);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: user.username,
            role: user.role,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/user",
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "users"
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, AppError> {
    let users = Users::find()
        .order_by_asc(users::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(UserListResponse {
        data: users.into_iter().map(UserSummary::from).collect(),
    }))
}

#[utoipa::path(
    patch,
    path = "/v1/user/{username}",
    request_body = UpdateUserRequest,
    params(
        ("username" = String, Path, description = "User to update")
    ),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation failed or username change attempted"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already in use")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if payload
        .username
        .as_deref()
        .is_some_and(|requested| requested != username)
    {
        return Err(AppError::BadRequest("Username cannot be changed.".to_string()));
    }

    let user = Users::find()
        .filter(users::Column::Username.eq(username.as_str()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    if let Some(email) = &payload.email {
        let taken = Users::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .filter(users::Column::Id.ne(user.id.as_str()))
            .one(&state.db)
            .await?
            .is_some();
        if taken {
            return Err(AppError::Conflict("User already exists".to_string()));
        }
    }

    let mut active: users::ActiveModel = user.into();

    if let Some(email) = payload.email {
        active.email = Set(Some(email));
    }
    if let Some(password) = payload.password {
        active.password_hash = Set(hash_password(&password)?);
    }
    if let Some(role) = payload.role {
        active.role = Set(role);
    }
    if let Some(root_path) = payload.root_path {
        active.root_path = Set(Some(root_path));
    }

    let updated = active.update(&state.db).await?;
    info!("User '{}' updated", updated.username);

    Ok(Json(UserResponse {
        id: updated.id,
        username: updated.username,
        email: updated.email,
        role: updated.role,
        root_path: updated.root_path,
        token: updated.token,
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/user/{username}",
    params(
        ("username" = String, Path, description = "User to delete")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 200, description = "User does not exist", body = MessageResponse),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(authorization): Extension<Authorization>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let Some(user) = Users::find()
        .filter(users::Column::Username.eq(username.as_str()))
        .one(&state.db)
        .await?
    else {
        return Ok(Json(MessageResponse {
            message: "User does not exist.".to_string(),
        })
        .into_response());
    };

    Users::delete_by_id(user.id).exec(&state.db).await?;

    let acting = authorization
        .user()
        .map(|u| u.username.as_str())
        .unwrap_or("unknown");
    warn!("User '{}' deleted by '{}'", username, acting);

    Ok(StatusCode::NO_CONTENT.into_response())
}
