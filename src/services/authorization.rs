use crate::entities::{prelude::Users, users, users::Role};
use crate::utils::auth::validate_jwt;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use thiserror::Error;

/// Caller identity as established by the auth middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub root_path: Option<String>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("No token provided")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
}

/// Outcome of the bearer token check, passed explicitly to whoever needs
/// to know who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Authenticated(AuthenticatedUser),
    Rejected(RejectReason),
}

impl Authorization {
    /// Checks an `Authorization` header value against the signing secret and
    /// the user's current token. Only database failures are errors.
    pub async fn resolve(
        db: &DatabaseConnection,
        jwt_secret: &str,
        header: Option<&str>,
    ) -> Result<Self, DbErr> {
        let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return Ok(Self::Rejected(RejectReason::MissingToken));
        };

        let claims = match validate_jwt(token, jwt_secret) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected bearer token: {}", e);
                return Ok(Self::Rejected(RejectReason::InvalidToken));
            }
        };

        let user = Users::find()
            .filter(users::Column::Username.eq(claims.sub.as_str()))
            .one(db)
            .await?;

        // A login replaces the stored token, which revokes every older one
        match user {
            Some(user) if user.token.as_deref() == Some(token) => {
                Ok(Self::Authenticated(AuthenticatedUser {
                    id: user.id,
                    username: user.username,
                    role: user.role,
                    root_path: user.root_path,
                }))
            }
            _ => Ok(Self::Rejected(RejectReason::InvalidToken)),
        }
    }

    pub fn user(&self) -> Result<&AuthenticatedUser, RejectReason> {
        match self {
            Self::Authenticated(user) => Ok(user),
            Self::Rejected(reason) => Err(*reason),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Authenticated(user) if user.role.is_admin())
    }
}
