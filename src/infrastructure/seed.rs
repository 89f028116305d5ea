use crate::entities::{prelude::*, users, users::Role};
use crate::utils::auth::hash_password;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

pub const ROOT_USERNAME: &str = "root";

/// Creates the `root` superadmin account unless it already exists
pub async fn seed_root_user(db: &DatabaseConnection, password: &str) -> anyhow::Result<()> {
    let existing = Users::find()
        .filter(users::Column::Username.eq(ROOT_USERNAME))
        .one(db)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    info!("🌱 Seeding '{}' account...", ROOT_USERNAME);

    users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        username: Set(ROOT_USERNAME.to_string()),
        email: Set(None),
        password_hash: Set(hash_password(password)?),
        role: Set(Role::Superadmin),
        root_path: Set(None),
        token: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    Ok(())
}
