// ============================================================================
// REFRESH TOKENS
// ============================================================================
//
// One row per logged-in device. A user may hold many active rows at once.
//
// Columns:
//   - token              signed refresh JWT (unique)
//   - device_fingerprint sha256 over user-agent / accept-language / accept-encoding
//   - user_agent, os, browser, device, is_mobile, ip_address  (session listing)
//   - issued_at, expires_at, last_used_at
//   - is_revoked
//
// Active = is_revoked = false AND expires_at > now.
// Rotation revokes the presented row and inserts a new one in the same
// transaction. The sweeper deletes rows that are expired or revoked.
// ON DELETE CASCADE from users.
//
// ============================================================================

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique, column_type = "Text")]
    #[serde(skip_serializing)]
    pub token: String,

    #[sea_orm(indexed)]
    pub user_id: i32,

    pub device_fingerprint: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,

    pub ip_address: Option<String>,

    pub os: Option<String>,

    pub browser: Option<String>,

    pub device: Option<String>,

    pub is_mobile: bool,

    pub issued_at: DateTimeUtc,

    pub expires_at: DateTimeUtc,

    pub last_used_at: DateTimeUtc,

    pub is_revoked: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
