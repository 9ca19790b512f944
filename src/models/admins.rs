// Administrators live in their own table, separate from customers.
// `deprecated = true` soft-disables an admin: the row is kept for history but
// the account can neither log in nor use tokens issued before the flag was set.
// Admins are never hard-deleted.

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

pub const DEFAULT_ROLE: &str = "admin";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "admins")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub deprecated: bool,
    pub role: String,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
