use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Patient row. Only read here, to prove ownership of a session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i32,
    pub usuario_id: Uuid,
    pub nome: String,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.usuario_id == user_id
    }
}
