//! User profile model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display profile for an already-authenticated user.
///
/// Holds no credentials; identity is resolved elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, display_name: String) -> Self {
        Self {
            id,
            display_name,
            created_at: Utc::now(),
        }
    }
}
