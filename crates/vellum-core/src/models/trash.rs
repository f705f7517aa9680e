use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::media::MediaRecord;

/// A soft-deleted media record awaiting restore or purge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrashEntry {
    pub id: Uuid,
    pub media_id: Uuid,
    pub owner_id: String,
    /// The record exactly as it was when trashed. Never mutated.
    pub snapshot: MediaRecord,
    pub trashed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrashEntry {
    pub fn new(snapshot: MediaRecord, trashed_at: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id: snapshot.id,
            owner_id: snapshot.owner_id.clone(),
            snapshot: snapshot.without_url(),
            trashed_at,
            expires_at: trashed_at + retention,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
