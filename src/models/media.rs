use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::UserAccount;

/// Lifecycle state of a stored record. Permanent deletion removes the row,
/// so there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Active,
    Trashed,
}

impl MediaStatus {
    /// Both states count toward the owner's quota.
    pub fn counts_toward_quota(self) -> bool {
        matches!(self, MediaStatus::Active | MediaStatus::Trashed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Other,
}

/// Opaque descriptor returned by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobLocation {
    pub location_key: String,
    pub url: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub original_filename: String,
    pub content_type: String,
    pub blob_key: String,
    pub blob_url: String,
    pub size_bytes: i64,
    pub status: MediaStatus,
    pub is_favorite: bool,
    pub trashed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn blob_location(&self) -> BlobLocation {
        BlobLocation {
            location_key: self.blob_key.clone(),
            url: self.blob_url.clone(),
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.status == MediaStatus::Trashed
    }
}

/// Media that has not been persisted yet. It has no id, no size and no status;
/// those are assigned when the upload is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDraft {
    pub kind: MediaKind,
    pub title: String,
    pub original_filename: String,
    pub content_type: String,
    pub blob: BlobLocation,
}

/// Row values for a new record, produced from a draft at commit time.
#[derive(Debug, Clone)]
pub struct NewMediaRecord {
    pub owner_id: Uuid,
    pub draft: MediaDraft,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl NewMediaRecord {
    pub fn into_record(self, id: Uuid) -> MediaRecord {
        MediaRecord {
            id,
            owner_id: self.owner_id,
            kind: self.draft.kind,
            title: self.draft.title,
            original_filename: self.draft.original_filename,
            content_type: self.draft.content_type,
            blob_key: self.draft.blob.location_key,
            blob_url: self.draft.blob.url,
            size_bytes: self.size_bytes,
            status: MediaStatus::Active,
            is_favorite: false,
            trashed_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommittedMedia {
    pub media: MediaRecord,
    pub account: UserAccount,
}

/// Result of a lifecycle transition. `changed` is false for no-op transitions
/// such as trashing an already trashed record.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: MediaRecord,
    pub changed: bool,
}

/// Which of an owner's records to list. `trashed: None` means active only,
/// matching the default library view.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub trashed: Option<bool>,
    pub favorites_only: bool,
    pub kind: Option<MediaKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MediaFilter {
    pub fn status(&self) -> MediaStatus {
        if self.trashed == Some(true) {
            MediaStatus::Trashed
        } else {
            MediaStatus::Active
        }
    }

    pub fn matches(&self, record: &MediaRecord) -> bool {
        record.status == self.status()
            && (!self.favorites_only || record.is_favorite)
            && self.kind.map_or(true, |kind| record.kind == kind)
    }
}

/// Boundary representation for existing consumers. `is_deleted` is derived
/// from the status and never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub original_filename: String,
    pub content_type: String,
    pub blob: BlobLocation,
    pub size_bytes: i64,
    pub status: MediaStatus,
    pub is_favorite: bool,
    pub is_deleted: bool,
    pub trashed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&MediaRecord> for MediaView {
    fn from(record: &MediaRecord) -> Self {
        MediaView {
            id: record.id,
            owner_id: record.owner_id,
            kind: record.kind,
            title: record.title.clone(),
            original_filename: record.original_filename.clone(),
            content_type: record.content_type.clone(),
            blob: record.blob_location(),
            size_bytes: record.size_bytes,
            status: record.status,
            is_favorite: record.is_favorite,
            is_deleted: record.is_trashed(),
            trashed_at: record.trashed_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> MediaDraft {
        MediaDraft {
            kind: MediaKind::Photo,
            title: "beach".to_string(),
            original_filename: "beach.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            blob: BlobLocation {
                location_key: "user-x/abc.jpg".to_string(),
                url: "http://blobs/user-x/abc.jpg".to_string(),
            },
        }
    }

    #[test]
    fn test_view_derives_is_deleted_from_status() {
        let mut record = NewMediaRecord {
            owner_id: Uuid::new_v4(),
            draft: draft(),
            size_bytes: 42,
            created_at: Utc::now(),
        }
        .into_record(Uuid::new_v4());

        let view = MediaView::from(&record);
        assert!(!view.is_deleted);

        record.status = MediaStatus::Trashed;
        let json = serde_json::to_value(MediaView::from(&record)).unwrap();
        assert_eq!(json["isDeleted"], true);
        assert_eq!(json["status"], "trashed");
        assert_eq!(json["blob"]["locationKey"], "user-x/abc.jpg");
    }

    #[test]
    fn test_filter_defaults_to_active() {
        let record = NewMediaRecord {
            owner_id: Uuid::new_v4(),
            draft: draft(),
            size_bytes: 1,
            created_at: Utc::now(),
        }
        .into_record(Uuid::new_v4());

        assert!(MediaFilter::default().matches(&record));
        let trash = MediaFilter {
            trashed: Some(true),
            ..Default::default()
        };
        assert!(!trash.matches(&record));
        let favorites = MediaFilter {
            favorites_only: true,
            ..Default::default()
        };
        assert!(!favorites.matches(&record));
    }
}
