use std::sync::Arc;

use media_storage_ledger::{
    config::Config,
    database::{MediaStore, MemoryAccountStore, MemoryMediaStore},
    models::*,
    AppError, AppState, ErrorClass,
};
use uuid::Uuid;

struct Harness {
    state: AppState,
    media: Arc<MemoryMediaStore>,
}

fn harness() -> Harness {
    let media = Arc::new(MemoryMediaStore::new());
    let state = AppState::new(
        Config::default(),
        Arc::new(MemoryAccountStore::new()),
        media.clone(),
    )
    .unwrap();
    Harness { state, media }
}

fn draft(name: &str) -> MediaDraft {
    MediaDraft {
        kind: MediaKind::Photo,
        title: name.to_string(),
        original_filename: name.to_string(),
        content_type: "image/jpeg".to_string(),
        blob: BlobLocation {
            location_key: format!("blobs/{}", name),
            url: format!("http://cdn.test/blobs/{}", name),
        },
    }
}

async fn ground_truth(h: &Harness, user_id: Uuid) -> i64 {
    h.media.sum_counted_bytes(user_id).await.unwrap()
}

async fn used_bytes(h: &Harness, user_id: Uuid) -> i64 {
    h.state.ledger.account(user_id).await.unwrap().used_bytes
}

#[tokio::test]
async fn test_usage_matches_ground_truth_after_every_step() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(Some(10_000)).await.unwrap();

    let mut ids = Vec::new();
    for (i, size) in [100, 250, 1, 4_000, 37].into_iter().enumerate() {
        let committed = ledger
            .commit_upload(&acct, draft(&format!("{}.jpg", i)), size)
            .await
            .unwrap();
        ids.push(committed.media.id);
        assert_eq!(used_bytes(&h, acct.id).await, ground_truth(&h, acct.id).await);
        assert_eq!(committed.account.used_bytes, used_bytes(&h, acct.id).await);
    }

    ledger.move_to_trash(ids[1], acct.id).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, ground_truth(&h, acct.id).await);

    ledger.delete_permanently(ids[3], acct.id).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, ground_truth(&h, acct.id).await);

    ledger.delete_permanently(ids[1], acct.id).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, 100 + 1 + 37);
    assert_eq!(used_bytes(&h, acct.id).await, ground_truth(&h, acct.id).await);
}

#[tokio::test]
async fn test_trash_restore_round_trip_keeps_usage() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(None).await.unwrap();
    let committed = ledger.commit_upload(&acct, draft("a.jpg"), 640).await.unwrap();

    let before = used_bytes(&h, acct.id).await;
    let trashed = ledger.move_to_trash(committed.media.id, acct.id).await.unwrap();
    assert_eq!(trashed.record.status, MediaStatus::Trashed);
    assert_eq!(used_bytes(&h, acct.id).await, before);

    let restored = ledger.restore_from_trash(committed.media.id, acct.id).await.unwrap();
    assert_eq!(restored.record.status, MediaStatus::Active);
    assert_eq!(restored.record.size_bytes, 640);
    assert_eq!(used_bytes(&h, acct.id).await, before);
}

#[tokio::test]
async fn test_delete_permanently_is_exact_and_final() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(None).await.unwrap();
    ledger.commit_upload(&acct, draft("keep.jpg"), 300).await.unwrap();
    let doomed = ledger.commit_upload(&acct, draft("gone.jpg"), 120).await.unwrap();

    let before = used_bytes(&h, acct.id).await;
    let outcome = ledger.delete_permanently(doomed.media.id, acct.id).await.unwrap();
    assert_eq!(outcome.record.size_bytes, 120);
    assert_eq!(used_bytes(&h, acct.id).await, before - 120);

    assert!(matches!(
        ledger.get_media(doomed.media.id, acct.id).await,
        Err(AppError::MediaNotFound)
    ));
    assert!(matches!(
        ledger.delete_permanently(doomed.media.id, acct.id).await,
        Err(AppError::MediaNotFound)
    ));
    assert!(matches!(
        ledger.restore_from_trash(doomed.media.id, acct.id).await,
        Err(AppError::MediaNotFound)
    ));
    assert_eq!(used_bytes(&h, acct.id).await, 300);
}

#[tokio::test]
async fn test_reconcile_is_idempotent_and_heals_drift() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(None).await.unwrap();
    ledger.commit_upload(&acct, draft("a.jpg"), 500).await.unwrap();

    // A record written behind the ledger's back, as a failed compensation would leave it.
    h.media
        .insert(NewMediaRecord {
            owner_id: acct.id,
            draft: draft("orphan.jpg"),
            size_bytes: 70,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, 500);

    let first = h.state.reconciler.reconcile(acct.id).await.unwrap();
    let second = h.state.reconciler.reconcile(acct.id).await.unwrap();
    assert_eq!(first, 570);
    assert_eq!(second, first);
    assert_eq!(used_bytes(&h, acct.id).await, ground_truth(&h, acct.id).await);
    assert_eq!(h.state.metrics.drift_bytes(), 70);
}

#[tokio::test]
async fn test_quota_boundary() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(Some(1000)).await.unwrap();
    ledger.commit_upload(&acct, draft("a.jpg"), 995).await.unwrap();

    assert!(!ledger.check_upload_quota(acct.id, 6).await.unwrap().allowed);
    assert!(ledger.check_upload_quota(acct.id, 5).await.unwrap().allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_do_not_lose_updates() {
    let h = harness();
    let acct = h.state.ledger.create_account(Some(1000)).await.unwrap();

    let first = {
        let ledger = h.state.ledger.clone();
        let acct = acct.clone();
        tokio::spawn(async move { ledger.commit_upload(&acct, draft("a.jpg"), 100).await })
    };
    let second = {
        let ledger = h.state.ledger.clone();
        let acct = acct.clone();
        tokio::spawn(async move { ledger.commit_upload(&acct, draft("b.jpg"), 100).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(used_bytes(&h, acct.id).await, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_decrement_once() {
    let h = harness();
    let acct = h.state.ledger.create_account(None).await.unwrap();
    h.state.ledger.commit_upload(&acct, draft("keep.jpg"), 50).await.unwrap();
    let target = h
        .state
        .ledger
        .commit_upload(&acct, draft("a.jpg"), 100)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = h.state.ledger.clone();
            let media_id = target.media.id;
            let user_id = acct.id;
            tokio::spawn(async move { ledger.delete_permanently(media_id, user_id).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::MediaNotFound) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(used_bytes(&h, acct.id).await, 50);
}

#[tokio::test]
async fn test_five_gigabyte_scenario() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(Some(5_000_000_000)).await.unwrap();
    assert_eq!(acct.used_bytes, 0);

    let committed = ledger.commit_upload(&acct, draft("video.mp4"), 1_000_000).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, 1_000_000);

    ledger.move_to_trash(committed.media.id, acct.id).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, 1_000_000);

    ledger.delete_permanently(committed.media.id, acct.id).await.unwrap();
    assert_eq!(used_bytes(&h, acct.id).await, 0);

    assert_eq!(h.state.reconciler.reconcile(acct.id).await.unwrap(), 0);
    assert_eq!(used_bytes(&h, acct.id).await, 0);
}

#[tokio::test]
async fn test_foreign_media_is_not_found() {
    let h = harness();
    let ledger = &h.state.ledger;
    let owner = ledger.create_account(None).await.unwrap();
    let intruder = ledger.create_account(None).await.unwrap();
    let committed = ledger.commit_upload(&owner, draft("a.jpg"), 10).await.unwrap();
    let media_id = committed.media.id;

    for result in [
        ledger.move_to_trash(media_id, intruder.id).await.map(|_| ()),
        ledger.restore_from_trash(media_id, intruder.id).await.map(|_| ()),
        ledger.delete_permanently(media_id, intruder.id).await.map(|_| ()),
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::MediaNotFound));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    let record = ledger.get_media(media_id, owner.id).await.unwrap();
    assert_eq!(record.status, MediaStatus::Active);
    assert_eq!(used_bytes(&h, owner.id).await, 10);
    assert_eq!(used_bytes(&h, intruder.id).await, 0);
}

#[tokio::test]
async fn test_storage_summary_and_stats() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(Some(2048)).await.unwrap();
    ledger.commit_upload(&acct, draft("a.jpg"), 512).await.unwrap();
    ledger.create_account(Some(1024)).await.unwrap();

    let summary = ledger.storage_summary(acct.id).await.unwrap();
    assert_eq!(summary.used_bytes, 512);
    assert_eq!(summary.quota_bytes, 2048);
    assert_eq!(summary.available_bytes, 1536);
    assert_eq!(summary.usage_percentage, 25.0);
    assert_eq!(summary.used_display, "512 B");
    assert_eq!(summary.quota_display, "2.0 KB");

    assert!(matches!(
        ledger.storage_summary(Uuid::new_v4()).await,
        Err(AppError::AccountNotFound)
    ));

    let stats = ledger.storage_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_used_bytes, 512);
    assert_eq!(stats.total_quota_bytes, 3072);
    assert_eq!(stats.avg_used_bytes, 256.0);
}

#[tokio::test]
async fn test_reconcile_all_reports_every_user() {
    let h = harness();
    let ledger = &h.state.ledger;
    let a = ledger.create_account(None).await.unwrap();
    let b = ledger.create_account(None).await.unwrap();
    ledger.commit_upload(&a, draft("a.jpg"), 10).await.unwrap();
    ledger.commit_upload(&b, draft("b.jpg"), 20).await.unwrap();

    let report = h.state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.message(), "Reconciled 2 of 2 users");
    assert!(report.results.iter().all(|r| r.drift_bytes == Some(0)));
}

#[tokio::test]
async fn test_listing_filters_and_paging() {
    let h = harness();
    let ledger = &h.state.ledger;
    let acct = ledger.create_account(None).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        let committed = ledger
            .commit_upload(&acct, draft(&format!("{}.jpg", i)), 10)
            .await
            .unwrap();
        ids.push(committed.media.id);
    }
    ledger.move_to_trash(ids[0], acct.id).await.unwrap();

    let active = ledger.list_media(acct.id, MediaFilter::default()).await.unwrap();
    assert_eq!(active.len(), 4);
    assert!(active.iter().all(|m| m.status == MediaStatus::Active));

    let trash = MediaFilter {
        trashed: Some(true),
        ..Default::default()
    };
    assert_eq!(ledger.count_media(acct.id, trash).await.unwrap(), 1);

    let page = MediaFilter {
        limit: Some(3),
        offset: Some(2),
        ..Default::default()
    };
    assert_eq!(ledger.list_media(acct.id, page).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_service_from_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        blob_root: dir.path().to_string_lossy().into_owned(),
        ..Config::default()
    };
    let state = AppState::new(
        config,
        Arc::new(MemoryAccountStore::new()),
        Arc::new(MemoryMediaStore::new()),
    )
    .unwrap();
    let uploads = state.upload_service().unwrap();
    let acct = state.ledger.create_account(None).await.unwrap();

    let committed = uploads
        .upload(
            acct.id,
            media_storage_ledger::services::UploadRequest {
                filename: "clip.mp4".to_string(),
                title: Some("Birthday".to_string()),
                data: vec![1u8; 64],
            },
        )
        .await
        .unwrap();

    assert_eq!(committed.media.kind, MediaKind::Video);
    assert_eq!(committed.media.title, "Birthday");
    assert_eq!(committed.account.used_bytes, 64);
}
