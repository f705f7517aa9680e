mod common;

use common::{cat_png, media_in, FailingCache, Harness};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use vellum_core::models::{MediaCategory, NewMedia};
use vellum_core::AppError;
use vellum_services::LifecycleSettings;
use vellum_storage::Storage;

#[tokio::test]
async fn create_then_get_round_trips_fields() {
    let h = Harness::new().await;

    let created = h.lifecycle.create("u1", cat_png()).await.unwrap();
    assert_eq!(created.category, MediaCategory::Image);
    assert_eq!(created.owner_id, "u1");
    assert_eq!(created.size_bytes, 2048);
    assert_eq!(
        created.blob_key,
        format!("media/u1/{}/current/cat.png", created.id)
    );
    assert!(created.url.is_none());

    let fetched = h.lifecycle.get(created.id).await.unwrap();
    assert_eq!(fetched.without_url(), created);
    let url = fetched.url.expect("read attaches a download URL");
    assert!(url.contains("method=GET"));

    // Served from cache: same URL as the first read.
    let cached = h.lifecycle.get(created.id).await.unwrap();
    assert_eq!(cached.url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn category_follows_mime_prefix() {
    let h = Harness::new().await;
    let cases = [
        ("clip.mp4", "video/mp4", MediaCategory::Video),
        ("song.mp3", "audio/mpeg", MediaCategory::Audio),
        ("report.pdf", "application/pdf", MediaCategory::Document),
        ("photo.jpg", "image/jpeg", MediaCategory::Image),
    ];
    for (filename, mime_type, expected) in cases {
        let media = h
            .lifecycle
            .create(
                "u1",
                NewMedia {
                    filename: filename.to_string(),
                    mime_type: mime_type.to_string(),
                    ..cat_png()
                },
            )
            .await
            .unwrap();
        assert_eq!(media.category, expected, "{}", mime_type);
    }

    let stats = h.lifecycle.stats_for_owner("u1").await.unwrap();
    assert_eq!(stats.total_files, 4);
    assert_eq!(stats.total_size, 4 * 2048);
    assert_eq!(stats.by_category.len(), 4);

    let videos = h
        .lifecycle
        .list_by_type("u1", MediaCategory::Video, None)
        .await
        .unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(h.lifecycle.list_for_owner("u1", Some(2)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_input_creates_nothing() {
    let h = Harness::new().await;
    let bad = [
        NewMedia {
            filename: String::new(),
            ..cat_png()
        },
        NewMedia {
            filename: "../etc/passwd".to_string(),
            ..cat_png()
        },
        NewMedia {
            mime_type: String::new(),
            ..cat_png()
        },
        NewMedia {
            mime_type: "png".to_string(),
            ..cat_png()
        },
        NewMedia {
            size_bytes: -1,
            ..cat_png()
        },
    ];
    for input in bad {
        let err = h.lifecycle.create("u1", input).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "{:?}", err);
    }
    assert_eq!(h.store.media_count(), 0);
}

#[tokio::test]
async fn foreign_caller_cannot_mutate() {
    let h = Harness::new().await;
    let media = h.lifecycle.create("u1", cat_png()).await.unwrap();

    let errs = vec![
        h.lifecycle.delete(media.id, "u2").await.unwrap_err(),
        h.lifecycle.rename(media.id, "u2", "dog.png").await.map(|_| ()).unwrap_err(),
        h.lifecycle
            .move_to_workspace(media.id, "u2", "ws2")
            .await
            .map(|_| ())
            .unwrap_err(),
        h.lifecycle
            .update_metadata(media.id, "u2", HashMap::from([("k".to_string(), "v".to_string())]))
            .await
            .map(|_| ())
            .unwrap_err(),
        h.lifecycle.copy(media.id, "u2", "ws2").await.map(|_| ()).unwrap_err(),
        h.trash.move_to_trash(media.id, "u2").await.map(|_| ()).unwrap_err(),
    ];
    for err in errs {
        assert!(matches!(err, AppError::Unauthorized(_)), "{:?}", err);
    }

    let after = h.lifecycle.get(media.id).await.unwrap();
    assert_eq!(after.without_url(), media);
    assert_eq!(h.store.media_count(), 1);
    assert_eq!(h.store.blob_ref_count(&media.blob_key), 1);
}

#[tokio::test]
async fn second_delete_is_not_found() {
    let h = Harness::new().await;
    let media = h.lifecycle.create("u1", cat_png()).await.unwrap();

    h.lifecycle.delete(media.id, "u1").await.unwrap();
    assert!(h.storage.deleted().contains(&media.blob_key));
    assert_eq!(h.store.blob_ref_count(&media.blob_key), 0);

    let err = h.lifecycle.delete(media.id, "u1").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.lifecycle.get(media.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn copy_keeps_shared_blob_until_last_holder_is_deleted() {
    let h = Harness::new().await;
    let original = h.lifecycle.create("u1", cat_png()).await.unwrap();
    h.storage
        .put(&original.blob_key, vec![7u8; 2048], "image/png")
        .await
        .unwrap();

    let copy = h.lifecycle.copy(original.id, "u1", "ws2").await.unwrap();
    assert_ne!(copy.id, original.id);
    assert_eq!(copy.blob_key, original.blob_key);
    assert_eq!(copy.workspace_id.as_deref(), Some("ws2"));
    assert_eq!(h.store.blob_ref_count(&original.blob_key), 2);

    h.lifecycle.delete(original.id, "u1").await.unwrap();
    assert!(h.storage.exists(&copy.blob_key).await.unwrap());
    assert_eq!(h.storage.get(&copy.blob_key).await.unwrap().len(), 2048);
    assert!(h.storage.deleted().is_empty());

    h.lifecycle.delete(copy.id, "u1").await.unwrap();
    assert!(!h.storage.exists(&copy.blob_key).await.unwrap());
}

#[tokio::test]
async fn workspace_listing_is_newest_first_and_follows_moves() {
    let h = Harness::new().await;
    let first = h.lifecycle.create("u1", media_in("ws1", "a.pdf", 10)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = h.lifecycle.create("u2", media_in("ws1", "b.pdf", 20)).await.unwrap();
    h.lifecycle.create("u1", media_in("ws2", "c.pdf", 30)).await.unwrap();
    h.lifecycle.create("u1", cat_png()).await.unwrap();

    let listed = h.lifecycle.list_by_workspace("ws1", None).await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert!(listed.iter().all(|m| m.url.is_some()));
    assert_eq!(h.lifecycle.list_by_workspace("ws1", Some(1)).await.unwrap().len(), 1);

    h.lifecycle.move_to_workspace(first.id, "u1", "ws2").await.unwrap();
    let listed = h.lifecycle.list_by_workspace("ws1", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(h.lifecycle.list_by_workspace("ws2", None).await.unwrap().len(), 2);

    let err = h.lifecycle.list_by_workspace(" ", None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn copy_of_missing_media_is_not_found() {
    let h = Harness::new().await;
    let err = h.lifecycle.copy(Uuid::new_v4(), "u1", "ws1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn mutations_invalidate_cached_record() {
    let h = Harness::new().await;
    let media = h.lifecycle.create("u1", cat_png()).await.unwrap();
    h.lifecycle.get(media.id).await.unwrap();

    h.lifecycle.rename(media.id, "u1", "dog.png").await.unwrap();
    assert_eq!(h.lifecycle.get(media.id).await.unwrap().filename, "dog.png");

    let metadata = HashMap::from([("alt".to_string(), "a dog".to_string())]);
    h.lifecycle
        .update_metadata(media.id, "u1", metadata.clone())
        .await
        .unwrap();
    assert_eq!(h.lifecycle.get(media.id).await.unwrap().metadata, metadata);

    h.lifecycle
        .move_to_workspace(media.id, "u1", "ws9")
        .await
        .unwrap();
    let moved = h.lifecycle.get(media.id).await.unwrap();
    assert_eq!(moved.workspace_id.as_deref(), Some("ws9"));
    // Renaming never moves the blob.
    assert_eq!(moved.blob_key, media.blob_key);
}

#[tokio::test]
async fn unavailable_cache_degrades_to_store_reads() {
    let h = Harness::with(LifecycleSettings::default(), Arc::new(FailingCache)).await;

    let media = h.lifecycle.create("u1", cat_png()).await.unwrap();
    assert_eq!(h.lifecycle.get(media.id).await.unwrap().id, media.id);

    h.lifecycle.rename(media.id, "u1", "renamed.png").await.unwrap();
    assert_eq!(h.lifecycle.get(media.id).await.unwrap().filename, "renamed.png");

    h.lifecycle.delete(media.id, "u1").await.unwrap();
    assert!(h.lifecycle.get(media.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn upload_ticket_carries_signed_put_url() {
    let h = Harness::new().await;
    let ticket = h
        .lifecycle
        .create_upload("u1", media_in("ws1", "report.pdf", 10))
        .await
        .unwrap();

    assert_eq!(ticket.blob_key, ticket.media.blob_key);
    assert!(ticket.upload_url.contains("method=PUT"));
    assert!(ticket.upload_url.contains("signature="));
    assert!(ticket.expires_at > chrono::Utc::now());
    assert_eq!(h.store.media_count(), 1);

    let url = h.lifecycle.download_url(ticket.media.id).await.unwrap();
    assert!(url.contains("method=GET"));
}
