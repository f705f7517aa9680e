//! Test helpers: an isolated PostgreSQL with the crate's migrations applied.
//!
//! Uses `VELLUM_TEST_DATABASE_URL` when set, otherwise starts a throwaway
//! container. Without either a reachable database or Docker the tests skip.

#![allow(dead_code)]

use chrono::{SubsecRound, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres as Pg};
use std::collections::HashMap;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;
use vellum_core::models::{MediaCategory, MediaRecord, MediaVersion};
use vellum_db::run_migrations;

pub struct TestDb {
    pub pool: PgPool,
    _container: Option<ContainerAsync<Postgres>>,
}

pub async fn setup_test_db() -> Option<TestDb> {
    let (url, container) = match std::env::var("VELLUM_TEST_DATABASE_URL") {
        Ok(url) => (url, None),
        Err(_) => {
            let container = match Postgres::default().start().await {
                Ok(container) => container,
                Err(e) => {
                    eprintln!("skipping PostgreSQL test, no container runtime: {}", e);
                    return None;
                }
            };
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            (
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
                Some(container),
            )
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");

    Some(TestDb {
        pool,
        _container: container,
    })
}

/// Unique name so tests sharing one database never see each other's rows.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

pub fn media(owner: &str, workspace: Option<&str>, blob_key: &str, size_bytes: i64) -> MediaRecord {
    // PostgreSQL stores microseconds.
    let now = Utc::now().trunc_subsecs(6);
    MediaRecord {
        id: Uuid::new_v4(),
        owner_id: owner.to_string(),
        workspace_id: workspace.map(str::to_string),
        category: MediaCategory::Image,
        filename: "cat.png".to_string(),
        mime_type: "image/png".to_string(),
        size_bytes,
        blob_key: blob_key.to_string(),
        metadata: HashMap::from([("camera".to_string(), "x100".to_string())]),
        url: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn version(media_id: Uuid, version_number: i32, blob_key: &str) -> MediaVersion {
    MediaVersion {
        id: Uuid::new_v4(),
        media_id,
        version_number,
        filename: "cat.png".to_string(),
        mime_type: "image/png".to_string(),
        size_bytes: 1,
        blob_key: blob_key.to_string(),
        uploaded_by: "u1".to_string(),
        comment: None,
        url: None,
        created_at: Utc::now().trunc_subsecs(6),
    }
}

/// Current `blob_refs` count, 0 when the row is gone.
pub async fn ref_count(pool: &PgPool, blob_key: &str) -> i64 {
    sqlx::query_scalar::<Pg, i64>("SELECT ref_count FROM blob_refs WHERE blob_key = $1")
        .bind(blob_key)
        .fetch_optional(pool)
        .await
        .expect("read blob_refs")
        .unwrap_or(0)
}
