//! Blob reference and workspace usage bookkeeping.
//!
//! Always called inside the transaction of the mutation that changes a record's
//! blob or attribution, so the ledgers commit or roll back with it.

use sqlx::{PgConnection, Postgres};
use vellum_core::AppError;

use crate::db::traits::{BlobClaim, BlobRelease};

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

/// Take one reference on `blob_key`. Returns the new count.
pub(crate) async fn claim_blob(
    conn: &mut PgConnection,
    blob_key: &str,
    claim: BlobClaim,
) -> Result<i64, AppError> {
    match claim {
        BlobClaim::New => {
            let count = sqlx::query_scalar::<Postgres, i64>(
                r#"
                INSERT INTO blob_refs (blob_key, ref_count)
                VALUES ($1, 1)
                ON CONFLICT (blob_key) DO UPDATE SET ref_count = blob_refs.ref_count + 1
                RETURNING ref_count
                "#,
            )
            .bind(blob_key)
            .fetch_one(&mut *conn)
            .await?;
            Ok(count)
        }
        BlobClaim::Existing => {
            // Blocks on the row lock held by a concurrent release; a deleted row yields nothing.
            let count = sqlx::query_scalar::<Postgres, i64>(
                r#"
                UPDATE blob_refs SET ref_count = ref_count + 1
                WHERE blob_key = $1
                RETURNING ref_count
                "#,
            )
            .bind(blob_key)
            .fetch_optional(&mut *conn)
            .await?;
            count.ok_or_else(|| {
                AppError::NotFound(format!("Blob {} is no longer referenced", blob_key))
            })
        }
    }
}

/// Drop one reference on `blob_key`, deleting the row when it reaches zero.
pub(crate) async fn release_blob(
    conn: &mut PgConnection,
    blob_key: &str,
) -> Result<BlobRelease, AppError> {
    let current = sqlx::query_scalar::<Postgres, i64>(
        "SELECT ref_count FROM blob_refs WHERE blob_key = $1 FOR UPDATE",
    )
    .bind(blob_key)
    .fetch_optional(&mut *conn)
    .await?;

    let remaining = match current {
        Some(count) if count > 1 => {
            sqlx::query_scalar::<Postgres, i64>(
                "UPDATE blob_refs SET ref_count = ref_count - 1 WHERE blob_key = $1 RETURNING ref_count",
            )
            .bind(blob_key)
            .fetch_one(&mut *conn)
            .await?
        }
        Some(_) => {
            sqlx::query("DELETE FROM blob_refs WHERE blob_key = $1")
                .bind(blob_key)
                .execute(&mut *conn)
                .await?;
            0
        }
        None => {
            tracing::warn!(blob_key = %blob_key, "Released a blob with no reference row");
            0
        }
    };

    Ok(BlobRelease {
        blob_key: blob_key.to_string(),
        remaining,
    })
}

/// Add the deltas to a workspace's usage row. Unattributed media are not tracked.
pub(crate) async fn adjust_usage(
    conn: &mut PgConnection,
    workspace_id: Option<&str>,
    delta_bytes: i64,
    delta_files: i64,
) -> Result<(), AppError> {
    let Some(workspace_id) = workspace_id else {
        return Ok(());
    };
    if delta_bytes == 0 && delta_files == 0 {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO workspace_usage (workspace_id, used_storage_bytes, current_file_count, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (workspace_id) DO UPDATE SET
            used_storage_bytes = workspace_usage.used_storage_bytes + EXCLUDED.used_storage_bytes,
            current_file_count = workspace_usage.current_file_count + EXCLUDED.current_file_count,
            updated_at = NOW()
        "#,
    )
    .bind(workspace_id)
    .bind(delta_bytes)
    .bind(delta_files)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
