use vellum_db::BlobRelease;
use vellum_storage::Storage;

/// Delete the physical blob once nothing references it. The metadata change
/// has already committed, so a failure here only leaves an orphaned blob and is
/// logged rather than returned.
pub(crate) async fn delete_if_unreferenced(storage: &dyn Storage, release: &BlobRelease) {
    if !release.is_unreferenced() {
        tracing::debug!(
            blob_key = %release.blob_key,
            remaining = release.remaining,
            "Blob still referenced, keeping it"
        );
        return;
    }

    match storage.delete(&release.blob_key).await {
        Ok(()) => {
            tracing::debug!(blob_key = %release.blob_key, "Deleted unreferenced blob");
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                blob_key = %release.blob_key,
                "Failed to delete unreferenced blob from storage"
            );
        }
    }
}
