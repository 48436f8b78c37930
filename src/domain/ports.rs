use crate::utils::error::Result;

/// Blob storage for place images.
///
/// Blobs are addressed by a storage-relative name (`places/a.jpg`) that is
/// kept in `Image::blob_ref`; `url` turns that name into a site-relative URL.
pub trait ImageStore: Send + Sync {
    /// Stores `data` under `name`, or under a free variant of it when the
    /// name is taken. Returns the name actually used.
    fn store(
        &self,
        name: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    fn read(&self, blob_ref: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    /// Deleting a missing blob is not an error.
    fn delete(&self, blob_ref: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    fn url(&self, blob_ref: &str) -> String;
}
