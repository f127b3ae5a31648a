use showroom_core::error::CoreError;
use showroom_remote::listing::ListingStoreError;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The batch was rejected before anything was submitted.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("All {total} images failed to process: {first_error}")]
    AllFailed { total: usize, first_error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("No listing store is configured")]
    StoreUnavailable,

    #[error("Failed to save listing images: {0}")]
    Store(#[from] ListingStoreError),
}
