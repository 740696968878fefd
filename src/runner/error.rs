use thiserror::Error;

/// Failures that end a whole run. Per-item problems never get here; they
/// become a reason on the item's summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("blocked by site at item {item_id} (marker: {marker})")]
    BlockedBySite { item_id: String, marker: String },
    #[error("worker task failed: {0}")]
    Worker(String),
}
