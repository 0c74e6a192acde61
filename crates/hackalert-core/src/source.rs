//! The spreadsheet side of the relay.

use async_trait::async_trait;
use thiserror::Error;

use crate::gate::Throttled;
use crate::snapshot::SheetSnapshot;

/// Metadata loaded once when the session is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub spreadsheet_title: String,
    pub sheet_id: i64,
    pub sheet_title: String,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by the data source (HTTP 429)")]
    RateLimited,
    #[error("data source rejected the session: {0}")]
    Unauthorized(String),
    #[error("data source returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("spreadsheet has no sheets")]
    NoSheets,
    #[error("session not initialized")]
    NotInitialized,
}

impl Throttled for SourceError {
    fn is_throttled(&self) -> bool {
        matches!(self, SourceError::RateLimited)
    }
}

/// Read access to the first sheet of a spreadsheet.
///
/// Implementations keep the authenticated session internally; `authenticate`
/// is called once at startup and never again.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn authenticate(&self) -> Result<(), SourceError>;
    async fn load_info(&self) -> Result<SheetInfo, SourceError>;
    async fn load_cells(&self, sheet: &SheetInfo) -> Result<SheetSnapshot, SourceError>;
}
