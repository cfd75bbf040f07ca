//! Filename synthesis, transfers and the download orchestrator.
//!
//! # Features
//!
//! - Deterministic, sanitized filenames from ad metadata
//! - Streaming HTTP fetches with `uniquify` conflict handling
//! - One direct-link fallback per failed item
//! - Paced sequential dispatch with partial-failure reports
//!
//! # Example
//!
//! ```no_run
//! use ads_downloader_core::download::{HttpClient, HttpTransferService, TransferRequest, TransferService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = HttpTransferService::new(HttpClient::new()?, "./downloads");
//! let receipt = service
//!     .transfer(&TransferRequest::new("https://video.fbcdn.net/v.mp4", "acme_2024-03-05_video.mp4"))
//!     .await?;
//! println!("transfer {}", receipt.id);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub mod filename;
mod orchestrator;
mod transfer;

pub use client::{DownloadFileResult, HttpClient};
pub use constants::{CANDIDATE_DELAY, ITEM_DELAY};
pub use error::DownloadError;
pub use orchestrator::{
    BatchObserver, BatchReport, CandidateOutcome, CandidateReport, DownloadJob, DownloadStats,
    ItemOutcome, ItemReport, NoopObserver, Orchestrator, PacingPolicy, prepare_jobs,
};
pub use transfer::{
    ConflictPolicy, HttpTransferService, TransferError, TransferId, TransferReceipt,
    TransferRequest, TransferService,
};
