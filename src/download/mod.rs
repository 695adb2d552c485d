//! Download engine: format selection, the per-URL state machine, retries and batches

pub mod batch;
pub mod control;
pub mod error;
pub mod format;
pub mod job;
pub mod merge;
pub mod progress;
pub mod source;
pub mod types;
pub mod worker;
pub mod ytdlp_errors;

// Re-exports for convenience
pub use batch::{BatchHandle, Downloader};
pub use control::{Checkpoint, DownloadControl};
pub use error::{DownloadError, ErrorKind};
pub use format::{select_format, Selection, SelectionRule};
pub use merge::{FfmpegMerger, MergeTool};
pub use progress::{BatchEvent, Outcome, ProgressEvent, TransferProgress, UrlProgress};
pub use source::{ProviderCapabilities, StreamProvider, YtDlpProvider};
pub use types::{DownloadRequest, MediaKind, MediaType, Quality, SourceInfo, StreamDescriptor};
