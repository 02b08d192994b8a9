//! Constants for the download module (timeouts, chunking, validation thresholds).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-attempt request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default minimum spacing between request starts (1.5 seconds).
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(1500);

/// Bytes read from the response body per write.
pub const CHUNK_SIZE: usize = 8192;

/// Smallest acceptable `.pdf` file.
pub const MIN_PDF_SIZE: u64 = 1024;

/// Smallest acceptable archive or generic file.
pub const MIN_FILE_SIZE: u64 = 100;

/// Legacy `.doc` files must be strictly larger than this.
pub const MIN_DOC_SIZE: u64 = 1000;

/// Leading bytes inspected when sniffing a file type.
pub const SNIFF_LEN: usize = 8;
