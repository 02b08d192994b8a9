//! Paginated catalog crawl.
//!
//! [`CrawlWalker`] drives any [`BrowserSession`] through the catalog's pages,
//! collecting document links (unique by canonical URL, in discovery order)
//! and one [`ExamEntry`](crate::metadata::ExamEntry) per table row.
//! [`ChromeSession`] is the production session over headless Chrome.
//!
//! # Example
//!
//! ```no_run
//! use annales_core::crawl::{ChromeOptions, ChromeSession, CrawlWalker, WalkerOptions};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = ChromeSession::launch(ChromeOptions::default())?;
//! let walker = CrawlWalker::new(
//!     session,
//!     "https://eduscol.education.fr/711/dnb-annales",
//!     WalkerOptions::default(),
//! )?;
//! let output = walker.extract(Some(2))?;
//! println!("{} links on {} pages", output.links.len(), output.pages_visited);
//! # Ok(())
//! # }
//! ```

mod chrome;
mod extract;
mod session;
mod walker;

pub use chrome::{ChromeOptions, ChromeSession};
pub use extract::{PageExtract, PageLink, PageRow, extract_page, is_document_link};
pub use session::{BrowserSession, SessionError};
pub use walker::{
    CrawlError, CrawlOutput, CrawlWalker, LinkRecord, PAGE_CEILING, RawRow, WalkerOptions,
};
