//! Paginated crawl over a browser session.
//!
//! The walker owns the session and moves through
//! `Init → PageLoaded → Extracting → Advancing → {Extracting | Done}`.
//! Only the initial navigation can fail the walk; every problem found while
//! advancing ends the walk normally with what was collected so far.
//!
//! The session is closed exactly once, on every exit path: when
//! [`CrawlWalker::extract`] returns, or when the walker is dropped unused.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use super::extract::{PageExtract, PageRow, extract_page};
use super::session::{BrowserSession, SessionError};
use crate::download::DownloadJob;
use crate::metadata::{
    DocumentMetadata, ExamEntry, ExamFile, normalize_discipline, normalize_localisation,
    normalize_serie, normalize_session, parse_link, split_atl_name,
};

/// Most pages one walk will visit.
pub const PAGE_CEILING: usize = 100;

/// Element whose presence means the catalog table rendered.
const CONTENT_SELECTOR: &str = "tbody";

/// Next-page control locators, tried in order.
const NEXT_SELECTORS: [&str; 2] = ["a[rel='next']", "a[title*='page suivante']"];

/// Overlay close buttons that may intercept clicks.
const OVERLAY_SELECTORS: [&str; 6] = [
    ".close",
    "[aria-label='Close']",
    ".modal-close",
    ".cookie-banner .close",
    "button.close",
    ".overlay-close",
];

const DISABLED_CLASS: &str = "is-disabled";

/// Error type for a crawl.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The start URL does not parse.
    #[error("invalid start URL: {url}")]
    InvalidUrl { url: String },

    /// The first page never loaded.
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: SessionError,
    },

    /// The rendered markup could not be read.
    #[error("browser session failed: {0}")]
    Session(#[from] SessionError),
}

/// Timing knobs of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkerOptions {
    /// Bound on waiting for the content container after a page load.
    pub load_timeout: Duration,
    /// Bound on waiting for each next-control locator.
    pub locate_timeout: Duration,
    /// Pause after clicking the next control.
    pub settle_delay: Duration,
    /// Pause before retrying a stale next control.
    pub stale_pause: Duration,
    /// Pause after dismissing an overlay.
    pub overlay_pause: Duration,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(20),
            locate_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            stale_pause: Duration::from_secs(1),
            overlay_pause: Duration::from_millis(500),
        }
    }
}

/// Raw categorical texts of the table row a link was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub session: String,
    pub discipline: String,
    pub serie: String,
    pub localisation: String,
    pub is_correction: bool,
}

/// A discovered document link, unique by canonical URL within one crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub canonical_url: String,
    /// `data-atl-name` sidecar, `"<filename>|<file id>"`.
    pub raw_tag: Option<String>,
    /// Present when the link was first seen inside a catalog table row.
    pub raw_row: Option<RawRow>,
}

impl LinkRecord {
    /// Metadata parsed from the URL and tag, with resolved row columns taking precedence.
    #[must_use]
    pub fn metadata(&self) -> DocumentMetadata {
        let mut metadata = parse_link(&self.canonical_url, self.raw_tag.as_deref());
        if let Some(row) = &self.raw_row {
            let session = normalize_session(&row.session);
            metadata.year = session.year().or(metadata.year);
            metadata.session_kind = session.kind().or(metadata.session_kind);
            metadata.discipline = normalize_discipline(&row.discipline).or(metadata.discipline);
            metadata.serie = normalize_serie(&row.serie).or(metadata.serie);
            metadata.localisation =
                normalize_localisation(&row.localisation).or(metadata.localisation);
        }
        metadata
    }
}

/// Result of a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOutput {
    /// Deduplicated links in first-discovery order.
    pub links: Vec<LinkRecord>,
    /// One entry per catalog row, ids from 1 in discovery order.
    pub entries: Vec<ExamEntry>,
    pub pages_visited: usize,
}

impl CrawlOutput {
    /// Download jobs for this crawl.
    ///
    /// Table entries are authoritative when the catalog had a table: one job
    /// per entry file, named from the entry's codes. Otherwise every link
    /// becomes a job with metadata parsed from its URL and tag.
    #[must_use]
    pub fn download_jobs(&self) -> Vec<DownloadJob> {
        if self.entries.iter().any(|entry| !entry.files().is_empty()) {
            return self
                .entries
                .iter()
                .flat_map(|entry| {
                    entry
                        .files()
                        .iter()
                        .map(|file| DownloadJob::new(&file.download_url, entry.metadata_for(file)))
                })
                .collect();
        }
        self.links
            .iter()
            .map(|link| DownloadJob::new(&link.canonical_url, link.metadata()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Init,
    PageLoaded,
    Extracting,
    Advancing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Moved,
    Exhausted,
}

/// Drives a [`BrowserSession`] through every page of a catalog.
#[derive(Debug)]
pub struct CrawlWalker<S: BrowserSession> {
    session: S,
    start_url: Url,
    options: WalkerOptions,
    seen: HashSet<String>,
    filed: HashSet<String>,
    /// Text keys of rows without links already turned into entries.
    linkless: HashSet<[String; 4]>,
    output: CrawlOutput,
    released: bool,
}

impl<S: BrowserSession> CrawlWalker<S> {
    /// Takes ownership of `session` for a walk starting at `start_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidUrl`] if `start_url` does not parse; the
    /// session is closed before returning.
    pub fn new(mut session: S, start_url: &str, options: WalkerOptions) -> Result<Self, CrawlError> {
        match Url::parse(start_url) {
            Ok(start_url) => Ok(Self {
                session,
                start_url,
                options,
                seen: HashSet::new(),
                filed: HashSet::new(),
                linkless: HashSet::new(),
                output: CrawlOutput::default(),
                released: false,
            }),
            Err(_) => {
                if let Err(error) = session.close() {
                    warn!(error = %error, "failed to close browser session");
                }
                Err(CrawlError::InvalidUrl {
                    url: start_url.to_string(),
                })
            }
        }
    }

    /// Walks the catalog, stopping after `max_pages` pages when given.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Navigation`] if the start page never shows its
    /// content, and [`CrawlError::Session`] if page markup cannot be read.
    #[instrument(skip(self), fields(url = %self.start_url))]
    pub fn extract(mut self, max_pages: Option<usize>) -> Result<CrawlOutput, CrawlError> {
        let result = self.walk(max_pages);
        self.release();
        result.map(|()| std::mem::take(&mut self.output))
    }

    fn walk(&mut self, max_pages: Option<usize>) -> Result<(), CrawlError> {
        let mut state = WalkState::Init;
        loop {
            state = match state {
                WalkState::Init => {
                    self.load_start_page()?;
                    WalkState::PageLoaded
                }
                WalkState::PageLoaded => {
                    self.dismiss_overlays();
                    WalkState::Extracting
                }
                WalkState::Extracting => {
                    let html = self.session.page_source()?;
                    let page = extract_page(&html, &self.start_url);
                    self.output.pages_visited += 1;
                    let fresh = self.absorb(page);
                    info!(
                        page = self.output.pages_visited,
                        new_links = fresh,
                        "extracted links from page"
                    );

                    if max_pages.is_some_and(|max| self.output.pages_visited >= max) {
                        info!(max_pages, "reached page limit, stopping");
                        WalkState::Done
                    } else {
                        WalkState::Advancing
                    }
                }
                WalkState::Advancing => {
                    if self.output.pages_visited >= PAGE_CEILING {
                        warn!(ceiling = PAGE_CEILING, "reached maximum page count");
                        WalkState::Done
                    } else if self.advance() == Advance::Moved {
                        WalkState::Extracting
                    } else {
                        WalkState::Done
                    }
                }
                WalkState::Done => break,
            };
        }

        info!(
            links = self.output.links.len(),
            entries = self.output.entries.len(),
            pages = self.output.pages_visited,
            "crawl complete"
        );
        Ok(())
    }

    fn load_start_page(&mut self) -> Result<(), CrawlError> {
        info!(url = %self.start_url, "navigating to catalog");
        let navigation = |source| CrawlError::Navigation {
            url: self.start_url.to_string(),
            source,
        };
        self.session
            .navigate(self.start_url.as_str())
            .map_err(navigation)?;
        self.session
            .wait_for(CONTENT_SELECTOR, self.options.load_timeout)
            .map_err(navigation)?;
        Ok(())
    }

    /// Best-effort clicks on overlay close buttons; failures are ignored.
    fn dismiss_overlays(&mut self) {
        for selector in OVERLAY_SELECTORS {
            let Ok(buttons) = self.session.find_all(selector) else {
                continue;
            };
            for button in &buttons {
                if !self.session.is_displayed(button).unwrap_or(false) {
                    continue;
                }
                if self.session.script_click(button).is_ok() {
                    debug!(selector, "closed overlay");
                    thread::sleep(self.options.overlay_pause);
                }
            }
        }
    }

    /// Records a page's links and rows; returns how many links were new.
    fn absorb(&mut self, page: PageExtract) -> usize {
        let rows_by_url: HashMap<&str, &PageRow> = page
            .rows
            .iter()
            .flat_map(|row| row.links.iter().map(move |l| (l.canonical_url.as_str(), row)))
            .collect();

        let mut fresh = 0;
        for link in &page.links {
            if !self.seen.insert(link.canonical_url.clone()) {
                continue;
            }
            fresh += 1;
            let raw_row = rows_by_url.get(link.canonical_url.as_str()).map(|row| RawRow {
                session: row.session.clone(),
                discipline: row.discipline.clone(),
                serie: row.serie.clone(),
                localisation: row.localisation.clone(),
                is_correction: parse_link(&link.canonical_url, link.raw_tag.as_deref())
                    .is_correction,
            });
            self.output.links.push(LinkRecord {
                canonical_url: link.canonical_url.clone(),
                raw_tag: link.raw_tag.clone(),
                raw_row,
            });
        }

        for row in &page.rows {
            self.absorb_row(row);
        }
        fresh
    }

    /// Adds an entry for `row` unless every one of its links is already filed.
    ///
    /// A row without links is added once per distinct text.
    fn absorb_row(&mut self, row: &PageRow) {
        if row.links.is_empty() {
            let key = [
                row.session.clone(),
                row.discipline.clone(),
                row.serie.clone(),
                row.localisation.clone(),
            ];
            if !self.linkless.insert(key) {
                return;
            }
        } else if row.links.iter().all(|l| self.filed.contains(&l.canonical_url)) {
            return;
        }

        let mut entry = ExamEntry::new(
            self.output.entries.len() + 1,
            normalize_session(&row.session).code(),
            normalize_discipline(&row.discipline),
            normalize_serie(&row.serie),
            normalize_localisation(&row.localisation),
        );
        for link in &row.links {
            if !self.filed.insert(link.canonical_url.clone()) {
                continue;
            }
            let (filename, file_id) = link
                .raw_tag
                .as_deref()
                .map_or((None, None), split_atl_name);
            entry.push_file(ExamFile {
                filename,
                download_url: link.canonical_url.clone(),
                file_id,
                is_correction: parse_link(&link.canonical_url, link.raw_tag.as_deref())
                    .is_correction,
            });
        }
        self.output.entries.push(entry);
    }

    /// Moves to the next page. A stale control is retried once.
    fn advance(&mut self) -> Advance {
        match self.try_advance() {
            Ok(advance) => advance,
            Err(SessionError::StaleElement) => {
                warn!("stale next-page control, retrying");
                thread::sleep(self.options.stale_pause);
                self.try_advance().unwrap_or_else(|error| {
                    info!(error = %error, "could not advance, ending walk");
                    Advance::Exhausted
                })
            }
            Err(error) => {
                info!(error = %error, "could not advance, ending walk");
                Advance::Exhausted
            }
        }
    }

    fn try_advance(&mut self) -> Result<Advance, SessionError> {
        let Some(next) = self.locate_next()? else {
            info!("no next-page control, last page reached");
            return Ok(Advance::Exhausted);
        };
        if self.is_disabled(&next)? {
            info!("next-page control is disabled, last page reached");
            return Ok(Advance::Exhausted);
        }

        self.session.script_click(&next)?;
        debug!("clicked next-page control");
        thread::sleep(self.options.settle_delay);
        self.session
            .wait_for(CONTENT_SELECTOR, self.options.load_timeout)?;
        Ok(Advance::Moved)
    }

    fn locate_next(&mut self) -> Result<Option<S::Element>, SessionError> {
        for selector in NEXT_SELECTORS {
            match self.session.find(selector, self.options.locate_timeout) {
                Ok(element) => return Ok(Some(element)),
                Err(error) if error.is_absent() => debug!(selector, "next-page locator missed"),
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }

    fn is_disabled(&mut self, control: &S::Element) -> Result<bool, SessionError> {
        let class = self.session.attribute(control, "class")?.unwrap_or_default();
        let parent_class = self
            .session
            .parent_attribute(control, "class")?
            .unwrap_or_default();
        let disabled = self.session.attribute(control, "disabled")?.is_some();
        let aria_disabled = self
            .session
            .attribute(control, "aria-disabled")?
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        Ok(class.contains(DISABLED_CLASS)
            || parent_class.contains(DISABLED_CLASS)
            || disabled
            || aria_disabled)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.session.close() {
            Ok(()) => debug!("browser session closed"),
            Err(error) => warn!(error = %error, "failed to close browser session"),
        }
    }
}

impl<S: BrowserSession> Drop for CrawlWalker<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::metadata::{Discipline, Localisation, Serie, SessionCode, SessionKind};

    /// How the next control looks on the last page.
    #[derive(Debug, Clone, Copy)]
    enum LastPage {
        Missing,
        DisabledParent,
        AriaDisabled,
    }

    /// Element ids at or above this are overlay close buttons.
    const OVERLAY_BASE: usize = 10_000;

    #[derive(Debug, Default)]
    struct Probe {
        closed: AtomicUsize,
        clicks: AtomicUsize,
        overlay_clicks: std::sync::Mutex<Vec<usize>>,
    }

    /// Serves `page_count` generated pages; page `i` links documents `i` and `i + 1`.
    #[derive(Debug)]
    struct FakeSession {
        page: usize,
        page_count: usize,
        last_page: LastPage,
        stale_failures: usize,
        fail_navigation: bool,
        fallback_locator_only: bool,
        /// Visibility of each `.close` button.
        overlays: Vec<bool>,
        linkless_row: bool,
        probe: Arc<Probe>,
    }

    impl FakeSession {
        fn new(page_count: usize, probe: &Arc<Probe>) -> Self {
            Self {
                page: 0,
                page_count,
                last_page: LastPage::Missing,
                stale_failures: 0,
                fail_navigation: false,
                fallback_locator_only: false,
                overlays: Vec::new(),
                linkless_row: false,
                probe: Arc::clone(probe),
            }
        }

        fn on_last_page(&self) -> bool {
            self.page + 1 >= self.page_count
        }
    }

    impl BrowserSession for FakeSession {
        type Element = usize;

        fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
            if self.fail_navigation {
                return Err(SessionError::driver("net::ERR_NAME_NOT_RESOLVED"));
            }
            self.page = 0;
            Ok(())
        }

        fn wait_for(&mut self, _selector: &str, _timeout: Duration) -> Result<(), SessionError> {
            Ok(())
        }

        fn page_source(&mut self) -> Result<String, SessionError> {
            let i = self.page;
            let extra = if self.linkless_row {
                "<tr><td>2019 - épreuves normales</td><td>Sciences</td>\
                 <td>Professionnelle</td><td>Étranger</td><td></td></tr>"
            } else {
                ""
            };
            Ok(format!(
                r#"<table><tbody><tr>
                    <td>2024 - épreuves normales</td><td>Mathématiques</td>
                    <td>Générale</td><td>Métropole</td>
                    <td><a href="/document/{i}/download" data-atl-name="24genmat{i}.pdf|{i}">Sujet</a></td>
                </tr>{extra}</tbody></table>
                <nav><a href="/document/{next}/download">Voir aussi</a></nav>"#,
                next = i + 1
            ))
        }

        fn find(&mut self, selector: &str, timeout: Duration) -> Result<usize, SessionError> {
            let primary = selector == NEXT_SELECTORS[0];
            if self.fallback_locator_only && primary {
                return Err(SessionError::timeout(selector, timeout));
            }
            if self.on_last_page() && matches!(self.last_page, LastPage::Missing) {
                return Err(SessionError::timeout(selector, timeout));
            }
            Ok(self.page)
        }

        fn find_all(&mut self, selector: &str) -> Result<Vec<usize>, SessionError> {
            if selector != OVERLAY_SELECTORS[0] {
                return Ok(Vec::new());
            }
            Ok((0..self.overlays.len()).map(|i| OVERLAY_BASE + i).collect())
        }

        fn attribute(
            &mut self,
            _element: &usize,
            name: &str,
        ) -> Result<Option<String>, SessionError> {
            if self.stale_failures > 0 {
                self.stale_failures -= 1;
                return Err(SessionError::StaleElement);
            }
            let value = match (name, self.on_last_page(), self.last_page) {
                ("class", _, _) => Some("pager__link".to_string()),
                ("aria-disabled", true, LastPage::AriaDisabled) => Some("true".to_string()),
                _ => None,
            };
            Ok(value)
        }

        fn parent_attribute(
            &mut self,
            _element: &usize,
            name: &str,
        ) -> Result<Option<String>, SessionError> {
            let value = match (name, self.on_last_page(), self.last_page) {
                ("class", true, LastPage::DisabledParent) => "pager__item is-disabled",
                ("class", _, _) => "pager__item",
                _ => return Ok(None),
            };
            Ok(Some(value.to_string()))
        }

        fn is_displayed(&mut self, element: &usize) -> Result<bool, SessionError> {
            Ok(element
                .checked_sub(OVERLAY_BASE)
                .is_none_or(|i| self.overlays[i]))
        }

        fn script_click(&mut self, element: &usize) -> Result<(), SessionError> {
            if *element >= OVERLAY_BASE {
                self.probe
                    .overlay_clicks
                    .lock()
                    .unwrap()
                    .push(element - OVERLAY_BASE);
                return Ok(());
            }
            self.probe.clicks.fetch_add(1, Ordering::SeqCst);
            self.page += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), SessionError> {
            self.probe.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn instant() -> WalkerOptions {
        WalkerOptions {
            load_timeout: Duration::ZERO,
            locate_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
            stale_pause: Duration::ZERO,
            overlay_pause: Duration::ZERO,
        }
    }

    fn walk(session: FakeSession, max_pages: Option<usize>) -> Result<CrawlOutput, CrawlError> {
        CrawlWalker::new(session, "https://eduscol.education.fr/711/annales", instant())
            .unwrap()
            .extract(max_pages)
    }

    fn urls(output: &CrawlOutput) -> Vec<&str> {
        output.links.iter().map(|l| l.canonical_url.as_str()).collect()
    }

    // ==================== Pagination ====================

    #[test]
    fn test_walks_until_next_control_missing() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(3, &probe), None).unwrap();

        assert_eq!(output.pages_visited, 3);
        assert_eq!(probe.clicks.load(Ordering::SeqCst), 2);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_links_are_unique_in_discovery_order() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(3, &probe), None).unwrap();

        assert_eq!(
            urls(&output),
            vec![
                "https://eduscol.education.fr/document/0/download",
                "https://eduscol.education.fr/document/1/download",
                "https://eduscol.education.fr/document/2/download",
                "https://eduscol.education.fr/document/3/download",
            ]
        );
    }

    #[test]
    fn test_stops_on_disabled_parent() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(2, &probe);
        session.last_page = LastPage::DisabledParent;

        let output = walk(session, None).unwrap();
        assert_eq!(output.pages_visited, 2);
        assert_eq!(probe.clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stops_on_aria_disabled() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(2, &probe);
        session.last_page = LastPage::AriaDisabled;

        let output = walk(session, None).unwrap();
        assert_eq!(output.pages_visited, 2);
    }

    #[test]
    fn test_fallback_locator_is_used() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(3, &probe);
        session.fallback_locator_only = true;

        let output = walk(session, None).unwrap();
        assert_eq!(output.pages_visited, 3);
    }

    #[test]
    fn test_max_pages_stops_early() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(10, &probe), Some(2)).unwrap();

        assert_eq!(output.pages_visited, 2);
        assert_eq!(probe.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_ceiling() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(usize::MAX, &probe), None).unwrap();
        assert_eq!(output.pages_visited, PAGE_CEILING);
    }

    // ==================== Overlays ====================

    #[test]
    fn test_only_visible_overlays_are_dismissed() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(1, &probe);
        session.overlays = vec![false, true, false];

        walk(session, None).unwrap();
        assert_eq!(*probe.overlay_clicks.lock().unwrap(), vec![1]);
        assert_eq!(probe.clicks.load(Ordering::SeqCst), 0);
    }

    // ==================== Staleness and errors ====================

    #[test]
    fn test_stale_control_retried_once() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(3, &probe);
        session.stale_failures = 1;

        let output = walk(session, None).unwrap();
        assert_eq!(output.pages_visited, 3);
    }

    #[test]
    fn test_stale_twice_ends_walk() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(3, &probe);
        session.stale_failures = 2;

        let output = walk(session, None).unwrap();
        assert_eq!(output.pages_visited, 1);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_navigation_error_releases_session() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(3, &probe);
        session.fail_navigation = true;

        let error = walk(session, None).unwrap_err();
        assert!(matches!(error, CrawlError::Navigation { .. }));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_start_url_releases_session() {
        let probe = Arc::new(Probe::default());
        let result = CrawlWalker::new(FakeSession::new(1, &probe), "not a url", instant());
        assert!(matches!(result, Err(CrawlError::InvalidUrl { .. })));
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_walker_releases_session() {
        let probe = Arc::new(Probe::default());
        let walker = CrawlWalker::new(
            FakeSession::new(1, &probe),
            "https://eduscol.education.fr/711/annales",
            instant(),
        )
        .unwrap();
        drop(walker);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    // ==================== Table rows ====================

    #[test]
    fn test_rows_become_classified_entries() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(2, &probe), None).unwrap();

        assert_eq!(output.entries.len(), 2);
        let entry = &output.entries[1];
        assert_eq!(entry.id, 2);
        assert_eq!(entry.session, Some(SessionCode::new(2024, SessionKind::Normal)));
        assert_eq!(entry.discipline, Some(Discipline::Mathematiques));
        assert_eq!(entry.serie, Some(Serie::Generale));
        assert_eq!(entry.localisation, Some(Localisation::Metropole));
        assert_eq!(entry.files().len(), 1);
        assert_eq!(entry.files()[0].file_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_first_occurrence_keeps_row_context() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(2, &probe), None).unwrap();

        // Document 1 is first seen outside the table on page 0.
        assert!(output.links[0].raw_row.is_some());
        assert!(output.links[1].raw_row.is_none());
        let metadata = output.links[0].metadata();
        assert_eq!(metadata.year, Some(2024));
        assert_eq!(metadata.serie, Some(Serie::Generale));
    }

    #[test]
    fn test_linkless_row_added_once() {
        let probe = Arc::new(Probe::default());
        let mut session = FakeSession::new(3, &probe);
        session.linkless_row = true;

        let output = walk(session, None).unwrap();
        let linkless: Vec<_> = output
            .entries
            .iter()
            .filter(|entry| entry.files().is_empty())
            .collect();
        assert_eq!(linkless.len(), 1);
        assert_eq!(linkless[0].discipline, Some(Discipline::Sciences));
        assert_eq!(output.entries.len(), 4);
    }

    #[test]
    fn test_download_jobs_prefer_entries() {
        let probe = Arc::new(Probe::default());
        let output = walk(FakeSession::new(2, &probe), None).unwrap();
        let jobs = output.download_jobs();

        // Document 2 is only linked outside the table, so entries cover 0 and 1.
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[0].metadata.filename.as_deref(),
            Some("2024_NORMAL_MATHEMATIQUES_GENERALE_METROPOLE_SUJET_0.pdf")
        );
    }

    #[test]
    fn test_download_jobs_fall_back_to_links() {
        let output = CrawlOutput {
            links: vec![LinkRecord {
                canonical_url: "https://x/document/5/download".to_string(),
                raw_tag: Some("23genmat.pdf|5".to_string()),
                raw_row: None,
            }],
            entries: Vec::new(),
            pages_visited: 1,
        };
        let jobs = output.download_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].metadata.year, Some(2023));
    }
}
