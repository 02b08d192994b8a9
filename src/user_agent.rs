//! Shared request identity for the HTTP client and the headless browser.
//!
//! The catalog serves bot-looking clients differently, so both sides present
//! the same desktop browser User-Agent and French-first language preference.

/// Desktop browser User-Agent sent with every download request and browser page.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// `Accept-Language` value matching the catalog's locale.
pub(crate) const ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7";
