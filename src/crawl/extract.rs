//! Link and table extraction from rendered catalog markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Cells a catalog row needs: session, discipline, serie, localisation, links.
const MIN_ROW_CELLS: usize = 5;

#[allow(clippy::expect_used)]
fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid") // Static selector, safe to panic
}

#[allow(clippy::expect_used)]
static DOWNLOAD_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/document/[^/]+/download").expect("download link regex is valid") // Static pattern, safe to panic
});

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tbody tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));

/// A document link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Absolute URL, resolved against the catalog URL.
    pub canonical_url: String,
    /// The anchor's `data-atl-name` sidecar, `"<filename>|<file id>"`.
    pub raw_tag: Option<String>,
}

/// Raw texts of one catalog table row and the links of its link cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRow {
    pub session: String,
    pub discipline: String,
    pub serie: String,
    pub localisation: String,
    pub links: Vec<PageLink>,
}

/// Everything extracted from one page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtract {
    pub links: Vec<PageLink>,
    pub rows: Vec<PageRow>,
}

/// Whether `href` has the `/document/<id>/download` shape.
#[must_use]
pub fn is_document_link(href: &str) -> bool {
    DOWNLOAD_LINK.is_match(href)
}

/// Extracts document links and table rows from `html`.
///
/// Links whose href cannot be resolved against `base` are skipped.
#[must_use]
pub fn extract_page(html: &str, base: &Url) -> PageExtract {
    let document = Html::parse_document(html);

    let links: Vec<PageLink> = document
        .select(&ANCHOR)
        .filter_map(|anchor| page_link(anchor, base))
        .collect();

    let rows: Vec<PageRow> = document
        .select(&ROW)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            if cells.len() < MIN_ROW_CELLS {
                return None;
            }
            Some(PageRow {
                session: cell_text(cells[0]),
                discipline: cell_text(cells[1]),
                serie: cell_text(cells[2]),
                localisation: cell_text(cells[3]),
                links: cells[4]
                    .select(&ANCHOR)
                    .filter_map(|anchor| page_link(anchor, base))
                    .collect(),
            })
        })
        .collect();

    debug!(links = links.len(), rows = rows.len(), "extracted page");
    PageExtract { links, rows }
}

fn page_link(anchor: ElementRef<'_>, base: &Url) -> Option<PageLink> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || !is_document_link(href) {
        return None;
    }
    let canonical_url = base.join(href).ok()?.to_string();
    let raw_tag = anchor
        .value()
        .attr("data-atl-name")
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string);
    Some(PageLink {
        canonical_url,
        raw_tag,
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <a href="/about">About</a>
          <table><tbody>
            <tr>
              <td>2024 - épreuves normales</td>
              <td>Français - dictée</td>
              <td>Générale</td>
              <td>Asie</td>
              <td class="views-field-link">
                <a href="/document/63414/download" data-atl-name="24genfrdag1_v11.pdf|63414">Sujet</a>
                <a href="/document/63415/download?attachment" data-atl-name="">Corrigé</a>
              </td>
            </tr>
            <tr><td>incomplete</td></tr>
          </tbody></table>
          <a href="https://other.example/document/9/download">Outside</a>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://eduscol.education.fr/711/annales?page=2").unwrap()
    }

    #[test]
    fn test_is_document_link() {
        assert!(is_document_link("/document/123/download"));
        assert!(is_document_link("https://x/document/abc/download?x=1"));
        assert!(!is_document_link("/document/download"));
        assert!(!is_document_link("/document/1/2/download"));
    }

    #[test]
    fn test_extract_links_in_document_order() {
        let page = extract_page(PAGE, &base());
        let urls: Vec<&str> = page.links.iter().map(|l| l.canonical_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://eduscol.education.fr/document/63414/download",
                "https://eduscol.education.fr/document/63415/download?attachment",
                "https://other.example/document/9/download",
            ]
        );
        assert_eq!(
            page.links[0].raw_tag.as_deref(),
            Some("24genfrdag1_v11.pdf|63414")
        );
        assert_eq!(page.links[1].raw_tag, None);
    }

    #[test]
    fn test_extract_rows_needs_five_cells() {
        let page = extract_page(PAGE, &base());
        assert_eq!(page.rows.len(), 1);
        let row = &page.rows[0];
        assert_eq!(row.session, "2024 - épreuves normales");
        assert_eq!(row.localisation, "Asie");
        assert_eq!(row.links.len(), 2);
    }

    #[test]
    fn test_extract_empty_markup() {
        assert_eq!(extract_page("", &base()), PageExtract::default());
    }
}
