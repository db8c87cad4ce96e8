//! Document queries over a captured page source
//!
//! Extraction reads from a snapshot of the rendered DOM rather than from live
//! elements, so a slow or half-loaded page never blocks a query. Every query
//! returns `None`, an empty list or a caller-supplied sentinel on absence.

use scraper::{ElementRef, Html, Selector};

/// A parsed page snapshot
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses a full HTML document
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Text of the first element matching `selector`
    ///
    /// Returns `None` if the selector is invalid or nothing matches.
    pub fn select_one(&self, selector: &str) -> Option<String> {
        let selector = parse_selector(selector)?;
        self.html.select(&selector).next().map(element_text)
    }

    /// Text of every element matching `selector`, in document order
    pub fn select_many(&self, selector: &str) -> Vec<String> {
        match parse_selector(selector) {
            Some(selector) => self.html.select(&selector).map(element_text).collect(),
            None => Vec::new(),
        }
    }

    /// Text of the first match, or `sentinel` when absent
    pub fn text_or(&self, selector: &str, sentinel: &str) -> String {
        self.select_one(selector)
            .unwrap_or_else(|| sentinel.to_string())
    }

    /// Rows of cells: for every `row_selector` match, the texts of its
    /// `cell_selector` descendants
    pub fn select_table(&self, row_selector: &str, cell_selector: &str) -> Vec<Vec<String>> {
        let (Some(rows), Some(cells)) = (parse_selector(row_selector), parse_selector(cell_selector))
        else {
            return Vec::new();
        };

        self.html
            .select(&rows)
            .map(|row| row.select(&cells).map(element_text).collect())
            .collect()
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!("Invalid selector [{}]: {:?}", selector, e);
            None
        }
    }
}

/// Concatenates the element's text nodes, each trimmed, skipping blank ones
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<String>()
}
