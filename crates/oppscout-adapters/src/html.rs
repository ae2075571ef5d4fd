//! Small scraper helpers shared by the HTML-backed fetchers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::AdapterError;

pub fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector(format!("{css}: {e}")))
}

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    text_or_none(element.text().collect::<String>())
}

pub fn first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).next().and_then(element_text))
}

pub fn all_texts(scope: ElementRef<'_>, css: &str) -> Result<Vec<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).filter_map(element_text).collect())
}

pub fn first_attr(scope: ElementRef<'_>, css: &str, attr: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string())))
}

/// Elements matching `css` in document order.
pub fn cards<'a>(document: &'a Html, css: &str) -> Result<Vec<ElementRef<'a>>, AdapterError> {
    let sel = selector(css)?;
    Ok(document.select(&sel).collect())
}

/// Resolve `href` against `base`; absolute hrefs pass through.
pub fn absolutize(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Last path segment of a URL, ignoring any query or trailing slash.
pub fn last_path_segment(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::to_string)
        .filter(|s| !s.is_empty() && !s.contains(':'))
}
