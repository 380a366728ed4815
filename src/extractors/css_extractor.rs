//! CSS selector-based extraction
//!
//! Queries take a CSS selector with an optional pseudo suffix:
//! - `div.name::text` - text content of each match
//! - `a.link::attr(href)` - attribute value of each match
//! - `div.name::html` or no suffix - outer HTML of each match

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ExtractError, ExtractResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssExtractMode {
    Text,
    Html,
    Attr(String),
}

/// A parsed CSS query.
#[derive(Debug, Clone)]
pub struct CssQuery {
    selector: Selector,
    mode: CssExtractMode,
}

impl CssQuery {
    pub fn parse(input: &str) -> ExtractResult<Self> {
        let (selector_str, mode) = parse_css_selector_with_pseudo(input);
        let selector_str = selector_str.trim();
        if selector_str.is_empty() {
            return Err(ExtractError::InvalidSelector {
                selector: input.to_string(),
                reason: "empty selector".to_string(),
            });
        }
        let selector = Selector::parse(selector_str).map_err(|e| ExtractError::InvalidSelector {
            selector: input.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { selector, mode })
    }

    pub fn mode(&self) -> &CssExtractMode {
        &self.mode
    }

    /// All matches below `root`, in document order. Matches without the
    /// requested attribute are skipped.
    pub fn select(&self, root: ElementRef<'_>) -> Vec<String> {
        root.select(&self.selector)
            .filter_map(|el| match &self.mode {
                CssExtractMode::Html => Some(el.html()),
                CssExtractMode::Text => Some(el.text().collect::<String>().trim().to_string()),
                CssExtractMode::Attr(name) => el.value().attr(name).map(String::from),
            })
            .collect()
    }
}

fn parse_css_selector_with_pseudo(input: &str) -> (&str, CssExtractMode) {
    if let Some(pos) = input.rfind("::text") {
        (&input[..pos], CssExtractMode::Text)
    } else if let Some(pos) = input.rfind("::html") {
        (&input[..pos], CssExtractMode::Html)
    } else if let Some(pos) = input.rfind("::attr(") {
        let attr_start = pos + 7;
        match input[attr_start..].find(')') {
            Some(attr_end) => {
                let attr_name = input[attr_start..attr_start + attr_end].trim().to_string();
                (&input[..pos], CssExtractMode::Attr(attr_name))
            }
            None => (input, CssExtractMode::Html),
        }
    } else {
        (input, CssExtractMode::Html)
    }
}

/// Convenience wrapper: run a query against a whole document.
pub fn extract_css(document: &Html, query: &str) -> ExtractResult<Vec<String>> {
    Ok(CssQuery::parse(query)?.select(document.root_element()))
}

/// Absolute http(s) links from `href` attributes of matching elements.
pub fn extract_links(root: ElementRef<'_>, selector: &str, base_url: &str) -> Vec<String> {
    let mut links = Vec::new();

    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return links,
    };

    let sel_str = if selector.is_empty() { "a[href]" } else { selector };
    let sel = match Selector::parse(sel_str) {
        Ok(s) => s,
        Err(_) => return links,
    };

    for element in root.select(&sel) {
        if let Some(href) = element.value().attr("href") {
            let href_trimmed = href.trim();
            if href_trimmed.is_empty()
                || href_trimmed.starts_with("javascript:")
                || href_trimmed.starts_with("mailto:")
                || href_trimmed.starts_with("tel:")
                || href_trimmed.starts_with('#')
            {
                continue;
            }

            if let Ok(absolute_url) = base.join(href_trimmed) {
                if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                    links.push(absolute_url.to_string());
                }
            }
        }
    }

    links
}
