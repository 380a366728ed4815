//! Document queries
//!
//! Each module answers one kind of query against one kind of document:
//! CSS selectors against parsed HTML, path expressions against JSON.

mod css_extractor;
mod path_extractor;

pub use css_extractor::*;
pub use path_extractor::*;

use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::error::ExtractResult;

/// The document a loader reads candidates from.
#[derive(Debug, Clone, Copy)]
pub enum Document<'a> {
    /// An HTML subtree; CSS queries search below it
    Html(ElementRef<'a>),
    Json(&'a Value),
    /// Nothing to query, e.g. for a failed request
    Empty,
}

impl<'a> Document<'a> {
    pub fn html(document: &'a Html) -> Self {
        Self::Html(document.root_element())
    }

    pub fn json(value: &'a Value) -> Self {
        Self::Json(value)
    }
}

/// One registered extraction query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// CSS selector, see [`CssQuery`]
    Css(&'static str),
    /// JSON path, see [`JsonPath`]
    Path(&'static str),
}

/// A field paired with the query that feeds it.
///
/// An ordered slice of rules is an extraction plan: for scalar fields the
/// first rule that yields a usable value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub field: &'static str,
    pub query: Query,
}

impl Rule {
    pub const fn css(field: &'static str, selector: &'static str) -> Self {
        Self {
            field,
            query: Query::Css(selector),
        }
    }

    pub const fn path(field: &'static str, path: &'static str) -> Self {
        Self {
            field,
            query: Query::Path(path),
        }
    }
}

/// Raw strings matched by a CSS query. Non-HTML documents match nothing.
pub fn query_css(document: Document<'_>, selector: &str) -> ExtractResult<Vec<String>> {
    let query = CssQuery::parse(selector)?;
    Ok(match document {
        Document::Html(root) => query.select(root),
        _ => Vec::new(),
    })
}

/// JSON values matched by a path. Non-JSON documents match nothing.
pub fn query_path<'a>(document: Document<'a>, path: &str) -> ExtractResult<Vec<&'a Value>> {
    let path = JsonPath::parse(path)?;
    Ok(match document {
        Document::Json(value) => path.evaluate(value),
        _ => Vec::new(),
    })
}
