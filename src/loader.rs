//! Extraction loader
//!
//! Collects raw candidates per field from a document, then reduces them into
//! a record at [`ItemLoader::finalize`]. Nothing is written to the record
//! before that.
//!
//! Reduction:
//! - scalar fields take the first candidate, in registration order, that
//!   survives the field's import pipeline; a value already on the bound
//!   record wins over all candidates
//! - list fields keep the bound record's items, then every normalized
//!   candidate, flattened and deduplicated in first-seen order
//! - fields left unset take their declared default

use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use crate::error::{ExtractResult, ItemResult};
use crate::extractors::{query_css, query_path, Document, Query, Rule};
use crate::item::Record;
use crate::normalize::run_pipeline;
use crate::value::FieldValue;

pub struct ItemLoader<'a> {
    record: Record,
    document: Document<'a>,
    base_url: Option<Url>,
    candidates: IndexMap<&'static str, Vec<FieldValue>>,
}

impl<'a> ItemLoader<'a> {
    /// Bind a (possibly partially filled) record to a document.
    pub fn new(record: Record, document: Document<'a>) -> Self {
        Self {
            record,
            document,
            base_url: None,
            candidates: IndexMap::new(),
        }
    }

    /// URL of the response the document came from; relative links resolve
    /// against it.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Url::parse(url).ok();
        self
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn document(&self) -> Document<'a> {
        self.document
    }

    /// Resolve `href` against the base URL, if any.
    pub fn urljoin(&self, href: &str) -> String {
        self.base_url
            .as_ref()
            .and_then(|base| base.join(href.trim()).ok())
            .map_or_else(|| href.trim().to_string(), |u| u.to_string())
    }

    fn slot(&mut self, field: &str) -> ItemResult<&mut Vec<FieldValue>> {
        let spec = self.record.spec(field)?;
        Ok(self.candidates.entry(spec.name).or_default())
    }

    /// Add a literal candidate. Lists are flattened into one candidate per item.
    pub fn add_value(&mut self, field: &str, value: impl Into<FieldValue>) -> ItemResult<()> {
        let slot = self.slot(field)?;
        push_flat(slot, value.into());
        Ok(())
    }

    pub fn add_values<I>(&mut self, field: &str, values: I) -> ItemResult<()>
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        let slot = self.slot(field)?;
        for value in values {
            push_flat(slot, value.into());
        }
        Ok(())
    }

    /// Add every match of a CSS query as a candidate.
    pub fn add_css(&mut self, field: &str, selector: &str) -> ExtractResult<()> {
        let values = self.get_css(selector)?;
        self.add_values(field, values)?;
        Ok(())
    }

    /// Add every match of a JSON path as a candidate.
    pub fn add_path(&mut self, field: &str, path: &str) -> ExtractResult<()> {
        let values = self.get_path(path)?;
        self.add_values(field, values)?;
        Ok(())
    }

    /// Run a CSS query without registering anything.
    pub fn get_css(&self, selector: &str) -> ExtractResult<Vec<FieldValue>> {
        Ok(query_css(self.document, selector)?
            .into_iter()
            .map(FieldValue::Text)
            .collect())
    }

    /// Run a JSON path without registering anything. Arrays are flattened.
    pub fn get_path(&self, path: &str) -> ExtractResult<Vec<FieldValue>> {
        let mut values = Vec::new();
        for value in query_path(self.document, path)? {
            if let Some(value) = FieldValue::from_json(value) {
                push_flat(&mut values, value);
            }
        }
        Ok(values)
    }

    /// Register an ordered extraction plan.
    pub fn apply(&mut self, rules: &[Rule]) -> ExtractResult<()> {
        for rule in rules {
            match rule.query {
                Query::Css(selector) => self.add_css(rule.field, selector)?,
                Query::Path(path) => self.add_path(rule.field, path)?,
            }
        }
        Ok(())
    }

    /// Reduce all candidates into the bound record.
    pub fn finalize(self) -> ItemResult<Record> {
        let Self {
            mut record,
            candidates,
            ..
        } = self;

        for (name, raw) in candidates {
            let spec = record.spec(name)?;
            let mut normalized = raw
                .into_iter()
                .filter_map(|candidate| run_pipeline(&spec.import_pipeline, candidate));

            if spec.is_list() {
                let mut items = match record.get(name) {
                    Some(FieldValue::List(prior)) => prior.clone(),
                    _ => Vec::new(),
                };
                for value in normalized {
                    push_flat(&mut items, value);
                }
                if !items.is_empty() {
                    record.assign(name, FieldValue::List(items))?;
                }
            } else if !record.contains(name) {
                if let Some(value) = normalized.next() {
                    record.assign(name, value)?;
                }
            }
        }

        record.apply_defaults();
        record.check_required()?;
        debug!(kind = %record.kind(), fields = record.len(), "record finalized");
        Ok(record)
    }
}

fn push_flat(out: &mut Vec<FieldValue>, value: FieldValue) {
    match value {
        FieldValue::List(items) => out.extend(items),
        other => out.push(other),
    }
}
