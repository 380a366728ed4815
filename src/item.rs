//! Typed record engine
//!
//! A [`Record`] only ever stores values whose runtime type matches the
//! declared [`SemanticType`](crate::fields::SemanticType) of the field.
//! Every write goes through [`Record::assign`], so downstream code never has
//! to re-validate.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::{ItemError, ItemResult};
use crate::fields::{Export, FieldSpec, RecordKind, Setter};
use crate::value::{format_date, FieldValue};

/// One game or rating, filled in incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    values: IndexMap<&'static str, FieldValue>,
}

impl Record {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            values: IndexMap::new(),
        }
    }

    pub fn game() -> Self {
        Self::new(RecordKind::Game)
    }

    pub fn rating() -> Self {
        Self::new(RecordKind::Rating)
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Look up the declaration of a field of this record's kind.
    pub fn spec(&self, name: &str) -> ItemResult<&'static FieldSpec> {
        self.kind.field(name).ok_or_else(|| ItemError::UnknownField {
            kind: self.kind,
            field: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn unset(&mut self, name: &str) -> Option<FieldValue> {
        self.values.shift_remove(name)
    }

    /// Store a value after running the field's setter and type check.
    ///
    /// A value of the wrong type goes through the field's converter once. A
    /// converter that yields no value leaves the field unset. A value that is
    /// still the wrong type is a [`ItemError::TypeContractViolation`].
    pub fn assign(&mut self, name: &str, value: impl Into<FieldValue>) -> ItemResult<()> {
        let spec = self.spec(name)?;
        let value = apply_setter(spec.setter, value.into());

        let value = match value {
            Some(v) if spec.semantic_type.matches(&v) => v,
            Some(v) => {
                let Some(converter) = spec.converter else {
                    return Err(violation(spec, &v));
                };
                match converter.apply(v).and_then(|c| apply_setter(spec.setter, c)) {
                    Some(c) if spec.semantic_type.matches(&c) => c,
                    Some(c) => return Err(violation(spec, &c)),
                    None => {
                        self.values.shift_remove(spec.name);
                        return Ok(());
                    }
                }
            }
            None => {
                self.values.shift_remove(spec.name);
                return Ok(());
            }
        };

        self.values.insert(spec.name, value);
        Ok(())
    }

    /// Builder-style [`assign`](Self::assign).
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> ItemResult<Self> {
        self.assign(name, value)?;
        Ok(self)
    }

    /// Build a record from loosely-typed input, e.g. a CSV row or a JSON
    /// line written by an earlier run.
    ///
    /// Null and empty values are skipped. A value that breaks the type
    /// contract is retried once through the field's import parser.
    pub fn parse_loose(kind: RecordKind, raw: &Map<String, Value>) -> ItemResult<Self> {
        let mut record = Self::new(kind);

        for spec in kind.fields() {
            let Some(value) = raw.get(spec.name).and_then(FieldValue::from_json) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }

            match record.assign(spec.name, value.clone()) {
                Ok(()) => {}
                Err(err @ ItemError::TypeContractViolation { .. }) => {
                    let Some(parser) = spec.import_parser else {
                        return Err(err);
                    };
                    if let Some(parsed) = parser.apply(value) {
                        record.assign(spec.name, parsed)?;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(record)
    }

    /// Keep only declared, truthy fields of already-normalized input.
    ///
    /// Values are type checked but not re-parsed.
    pub fn clean_partial(kind: RecordKind, raw: &Map<String, Value>) -> ItemResult<Self> {
        let entries = raw
            .iter()
            .filter_map(|(k, v)| FieldValue::from_json(v).map(|v| (k.as_str(), v)));
        Self::clean_entries(kind, entries)
    }

    /// [`clean_partial`](Self::clean_partial) applied to this record's own values.
    pub fn clean(&self) -> ItemResult<Self> {
        Self::clean_entries(self.kind, self.values.iter().map(|(k, v)| (*k, v.clone())))
    }

    fn clean_entries<'a>(
        kind: RecordKind,
        entries: impl IntoIterator<Item = (&'a str, FieldValue)>,
    ) -> ItemResult<Self> {
        let mut record = Self::new(kind);
        for (name, value) in entries {
            if kind.field(name).is_none() || !value.is_truthy() {
                continue;
            }
            record.assign(name, value)?;
            // a converter may turn a truthy raw value into a falsy one
            if record.get(name).is_some_and(|v| !v.is_truthy()) {
                record.unset(name);
            }
        }
        Ok(record)
    }

    /// Fill every unset field that declares a default.
    pub fn apply_defaults(&mut self) {
        for spec in self.kind.fields() {
            if self.values.contains_key(spec.name) {
                continue;
            }
            if let Some(value) = spec.default.resolve() {
                self.values.insert(spec.name, value);
            }
        }
    }

    /// Fail on the first required field that is still unset.
    pub fn check_required(&self) -> ItemResult<()> {
        match self
            .kind
            .fields()
            .iter()
            .find(|spec| spec.required && !self.values.contains_key(spec.name))
        {
            Some(spec) => Err(ItemError::MissingRequiredField {
                kind: self.kind,
                field: spec.name,
            }),
            None => Ok(()),
        }
    }

    /// Flat output mapping in declaration order; unset fields are absent.
    pub fn export(&self) -> IndexMap<&'static str, Value> {
        self.kind
            .fields()
            .iter()
            .filter_map(|spec| {
                let value = self.values.get(spec.name)?;
                Some((spec.name, export_value(spec.export, value)))
            })
            .collect()
    }

    /// One line of a JSON Lines feed.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let exported = self.export();
        let mut map = serializer.serialize_map(Some(exported.len()))?;
        for (k, v) in &exported {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn violation(spec: &FieldSpec, value: &FieldValue) -> ItemError {
    ItemError::TypeContractViolation {
        field: spec.name,
        expected: spec.semantic_type,
        actual: value.type_name(),
    }
}

fn apply_setter(setter: Setter, value: FieldValue) -> Option<FieldValue> {
    match (setter, value) {
        (Setter::DedupList, FieldValue::List(items)) => {
            let items = dedup_list(items);
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        (_, value) => Some(value),
    }
}

/// Drop falsy entries and repeats, keeping first-seen order.
pub fn dedup_list(items: impl IntoIterator<Item = FieldValue>) -> Vec<FieldValue> {
    let mut out: Vec<FieldValue> = Vec::new();
    for item in items {
        if item.is_truthy() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn export_value(export: Export, value: &FieldValue) -> Value {
    match (export, value) {
        (Export::BoolAsInt, FieldValue::Bool(b)) => Value::from(i64::from(*b)),
        (Export::IsoDate, FieldValue::Date(d)) => Value::String(format_date(d)),
        (Export::JsonList, FieldValue::List(items)) => {
            Value::Array(items.iter().map(FieldValue::to_json).collect())
        }
        _ => value.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::SemanticType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn loose(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_assign_matching_type() {
        let mut record = Record::game();
        record.assign("name", "Catan").unwrap();
        record.assign("min_players", 3).unwrap();
        assert_eq!(record.get("name"), Some(&FieldValue::Text("Catan".into())));
        assert_eq!(record.get("min_players"), Some(&FieldValue::Int(3)));
    }

    #[test]
    fn test_assign_converts() {
        let mut record = Record::game();
        record.assign("year", "1995").unwrap();
        record.assign("avg_rating", 7).unwrap();
        assert_eq!(record.get("year"), Some(&FieldValue::Int(1995)));
        assert_eq!(record.get("avg_rating"), Some(&FieldValue::Float(7.0)));

        record.assign("year", "unknown").unwrap();
        assert!(!record.contains("year"));
    }

    #[test]
    fn test_assign_rejects_non_finite_floats() {
        let mut record = Record::game();
        record.assign("avg_rating", 7.5).unwrap();
        record.assign("avg_rating", f64::NAN).unwrap();
        assert!(!record.contains("avg_rating"));

        record.assign("stddev_rating", f64::INFINITY).unwrap();
        assert!(!record.contains("stddev_rating"));
        assert!(!record.to_json_line().unwrap().contains("null"));
    }

    #[test]
    fn test_assign_type_contract_violation() {
        let mut record = Record::game();
        let err = record.assign("name", 5).unwrap_err();
        assert_eq!(
            err,
            ItemError::TypeContractViolation {
                field: "name",
                expected: SemanticType::Text,
                actual: "int",
            }
        );
        assert!(record.assign("published_at", "2020-01-01").is_err());
        assert!(matches!(
            record.assign("nope", 1),
            Err(ItemError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_list_setter_dedups() {
        let mut record = Record::game();
        record
            .assign("designer", vec!["b", "a", "b", "", "c"])
            .unwrap();
        assert_eq!(
            record.get("designer"),
            Some(&FieldValue::from(vec!["b", "a", "c"]))
        );
    }

    #[test]
    fn test_parse_loose_falls_back_to_parser() {
        let raw = loose(json!({
            "name": "Catan",
            "designer": r#"["Klaus Teuber"]"#,
            "published_at": "2019-03-01T00:00:00Z",
            "cooperative": "no",
            "year": "1995",
            "rank": "",
            "bogus": "ignored",
        }));
        let record = Record::parse_loose(RecordKind::Game, &raw).unwrap();
        assert_eq!(record.get("designer"), Some(&FieldValue::from(vec!["Klaus Teuber"])));
        assert_eq!(
            record.get("published_at"),
            Some(&FieldValue::Date(Utc.with_ymd_and_hms(2019, 3, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(record.get("cooperative"), Some(&FieldValue::Bool(false)));
        assert_eq!(record.get("year"), Some(&FieldValue::Int(1995)));
        assert!(!record.contains("rank"));
    }

    #[test]
    fn test_parse_loose_unparseable_list_is_skipped() {
        let raw = loose(json!({"name": "Catan", "designer": "not json"}));
        let record = Record::parse_loose(RecordKind::Game, &raw).unwrap();
        assert!(!record.contains("designer"));
    }

    #[test]
    fn test_clean_partial_filters() {
        let raw = loose(json!({
            "name": "Catan",
            "rank": 0,
            "url": "",
            "designer": [],
            "unknown": "x",
        }));
        let record = Record::clean_partial(RecordKind::Game, &raw).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.clean().unwrap(), record);
    }

    #[test]
    fn test_defaults_and_required() {
        let mut record = Record::game();
        assert_eq!(
            record.check_required(),
            Err(ItemError::MissingRequiredField {
                kind: RecordKind::Game,
                field: "name",
            })
        );
        record.assign("name", "Catan").unwrap();
        record.apply_defaults();
        assert!(record.check_required().is_ok());
        assert_eq!(record.get("num_votes"), Some(&FieldValue::Int(0)));
        assert!(record.get("scraped_at").and_then(FieldValue::as_date).is_some());
        assert!(!record.contains("rank"));
    }

    #[test]
    fn test_export_shape() {
        let record = Record::rating()
            .with("bgg_user_owned", true)
            .unwrap()
            .with("bgg_user_want_to_buy", "no")
            .unwrap()
            .with("bgg_user_name", "alice")
            .unwrap()
            .with("scraped_at", Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap())
            .unwrap();

        let line = record.to_json_line().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            parsed,
            json!({
                "bgg_user_name": "alice",
                "bgg_user_owned": 1,
                "bgg_user_want_to_buy": 0,
                "scraped_at": "2020-05-06T07:08:09Z",
            })
        );
        let keys: Vec<_> = record.export().keys().copied().collect();
        assert_eq!(keys, vec!["bgg_user_name", "bgg_user_owned", "bgg_user_want_to_buy", "scraped_at"]);
    }

    #[test]
    fn test_export_lists_as_arrays() {
        let record = Record::game()
            .with("name", "Catan")
            .unwrap()
            .with("designer", vec!["Klaus Teuber"])
            .unwrap()
            .with("image_url", vec!["http://a/1.jpg", "http://a/2.jpg"])
            .unwrap();
        let exported = record.export();
        assert_eq!(exported["designer"], json!(["Klaus Teuber"]));
        assert_eq!(exported["image_url"], json!(["http://a/1.jpg", "http://a/2.jpg"]));
    }

    #[test]
    fn test_json_line_reads_back() {
        let record = Record::game()
            .with("name", "Catan")
            .unwrap()
            .with("year", 1995)
            .unwrap()
            .with("avg_rating", 7.5)
            .unwrap()
            .with("cooperative", true)
            .unwrap()
            .with("compilation", false)
            .unwrap()
            .with("published_at", Utc.with_ymd_and_hms(2019, 3, 1, 12, 30, 0).unwrap())
            .unwrap()
            .with("designer", vec!["Klaus Teuber", "Benjamin Teuber"])
            .unwrap();

        let line = record.to_json_line().unwrap();
        let raw: Map<String, Value> = serde_json::from_str(&line).unwrap();
        assert_eq!(Record::parse_loose(RecordKind::Game, &raw).unwrap(), record);
    }
}
