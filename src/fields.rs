//! Field descriptor registry
//!
//! Static declarations of every field of the two record kinds: its semantic
//! type, default, converter, import pipeline, export shape and loose-input
//! parser. Nothing here executes; the record engine and the loader read it.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::Normalizer;
use crate::value::FieldValue;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Int,
    Float,
    Bool,
    Text,
    Date,
    List,
}

impl SemanticType {
    pub fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Float, FieldValue::Float(f)) => f.is_finite(),
            (Self::Int, FieldValue::Int(_))
            | (Self::Bool, FieldValue::Bool(_))
            | (Self::Text, FieldValue::Text(_))
            | (Self::Date, FieldValue::Date(_))
            | (Self::List, FieldValue::List(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Date => "date",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// Value a field takes when nothing was extracted for it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    None,
    Value(FieldValue),
    /// Current time, evaluated at finalization
    Now,
}

impl FieldDefault {
    pub fn resolve(&self) -> Option<FieldValue> {
        match self {
            Self::None => None,
            Self::Value(v) => Some(v.clone()),
            Self::Now => Some(FieldValue::Date(Utc::now())),
        }
    }
}

/// Applied on every assignment, before the type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    Identity,
    /// Drop falsy entries and duplicates, keeping first-seen order
    DedupList,
}

/// How a stored value is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export {
    Plain,
    /// `1` / `0`
    BoolAsInt,
    /// JSON array
    JsonList,
    /// RFC 3339 string
    IsoDate,
}

/// Static declaration of one field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub required: bool,
    pub default: FieldDefault,
    pub setter: Setter,
    /// Applied when an assigned value has the wrong type
    pub converter: Option<Normalizer>,
    /// Applied by the loader to every raw candidate
    pub import_pipeline: Vec<Normalizer>,
    pub export: Export,
    /// Fallback for loose input that failed assignment
    pub import_parser: Option<Normalizer>,
}

impl FieldSpec {
    fn new(name: &'static str, semantic_type: SemanticType) -> Self {
        let export = match semantic_type {
            SemanticType::Bool => Export::BoolAsInt,
            SemanticType::List => Export::JsonList,
            SemanticType::Date => Export::IsoDate,
            _ => Export::Plain,
        };
        Self {
            name,
            semantic_type,
            required: false,
            default: FieldDefault::None,
            setter: Setter::Identity,
            converter: None,
            import_pipeline: text_pipeline(),
            export,
            import_parser: None,
        }
    }

    fn text(name: &'static str) -> Self {
        Self::new(name, SemanticType::Text)
    }

    fn list(name: &'static str) -> Self {
        Self {
            setter: Setter::DedupList,
            import_parser: Some(Normalizer::ParseJsonList),
            ..Self::new(name, SemanticType::List)
        }
    }

    fn int(name: &'static str, lower: f64) -> Self {
        Self {
            converter: Some(Normalizer::ParseInt),
            import_pipeline: numeric_pipeline(Normalizer::ParseInt, Some(lower), None),
            ..Self::new(name, SemanticType::Int)
        }
    }

    fn pos_int(name: &'static str) -> Self {
        Self::int(name, 1.0)
    }

    fn nn_int(name: &'static str) -> Self {
        Self::int(name, 0.0)
    }

    fn pos_float(name: &'static str) -> Self {
        let mut pipeline = numeric_pipeline(Normalizer::ParseFloat, Some(0.0), None);
        pipeline.push(Normalizer::NonZero);
        Self {
            converter: Some(Normalizer::ParseFloat),
            import_pipeline: pipeline,
            ..Self::new(name, SemanticType::Float)
        }
    }

    fn nn_float(name: &'static str) -> Self {
        Self {
            converter: Some(Normalizer::ParseFloat),
            import_pipeline: numeric_pipeline(Normalizer::ParseFloat, Some(0.0), None),
            ..Self::new(name, SemanticType::Float)
        }
    }

    fn flag(name: &'static str) -> Self {
        Self {
            import_pipeline: vec![Normalizer::ParseBool],
            import_parser: Some(Normalizer::ParseBool),
            ..Self::new(name, SemanticType::Bool)
        }
    }

    fn date(name: &'static str) -> Self {
        Self {
            import_pipeline: vec![Normalizer::ParseDate],
            import_parser: Some(Normalizer::ParseDate),
            ..Self::new(name, SemanticType::Date)
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn default_value(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    fn converter(mut self, converter: Normalizer) -> Self {
        self.converter = Some(converter);
        self
    }

    fn pipeline(mut self, pipeline: Vec<Normalizer>) -> Self {
        self.import_pipeline = pipeline;
        self
    }

    pub fn is_list(&self) -> bool {
        self.semantic_type == SemanticType::List
    }
}

fn text_pipeline() -> Vec<Normalizer> {
    vec![
        Normalizer::Text,
        Normalizer::StripMarkup,
        Normalizer::ReplaceEntities,
        Normalizer::ReplaceEntities,
        Normalizer::NormalizeSpace { preserve_newline: false },
    ]
}

fn numeric_pipeline(parse: Normalizer, lower: Option<f64>, upper: Option<f64>) -> Vec<Normalizer> {
    let mut pipeline = text_pipeline();
    pipeline.push(parse);
    pipeline.push(Normalizer::Range { lower, upper });
    pipeline
}

/// The two kinds of record this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Game,
    Rating,
}

impl RecordKind {
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Game => GAME_FIELDS.as_slice(),
            Self::Rating => RATING_FIELDS.as_slice(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.name == name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game => f.write_str("game"),
            Self::Rating => f.write_str("rating"),
        }
    }
}

static GAME_FIELDS: LazyLock<Vec<FieldSpec>> = LazyLock::new(|| {
    let max_year = f64::from(Utc::now().year() + 10);
    let mut year_pipeline = numeric_pipeline(Normalizer::ParseInt, Some(-4000.0), Some(max_year));
    year_pipeline.push(Normalizer::NonZero);

    vec![
        FieldSpec::text("name").required(),
        FieldSpec::list("alt_name"),
        FieldSpec::pos_int("year").pipeline(year_pipeline),
        FieldSpec::text("game_type"),
        FieldSpec::text("description").pipeline(vec![
            Normalizer::Text,
            Normalizer::StripMarkup,
            Normalizer::ReplaceEntities,
            Normalizer::ReplaceEntities,
            Normalizer::NormalizeSpace { preserve_newline: true },
        ]),
        FieldSpec::list("designer"),
        FieldSpec::list("artist"),
        FieldSpec::list("publisher"),
        FieldSpec::text("url"),
        FieldSpec::list("image_url"),
        FieldSpec::list("video_url"),
        FieldSpec::list("review_url"),
        FieldSpec::list("external_link"),
        FieldSpec::text("list_price"),
        FieldSpec::pos_int("min_players"),
        FieldSpec::pos_int("max_players"),
        FieldSpec::pos_int("min_players_rec"),
        FieldSpec::pos_int("max_players_rec"),
        FieldSpec::pos_int("min_players_best"),
        FieldSpec::pos_int("max_players_best"),
        FieldSpec::pos_int("min_age"),
        FieldSpec::pos_int("max_age"),
        FieldSpec::pos_float("min_age_rec"),
        FieldSpec::pos_float("max_age_rec"),
        FieldSpec::pos_int("min_time"),
        FieldSpec::pos_int("max_time"),
        FieldSpec::list("category"),
        FieldSpec::list("mechanic"),
        FieldSpec::flag("cooperative"),
        FieldSpec::flag("compilation"),
        FieldSpec::list("family"),
        FieldSpec::list("expansion"),
        FieldSpec::list("implementation").pipeline(vec![Normalizer::ParseInt]),
        FieldSpec::pos_int("rank"),
        FieldSpec::nn_int("num_votes").default_value(FieldDefault::Value(FieldValue::Int(0))),
        FieldSpec::pos_float("avg_rating"),
        FieldSpec::nn_float("stddev_rating"),
        FieldSpec::pos_float("bayes_rating"),
        FieldSpec::pos_int("worst_rating"),
        FieldSpec::pos_int("best_rating"),
        FieldSpec::pos_float("complexity"),
        FieldSpec::pos_int("easiest_complexity"),
        FieldSpec::pos_int("hardest_complexity"),
        FieldSpec::pos_float("language_dependency"),
        FieldSpec::pos_int("lowest_language_dependency"),
        FieldSpec::pos_int("highest_language_dependency"),
        FieldSpec::pos_int("bgg_id"),
        FieldSpec::text("freebase_id"),
        FieldSpec::text("wikidata_id"),
        FieldSpec::text("wikipedia_id"),
        FieldSpec::text("dbpedia_id"),
        FieldSpec::pos_int("luding_id"),
        FieldSpec::text("bga_id"),
        FieldSpec::date("published_at"),
        FieldSpec::date("updated_at"),
        FieldSpec::date("scraped_at").required().default_value(FieldDefault::Now),
    ]
});

static RATING_FIELDS: LazyLock<Vec<FieldSpec>> = LazyLock::new(|| {
    vec![
        FieldSpec::pos_int("bgg_id"),
        FieldSpec::text("bgg_user_name"),
        FieldSpec::text("bga_id"),
        FieldSpec::text("bga_user_id"),
        FieldSpec::text("bga_user_name"),
        FieldSpec::pos_float("bgg_user_rating"),
        FieldSpec::pos_float("bga_user_rating"),
        FieldSpec::flag("bgg_user_owned").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_prev_owned").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_for_trade").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_want_in_trade").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_want_to_play").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_want_to_buy").converter(Normalizer::ParseBool),
        FieldSpec::flag("bgg_user_preordered").converter(Normalizer::ParseBool),
        FieldSpec::pos_int("bgg_user_wishlist"),
        FieldSpec::nn_int("bgg_user_play_count")
            .default_value(FieldDefault::Value(FieldValue::Int(0))),
        FieldSpec::text("comment").pipeline(vec![
            Normalizer::Text,
            Normalizer::StripMarkup,
            Normalizer::ReplaceEntities,
            Normalizer::NormalizeSpace { preserve_newline: true },
        ]),
        FieldSpec::date("published_at"),
        FieldSpec::date("updated_at"),
        FieldSpec::date("scraped_at").required().default_value(FieldDefault::Now),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_unique() {
        for kind in [RecordKind::Game, RecordKind::Rating] {
            let names: HashSet<_> = kind.fields().iter().map(|f| f.name).collect();
            assert_eq!(names.len(), kind.fields().len(), "duplicate field in {kind}");
        }
    }

    #[test]
    fn test_registry_shapes() {
        let year = RecordKind::Game.field("year").unwrap();
        assert_eq!(year.semantic_type, SemanticType::Int);
        assert_eq!(year.converter, Some(Normalizer::ParseInt));

        let designer = RecordKind::Game.field("designer").unwrap();
        assert!(designer.is_list());
        assert_eq!(designer.setter, Setter::DedupList);
        assert_eq!(designer.export, Export::JsonList);

        let owned = RecordKind::Rating.field("bgg_user_owned").unwrap();
        assert_eq!(owned.export, Export::BoolAsInt);

        let required: Vec<_> = RecordKind::Game
            .fields()
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();
        assert_eq!(required, vec!["name", "scraped_at"]);
        assert!(RecordKind::Rating.field("name").is_none());
    }
}
