//! Value normalizers
//!
//! Pure functions that turn raw candidates into typed values. Every
//! normalizer is total: malformed input yields `None`, never an error.
//! Pipelines run left to right and stop at the first `None` or empty value.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::{Captures, Regex};
use url::Url;

use crate::value::FieldValue;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").expect("valid tag pattern"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("valid entity pattern")
});

const TRUE_VALUES: &[&str] = &["true", "t", "yes", "y", "1", "on"];
const FALSE_VALUES: &[&str] = &["false", "f", "no", "n", "0", "off"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H-%M-%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y",
];

/// One step of an import pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalizer {
    /// Render any value as text
    Text,
    /// Remove HTML tags and comments
    StripMarkup,
    /// Decode HTML character references
    ReplaceEntities,
    /// Collapse runs of whitespace
    NormalizeSpace { preserve_newline: bool },
    ParseInt,
    ParseFloat,
    ParseBool,
    ParseDate,
    ParseJsonList,
    /// Inclusive numeric bounds; either side may be open
    Range { lower: Option<f64>, upper: Option<f64> },
    /// Zero, `false` and empty values have no value
    NonZero,
    ExtractBggId,
    ExtractBgaId,
    /// Take one query parameter from a URL
    QueryParam(&'static str),
}

impl Normalizer {
    pub fn apply(&self, value: FieldValue) -> Option<FieldValue> {
        match self {
            Self::Text => Some(FieldValue::Text(value.to_text())),
            Self::StripMarkup => Some(map_text(value, strip_markup)),
            Self::ReplaceEntities => Some(map_text(value, replace_entities)),
            Self::NormalizeSpace { preserve_newline } => {
                Some(map_text(value, |s| normalize_space(s, *preserve_newline)))
            }
            Self::ParseInt => parse_int(&value).map(FieldValue::Int),
            Self::ParseFloat => parse_float(&value).map(FieldValue::Float),
            Self::ParseBool => parse_bool(&value).map(FieldValue::Bool),
            Self::ParseDate => parse_date(&value).map(FieldValue::Date),
            Self::ParseJsonList => parse_json_list(&value).map(FieldValue::List),
            Self::Range { lower, upper } => validate_range(value, *lower, *upper),
            Self::NonZero => value.is_truthy().then_some(value),
            Self::ExtractBggId => match value {
                FieldValue::Int(id) => Some(FieldValue::Int(id)),
                other => extract_bgg_id(&other.to_text()).map(FieldValue::Int),
            },
            Self::ExtractBgaId => extract_bga_id(&value.to_text()).map(FieldValue::Text),
            Self::QueryParam(name) => {
                extract_query_param(&value.to_text(), name).map(FieldValue::Text)
            }
        }
    }
}

/// Run a value through a pipeline, stopping at the first empty result.
pub fn run_pipeline(pipeline: &[Normalizer], value: FieldValue) -> Option<FieldValue> {
    let mut current = value;
    for step in pipeline {
        if current.is_empty() {
            return None;
        }
        current = step.apply(current)?;
    }
    (!current.is_empty()).then_some(current)
}

fn map_text(value: FieldValue, f: impl Fn(&str) -> String) -> FieldValue {
    match value {
        FieldValue::Text(s) => FieldValue::Text(f(&s)),
        other => other,
    }
}

pub fn strip_markup(text: &str) -> String {
    TAG_RE.replace_all(text, "").into_owned()
}

pub fn replace_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            decode_entity(&caps[1]).map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse().ok().and_then(char::from_u32);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "times" => '×',
        "auml" => 'ä',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "szlig" => 'ß',
        "eacute" => 'é',
        "egrave" => 'è',
        "aacute" => 'á',
        "agrave" => 'à',
        _ => return None,
    };
    Some(c)
}

/// Collapse whitespace runs to a single space and trim.
///
/// With `preserve_newline`, each line is collapsed separately and line
/// breaks survive; blank lines are squeezed to one.
pub fn normalize_space(text: &str, preserve_newline: bool) -> String {
    if !preserve_newline {
        return text.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn numeric_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '_' && *c != '\'')
        .collect()
}

/// Parse an integer, tolerating thousands separators and a fractional part.
pub fn parse_int(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Int(i) => Some(*i),
        FieldValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        FieldValue::Bool(b) => Some(i64::from(*b)),
        FieldValue::Text(s) => {
            let cleaned = numeric_text(s);
            cleaned.parse::<i64>().ok().or_else(|| {
                let f = cleaned.parse::<f64>().ok().filter(|f| f.is_finite())?;
                Some(f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Parse a finite float, tolerating thousands separators.
pub fn parse_float(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(f) => f.is_finite().then_some(*f),
        FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        FieldValue::Text(s) => numeric_text(s).parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub fn parse_bool(value: &FieldValue) -> Option<bool> {
    match value {
        FieldValue::Bool(b) => Some(*b),
        FieldValue::Int(i) => Some(*i != 0),
        FieldValue::Float(f) => Some(*f != 0.0),
        FieldValue::Text(s) => {
            let token = s.trim().to_lowercase();
            if TRUE_VALUES.contains(&token.as_str()) {
                Some(true)
            } else if FALSE_VALUES.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parse a timestamp into UTC. Naive inputs are taken as UTC; numbers are
/// seconds since the epoch.
pub fn parse_date(value: &FieldValue) -> Option<DateTime<Utc>> {
    match value {
        FieldValue::Date(d) => Some(*d),
        FieldValue::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
        FieldValue::Float(secs) if secs.is_finite() => {
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        }
        FieldValue::Text(s) => parse_date_str(s.trim()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(d) = DateTime::parse_from_str(s, fmt) {
            return Some(d.with_timezone(&Utc));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        }
    }
    None
}

/// Parse a JSON-encoded array. Lists pass through.
pub fn parse_json_list(value: &FieldValue) -> Option<Vec<FieldValue>> {
    match value {
        FieldValue::List(items) => Some(items.clone()),
        FieldValue::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json @ serde_json::Value::Array(_)) => match FieldValue::from_json(&json) {
                Some(FieldValue::List(items)) => Some(items),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// Keep a numeric value only if it lies within `[lower, upper]`.
pub fn validate_range(
    value: FieldValue,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Option<FieldValue> {
    let n = value.as_f64()?;
    if lower.is_some_and(|lo| n < lo) || upper.is_some_and(|hi| n > hi) {
        return None;
    }
    Some(value)
}

pub fn extract_query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// BoardGameGeek ID from a URL like `https://boardgamegeek.com/boardgame/13/catan`.
pub fn extract_bgg_id(url: &str) -> Option<i64> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !host.ends_with("boardgamegeek.com") {
        return None;
    }
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0].starts_with("boardgame") || pair[0] == "thing")
        .and_then(|pair| pair[1].parse().ok())
        .filter(|id: &i64| *id > 0)
}

/// Board Game Atlas ID from a URL like
/// `https://www.boardgameatlas.com/game/OIXt3DmJU0/catan`, or its `ids` query
/// parameter.
pub fn extract_bga_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !host.ends_with("boardgameatlas.com") {
        return None;
    }
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == "game")
        .map(|pair| pair[1].to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| extract_query_param(url, "ids"))
        .or_else(|| extract_query_param(url, "game-id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(&text("1,234")), Some(1234));
        assert_eq!(parse_int(&text(" 42 ")), Some(42));
        assert_eq!(parse_int(&text("7.9")), Some(7));
        assert_eq!(parse_int(&text("-12")), Some(-12));
        assert_eq!(parse_int(&text("abc")), None);
        assert_eq!(parse_int(&text("")), None);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(&text("1,234.5")), Some(1234.5));
        assert_eq!(parse_float(&FieldValue::Int(3)), Some(3.0));
        assert_eq!(parse_float(&text("NaN")), None);
        assert_eq!(parse_float(&text("n/a")), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(&text("yes")), Some(true));
        assert_eq!(parse_bool(&text("TRUE")), Some(true));
        assert_eq!(parse_bool(&text("0")), Some(false));
        assert_eq!(parse_bool(&text("no")), Some(false));
        assert_eq!(parse_bool(&text("maybe")), None);
    }

    #[test]
    fn test_parse_date() {
        let expected = Utc.with_ymd_and_hms(2019, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_date(&text("2019-03-01T12:30:00Z")), Some(expected));
        assert_eq!(parse_date(&text("2019-03-01T14:30:00+02:00")), Some(expected));
        assert_eq!(parse_date(&text("2019-03-01 12:30:00")), Some(expected));
        assert_eq!(parse_date(&text("2019-03-01T12-30-00")), Some(expected));
        assert_eq!(
            parse_date(&text("2019-03-01")),
            Some(Utc.with_ymd_and_hms(2019, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date(&text("not a date")), None);
        assert_eq!(parse_date(&text("2019-13-45")), None);
    }

    #[test]
    fn test_parse_json_list() {
        assert_eq!(
            parse_json_list(&text(r#"["a", "b"]"#)),
            Some(vec![text("a"), text("b")])
        );
        assert_eq!(parse_json_list(&text(r#"{"a": 1}"#)), None);
        assert_eq!(parse_json_list(&text("[1, 2")), None);
    }

    #[test]
    fn test_validate_range_bounds_inclusive() {
        let check = |v: i64| validate_range(FieldValue::Int(v), Some(1.0), Some(10.0));
        assert_eq!(check(1), Some(FieldValue::Int(1)));
        assert_eq!(check(10), Some(FieldValue::Int(10)));
        assert_eq!(check(0), None);
        assert_eq!(check(11), None);
        assert_eq!(validate_range(text("5"), Some(0.0), None), None);
    }

    #[test]
    fn test_text_cleaning() {
        assert_eq!(strip_markup("<p>Hello <b>world</b></p><!-- x -->"), "Hello world");
        assert_eq!(replace_entities("Tom &amp; Jerry &#39;s &#x41; &bogus;"), "Tom & Jerry 's A &bogus;");
        assert_eq!(normalize_space("  a \t b\n c  ", false), "a b c");
        assert_eq!(normalize_space(" a  b \n\n\n c ", true), "a b\n\nc");
    }

    #[test]
    fn test_strip_markup_keeps_comparisons() {
        assert_eq!(strip_markup("Score a < b and c > d wins"), "Score a < b and c > d wins");
        assert_eq!(strip_markup("2 <3 players</b> > 1"), "2 <3 players > 1");
        assert_eq!(strip_markup("line<br/>break</ p>"), "linebreak</ p>");
    }

    #[test]
    fn test_pipeline_short_circuits() {
        let pipeline = [
            Normalizer::Text,
            Normalizer::NormalizeSpace { preserve_newline: false },
            Normalizer::ParseInt,
            Normalizer::Range { lower: Some(1.0), upper: None },
        ];
        assert_eq!(run_pipeline(&pipeline, text(" 5 ")), Some(FieldValue::Int(5)));
        assert_eq!(run_pipeline(&pipeline, text("   ")), None);
        assert_eq!(run_pipeline(&pipeline, text("0")), None);
    }

    #[test]
    fn test_identity_extraction() {
        assert_eq!(extract_bgg_id("https://boardgamegeek.com/boardgame/13/catan"), Some(13));
        assert_eq!(extract_bgg_id("https://www.boardgamegeek.com/boardgameexpansion/926"), Some(926));
        assert_eq!(extract_bgg_id("https://example.com/boardgame/13"), None);
        assert_eq!(
            extract_bga_id("https://www.boardgameatlas.com/game/OIXt3DmJU0/catan").as_deref(),
            Some("OIXt3DmJU0")
        );
        assert_eq!(
            extract_query_param("http://luding.org/cgi-bin/GameData.py?f=x&gameid=1508", "gameid")
                .as_deref(),
            Some("1508")
        );

        let url = text("http://luding.org/cgi-bin/Redirect.py?URL=https%3A%2F%2Fboardgamegeek.com%2Fboardgame%2F822");
        let link = Normalizer::QueryParam("URL").apply(url).unwrap();
        assert_eq!(Normalizer::ExtractBggId.apply(link), Some(FieldValue::Int(822)));
        assert_eq!(
            Normalizer::ExtractBgaId.apply(text("https://api.boardgameatlas.com/api/search?ids=abc")),
            Some(text("abc"))
        );
        assert_eq!(Normalizer::ExtractBggId.apply(text("not a url")), None);
    }
}
