use chrono::NaiveDate;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;

use ncsr_core::{AppError, AppResult};

use super::{FilingMetadata, ParsedFact};

static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("title regex"));

static ENTITY_CIK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)scheme="[^"]*cik"[^>]*>(\d+)"#).expect("cik regex"));

/// An XBRL context: the (entity, period) tuple facts reference by id
#[derive(Debug, Clone, Default)]
pub struct XbrlContext {
    pub id: String,
    pub entity_identifier: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub period_instant: Option<NaiveDate>,
}

/// Extract one fact per `ix:nonFraction` / `ix:nonNumeric` / `ix:fraction`
/// element, with periods and entity resolved from the referenced contexts.
pub fn parse_inline_xbrl(content: &str) -> AppResult<Vec<ParsedFact>> {
    let contexts = parse_contexts(content)?;
    parse_facts(content, &contexts)
}

fn new_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    // Inline XBRL lives inside XHTML; end-name checking is too strict for
    // the HTML that surrounds the facts
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text(true);
    reader
}

fn local_name_lower(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).to_lowercase()
}

fn is_fact_element(local_name: &str) -> bool {
    matches!(local_name, "nonfraction" | "nonnumeric" | "fraction")
}

/// Resolve `<xbrli:context>` (or `<ix:context>`) elements keyed by id
pub fn parse_contexts(content: &str) -> AppResult<HashMap<String, XbrlContext>> {
    #[derive(Clone, Copy)]
    enum Capture {
        Identifier,
        StartDate,
        EndDate,
        Instant,
    }

    let mut reader = new_reader(content);
    let mut contexts = HashMap::new();
    let mut current: Option<XbrlContext> = None;
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name_lower(&e);
                if local == "context" {
                    if let Some(id) = attribute_value(&e, "id") {
                        current = Some(XbrlContext {
                            id,
                            ..XbrlContext::default()
                        });
                    }
                } else if current.is_some() {
                    capture = match local.as_str() {
                        "identifier" => Some(Capture::Identifier),
                        "startdate" => Some(Capture::StartDate),
                        "enddate" => Some(Capture::EndDate),
                        "instant" => Some(Capture::Instant),
                        _ => None,
                    };
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(context), Some(capture)) = (current.as_mut(), capture) {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    let text = text.trim();
                    match capture {
                        Capture::Identifier => {
                            context.entity_identifier = Some(text.to_string());
                        }
                        Capture::StartDate => context.period_start = parse_date(text),
                        Capture::EndDate => context.period_end = parse_date(text),
                        Capture::Instant => context.period_instant = parse_date(text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if local == "context" {
                    if let Some(context) = current.take() {
                        contexts.insert(context.id.clone(), context);
                    }
                }
                capture = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::parser_error(format!(
                    "XML error while resolving contexts: {}",
                    e
                )))
            }
        }
    }

    Ok(contexts)
}

struct PendingFact {
    concept: String,
    numeric: bool,
    unit_ref: Option<String>,
    context_ref: Option<String>,
    decimals: Option<i32>,
    scale: Option<i32>,
    precision: Option<i32>,
    sign: Option<String>,
    additional: serde_json::Map<String, serde_json::Value>,
    text: String,
    depth: u32,
}

fn parse_facts(
    content: &str,
    contexts: &HashMap<String, XbrlContext>,
) -> AppResult<Vec<ParsedFact>> {
    let mut reader = new_reader(content);
    let mut facts = Vec::new();
    let mut pending: Option<PendingFact> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if let Some(fact) = pending.as_mut() {
                    fact.depth += 1;
                } else {
                    let local = local_name_lower(&e);
                    if is_fact_element(&local) {
                        pending = begin_fact(&e, &local);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if pending.is_none() {
                    let local = local_name_lower(&e);
                    if is_fact_element(&local) {
                        if let Some(fact) = begin_fact(&e, &local) {
                            facts.push(finish_fact(fact, contexts));
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(fact) = pending.as_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    if !fact.text.is_empty() {
                        fact.text.push(' ');
                    }
                    fact.text.push_str(text.trim());
                }
            }
            Ok(Event::End(_)) => {
                if let Some(mut fact) = pending.take() {
                    if fact.depth == 0 {
                        facts.push(finish_fact(fact, contexts));
                    } else {
                        fact.depth -= 1;
                        pending = Some(fact);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::parser_error(format!(
                    "XML error while extracting facts: {}",
                    e
                )))
            }
        }
    }

    Ok(facts)
}

fn begin_fact(element: &BytesStart<'_>, local_name: &str) -> Option<PendingFact> {
    let mut fact = PendingFact {
        concept: String::new(),
        numeric: matches!(local_name, "nonfraction" | "fraction"),
        unit_ref: None,
        context_ref: None,
        decimals: None,
        scale: None,
        precision: None,
        sign: None,
        additional: serde_json::Map::new(),
        text: String::new(),
        depth: 0,
    };

    for attribute in element.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
        let value = attribute
            .unescape_value()
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attribute.value).into_owned());

        match key.to_lowercase().as_str() {
            "name" => fact.concept = value,
            "unitref" => fact.unit_ref = Some(value),
            "contextref" => fact.context_ref = Some(value),
            "decimals" => {
                // INF is a sentinel for exact values; stored as null
                if !value.eq_ignore_ascii_case("inf") {
                    fact.decimals = value.trim().parse().ok();
                }
            }
            "scale" => fact.scale = value.trim().parse().ok(),
            "precision" => fact.precision = value.trim().parse().ok(),
            "sign" => fact.sign = Some(value),
            _ => {
                fact.additional
                    .insert(key, serde_json::Value::String(value));
            }
        }
    }

    if fact.concept.is_empty() {
        return None;
    }
    Some(fact)
}

fn finish_fact(fact: PendingFact, contexts: &HashMap<String, XbrlContext>) -> ParsedFact {
    let raw_value = fact.text.trim().to_string();
    let value = if fact.numeric {
        scale_numeric_value(&raw_value, fact.scale, fact.sign.as_deref())
    } else {
        raw_value
    };

    let context = fact
        .context_ref
        .as_ref()
        .and_then(|id| contexts.get(id));

    ParsedFact {
        concept: fact.concept,
        value: Some(value),
        unit_ref: fact.unit_ref,
        context_ref: fact.context_ref,
        period_start: context.and_then(|c| c.period_start),
        period_end: context.and_then(|c| c.period_end),
        period_instant: context.and_then(|c| c.period_instant),
        entity_identifier: context.and_then(|c| c.entity_identifier.clone()),
        decimals: fact.decimals,
        scale: fact.scale,
        precision: fact.precision,
        additional_attributes: fact.additional,
    }
}

/// Apply the scale attribute to a numeric fact value and honor the sign.
/// Values that do not parse as numbers are kept verbatim.
fn scale_numeric_value(raw: &str, scale: Option<i32>, sign: Option<&str>) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();

    let Ok(mut value) = cleaned.parse::<f64>() else {
        return raw.to_string();
    };

    if let Some(scale) = scale {
        value *= 10f64.powi(scale);
    }
    if sign == Some("-") {
        value = -value;
    }

    format!("{}", value)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn attribute_value(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).to_lowercase();
            key.rsplit(':').next() == Some(&name.to_lowercase())
        })
        .map(|a| {
            a.unescape_value()
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

/// Sniff what little metadata a pure inline XBRL document exposes: the HTML
/// title and the entity CIK from context schemes.
pub fn sniff_metadata(content: &str) -> Option<FilingMetadata> {
    let title = TITLE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let cik = ENTITY_CIK
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    if title.is_none() && cik.is_none() {
        return None;
    }

    let mut metadata = FilingMetadata {
        company_name: title.clone(),
        cik,
        ..FilingMetadata::default()
    };
    if let Some(title) = title {
        metadata.additional.insert("title".to_string(), title);
    }
    Some(metadata)
}
