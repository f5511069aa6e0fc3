// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label and field selector matching for the fake API server.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        match self {
            Requirement::Equals(key, value) => lookup(key).as_deref() == Some(value.as_str()),
            Requirement::NotEquals(key, value) => lookup(key).as_deref() != Some(value.as_str()),
            Requirement::In(key, values) => lookup(key).is_some_and(|v| values.contains(&v)),
            Requirement::NotIn(key, values) => !lookup(key).is_some_and(|v| values.contains(&v)),
            Requirement::Exists(key) => lookup(key).is_some(),
            Requirement::DoesNotExist(key) => lookup(key).is_none(),
        }
    }
}

/// Parsed `labelSelector` query parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn parse(selector: &str) -> Result<Self, String> {
        let requirements = split_top_level(selector)
            .into_iter()
            .map(parse_label_requirement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }

    /// Match against an object's `metadata.labels`.
    pub fn matches(&self, obj: &Value) -> bool {
        let labels = obj.pointer("/metadata/labels").and_then(Value::as_object);
        self.requirements.iter().all(|r| {
            r.matches(|key| {
                labels
                    .and_then(|l| l.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        })
    }
}

/// Parsed `fieldSelector` query parameter. Only equality based operators
/// exist for fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<Requirement>,
}

impl FieldSelector {
    pub fn parse(selector: &str) -> Result<Self, String> {
        let requirements = split_top_level(selector)
            .into_iter()
            .map(|term| match parse_equality(term)? {
                Some(requirement) => Ok(requirement),
                None => Err(format!("invalid field selector: '{}'", term)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }

    /// Missing fields compare as the empty string.
    pub fn matches(&self, obj: &Value) -> bool {
        self.requirements
            .iter()
            .all(|r| r.matches(|path| Some(field_value(obj, path))))
    }
}

fn field_value(obj: &Value, path: &str) -> String {
    let pointer = format!("/{}", path.replace('.', "/"));
    match obj.pointer(&pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Split on commas that are not inside a `(...)` value set.
fn split_top_level(selector: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&selector[start..]);
    terms
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_equality(term: &str) -> Result<Option<Requirement>, String> {
    let (key, value, negated) = if let Some((key, value)) = term.split_once("!=") {
        (key, value, true)
    } else if let Some((key, value)) = term.split_once("==") {
        (key, value, false)
    } else if let Some((key, value)) = term.split_once('=') {
        (key, value, false)
    } else {
        return Ok(None);
    };

    let key = valid_key(key.trim(), term)?;
    let value = value.trim().to_string();
    Ok(Some(if negated {
        Requirement::NotEquals(key, value)
    } else {
        Requirement::Equals(key, value)
    }))
}

fn parse_label_requirement(term: &str) -> Result<Requirement, String> {
    if let Some(requirement) = parse_set(term)? {
        return Ok(requirement);
    }
    if let Some(requirement) = parse_equality(term)? {
        return Ok(requirement);
    }
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(valid_key(key.trim(), term)?));
    }
    Ok(Requirement::Exists(valid_key(term, term)?))
}

fn parse_set(term: &str) -> Result<Option<Requirement>, String> {
    let Some(open) = term.find('(') else {
        return Ok(None);
    };
    let Some(values) = term[open + 1..].strip_suffix(')') else {
        return Err(format!("unterminated value set in '{}'", term));
    };
    let values: Vec<String> = values
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();

    let head = term[..open].trim();
    if let Some(key) = head.strip_suffix(" notin") {
        return Ok(Some(Requirement::NotIn(valid_key(key.trim(), term)?, values)));
    }
    if let Some(key) = head.strip_suffix(" in") {
        return Ok(Some(Requirement::In(valid_key(key.trim(), term)?, values)));
    }
    Err(format!("unknown set operator in '{}'", term))
}

fn valid_key(key: &str, term: &str) -> Result<String, String> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid selector key in '{}'", term));
    }
    Ok(key.to_string())
}
