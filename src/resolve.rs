// Column resolution: map a canonical field to the header a particular file uses

use crate::data::{Dataset, Row, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to find a canonical field among raw headers. Either a fixed name, a
/// list of keyword fragments that must all appear in the header, or both (the
/// name is tried first).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl FieldSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            keywords: Vec::new(),
        }
    }

    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            keywords: keywords.into_iter().map(|k| k.into().to_lowercase()).collect(),
        }
    }

    /// Human readable name used in "missing columns" messages.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.trim().to_string(),
            None => self.keywords.join(" + "),
        }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::named(name)
    }
}

impl From<String> for FieldSpec {
    fn from(name: String) -> Self {
        FieldSpec::named(name)
    }
}

/// Anything that exposes an ordered list of header names.
pub trait HeaderSource {
    fn header_names(&self) -> Vec<&str>;
}

impl HeaderSource for Schema {
    fn header_names(&self) -> Vec<&str> {
        self.names().iter().map(String::as_str).collect()
    }
}

impl HeaderSource for Row {
    fn header_names(&self) -> Vec<&str> {
        self.headers().collect()
    }
}

impl HeaderSource for Dataset {
    fn header_names(&self) -> Vec<&str> {
        if self.schema.is_empty() {
            self.rows.first().map(|r| r.header_names()).unwrap_or_default()
        } else {
            self.schema.header_names()
        }
    }
}

impl HeaderSource for [String] {
    fn header_names(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

impl HeaderSource for [Row] {
    fn header_names(&self) -> Vec<&str> {
        self.first().map(|r| r.header_names()).unwrap_or_default()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn has_duplicate_suffix(header: &str, name: &str) -> bool {
    match header.strip_prefix(name).and_then(|rest| rest.strip_prefix('_')) {
        Some(digits) => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Exact match only: case-insensitive, whitespace-trimmed.
pub fn resolve_exact<'a, H: HeaderSource + ?Sized>(source: &'a H, name: &str) -> Option<&'a str> {
    let wanted = normalize(name);
    source
        .header_names()
        .into_iter()
        .find(|h| normalize(h) == wanted)
}

/// Find the header that carries `field`, trying in order an exact match, a
/// match allowing a `_<digits>` duplicate suffix, and a keyword-subset match.
/// Returns `None` when nothing matches.
pub fn resolve<'a, H: HeaderSource + ?Sized>(source: &'a H, field: &FieldSpec) -> Option<&'a str> {
    let headers = source.header_names();

    if let Some(name) = &field.name {
        let wanted = normalize(name);
        if let Some(h) = headers.iter().copied().find(|h| normalize(h) == wanted) {
            return Some(h);
        }
        if let Some(h) = headers
            .iter()
            .copied()
            .find(|h| has_duplicate_suffix(&normalize(h), &wanted))
        {
            return Some(h);
        }
    }

    if !field.keywords.is_empty() {
        let keywords: Vec<String> = field.keywords.iter().map(|k| k.to_lowercase()).collect();
        return headers.into_iter().find(|h| {
            let lower = h.to_lowercase();
            keywords.iter().all(|kw| lower.contains(kw.as_str()))
        });
    }

    None
}

/// Resolve every field, or report the display names of those that failed.
pub fn resolve_all<H: HeaderSource + ?Sized>(
    source: &H,
    fields: &[FieldSpec],
) -> std::result::Result<Vec<String>, Vec<String>> {
    let mut found = Vec::with_capacity(fields.len());
    let mut missing = Vec::new();
    for field in fields {
        match resolve(source, field) {
            Some(h) => found.push(h.to_string()),
            None => missing.push(field.display_name()),
        }
    }
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_exact_case_and_whitespace() {
        let h = headers(&["  Chainage (m) ", "Elevation (m)"]);
        assert_eq!(resolve(h.as_slice(), &FieldSpec::named("chainage (m)")), Some("  Chainage (m) "));
        assert_eq!(resolve(h.as_slice(), &FieldSpec::named("Chainage (m)")), Some("  Chainage (m) "));
        assert_eq!(
            resolve(h.as_slice(), &FieldSpec::named("Chainage (m)")),
            resolve(h.as_slice(), &FieldSpec::named("chainage (m)  "))
        );
    }

    #[test]
    fn test_resolve_duplicate_suffix() {
        let h = headers(&["Distance", "Elevation (m)_1"]);
        assert_eq!(resolve(h.as_slice(), &FieldSpec::named("Elevation (m)")), Some("Elevation (m)_1"));
        // not a numeric suffix
        let h = headers(&["Elevation (m)_x"]);
        assert_eq!(resolve(h.as_slice(), &FieldSpec::named("Elevation (m)")), None);
    }

    #[test]
    fn test_exact_preferred_over_suffix() {
        let h = headers(&["Elevation (m)_1", "Elevation (m)"]);
        assert_eq!(resolve(h.as_slice(), &FieldSpec::named("elevation (m)")), Some("Elevation (m)"));
    }

    #[test]
    fn test_resolve_keywords_any_order() {
        let h = headers(&["Chainage (m)", "Wall Loss % (Worst)", "Wall Loss % (Realistic)"]);
        let spec = FieldSpec::keywords(["worst", "wall loss"]);
        assert_eq!(resolve(h.as_slice(), &spec), Some("Wall Loss % (Worst)"));
        let spec = FieldSpec::keywords(["wall loss", "general"]);
        assert_eq!(resolve(h.as_slice(), &spec), None);
    }

    #[test]
    fn test_name_falls_back_to_keywords() {
        let h = headers(&["Temperature change (°C) avg"]);
        let spec = FieldSpec {
            name: Some("Temperature change (°C)".to_string()),
            keywords: vec!["temperature change".to_string()],
        };
        assert_eq!(resolve(h.as_slice(), &spec), Some("Temperature change (°C) avg"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let h = headers(&["VirtualDistance (m)", "ACPSP_OnPotential"]);
        let spec = FieldSpec::named("virtualdistance (m)");
        let first = resolve(h.as_slice(), &spec).map(str::to_string);
        let again = first.as_deref().and_then(|name| resolve(h.as_slice(), &FieldSpec::named(name)));
        assert_eq!(first.as_deref(), again);
    }

    #[test]
    fn test_resolve_all_reports_missing() {
        let h = headers(&["Chainage (m)"]);
        let fields = vec![FieldSpec::named("Chainage (m)"), FieldSpec::named("Elevation (m)")];
        assert_eq!(resolve_all(h.as_slice(), &fields), Err(vec!["Elevation (m)".to_string()]));
        let fields = vec![FieldSpec::named("chainage (M)")];
        assert_eq!(resolve_all(h.as_slice(), &fields), Ok(vec!["Chainage (m)".to_string()]));
    }

    #[test]
    fn test_resolve_exact_only() {
        let h = headers(&["Latitude_1", "LATITUDE"]);
        assert_eq!(resolve_exact(h.as_slice(), "latitude"), Some("LATITUDE"));
        let h = headers(&["Latitude_1"]);
        assert_eq!(resolve_exact(h.as_slice(), "latitude"), None);
    }
}
