//! Canonical serialization of parameter state.
//!
//! The canonical form is a JSON object with keys sorted lexicographically,
//! no whitespace, and numbers in shortest round-trip form (JCS-style). It is
//! a direct input to seed derivation, so it must never depend on insertion
//! order or formatting settings.

use crate::error::ParamResult;
use crate::params::{ParameterState, Section, PARAMETERS};

impl ParameterState {
    /// Returns the canonical string for the full state.
    pub fn canonical_string(&self) -> String {
        let mut entries: Vec<(&'static str, f64)> = PARAMETERS
            .iter()
            .map(|spec| (spec.name, self.get(spec.name).unwrap_or(spec.default)))
            .collect();
        canonical_object(&mut entries)
    }

    /// Returns the canonical string for a single section.
    ///
    /// Used to key caches that only depend on part of the state.
    pub fn canonical_section(&self, section: Section) -> String {
        let mut entries: Vec<(&'static str, f64)> = self.section_values(section).collect();
        canonical_object(&mut entries)
    }

    /// Parses a preset or shared-link payload.
    ///
    /// Keys may appear in any order; missing keys take defaults; unknown keys
    /// and out-of-range values are rejected.
    pub fn from_json_str(json: &str) -> ParamResult<Self> {
        let state: ParameterState = serde_json::from_str(json)?;
        state.validate()?;
        Ok(state)
    }

    /// Serializes the state as pretty JSON for preset files.
    pub fn to_json_pretty(&self) -> ParamResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn canonical_object(entries: &mut [(&'static str, f64)]) -> String {
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let pairs: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}:{}", format_jcs_string(k), format_jcs_number(*v)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

/// Formats a number according to JCS rules.
pub(crate) fn format_jcs_number(f: f64) -> String {
    if f.is_nan() || f.is_infinite() {
        return "null".to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    // Display for f64 is the shortest string that round-trips.
    let s = format!("{}", f);
    if s.contains('.') && !s.contains('e') && !s.contains('E') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.');
        return trimmed.to_string();
    }
    s
}

/// Formats a string according to JCS rules.
pub(crate) fn format_jcs_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result.push('"');
    result
}
