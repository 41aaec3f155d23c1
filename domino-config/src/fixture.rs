//! Fixture file parsing: the text format Domino CLI tools read for
//! inputs and write for outputs.
//!
//! A fixture is plain text: a required header line identifying which
//! domain/command it belongs to, then `key=value` lines. `# ` prefixes
//! a comment, blank lines are ignored, and unknown keys are ignored by
//! the caller rather than rejected here — the grammar is permissive by
//! design so older fixtures keep loading against a newer binary.

use std::collections::BTreeMap;

use domino_core::domain::Point;
use domino_core::fixed::{Q16, Q48};

use crate::error::{ConfigError, Result};

/// A parsed fixture: a validated header plus an ordered `key=value`
/// table. Typed accessors parse on read rather than up front, so a
/// malformed value for a key the caller never asks for is never an
/// error.
#[derive(Debug, Clone)]
pub struct Fixture {
    path: String,
    header: String,
    entries: BTreeMap<String, String>,
    digest: blake3::Hash,
}

impl Fixture {
    /// Parses `text`, requiring its first non-blank, non-comment line
    /// to equal `expected_header` exactly.
    pub fn parse(path: &str, expected_header: &str, text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("# "));

        let header = lines.next().ok_or_else(|| ConfigError::MissingHeader {
            path: path.to_string(),
            expected: expected_header.to_string(),
        })?;
        if header != expected_header {
            return Err(ConfigError::WrongHeader {
                path: path.to_string(),
                expected: expected_header.to_string(),
                found: header.to_string(),
            });
        }

        let mut entries = BTreeMap::new();
        for (offset, line) in lines.enumerate() {
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine {
                    path: path.to_string(),
                    line: offset + 2,
                    text: line.to_string(),
                });
            };
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Fixture {
            path: path.to_string(),
            header: header.to_string(),
            entries,
            digest: blake3::hash(text.as_bytes()),
        })
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Content digest of the fixture's full source text, stable across
    /// whitespace-insensitive re-reads of the same file since it hashes
    /// the text as given rather than the parsed table. Two fixtures with
    /// the same entries in a different comment/whitespace layout hash
    /// differently; that is intentional, it identifies the exact file.
    pub fn digest(&self) -> blake3::Hash {
        self.digest
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn value(&self, key: &str) -> Option<(&str, &str)> {
        self.entries.get(key).map(|v| (key, v.as_str()))
    }

    fn parse_int_literal(text: &str) -> Option<i128> {
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i128::from_str_radix(hex, 16).ok()
        } else if text.len() > 1 && text.starts_with('0') && text.bytes().all(|b| b.is_ascii_digit()) {
            i128::from_str_radix(&text[1..], 8).ok()
        } else {
            text.parse::<i128>().ok()
        }
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>> {
        let Some((k, v)) = self.value(key) else { return Ok(None) };
        let n = Self::parse_int_literal(v).ok_or_else(|| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "u32",
        })?;
        u32::try_from(n).map(Some).map_err(|_| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "u32",
        })
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        let Some((k, v)) = self.value(key) else { return Ok(None) };
        let n = Self::parse_int_literal(v).ok_or_else(|| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "u64",
        })?;
        u64::try_from(n).map(Some).map_err(|_| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "u64",
        })
    }

    pub fn q16(&self, key: &str) -> Result<Option<Q16>> {
        let Some((k, v)) = self.value(key) else { return Ok(None) };
        let f: f64 = v.parse().map_err(|_| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "Q16.16 decimal",
        })?;
        Ok(Some(Q16::from_f64(f)))
    }

    pub fn q48(&self, key: &str) -> Result<Option<Q48>> {
        let Some((k, v)) = self.value(key) else { return Ok(None) };
        let f: f64 = v.parse().map_err(|_| ConfigError::BadValue {
            path: self.path.clone(),
            line: 0,
            key: k.to_string(),
            value: v.to_string(),
            expected: "Q48.16 decimal",
        })?;
        Ok(Some(Q48::from_f64(f)))
    }

    pub fn point(&self, key: &str) -> Result<Option<Point>> {
        let Some((k, v)) = self.value(key) else { return Ok(None) };
        let parts: Vec<&str> = v.split(',').collect();
        if parts.len() != 3 {
            return Err(ConfigError::BadValue {
                path: self.path.clone(),
                line: 0,
                key: k.to_string(),
                value: v.to_string(),
                expected: "x,y,z triplet",
            });
        }
        let mut coords = [Q16::ZERO; 3];
        for (i, part) in parts.iter().enumerate() {
            let f: f64 = part.trim().parse().map_err(|_| ConfigError::BadValue {
                path: self.path.clone(),
                line: 0,
                key: k.to_string(),
                value: v.to_string(),
                expected: "x,y,z triplet",
            })?;
            coords[i] = Q16::from_f64(f);
        }
        Ok(Some(Point { x: coords[0], y: coords[1], z: coords[2] }))
    }
}

/// Writer for the CLI output side of the same grammar: a header line
/// followed by `key=value` lines, Q-values tagged with a `_q16`/`_q48`
/// suffix and printed as their raw signed integer.
#[derive(Debug, Default)]
pub struct FixtureWriter {
    header: String,
    lines: Vec<String>,
}

impl FixtureWriter {
    pub fn new(header: impl Into<String>) -> Self {
        FixtureWriter { header: header.into(), lines: Vec::new() }
    }

    pub fn field(&mut self, key: &str, value: impl std::fmt::Display) -> &mut Self {
        self.lines.push(format!("{key}={value}"));
        self
    }

    pub fn q16_field(&mut self, key: &str, value: Q16) -> &mut Self {
        self.lines.push(format!("{key}_q16={}", value.raw()));
        self
    }

    pub fn q48_field(&mut self, key: &str, value: Q48) -> &mut Self {
        self.lines.push(format!("{key}_q48={}", value.raw()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header);
        out.push('\n');
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_entries() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\n# a comment\nstore_count=3\nnetwork_id=0x10\n";
        let f = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        assert_eq!(f.u32("store_count").unwrap(), Some(3));
        assert_eq!(f.u32("network_id").unwrap(), Some(0x10));
    }

    #[test]
    fn wrong_header_is_rejected() {
        let text = "DOMINIUM_HEAT_FIXTURE_V1\nfoo=1\n";
        let err = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap_err();
        assert!(matches!(err, ConfigError::WrongHeader { .. }));
    }

    #[test]
    fn unknown_keys_are_simply_never_queried() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\nunused_future_key=1\nstore_count=1\n";
        let f = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        assert_eq!(f.u32("store_count").unwrap(), Some(1));
    }

    #[test]
    fn octal_and_decimal_u64_parse() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\nseed=0755\nbudget=1000\n";
        let f = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        assert_eq!(f.u64("seed").unwrap(), Some(0o755));
        assert_eq!(f.u64("budget").unwrap(), Some(1000));
    }

    #[test]
    fn q16_field_parses_decimal_float() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\nefficiency=0.5\n";
        let f = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        assert_eq!(f.q16("efficiency").unwrap(), Some(Q16::from_f64(0.5)));
    }

    #[test]
    fn point_parses_comma_triplet() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\norigin=1.0,2.5,-3.0\n";
        let f = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        let p = f.point("origin").unwrap().unwrap();
        assert_eq!(p.x, Q16::from_f64(1.0));
        assert_eq!(p.y, Q16::from_f64(2.5));
        assert_eq!(p.z, Q16::from_f64(-3.0));
    }

    #[test]
    fn digest_is_stable_for_identical_text_and_differs_for_edits() {
        let text = "DOMINIUM_ENERGY_FIXTURE_V1\nstore_count=3\n";
        let a = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        let b = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", text).unwrap();
        assert_eq!(a.digest(), b.digest());

        let edited = "DOMINIUM_ENERGY_FIXTURE_V1\nstore_count=4\n";
        let c = Fixture::parse("test.fixture", "DOMINIUM_ENERGY_FIXTURE_V1", edited).unwrap();
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn writer_renders_header_then_q16_suffixed_field() {
        let mut w = FixtureWriter::new("DOMINIUM_ENERGY_RESOLVE_V1");
        w.field("ok", 1).q16_field("efficiency", Q16::from_f64(0.5));
        let rendered = w.render();
        assert!(rendered.starts_with("DOMINIUM_ENERGY_RESOLVE_V1\n"));
        assert!(rendered.contains("efficiency_q16="));
    }
}
