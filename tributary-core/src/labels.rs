//! Label sets, their canonical form, and fingerprints.
//!
//! A label set is an unordered collection of `name="value"` pairs with unique
//! names. Its canonical form is the pairs sorted by name; equality and the
//! fingerprint are defined on the canonical form only, so two clients that
//! declare the same pairs in different orders always land on the same stream.
//!
//! Fingerprints are fast lookup keys, not identities: distinct label sets may
//! share a fingerprint and callers must compare canonical forms to tell them
//! apart.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::types::Fingerprint;

/// Byte separating names from values (and pairs) in hashed encodings.
/// Never valid in UTF-8 text, so no label content can forge it.
const SEPARATOR: u8 = 0xff;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET: u64 = 14_695_981_039_346_656_037;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 1_099_511_628_211;

/// A single label pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

impl Label {
    /// Creates a new label pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A label set in canonical (name-sorted) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Builds a label set from pairs in any order.
    ///
    /// # Errors
    /// Returns `InvalidLabels` on an invalid name or a duplicated name.
    pub fn new(pairs: Vec<Label>) -> Result<Self> {
        let set = Self::sorted(pairs);
        set.validate()?;
        Ok(set)
    }

    fn sorted(mut labels: Vec<Label>) -> Self {
        labels.sort_unstable();
        Self { labels }
    }

    fn validate(&self) -> Result<()> {
        for label in &self.labels {
            if !is_valid_name(&label.name) {
                return Err(Error::invalid_labels(
                    &self.to_string(),
                    format!("invalid label name '{}'", label.name),
                ));
            }
        }
        if let Some(pair) = self.labels.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(Error::invalid_labels(
                &self.to_string(),
                format!("duplicate label name '{}'", pair[0].name),
            ));
        }
        Ok(())
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if the set has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Returns the value of the named label, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.labels[idx].value.as_str())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"", label.name)?;
            for c in label.value.chars() {
                match c {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// Hash function used to derive a fingerprint from a canonical label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintAlgorithm {
    /// xxh3-64 over the canonical encoding `name 0xff value 0xff ...`.
    #[default]
    Xxh3,
    /// XOR of per-pair FNV-1a hashes of `name 0xff value`.
    ///
    /// Order-independent and cheap, but collides for real-world label sets.
    /// Matches the fingerprints older ingesters computed.
    LabelPairXor,
}

impl FingerprintAlgorithm {
    /// Computes the fingerprint of a canonical label set.
    #[must_use]
    pub fn fingerprint(self, labels: &LabelSet) -> Fingerprint {
        match self {
            Self::Xxh3 => {
                let capacity = labels
                    .iter()
                    .map(|l| l.name.len() + l.value.len() + 2)
                    .sum();
                let mut buf = Vec::with_capacity(capacity);
                for label in labels.iter() {
                    buf.extend_from_slice(label.name.as_bytes());
                    buf.push(SEPARATOR);
                    buf.extend_from_slice(label.value.as_bytes());
                    buf.push(SEPARATOR);
                }
                Fingerprint::new(xxh3_64(&buf))
            }
            Self::LabelPairXor => {
                if labels.is_empty() {
                    return Fingerprint::new(FNV_OFFSET);
                }
                let hash = labels.iter().fold(0u64, |acc, label| {
                    let mut h = fnv_add(FNV_OFFSET, label.name.as_bytes());
                    h = fnv_add(h, &[SEPARATOR]);
                    h = fnv_add(h, label.value.as_bytes());
                    acc ^ h
                });
                Fingerprint::new(hash)
            }
        }
    }
}

fn fnv_add(mut h: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// A label set together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Canonical label set.
    pub labels: LabelSet,
    /// Fingerprint of `labels`.
    pub fingerprint: Fingerprint,
}

/// Sorts pairs into canonical form and fingerprints the sorted form.
///
/// Callers reject duplicate names before reaching this point; the result is a
/// pure function of the pair set regardless of declaration order.
#[must_use]
pub fn canonicalize(pairs: Vec<Label>, algorithm: FingerprintAlgorithm) -> Canonical {
    let labels = LabelSet::sorted(pairs);
    let fingerprint = algorithm.fingerprint(&labels);
    Canonical {
        labels,
        fingerprint,
    }
}

/// Parses and canonicalizes a label string in one step.
///
/// # Errors
/// Returns `InvalidLabels` if the string is malformed.
pub fn parse_canonical(input: &str, algorithm: FingerprintAlgorithm) -> Result<Canonical> {
    Ok(canonicalize(parse_labels(input)?, algorithm))
}

/// Parses a label string of the form `{name="value", ...}`.
///
/// Pairs may appear in any order. Values support the `\"`, `\\` and `\n`
/// escapes.
///
/// # Errors
/// Returns `InvalidLabels` on a syntax error, an invalid name, a duplicated
/// name, or an empty set.
pub fn parse_labels(input: &str) -> Result<Vec<Label>> {
    let mut parser = Parser {
        input,
        chars: input.char_indices().peekable(),
    };
    let pairs = parser.label_set()?;

    if pairs.is_empty() {
        return Err(Error::invalid_labels(input, "at least one label is required"));
    }

    let set = LabelSet::sorted(pairs);
    set.validate()
        .map_err(|_| Error::invalid_labels(input, duplicate_reason(&set)))?;
    Ok(set.labels)
}

fn duplicate_reason(set: &LabelSet) -> String {
    set.labels
        .windows(2)
        .find(|w| w[0].name == w[1].name)
        .map_or_else(
            || "invalid label name".to_string(),
            |w| format!("duplicate label name '{}'", w[0].name),
        )
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn label_set(&mut self) -> Result<Vec<Label>> {
        self.skip_whitespace();
        self.expect('{')?;
        self.skip_whitespace();

        let mut pairs = Vec::new();
        if self.peek() == Some('}') {
            self.chars.next();
        } else {
            loop {
                pairs.push(self.pair()?);
                self.skip_whitespace();
                match self.chars.next() {
                    Some((_, ',')) => self.skip_whitespace(),
                    Some((_, '}')) => break,
                    Some((pos, c)) => {
                        return Err(self.error(format!("expected ',' or '}}' at {pos}, found '{c}'")))
                    }
                    None => return Err(self.error("unterminated label set")),
                }
            }
        }

        self.skip_whitespace();
        if let Some((pos, c)) = self.chars.next() {
            return Err(self.error(format!("unexpected '{c}' at {pos} after label set")));
        }
        Ok(pairs)
    }

    fn pair(&mut self) -> Result<Label> {
        let name = self.name()?;
        self.skip_whitespace();
        self.expect('=')?;
        self.skip_whitespace();
        let value = self.quoted()?;
        Ok(Label { name, value })
    }

    fn name(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if is_valid_name(&name) {
            Ok(name)
        } else {
            Err(self.error(format!("invalid label name '{name}'")))
        }
    }

    fn quoted(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(value),
                Some((pos, '\\')) => match self.chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => {
                        return Err(self.error(format!("unknown escape '\\{c}' at {pos}")))
                    }
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(self.error("unterminated label value")),
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.chars.next() {
            Some((_, c)) if c == want => Ok(()),
            Some((pos, c)) => Err(self.error(format!("expected '{want}' at {pos}, found '{c}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::invalid_labels(self.input, reason)
    }
}
