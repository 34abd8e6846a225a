//! Version parsing and comparison

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AtomError, Result};

lazy_static! {
    static ref VERSION_REGEX: Regex = Regex::new(
        r"^(?P<numbers>\d+(?:\.\d+)*)(?P<letter>[a-z])?(?P<suffixes>(?:_(?:alpha|beta|pre|rc|p)\d*)*)(?:-r(?P<revision>\d+))?$"
    ).unwrap();
    static ref SUFFIX_REGEX: Regex = Regex::new(r"_(alpha|beta|pre|rc|p)(\d*)").unwrap();
}

/// Release suffix, ordered so that `_p` sorts after a plain release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl Suffix {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "alpha" => Some(Suffix::Alpha),
            "beta" => Some(Suffix::Beta),
            "pre" => Some(Suffix::Pre),
            "rc" => Some(Suffix::Rc),
            "p" => Some(Suffix::P),
            _ => None,
        }
    }
}

/// A package version such as `1.2.3b_rc1-r2`.
///
/// Equality is textual; ordering is semantic with the text as a tie-breaker,
/// so `1.0` and `1.00` compare as different but adjacent versions.
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    numbers: Vec<String>,
    letter: Option<char>,
    suffixes: Vec<(Suffix, u64)>,
    revision: u64,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let caps = VERSION_REGEX
            .captures(input)
            .ok_or_else(|| AtomError::InvalidVersion(input.to_string()))?;

        let numbers = caps["numbers"].split('.').map(str::to_string).collect();
        let letter = caps.name("letter").and_then(|m| m.as_str().chars().next());

        let mut suffixes = Vec::new();
        if let Some(m) = caps.name("suffixes") {
            for suffix in SUFFIX_REGEX.captures_iter(m.as_str()) {
                let kind = Suffix::from_str(&suffix[1])
                    .ok_or_else(|| AtomError::InvalidVersion(input.to_string()))?;
                let number = parse_number(&suffix[2], input)?;
                suffixes.push((kind, number));
            }
        }

        let revision = match caps.name("revision") {
            Some(m) => parse_number(m.as_str(), input)?,
            None => 0,
        };

        Ok(Self {
            text: input.to_string(),
            numbers,
            letter,
            suffixes,
            revision,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Prefix match used by `=cat/name-1.2*` atoms
    pub fn starts_with(&self, prefix: &Version) -> bool {
        self.text.starts_with(&prefix.text)
    }

    /// Compare everything except the revision
    pub fn cmp_base(&self, other: &Version) -> Ordering {
        compare_numbers(&self.numbers, &other.numbers)
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| compare_suffixes(&self.suffixes, &other.suffixes))
    }

    fn cmp_semantic(&self, other: &Version) -> Ordering {
        self.cmp_base(other).then_with(|| self.revision.cmp(&other.revision))
    }
}

fn parse_number(digits: &str, input: &str) -> Result<u64> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|_| AtomError::InvalidVersion(input.to_string()))
}

/// Compare two digit strings as integers of arbitrary size
fn compare_integers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_numbers(a: &[String], b: &[String]) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let ord = if i > 0 && (x.starts_with('0') || y.starts_with('0')) {
            // fractional comparison
            x.trim_end_matches('0').cmp(y.trim_end_matches('0'))
        } else {
            compare_integers(x, y)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_suffixes(a: &[(Suffix, u64)], b: &[(Suffix, u64)]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.0.cmp(&y.0).then_with(|| x.1.cmp(&y.1));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match a.len().cmp(&b.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => extra_suffix_order(a[b.len()].0),
        Ordering::Less => extra_suffix_order(b[a.len()].0).reverse(),
    }
}

/// Ordering of a version with one more suffix than an otherwise equal version
fn extra_suffix_order(suffix: Suffix) -> Ordering {
    if suffix == Suffix::P {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_semantic(other).then_with(|| self.text.cmp(&other.text))
    }
}

impl FromStr for Version {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
