//! Presence/absence predicates over captured command output.

use std::fmt;
use std::net::Ipv4Addr;

use regex::Regex;

/// Something to look for in command output.
#[derive(Debug, Clone)]
pub enum Pattern {
    Substring(String),
    Regex(Regex),
    /// An IPv4 address standing on its own, so `100.100.1.1` does not match
    /// inside `100.100.1.10` or `10.100.100.1.1`.
    Address(Ipv4Addr),
}

impl Pattern {
    pub fn substring(s: impl Into<String>) -> Self {
        Pattern::Substring(s.into())
    }

    pub fn regex(re: &str) -> Result<Self, regex::Error> {
        Regex::new(re).map(Pattern::Regex)
    }

    pub fn address(addr: Ipv4Addr) -> Self {
        Pattern::Address(addr)
    }

    pub fn is_found(&self, output: &str) -> bool {
        match self {
            Pattern::Substring(s) => output.contains(s.as_str()),
            Pattern::Regex(re) => re.is_match(output),
            Pattern::Address(addr) => contains_address(output, &addr.to_string()),
        }
    }
}

fn contains_address(output: &str, needle: &str) -> bool {
    output.match_indices(needle).any(|(start, _)| {
        let before = output[..start].chars().next_back();
        let after = output[start + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit() || c == '.')
            && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Substring(s) => write!(f, "\"{s}\""),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            Pattern::Address(addr) => write!(f, "{addr}"),
        }
    }
}

/// A conjunctive presence test with a polarity.
///
/// With `present`, the predicate holds iff every pattern is found. Inverted,
/// it holds iff that conjunction does *not* hold.
#[derive(Debug, Clone)]
pub struct Predicate {
    patterns: Vec<Pattern>,
    present: bool,
}

impl Predicate {
    pub fn contains(s: impl Into<String>) -> Self {
        Self::all_of([Pattern::substring(s)])
    }

    pub fn contains_all<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::all_of(items.into_iter().map(Pattern::substring))
    }

    pub fn matches(re: &str) -> Result<Self, regex::Error> {
        Ok(Self::all_of([Pattern::regex(re)?]))
    }

    pub fn all_of(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
            present: true,
        }
    }

    /// Flip the polarity.
    pub fn inverted(mut self) -> Self {
        self.present = !self.present;
        self
    }

    /// Keep the polarity when `present`, invert otherwise.
    pub fn expect_present(self, present: bool) -> Self {
        if present { self } else { self.inverted() }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn is_inverted(&self) -> bool {
        !self.present
    }

    pub fn evaluate(&self, output: &str) -> bool {
        let all_found = self.patterns.iter().all(|p| p.is_found(output));
        all_found == self.present
    }

    /// Patterns whose presence disagrees with the predicate's polarity.
    ///
    /// For a failed positive predicate these are the missing patterns; for a
    /// failed inverted one, every pattern (all of them were found).
    pub fn offending<'a>(&'a self, output: &str) -> Vec<&'a Pattern> {
        if self.present {
            self.patterns.iter().filter(|p| !p.is_found(output)).collect()
        } else if self.evaluate(output) {
            Vec::new()
        } else {
            self.patterns.iter().collect()
        }
    }

    pub fn describe(&self) -> String {
        let list = self
            .patterns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        match (self.present, self.patterns.len()) {
            (true, 1) => format!("contains {list}"),
            (false, 1) => format!("does not contain {list}"),
            (true, _) => format!("contains all of [{list}]"),
            (false, _) => format!("does not contain all of [{list}]"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
