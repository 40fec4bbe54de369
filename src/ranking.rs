use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A reduced `key:count` result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

impl KeyCount {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

impl fmt::Display for KeyCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a key:count line: {0:?}")]
pub struct ParseKeyCountError(pub String);

impl FromStr for KeyCount {
    type Err = ParseKeyCountError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (key, count) = line
            .rsplit_once(':')
            .ok_or_else(|| ParseKeyCountError(line.to_string()))?;
        let count = count
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseKeyCountError(line.to_string()))?;
        if key.is_empty() {
            return Err(ParseKeyCountError(line.to_string()));
        }
        Ok(KeyCount::new(key, count))
    }
}

/// Highest count first; equal counts keep their encounter order.
pub fn rank(mut results: Vec<KeyCount>) -> Vec<KeyCount> {
    results.sort_by(|a, b| b.count.cmp(&a.count));
    results
}
