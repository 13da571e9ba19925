//! Option-name filters for the raw data reports.
//!
//! A `%` matches any run of characters (including none). Every other
//! character, `_` included, matches itself.

/// A list of option names or `%` patterns; a name matches if any entry does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionFilter {
    patterns: Vec<String>,
}

impl OptionFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| like(p, name))
    }
}

/// Match `name` against a pattern where `%` is the only wildcard.
fn like(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('%');
    // split always yields at least one item
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let middle: Vec<&str> = parts.collect();
    let Some((last, middle)) = middle.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}
