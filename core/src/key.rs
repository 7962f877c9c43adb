//! Structured cache keys.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(String),
    Id(i64),
}

impl From<&str> for KeySegment {
    fn from(name: &str) -> Self {
        KeySegment::Name(name.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(name: String) -> Self {
        KeySegment::Name(name)
    }
}

impl From<i64> for KeySegment {
    fn from(id: i64) -> Self {
        KeySegment::Id(id)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Name(name) => f.write_str(name),
            KeySegment::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Identifies one independently fetched result, e.g. `users/list` or
/// `users/detail/3`. Two keys are equal when all their segments are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<KeySegment>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_names_are_distinct_segments() {
        let by_id = QueryKey::new(["users", "detail"]).with(3);
        let by_name = QueryKey::new(["users", "detail", "3"]);
        assert_ne!(by_id, by_name);
        assert_eq!(by_id.to_string(), by_name.to_string());
    }

    #[test]
    fn equal_segments_make_equal_keys() {
        assert_eq!(QueryKey::new(["users", "list"]), QueryKey::new(["users".to_string(), "list".to_string()]));
        assert_eq!(QueryKey::new(["users"]).with("list").segments().len(), 2);
    }

    #[test]
    fn display_joins_segments() {
        let key = QueryKey::new(["users", "detail"]).with(42);
        assert_eq!(key.to_string(), "users/detail/42");
        assert_eq!(QueryKey::new(Vec::<KeySegment>::new()).to_string(), "");
    }
}
