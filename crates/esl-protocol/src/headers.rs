//! Case-insensitive header storage
//!
//! Switch events and frame headers are flat `Name: value` records whose field
//! set is open-ended. Lookups ignore ASCII case (`Unique-ID` and `Unique-Id`
//! name the same field) while insertion order is preserved for display.

/// Ordered, case-insensitive list of header fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field by name, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Insert a field, replacing any existing value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Check whether a field is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::Headers;

    #[test]
    fn test_lookup_ignores_case() {
        let headers: Headers = [("Unique-ID", "abc")].into_iter().collect();
        assert_eq!(headers.get("unique-id"), Some("abc"));
        assert_eq!(headers.get("Unique-Id"), Some("abc"));
        assert_eq!(headers.get("Answer-State"), None);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "api/response");
        headers.insert("content-type", "command/reply");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("command/reply"));
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let headers: Headers = [("B", "2"), ("A", "1")].into_iter().collect();
        let names: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
