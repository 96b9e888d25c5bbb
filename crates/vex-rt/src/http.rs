//! Minimal HTTP request/response model for the simulator.
//!
//! Headers are an ordered multimap: insertion order is preserved for
//! rendering, names compare case-insensitively, and one name may hold
//! multiple occurrences (`add` appends rather than replaces).

use indexmap::IndexMap;

/// One named header with its occurrences.
#[derive(Clone, Debug, Default, PartialEq)]
struct HeaderEntry {
    /// Name as first written.
    name: String,
    values: Vec<String>,
}

/// Ordered, case-insensitive header multimap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    entries: IndexMap<String, HeaderEntry>,
}

impl Headers {
    /// Empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// First occurrence of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&Self::key(name))
            .and_then(|entry| entry.values.first())
            .map(|value| value.as_str())
    }

    /// All occurrences of a header.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&Self::key(name))
            .map(|entry| entry.values.as_slice())
            .unwrap_or(&[])
    }

    /// Replace every occurrence with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let entry = self
            .entries
            .entry(Self::key(name))
            .or_insert_with(|| HeaderEntry {
                name: name.to_string(),
                values: Vec::new(),
            });
        entry.values.clear();
        entry.values.push(value.into());
    }

    /// Append a new occurrence.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(Self::key(name))
            .or_insert_with(|| HeaderEntry {
                name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Delete a header entirely.
    pub fn unset(&mut self, name: &str) {
        self.entries.shift_remove(&Self::key(name));
    }

    /// Whether the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::key(name))
    }

    /// Iterate `(name, value)` pairs in insertion order, one pair per
    /// occurrence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().flat_map(|entry| {
            entry
                .values
                .iter()
                .map(move |value| (entry.name.as_str(), value.as_str()))
        })
    }
}

/// A synthetic client or backend request.
#[derive(Clone, Debug, Default)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub proto: String,
    pub headers: Headers,
}

impl HttpRequest {
    /// A plain GET request suitable for simulator runs.
    pub fn get(url: impl Into<String>) -> Self {
        let mut request = HttpRequest {
            method: "GET".to_string(),
            url: url.into(),
            proto: "HTTP/1.1".to_string(),
            headers: Headers::new(),
        };
        request.headers.set("Host", "localhost");
        request
    }
}

/// A response flowing through the state machine.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: i64,
    /// Reason phrase (`resp.response`).
    pub response: String,
    pub proto: String,
    pub headers: Headers,
    pub body: String,
}

impl HttpResponse {
    /// A response with a status and reason phrase.
    pub fn with_status(status: i64, response: impl Into<String>) -> Self {
        HttpResponse {
            status,
            response: response.into(),
            proto: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            body: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_add_appends() {
        let mut headers = Headers::new();
        headers.set("X-Test", "one");
        headers.add("X-Test", "two");
        assert_eq!(headers.get_all("X-Test"), &["one", "two"]);

        headers.set("X-Test", "three");
        assert_eq!(headers.get_all("X-Test"), &["three"]);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_unset() {
        let mut headers = Headers::new();
        headers.set("X-Drop", "v");
        headers.unset("x-drop");
        assert!(!headers.contains("X-Drop"));
        assert_eq!(headers.get("X-Drop"), None);
    }

    #[test]
    fn test_iteration_preserves_order_and_name() {
        let mut headers = Headers::new();
        headers.set("B-Second", "2");
        headers.set("A-First", "1");
        headers.add("B-Second", "3");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(
            pairs,
            vec![("B-Second", "2"), ("B-Second", "3"), ("A-First", "1")]
        );
    }
}
