//! Carrier abstraction: anything fields can be written to or read from.
use std::collections::HashMap;

/// One propagated field as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireField {
    pub name: String,
    pub value: String,
}

/// Writable carrier (outgoing headers, metadata).
pub trait Injector {
    /// Append a field. Existing fields with the same name are kept.
    fn inject(&mut self, name: &str, value: String);
}

/// Readable carrier (incoming headers, metadata).
///
/// Lookups are case-insensitive, matching how header and metadata names compare.
pub trait Extractor {
    /// First value stored under `name`.
    fn get(&self, name: &str) -> Option<&str>;
}

impl Injector for Vec<WireField> {
    fn inject(&mut self, name: &str, value: String) {
        self.push(WireField {
            name: name.to_string(),
            value,
        });
    }
}

impl Extractor for Vec<WireField> {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }
}

impl Injector for Vec<(String, String)> {
    fn inject(&mut self, name: &str, value: String) {
        self.push((name.to_string(), value));
    }
}

impl Extractor for Vec<(String, String)> {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A map holds one value per name: the last write wins.
impl Injector for HashMap<String, String> {
    fn inject(&mut self, name: &str, value: String) {
        self.insert(name.to_string(), value);
    }
}

impl Extractor for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        if let Some(v) = HashMap::get(self, name) {
            return Some(v.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_keeps_duplicates_and_returns_first() {
        let mut fields: Vec<WireField> = Vec::new();
        fields.inject("X-Go-Context-hop", "1".into());
        fields.inject("X-Go-Context-hop", "2".into());

        assert_eq!(fields.len(), 2);
        assert_eq!(Extractor::get(&fields, "x-go-context-hop"), Some("1"));
    }

    #[test]
    fn map_keeps_last_write() {
        let mut map = HashMap::new();
        map.inject("X-Go-Context-hop", "1".into());
        map.inject("X-Go-Context-hop", "2".into());

        assert_eq!(map.len(), 1);
        assert_eq!(Extractor::get(&map, "X-Go-Context-hop"), Some("2"));
    }

    #[test]
    fn map_lookup_is_case_insensitive() {
        let mut map = HashMap::new();
        map.inject("X-Go-Context-user", "alice".into());

        assert_eq!(Extractor::get(&map, "X-Go-Context-user"), Some("alice"));
        assert_eq!(Extractor::get(&map, "x-go-context-USER"), Some("alice"));
        assert_eq!(Extractor::get(&map, "x-go-context-tenant"), None);
    }
}
