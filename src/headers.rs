use crate::constants::header;
use indexmap::IndexMap;

/// Ordered header store with case-insensitive names.
///
/// The first spelling of a name is kept for display; later writes replace the
/// value in place so insertion order stays stable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderList {
    entries: IndexMap<String, (String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<N, V>(&mut self, name: N, value: V)
    where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let value = value.into();
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(existing) => existing.1 = value,
            None => {
                self.entries.insert(key, (name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for HeaderList
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut list = HeaderList::new();
        for (name, value) in iter {
            list.set(name, value);
        }
        list
    }
}

/// Header names a preflight asks about: lower-cased, sorted and unique so the
/// `Access-Control-Request-Headers` value is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreflightHeaders(Vec<String>);

impl PreflightHeaders {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        values.sort();
        values.dedup();
        Self(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma joined, no spaces.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

/// Request headers that need no explicit approval from the server.
pub fn is_simple_header(name: &str, value: &str) -> bool {
    if name.eq_ignore_ascii_case(header::ACCEPT)
        || name.eq_ignore_ascii_case(header::ACCEPT_LANGUAGE)
        || name.eq_ignore_ascii_case(header::CONTENT_LANGUAGE)
    {
        return true;
    }

    if name.eq_ignore_ascii_case(header::CONTENT_TYPE) {
        let essence = value.split(';').next().unwrap_or_default().trim();
        return ["text/plain", "application/x-www-form-urlencoded", "multipart/form-data"]
            .iter()
            .any(|simple| essence.eq_ignore_ascii_case(simple));
    }

    false
}

/// Names of the author headers in `headers` a preflight must ask about.
pub fn unsafe_header_names(headers: &HeaderList) -> PreflightHeaders {
    PreflightHeaders::new(
        headers
            .iter()
            .filter(|(name, value)| !is_simple_header(name, value))
            .map(|(name, _)| name),
    )
}

#[cfg(test)]
#[path = "headers_test.rs"]
mod headers_test;
