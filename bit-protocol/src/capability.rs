//! Parsing and querying of the capability tokens a peer announces, either embedded
//! after a NUL byte on the first v0 ref line or as separate `key`/`key=value` lines
//! in a v2 advertisement.

use log::warn;

/// A capability list, in the order the peer sent it. Most names appear at most once,
/// but `symref=` is legitimately repeatable (one per symbolic ref the peer wants to
/// advertise), so this stores every token rather than collapsing into a name-keyed
/// map — a `HashMap<String, Option<String>>` would silently drop all but the last
/// `symref=` entry.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    entries: Vec<(String, Option<String>)>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single token, splitting on the first `=`.
    pub fn add(&mut self, token: &str) {
        let (name, value) = match token.split_once('=') {
            Some((name, value)) => (name, Some(value.to_owned())),
            None => (token, None),
        };
        if name != "symref" && self.entries.iter().any(|(n, _)| n == name) {
            warn!("peer re-advertised capability `{name}`, keeping the latest value");
        }
        self.entries.push((name.to_owned(), value));
    }

    /// Add every whitespace-separated token in `tokens`.
    pub fn add_all(&mut self, tokens: &str) {
        for token in tokens.split_whitespace() {
            self.add(token);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// the most recently added value for `name`; repeatable capabilities like
    /// `symref` should go through [`Self::symrefs`] instead.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.iter().rev().find(|(n, _)| n == name).and_then(|(_, v)| v.as_deref())
    }

    /// every `symref=` entry as a (source, target) pair, value split on the first `:`.
    pub fn symrefs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(name, value)| {
            if name != "symref" {
                return None;
            }
            value.as_deref()?.split_once(':')
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_has_null_value() {
        let mut caps = CapabilitySet::new();
        caps.add("thin-pack");
        assert!(caps.has("thin-pack"));
        assert_eq!(caps.value("thin-pack"), None);
    }

    #[test]
    fn valued_token_splits_on_first_equals() {
        let mut caps = CapabilitySet::new();
        caps.add("agent=git/2.0=extra");
        assert_eq!(caps.value("agent"), Some("git/2.0=extra"));
    }

    #[test]
    fn add_all_splits_on_whitespace() {
        let mut caps = CapabilitySet::new();
        caps.add_all("multi_ack thin-pack ofs-delta agent=git/2.0");
        assert!(caps.has("multi_ack"));
        assert!(caps.has("thin-pack"));
        assert!(caps.has("ofs-delta"));
        assert_eq!(caps.value("agent"), Some("git/2.0"));
    }

    #[test]
    fn symref_value_splits_on_first_colon() {
        let mut caps = CapabilitySet::new();
        caps.add("symref=HEAD:refs/heads/main");
        let symrefs: Vec<_> = caps.symrefs().collect();
        assert_eq!(symrefs, vec![("HEAD", "refs/heads/main")]);
    }

    #[test]
    fn missing_capability_is_absent() {
        let caps = CapabilitySet::new();
        assert!(!caps.has("nonexistent"));
        assert_eq!(caps.value("nonexistent"), None);
    }

    #[test]
    fn multiple_symref_entries_all_survive() {
        let mut caps = CapabilitySet::new();
        caps.add_all("symref=HEAD:refs/heads/main symref=refs/remotes/origin/HEAD:refs/heads/main");
        let symrefs: Vec<_> = caps.symrefs().collect();
        assert_eq!(
            symrefs,
            vec![
                ("HEAD", "refs/heads/main"),
                ("refs/remotes/origin/HEAD", "refs/heads/main"),
            ]
        );
    }
}
