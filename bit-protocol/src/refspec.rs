//! Refspecs: the pattern pairs that decide which advertised refs get fetched and
//! where they land locally. Generalizes `libbit`'s old "rough" `Refspec` (which didn't
//! support negative specs or standalone wildcard matching) into the full model the
//! fetch planner needs.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::Error;
use crate::oid::ObjectId;

/// A single refspec: `[+]<src>[:<dst>]`. A wildcard spec has `src` and, if present,
/// `dst` ending in `/*`; both sides glob or neither does. A spec with no `:` at all
/// (just `+src` or `src`) has no destination; one written as `^<pattern>` is negative
/// and suppresses matches rather than producing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    src: String,
    dst: Option<String>,
    force: bool,
    negative: bool,
}

impl RefSpec {
    pub fn new(src: impl Into<String>, dst: Option<String>, force: bool) -> Self {
        Self { src: src.into(), dst, force, negative: false }
    }

    pub fn negative(src: impl Into<String>) -> Self {
        Self { src: src.into(), dst: None, force: false, negative: true }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dst(&self) -> Option<&str> {
        self.dst.as_deref()
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_wildcard(&self) -> bool {
        self.src.ends_with("/*")
    }

    /// the literal source this spec names, without a wildcard asterisk but keeping
    /// the trailing slash, e.g. `refs/heads/*` -> `refs/heads/`
    pub fn src_prefix(&self) -> &str {
        self.src.strip_suffix('*').unwrap_or(&self.src)
    }

    /// whether `self.src` parses as a raw 40-hex object id rather than a ref name
    pub fn src_is_object_id(&self) -> bool {
        !self.is_wildcard() && ObjectId::from_str(&self.src).is_ok()
    }

    /// if this is a wildcard spec and `name` matches the source pattern, the expanded
    /// destination for `name`; `None` if this spec doesn't apply to `name` at all
    /// (including non-wildcard specs, which match only the literal source)
    pub fn expand(&self, name: &str) -> Option<String> {
        if self.is_wildcard() {
            let suffix = name.strip_prefix(self.src_prefix())?;
            let dst_prefix = self.dst.as_deref()?.strip_suffix('*')?;
            Some(format!("{dst_prefix}{suffix}"))
        } else if self.src == name {
            self.dst.clone()
        } else {
            None
        }
    }

    /// whether this spec's source pattern matches `name` at all, independent of
    /// whether it has a destination (used for negative specs, which never do)
    pub fn matches_src(&self, name: &str) -> bool {
        if self.is_wildcard() {
            name.starts_with(self.src_prefix())
        } else {
            self.src == name
        }
    }

    /// the inverse of `expand`: if `local_name` matches this spec's destination
    /// pattern, the source name that would have produced it. Used by prune to find
    /// which remote source a local tracking ref corresponds to.
    pub fn reverse_expand(&self, local_name: &str) -> Option<String> {
        let dst = self.dst.as_deref()?;
        if self.is_wildcard() {
            let dst_prefix = dst.strip_suffix('*')?;
            let suffix = local_name.strip_prefix(dst_prefix)?;
            Some(format!("{}{}", self.src_prefix(), suffix))
        } else if dst == local_name {
            Some(self.src.clone())
        } else {
            None
        }
    }
}

impl FromStr for RefSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(pattern) = s.strip_prefix('^') {
            return Ok(Self::negative(pattern));
        }

        let (force, rest) = match s.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (src, dst) = match rest.split_once(':') {
            Some((src, dst)) => (src, Some(dst.to_owned())),
            None => (rest, None),
        };

        let src_is_glob = src.ends_with("/*");
        let dst_is_glob = dst.as_deref().is_some_and(|d| d.ends_with("/*"));
        if let Some(ref dst) = dst {
            if src_is_glob != dst_is_glob {
                return Err(Error::InvalidAdvertisement(format!(
                    "refspec `{s}` has mismatched wildcards between source `{src}` and destination `{dst}`"
                )));
            }
        }

        Ok(Self { src: src.to_owned(), dst, force, negative: false })
    }
}

impl Display for RefSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.negative {
            return write!(f, "^{}", self.src);
        }
        if self.force {
            write!(f, "+")?;
        }
        write!(f, "{}", self.src)?;
        if let Some(dst) = &self.dst {
            write!(f, ":{dst}")?;
        }
        Ok(())
    }
}

/// A full set of refspecs for one fetch, split by sign for the planner's convenience.
#[derive(Debug, Clone, Default)]
pub struct RefSpecSet {
    specs: Vec<RefSpec>,
}

impl RefSpecSet {
    pub fn new(specs: Vec<RefSpec>) -> Self {
        Self { specs }
    }

    pub fn positive(&self) -> impl Iterator<Item = &RefSpec> {
        self.specs.iter().filter(|s| !s.is_negative())
    }

    pub fn negative(&self) -> impl Iterator<Item = &RefSpec> {
        self.specs.iter().filter(|s| s.is_negative())
    }

    /// whether any negative spec's source pattern matches `name`
    pub fn is_excluded(&self, name: &str) -> bool {
        self.negative().any(|s| s.matches_src(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefSpec> {
        self.specs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_spec() {
        let spec: RefSpec = "+refs/heads/*:refs/remotes/origin/*".parse().unwrap();
        assert!(spec.is_force());
        assert!(spec.is_wildcard());
        assert_eq!(spec.src_prefix(), "refs/heads/");
        assert_eq!(
            spec.expand("refs/heads/main"),
            Some("refs/remotes/origin/main".to_owned())
        );
        assert_eq!(spec.expand("refs/tags/v1"), None);
    }

    #[test]
    fn parses_negative_spec() {
        let spec: RefSpec = "^refs/heads/wip/*".parse().unwrap();
        assert!(spec.is_negative());
        assert!(spec.matches_src("refs/heads/wip/foo"));
        assert!(!spec.matches_src("refs/heads/main"));
    }

    #[test]
    fn non_wildcard_spec_only_matches_literal_source() {
        let spec: RefSpec = "refs/heads/main:refs/remotes/origin/main".parse().unwrap();
        assert_eq!(spec.expand("refs/heads/main"), Some("refs/remotes/origin/main".to_owned()));
        assert_eq!(spec.expand("refs/heads/other"), None);
    }

    #[test]
    fn mismatched_wildcards_are_rejected() {
        assert!("refs/heads/*:refs/remotes/origin/main".parse::<RefSpec>().is_err());
    }

    #[test]
    fn spec_with_no_destination_has_none() {
        let spec: RefSpec = "refs/heads/main".parse().unwrap();
        assert_eq!(spec.dst(), None);
    }

    #[test]
    fn reverse_expand_recovers_wildcard_source() {
        let spec: RefSpec = "+refs/heads/*:refs/remotes/origin/*".parse().unwrap();
        assert_eq!(spec.reverse_expand("refs/remotes/origin/main"), Some("refs/heads/main".to_owned()));
        assert_eq!(spec.reverse_expand("refs/tags/v1"), None);
    }

    #[test]
    fn reverse_expand_recovers_literal_source() {
        let spec: RefSpec = "refs/heads/main:refs/remotes/origin/main".parse().unwrap();
        assert_eq!(spec.reverse_expand("refs/remotes/origin/main"), Some("refs/heads/main".to_owned()));
        assert_eq!(spec.reverse_expand("refs/remotes/origin/other"), None);
    }

    #[test]
    fn refspec_set_negative_excludes() {
        let set = RefSpecSet::new(vec![
            "+refs/heads/*:refs/remotes/origin/*".parse().unwrap(),
            "^refs/heads/wip/*".parse().unwrap(),
        ]);
        assert!(set.is_excluded("refs/heads/wip/scratch"));
        assert!(!set.is_excluded("refs/heads/main"));
    }
}
