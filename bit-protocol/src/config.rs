//! Explicit, caller-constructed configuration. Nothing in this crate reads the
//! environment or `.gitconfig` directly — a host binary resolves `remote.<n>.*` and
//! `http.*` settings into these structs before calling in (§9 Design Notes: "Global
//! state → explicit context passed to `open`").

use std::time::Duration;

use crate::refspec::RefSpecSet;

/// `remote.<n>.tagopt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOpt {
    /// `--no-tags`: never fetch tags implicitly.
    NoTags,
    /// the default: follow a tag only once its peeled target is already local.
    AutoFollow,
    /// `--tags`: fetch every advertised tag unconditionally.
    FetchTags,
}

impl Default for TagOpt {
    fn default() -> Self {
        Self::AutoFollow
    }
}

/// A per-connection I/O deadline. `None` (or a zero duration, per `remote.<n>.timeout`'s
/// `0 = infinite` convention) disables the deadline entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 { Self(None) } else { Self(Some(Duration::from_secs(secs))) }
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        self.0
    }
}

impl From<Timeout> for Option<Duration> {
    fn from(t: Timeout) -> Self {
        t.0
    }
}

/// Everything `FetchPlanner::execute` needs for one fetch that isn't derived from the
/// wire: the refspecs the caller wants resolved, how to treat tags, whether an initial
/// branch is mandatory (cloning), and the bookkeeping knobs (prune/dry-run/force-all).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub refspecs: RefSpecSet,
    pub tag_opt: TagOpt,
    /// required on a clone: fail with `RemoteBranchNotFound` if absent from a
    /// non-empty advertisement
    pub initial_branch: Option<String>,
    /// delete local tracking refs whose expanded source is no longer advertised
    pub prune: bool,
    /// compute and report outcomes without touching the local ref database
    pub dry_run: bool,
    /// the remote's configured name, used to label `FETCH_HEAD` and tracking updates
    pub remote_name: String,
    /// the URI recorded in each `FETCH_HEAD` line
    pub uri: String,
}

impl FetchOptions {
    pub fn new(remote_name: impl Into<String>, uri: impl Into<String>, refspecs: RefSpecSet) -> Self {
        Self {
            refspecs,
            tag_opt: TagOpt::default(),
            initial_branch: None,
            prune: false,
            dry_run: false,
            remote_name: remote_name.into(),
            uri: uri.into(),
        }
    }
}

/// `http.<prefix>.*` overrides, selected by longest-matching scheme+host+port+path
/// prefix. Consumed only by the HTTP transport (outside this crate); modeled here so
/// a host crate has a single place to park the parsed config before handing the
/// engine a `ByteStream`.
#[derive(Debug, Clone)]
pub struct PerUrlHttpConfig {
    pub post_buffer: usize,
    pub ssl_verify: bool,
    pub follow_redirects: FollowRedirects,
    pub max_redirects: u32,
    pub cookie_file: Option<String>,
    pub save_cookies: bool,
    pub cookie_file_cache_limit: usize,
}

impl Default for PerUrlHttpConfig {
    fn default() -> Self {
        Self {
            post_buffer: 1024 * 1024,
            ssl_verify: true,
            follow_redirects: FollowRedirects::Initial,
            max_redirects: 5,
            cookie_file: None,
            save_cookies: false,
            cookie_file_cache_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowRedirects {
    Always,
    Never,
    /// follow only the first redirect of a request, as git's own default does
    Initial,
}
