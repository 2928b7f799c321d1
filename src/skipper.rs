// src/skipper.rs
//! Per-request decisions about whether the profiler should run at all.

use http::request::Parts;

/// Decides, from the request head, whether a request is left unmeasured.
pub trait Skipper: Send + Sync + 'static {
    fn skip(&self, head: &Parts) -> bool;
}

/// Measures every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkip;

impl Skipper for NeverSkip {
    fn skip(&self, _head: &Parts) -> bool {
        false
    }
}

/// Skips requests whose path matches one of a fixed set exactly.
///
/// Handy for health checks and scrape endpoints that would otherwise
/// dominate the timings.
#[derive(Debug, Clone, Default)]
pub struct SkipPaths {
    paths: Vec<String>,
}

impl SkipPaths {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl Skipper for SkipPaths {
    fn skip(&self, head: &Parts) -> bool {
        let path = head.uri.path();
        self.paths.iter().any(|p| p == path)
    }
}

impl<F> Skipper for F
where
    F: Fn(&Parts) -> bool + Send + Sync + 'static,
{
    fn skip(&self, head: &Parts) -> bool {
        self(head)
    }
}
