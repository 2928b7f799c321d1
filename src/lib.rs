//! Tower middleware that times HTTP requests and reports each one to a
//! StatsD daemon as `response.<service>.<method>.<path>.<status>`.

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod skipper;

pub use client::TimingClient;
pub use error::{ProfilerError, Result};
pub use middleware::{Profiler, ProfilerConfig, ProfilerLayer, ProfilerService};
pub use skipper::{NeverSkip, SkipPaths, Skipper};
