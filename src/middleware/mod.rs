// src/middleware/mod.rs
pub mod profiler;

pub use profiler::{
    metric_name, profiler, profiler_with_config, Profiler, ProfilerConfig, ProfilerLayer,
    ProfilerService,
};
