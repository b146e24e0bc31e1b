//! Observability hooks for the provider attempt loop.
//!
//! ```rust
//! use pobserve::{MetricsObservabilityHooks, SafeProviderHooks, TracingObservabilityHooks};
//!
//! let _provider_hooks = SafeProviderHooks::new(TracingObservabilityHooks);
//! let _metrics = MetricsObservabilityHooks;
//! ```

mod fanout;
mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use fanout::FanoutProviderHooks;
pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::SafeProviderHooks;
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        FanoutProviderHooks, MetricsObservabilityHooks, SafeProviderHooks,
        TracingObservabilityHooks,
    };
}
