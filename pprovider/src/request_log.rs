//! Audit sink contract for per-send request logs.
//!
//! ```rust
//! use pprovider::{NewRequestLog, RequestLogStore};
//!
//! fn accepts_store(_store: &dyn RequestLogStore) {}
//!
//! let log = NewRequestLog::new("session-1", "build a form");
//! assert_eq!(log.attempt_number, 1);
//! ```

use crate::{NewRequestLog, ProviderError, ProviderFuture, RequestLog, RequestLogUpdate};

pub trait RequestLogStore: Send + Sync {
    /// Inserts a row in pending state and returns it with its assigned id.
    fn add_request_log<'a>(
        &'a self,
        log: NewRequestLog,
    ) -> ProviderFuture<'a, Result<RequestLog, ProviderError>>;

    /// Patches an existing row. Never inserts.
    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> ProviderFuture<'a, Result<(), ProviderError>>;
}
