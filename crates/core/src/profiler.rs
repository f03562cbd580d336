//! Hook into the external request profiler.

/// Receives the transaction name for the request being profiled.
///
/// Implementations must not fail or block; the call sits on the host
/// request path.
pub trait Profiler: Send + Sync {
    fn set_transaction_name(&self, name: &str);
}

impl<F> Profiler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn set_transaction_name(&self, name: &str) {
        self(name)
    }
}
