//! Per-request orchestration: fingerprint, record once, name the transaction.

use std::sync::Arc;

use crate::profiler::Profiler;
use crate::recorder::Recorder;
use crate::request::{RequestContext, RequestFingerprint};

/// Labels inbound requests for the profiler.
///
/// Store faults are logged and swallowed; labeling never fails the host request.
#[derive(Clone)]
pub struct Labeler {
    recorder: Recorder,
    profiler: Option<Arc<dyn Profiler>>,
}

impl Labeler {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder, profiler: None }
    }

    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Fingerprint `ctx`, record it if new, and hand the fingerprint to the profiler.
    pub async fn label_current_request(&self, ctx: &RequestContext) -> RequestFingerprint {
        let fingerprint = ctx.fingerprint();

        match self.recorder.record_if_absent(&fingerprint, ctx).await {
            Ok(true) => tracing::debug!(%fingerprint, "first sighting of request"),
            Ok(false) => tracing::trace!(%fingerprint, "request already recorded"),
            Err(e) => tracing::warn!(%fingerprint, error = %e, "request not recorded"),
        }

        if let Some(profiler) = &self.profiler {
            profiler.set_transaction_name(fingerprint.as_str());
        }

        fingerprint
    }
}
