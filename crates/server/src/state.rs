use offers_core::Config;
use offers_ingest::TaskLifecycle;

/// Shared handler state. Generic over the gateway so the router can be
/// driven by the in-memory store in tests.
pub struct AppState<G> {
    pub lifecycle: TaskLifecycle<G>,
    pub config: Config,
}
