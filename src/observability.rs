use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("urochat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("urochat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("urochat.client.request_duration_seconds");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("urochat.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("urochat.stream.errors");
pub(crate) static STREAM_MID_STREAM_FAILURES: Counter =
    Counter::new("urochat.stream.mid_stream_failures");
pub(crate) static STREAM_TTFF: Moments = Moments::new("urochat.stream.ttff_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("urochat.stream.duration_seconds");

pub(crate) static SESSION_BINDINGS_OPENED: Counter = Counter::new("urochat.session.bindings_opened");
pub(crate) static SESSION_EXCHANGES: Counter = Counter::new("urochat.session.exchanges");
pub(crate) static SESSION_EXCHANGE_FAILURES: Counter =
    Counter::new("urochat.session.exchange_failures");
pub(crate) static SESSION_RESETS: Counter = Counter::new("urochat.session.resets");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_MID_STREAM_FAILURES);
    collector.register_moments(&STREAM_TTFF);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_BINDINGS_OPENED);
    collector.register_counter(&SESSION_EXCHANGES);
    collector.register_counter(&SESSION_EXCHANGE_FAILURES);
    collector.register_counter(&SESSION_RESETS);
}
