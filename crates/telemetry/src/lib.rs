// lib.rs - Main telemetry API
mod time;

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "human-log")]
mod log;

pub use time::{now_ns, since_ms};

/// Record a measurement in milliseconds
///
/// Emits the measurement to the configured backend (log or json)
pub fn record_ms(name: &str, start_ns: u64) {
    let ms = since_ms(start_ns);
    emit_ms(name, ms);
}

/// Emit an already-computed millisecond value under `name`
pub fn emit_ms(name: &str, ms: f64) {
    #[cfg(feature = "json")]
    json::emit(name, ms);

    #[cfg(all(not(feature = "json"), feature = "human-log"))]
    log::emit(name, ms);

    #[cfg(all(not(feature = "json"), not(feature = "human-log")))]
    let _ = (name, ms);
}

/// Time a closure and record its latency under `name`
pub fn time_block<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let t0 = now_ns();
    let out = f();
    record_ms(name, t0);
    out
}
