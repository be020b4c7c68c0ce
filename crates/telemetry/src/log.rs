// log.rs - human-readable backend
/// Emit a latency sample to stderr for eyeballing during bring-up
#[inline]
pub fn emit(name: &str, ms: f64) {
    eprintln!("[latency] {name}: {ms:.2} ms");
}
