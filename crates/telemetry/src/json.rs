// json.rs - machine-parseable backend
/// Emit a latency sample as one JSON object per line on stderr
#[inline]
pub fn emit(name: &str, ms: f64) {
    eprintln!(
        "{{\"t_ns\":{},\"stage\":\"{}\",\"latency_ms\":{:.3}}}",
        super::now_ns(),
        name,
        ms
    );
}
