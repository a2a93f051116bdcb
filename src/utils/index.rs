use rand::Rng;
use std::time::Duration;

/// Random 128-bit run identifier, hex encoded.
pub fn generate_run_id() -> String {
    let mut id = [0u8; 16];
    rand::rng().fill(&mut id);
    hex::encode(id)
}

/// Items per second over `elapsed`, formatted with one decimal.
pub fn format_rate(items: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return format!("{} items/s", items);
    }
    format!("{:.1} items/s", items as f64 / secs)
}
