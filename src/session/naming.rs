use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_TOKEN: AtomicI64 = AtomicI64::new(0);

/// Epoch milliseconds, bumped when needed so no two calls in this process share a token.
pub fn next_timestamp_token() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_TOKEN.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last.saturating_add(1));
        match LAST_TOKEN.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

pub fn default_output_name(prefix: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{}{}", prefix, next_timestamp_token())
    } else {
        format!("{}{}.{}", prefix, next_timestamp_token(), extension)
    }
}
