use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::warn;

/// Windows `ERROR_SHARING_VIOLATION` / `ERROR_LOCK_VIOLATION`.
const SHARING_VIOLATION: i32 = 32;
const LOCK_VIOLATION: i32 = 33;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `https://example.com/a` -> `example.com/a`
pub fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// True for I/O errors caused by another process holding the file.
pub fn is_file_locked(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(SHARING_VIOLATION) | Some(LOCK_VIOLATION))
        || matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        )
}

/// Runs `op` up to `attempts` times, sleeping `delay` between tries, as long as
/// the failure satisfies `is_transient`. Any other error is returned immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: usize,
    delay: Duration,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_transient(&e) => {
                warn!("Transient failure (attempt {}): {}, retrying in {:?}", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
