// ABOUTME: Small shared helpers for retries and display formatting
// ABOUTME: Used by connection setup, progress output, and the migration report

use std::fmt::Display;
use std::time::Duration;

/// Retry a function with exponential backoff
///
/// Executes an async operation with automatic retry on failure. Each retry doubles
/// the delay to ride out transient failures such as a database that is still
/// starting up. Errors rejected by `should_retry` (bad credentials, for example)
/// are returned immediately.
///
/// # Arguments
///
/// * `operation` - Async function to retry
/// * `should_retry` - Returns false for errors that another attempt cannot fix
/// * `max_retries` - Maximum number of retry attempts (0 = no retries, just initial attempt)
/// * `initial_delay` - Delay before first retry (doubles each subsequent retry)
///
/// # Returns
///
/// Returns the successful result or the error of the final attempt.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use sqlserver_migrator::utils::retry_with_backoff;
/// # async fn example() -> Result<(), String> {
/// let result = retry_with_backoff(
///     || async { Ok::<_, String>("success") },
///     |_| true,
///     3,
///     Duration::from_secs(1),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    should_retry: P,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && should_retry(&e) => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sanitize an identifier (table name, column name) for display
///
/// Removes control characters and limits length to keep log lines readable.
/// This is for display only; SQL text quotes identifiers through the dialect.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Render a duration as `1h 02m 03s`, `2m 03s`, or `3.21s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}
