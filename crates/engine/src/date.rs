//! Cached `Date` header values.
//!
//! Formatting an RFC 7231 date on every response is wasted work under load;
//! a background task refreshes a shared preformatted value instead and the
//! connection layer reads it lock-free.

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

/// Maintains the current preformatted HTTP date string.
pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

static DATE_SERVICE: Lazy<DateService> = Lazy::new(|| DateService::with_update_interval(Duration::from_millis(800)));

impl std::fmt::Debug for DateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateService").finish_non_exhaustive()
    }
}

fn format_now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl DateService {
    /// The global instance shared by every connection.
    pub fn global() -> &'static DateService {
        &DATE_SERVICE
    }

    fn with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(format_now()));
        let current_arc = Arc::clone(&current);

        // outside a runtime (unit tests) the value stays fixed at creation time
        let handle = tokio::runtime::Handle::try_current().ok().map(|rt| {
            rt.spawn(async move {
                loop {
                    tokio::time::sleep(update_interval).await;
                    current_arc.store(Arc::new(format_now()));
                }
            })
        });

        DateService { current, handle }
    }

    /// The current date value, preformatted for the wire.
    pub fn http_date(&self) -> Bytes {
        self.current.load().as_ref().clone()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DateService;

    #[tokio::test]
    async fn date_is_nonempty_and_stable_within_a_tick() {
        let date = DateService::global().http_date();
        assert!(!date.is_empty());
        assert_eq!(date, DateService::global().http_date());
    }
}
