//! HTTP date values.
//!
//! [`DateService`] keeps the current `Date` header value pre-formatted and refreshes it from a
//! background task, so responses do not format a date each time. The remaining helpers convert
//! between `SystemTime` and HTTP-date strings for validators such as `Last-Modified`.

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: tokio::task::JoinHandle<()>,
}

static DATE_SERVICE: Lazy<DateService> = Lazy::new(|| DateService::new_with_update_interval(Duration::from_millis(800)));

impl DateService {
    /// The shared instance; its refresh task is spawned on the runtime that first uses it.
    pub fn get_global_instance() -> &'static DateService {
        &DATE_SERVICE
    }

    fn new_with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(now_bytes()));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                current_arc.store(Arc::new(now_bytes()));
            }
        });

        DateService { current, handle }
    }

    /// The current time as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn http_date(&self) -> String {
        String::from_utf8_lossy(self.current.load().as_ref()).into_owned()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn now_bytes() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

/// Formats a time as an HTTP-date.
pub fn format_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parses any of the three HTTP-date formats.
pub fn parse_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Truncates a time to whole seconds, the resolution of HTTP dates.
pub fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        Err(_) => UNIX_EPOCH,
    }
}

/// Seconds since the epoch, `0` for times before it.
pub fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
