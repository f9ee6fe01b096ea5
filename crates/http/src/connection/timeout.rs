//! Read timeout for connection streams.

use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep, sleep};

pin_project! {
    /// Fails a read with [`io::ErrorKind::TimedOut`] once the inner reader stayed idle
    /// for longer than the timeout.
    ///
    /// The clock starts when a read first returns `Pending` and is reset by every read
    /// that completes, so only idle time counts.
    #[derive(Debug)]
    pub struct TimeoutReader<R> {
        #[pin]
        reader: R,
        sleep: Pin<Box<Sleep>>,
        timeout: Option<Duration>,
        armed: bool,
    }
}

impl<R> TimeoutReader<R> {
    /// Wraps `reader`; a `None` timeout never fires.
    pub fn new(reader: R, timeout: Option<Duration>) -> Self {
        Self { reader, sleep: Box::pin(sleep(timeout.unwrap_or_default())), timeout, armed: false }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead> AsyncRead for TimeoutReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        let Some(timeout) = *this.timeout else {
            return this.reader.poll_read(cx, buf);
        };

        if let Poll::Ready(result) = this.reader.poll_read(cx, buf) {
            *this.armed = false;
            return Poll::Ready(result);
        }

        if !*this.armed {
            this.sleep.as_mut().reset(Instant::now() + timeout);
            *this.armed = true;
        }
        ready!(this.sleep.as_mut().poll(cx));
        *this.armed = false;
        Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "socket read timed out")))
    }
}
