use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Consumes a response body to the end without keeping it, yielding the number of
    /// data bytes seen. Trailers are skipped.
    pub struct DrainBodyFuture<B: Body> {
        #[pin]
        body: B,
        received: usize,
    }
}

impl<B> DrainBodyFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, received: 0 }
    }
}

impl<B> Future for DrainBodyFuture<B>
where
    B: Body,
{
    type Output = Result<usize, anyhow::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.received));
            }
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.received));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(_e) => {
                    return Poll::Ready(Err(anyhow::anyhow!("Failed to poll next frame")));
                }
            };
            if let Ok(data) = frame.into_data() {
                *slf.received += data.remaining();
            }
        }
    }
}
