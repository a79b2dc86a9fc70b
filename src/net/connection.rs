//! Per-connection idle deadline.
//!
//! # Responsibilities
//! - Close keep-alive connections that wait too long for their next request
//! - Count the requests in flight on each connection
//!
//! # Design Decisions
//! - Wraps the accepted TCP stream, below TLS, as an axum-server acceptor
//! - The deadline only fires while no request is in flight, so a slow
//!   handler is never cut
//! - Any read or write pushes the deadline back
//! - Firing surfaces as a `TimedOut` read error, which ends the connection

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum_server::accept::Accept;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, TryFutureExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};
use tower::Service;

/// Requests in flight on one connection.
#[derive(Debug, Clone, Default)]
pub struct ActiveRequests(Arc<AtomicUsize>);

impl ActiveRequests {
    pub fn enter(&self) -> RequestGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        RequestGuard(self.0.clone())
    }

    pub fn is_idle(&self) -> bool {
        self.0.load(Ordering::SeqCst) == 0
    }
}

/// Marks one request in flight until dropped.
#[derive(Debug)]
pub struct RequestGuard(Arc<AtomicUsize>);

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Acceptor wrapping every stream of `inner` in an [`IdleTimeoutStream`] and
/// its service in a [`TrackRequests`] sharing the same counter.
#[derive(Debug, Clone)]
pub struct IdleTimeoutAcceptor<A> {
    inner: A,
    timeout: Duration,
}

impl<A> IdleTimeoutAcceptor<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<A, I, S> Accept<I, S> for IdleTimeoutAcceptor<A>
where
    A: Accept<I, S>,
    A::Future: Send + 'static,
    A::Stream: Send + 'static,
    A::Service: Send + 'static,
{
    type Stream = IdleTimeoutStream<A::Stream>;
    type Service = TrackRequests<A::Service>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let timeout = self.timeout;
        self.inner
            .accept(stream, service)
            .map_ok(move |(stream, service)| {
                let active = ActiveRequests::default();
                let stream = IdleTimeoutStream::new(stream, timeout, active.clone());
                (stream, TrackRequests { inner: service, active })
            })
            .boxed()
    }
}

/// Service holding a [`RequestGuard`] for as long as each call runs.
#[derive(Debug, Clone)]
pub struct TrackRequests<S> {
    inner: S,
    active: ActiveRequests,
}

impl<S, R> Service<R> for TrackRequests<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let guard = self.active.enter();
        let response = self.inner.call(request);
        async move {
            let _guard = guard;
            response.await
        }
        .boxed()
    }
}

/// A stream that fails its reads once it has been idle for `timeout`.
#[derive(Debug)]
pub struct IdleTimeoutStream<S> {
    inner: S,
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    active: ActiveRequests,
}

impl<S> IdleTimeoutStream<S> {
    pub fn new(inner: S, timeout: Duration, active: ActiveRequests) -> Self {
        Self {
            inner,
            timeout,
            deadline: Box::pin(tokio::time::sleep(timeout)),
            active,
        }
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.timeout;
        self.deadline.as_mut().reset(next);
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IdleTimeoutStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before {
                    this.touch();
                }
                Poll::Ready(Ok(()))
            }
            Poll::Pending => {
                if !this.active.is_idle() {
                    return Poll::Pending;
                }
                if this.deadline.as_mut().poll(cx).is_ready() {
                    tracing::debug!(timeout_secs = this.timeout.as_secs_f64(), "Closing idle connection");
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "connection idle timeout")));
                }
                Poll::Pending
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IdleTimeoutStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = written {
            if n > 0 {
                this.touch();
            }
        }
        written
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = written {
            if n > 0 {
                this.touch();
            }
        }
        written
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    const IDLE: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn idle_after_response_times_out() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, IDLE, ActiveRequests::default());

        client.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 7);
        stream.write_all(b"response").await.unwrap();

        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, IDLE, ActiveRequests::default());

        let mut buf = [0u8; 16];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn request_in_flight_is_not_idle() {
        let (_client, server) = tokio::io::duplex(64);
        let active = ActiveRequests::default();
        let mut stream = IdleTimeoutStream::new(server, IDLE, active.clone());
        let mut buf = [0u8; 16];

        let guard = active.enter();
        let waited = tokio::time::timeout(IDLE * 3, stream.read(&mut buf)).await;
        assert!(waited.is_err(), "read must still be pending");

        drop(guard);
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn activity_pushes_the_deadline_back() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, IDLE, ActiveRequests::default());
        let mut buf = [0u8; 16];

        for _ in 0..3 {
            client.write_all(b"ping").await.unwrap();
            assert_eq!(stream.read(&mut buf).await.unwrap(), 4);
            stream.write_all(b"pong").await.unwrap();
            tokio::time::sleep(IDLE / 2).await;
        }

        client.write_all(b"late").await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn tracked_service_counts_running_calls() {
        let active = ActiveRequests::default();
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let mut released = Some(released);
        let service = TrackRequests {
            inner: tower::service_fn(move |_: ()| {
                let released = released.take();
                async move {
                    match released {
                        Some(released) => released.await.map_err(|_| "sender dropped"),
                        None => Err("called twice"),
                    }
                }
            }),
            active: active.clone(),
        };
        let call = tokio::spawn(service.oneshot(()));

        while active.is_idle() {
            tokio::task::yield_now().await;
        }
        release.send(()).unwrap();
        call.await.unwrap().unwrap();
        assert!(active.is_idle());
    }
}
