//! Overlay listener with bounded readiness waits.
//!
//! # Responsibilities
//! - Wait for a pending connection for at most one poll interval
//! - Invoke the native accept and wrap the returned descriptor
//!
//! # Design Decisions
//! - The listener handle is a pollable descriptor; readiness is awaited on the
//!   runtime reactor rather than by blocking a worker thread
//! - A zero-timeout `poll(2)` confirms readiness before the native accept so a
//!   stale reactor event never turns into a failed accept
//! - The reactor watches a duplicate of the listener descriptor owned by the
//!   listener; the engine closes its own copy on session close

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::engine::{fetch_error, ListenerHandle, NativeConnectionId, SessionHandle, EBADF, GENERIC_FAILURE};
use crate::error::{OverlayError, OverlayResult};
use crate::net::connection::OverlayConnection;
use crate::net::session::SessionShared;

/// Longest a single `accept` waits before reporting "no connection yet".
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The listener's own duplicate of the engine's listener descriptor.
struct ListenerFd(OwnedFd);

impl ListenerFd {
    /// Duplicate the engine's descriptor. The session must be open.
    fn duplicate(handle: ListenerHandle) -> io::Result<Self> {
        // SAFETY: the engine keeps the listener descriptor open until the
        // session closes, and the caller has just checked the session is open.
        let borrowed = unsafe { BorrowedFd::borrow_raw(handle.as_raw()) };
        borrowed.try_clone_to_owned().map(Self)
    }
}

impl AsRawFd for ListenerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// A listener opened on an overlay session.
pub struct OverlayListener {
    handle: ListenerHandle,
    session: Arc<SessionShared>,
    readiness: Option<AsyncFd<ListenerFd>>,
}

impl OverlayListener {
    pub(crate) fn new(handle: ListenerHandle, session: Arc<SessionShared>) -> Self {
        Self {
            handle,
            session,
            readiness: None,
        }
    }

    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    /// The session this listener was opened on.
    pub fn session(&self) -> SessionHandle {
        self.session.handle
    }

    /// Wait up to [`POLL_INTERVAL`] for a connection.
    ///
    /// Returns `Ok(None)` when nothing arrived in time so the caller can
    /// re-check cancellation.
    pub async fn accept(&mut self) -> OverlayResult<Option<OverlayConnection>> {
        self.session.ensure_open(self.handle)?;
        if !self.wait_ready().await? {
            return Ok(None);
        }
        self.session.ensure_open(self.handle)?;

        let engine = self.session.engine.as_ref();
        let (mut conn, mut fd) = (-1, -1);
        match engine.accept(self.handle.as_raw(), &mut conn, &mut fd) {
            0 => {}
            EBADF => {
                return Err(OverlayError::InvalidHandle(format!(
                    "{} rejected by tailscale_accept",
                    self.handle
                )))
            }
            GENERIC_FAILURE => return Err(fetch_error(engine, self.session.handle)),
            code => {
                return Err(OverlayError::EngineFault(format!(
                    "unhandled return value {} from tailscale_accept",
                    code
                )))
            }
        }

        let connection = OverlayConnection::from_raw(
            NativeConnectionId::from_raw(conn),
            fd,
            self.handle,
            Arc::clone(&self.session),
        )?;
        tracing::debug!(
            listener = %self.handle,
            connection_id = %connection.id(),
            "Overlay connection accepted"
        );
        Ok(Some(connection))
    }

    /// `true` once a connection is pending, `false` if the interval elapsed.
    async fn wait_ready(&mut self) -> OverlayResult<bool> {
        let readiness = match self.readiness.take() {
            Some(readiness) => readiness,
            None => {
                let fd = ListenerFd::duplicate(self.handle)?;
                AsyncFd::try_with_interest(fd, Interest::READABLE).map_err(|e| e.into_parts().1)?
            }
        };
        let readiness = self.readiness.insert(readiness);

        let mut guard = match tokio::time::timeout(POLL_INTERVAL, readiness.readable()).await {
            Ok(guard) => guard?,
            Err(_elapsed) => return Ok(false),
        };

        match guard.try_io(|fd| poll_pending(fd.get_ref().as_raw_fd())) {
            Ok(result) => {
                result?;
                Ok(true)
            }
            Err(_would_block) => Ok(false),
        }
    }
}

/// Non-blocking readiness check; `WouldBlock` clears the reactor's readiness.
fn poll_pending(fd: RawFd) -> io::Result<()> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ready = poll(&mut fds, 0).map_err(io::Error::from)?;
    if ready > 0 {
        Ok(())
    } else {
        Err(io::ErrorKind::WouldBlock.into())
    }
}

impl std::fmt::Debug for OverlayListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayListener")
            .field("handle", &self.handle)
            .field("session", &self.session.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::engine::simulated::SimulatedEngine;
    use crate::net::session::OverlaySession;

    fn bound() -> (Arc<SimulatedEngine>, OverlaySession, OverlayListener) {
        let engine = Arc::new(SimulatedEngine::new());
        let mut session = OverlaySession::create(engine.clone());
        session.start().unwrap();
        let listener = session.listen("tcp", ":80").unwrap();
        (engine, session, listener)
    }

    #[tokio::test]
    async fn accept_without_pending_returns_none_within_interval() {
        let (_engine, _session, mut listener) = bound();
        let started = Instant::now();
        assert!(listener.accept().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn accept_returns_pending_connection() {
        let (engine, _session, mut listener) = bound();
        let _peer = engine.dial(listener.handle(), "100.101.102.103:50000").unwrap();

        let connection = listener.accept().await.unwrap().expect("connection");
        assert_eq!(connection.listener(), listener.handle());
        assert_eq!(connection.remote_address().unwrap(), "100.101.102.103:50000");
        assert_eq!(engine.pending_count(listener.handle()), 0);
    }

    #[tokio::test]
    async fn accepts_connections_in_dial_order() {
        let (engine, _session, mut listener) = bound();
        let _a = engine.dial(listener.handle(), "100.64.0.1:1000").unwrap();
        let _b = engine.dial(listener.handle(), "100.64.0.2:2000").unwrap();

        let first = listener.accept().await.unwrap().expect("first");
        let second = listener.accept().await.unwrap().expect("second");
        assert_eq!(first.remote_address().unwrap(), "100.64.0.1:1000");
        assert_eq!(second.remote_address().unwrap(), "100.64.0.2:2000");
        assert!(listener.accept().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropping_listener_after_close_leaves_other_sockets_registered() {
        let (_engine, mut session, mut listener) = bound();
        assert!(listener.accept().await.unwrap().is_none());
        session.close().unwrap();

        // Likely to reuse the descriptor number the engine just released.
        let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        let mut a = tokio::net::UnixStream::from_std(a).unwrap();
        let mut b = tokio::net::UnixStream::from_std(b).unwrap();
        drop(listener);

        let exchange = async {
            a.write_all(b"x").await.unwrap();
            b.write_all(b"y").await.unwrap();
            let mut buf = [0u8; 1];
            b.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"x");
            a.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"y");
        };
        tokio::time::timeout(Duration::from_secs(2), exchange)
            .await
            .expect("sockets still driven by the reactor");
    }

    #[tokio::test]
    async fn accept_after_session_close_is_invalid_handle() {
        let (_engine, mut session, mut listener) = bound();
        session.close().unwrap();
        assert!(matches!(
            listener.accept().await,
            Err(OverlayError::InvalidHandle(_))
        ));
    }
}
