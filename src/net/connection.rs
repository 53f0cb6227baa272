//! Accepted overlay connections.
//!
//! # Responsibilities
//! - Own the connection descriptor exactly once, as a duplex stream
//! - Report the peer's overlay address
//! - Resolve the peer's identity through the owning session

use std::os::fd::{FromRawFd, RawFd};
use std::sync::Arc;

use crate::engine::buffer::{ScratchBuffer, REMOTE_ADDR_LEN};
use crate::engine::{ListenerHandle, NativeConnectionId, EBADF, ERANGE};
use crate::error::{OverlayError, OverlayResult};
use crate::identity::IdentityRecord;
use crate::net::session::SessionShared;

/// Duplex stream carried by an overlay connection.
pub type OverlayStream = tokio::net::UnixStream;

/// Human-readable connection identifier, stable for the connection's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(NativeConnectionId);

impl ConnectionId {
    pub fn from_native(id: NativeConnectionId) -> Self {
        Self(id)
    }

    pub fn native(&self) -> NativeConnectionId {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tailnet-conn-{}", self.0.as_raw())
    }
}

/// One accepted connection.
pub struct OverlayConnection {
    id: ConnectionId,
    listener: ListenerHandle,
    session: Arc<SessionShared>,
    stream: OverlayStream,
}

impl OverlayConnection {
    pub(crate) fn from_raw(
        id: NativeConnectionId,
        fd: RawFd,
        listener: ListenerHandle,
        session: Arc<SessionShared>,
    ) -> OverlayResult<Self> {
        // SAFETY: a successful native accept transfers ownership of `fd` to the
        // caller; it is wrapped once here and closed when the stream drops.
        let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
        std_stream.set_nonblocking(true)?;
        let stream = OverlayStream::from_std(std_stream)?;

        Ok(Self {
            id: ConnectionId::from_native(id),
            listener,
            session,
            stream,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn listener(&self) -> ListenerHandle {
        self.listener
    }

    pub fn stream(&self) -> &OverlayStream {
        &self.stream
    }

    /// Whether the stream is usable for both reading and writing.
    pub fn is_duplex(&self) -> bool {
        matches!(self.stream.take_error(), Ok(None))
    }

    /// The peer's overlay address as `ip:port`.
    pub fn remote_address(&self) -> OverlayResult<String> {
        self.session.ensure_open(self.id)?;

        let mut buf = ScratchBuffer::<REMOTE_ADDR_LEN>::new();
        let engine = self.session.engine.as_ref();
        match engine.remote_addr(self.listener.as_raw(), self.id.native().as_raw(), buf.as_mut_slice()) {
            0 => buf.decode("tailscale_getremoteaddr"),
            EBADF => Err(OverlayError::InvalidHandle(format!(
                "{} on {} rejected by tailscale_getremoteaddr",
                self.id, self.listener
            ))),
            ERANGE => Err(OverlayError::InsufficientBuffer {
                call: "tailscale_getremoteaddr",
                capacity: REMOTE_ADDR_LEN,
            }),
            code => Err(OverlayError::EngineFault(format!(
                "unhandled return value {} from tailscale_getremoteaddr",
                code
            ))),
        }
    }

    /// Look up who is on the other end of this connection.
    pub async fn resolve_identity(&self) -> OverlayResult<IdentityRecord> {
        self.session.ensure_open(self.id)?;
        if self.session.loopback_client().is_none() {
            return Err(OverlayError::LoopbackUnavailable);
        }
        let address = self.remote_address()?;
        self.session.who_is(&address).await
    }

    /// Give up the connection wrapper and keep the stream.
    pub fn into_stream(self) -> OverlayStream {
        self.stream
    }

    /// Close the connection.
    pub fn dispose(self) {
        tracing::trace!(connection_id = %self.id, "Overlay connection disposed");
    }
}

impl std::fmt::Debug for OverlayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayConnection")
            .field("id", &self.id)
            .field("listener", &self.listener)
            .finish()
    }
}
