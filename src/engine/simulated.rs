//! In-process engine used by tests and local development.
//!
//! Implements the same call contract as libtailscale: listener handles are
//! real Unix socket descriptors that become readable when a connection is
//! pending, and accepted connections are one end of a real socket pair whose
//! other end is returned to whoever dialed.

use std::collections::{HashMap, VecDeque};
use std::ffi::CStr;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
use std::os::raw::c_int;
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::buffer::{write_c_string, CREDENTIAL_LEN};
use super::{Engine, EngineOption, ListenerHandle, SessionHandle, EBADF, ERANGE, GENERIC_FAILURE};

const DEFAULT_PROXY_CREDENTIAL: &str = "8f3c1d27a9b04e6f5d2c7a1e0b9f4c36";
const DEFAULT_LOCAL_API_CREDENTIAL: &str = "2b7e151628aed2a6abf7158809cf4f3c";

#[derive(Default)]
struct SimSession {
    started: bool,
    closed: bool,
    last_error: String,
    start_failure: Option<String>,
    options: HashMap<&'static str, String>,
}

struct PendingConnection {
    fd: OwnedFd,
    remote_addr: String,
}

struct SimListener {
    session: c_int,
    /// The descriptor handed out as the listener handle.
    ready_rx: UnixStream,
    ready_tx: UnixStream,
    pending: VecDeque<PendingConnection>,
    accepted: HashMap<c_int, String>,
}

struct SimState {
    next_session: c_int,
    next_connection: c_int,
    sessions: HashMap<c_int, SimSession>,
    listeners: HashMap<c_int, SimListener>,
    loopback_address: String,
    proxy_credential: String,
    local_api_credential: String,
    accepted_total: usize,
    latest_listener: Option<c_int>,
}

/// A simulated overlay engine.
pub struct SimulatedEngine {
    state: Mutex<SimState>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_session: 1,
                next_connection: 1,
                sessions: HashMap::new(),
                listeners: HashMap::new(),
                loopback_address: "127.0.0.1:41112".to_string(),
                proxy_credential: DEFAULT_PROXY_CREDENTIAL.to_string(),
                local_api_credential: DEFAULT_LOCAL_API_CREDENTIAL.to_string(),
                accepted_total: 0,
                latest_listener: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address reported by the loopback call (host:port of the identity service).
    pub fn set_loopback_address(&self, address: impl Into<String>) {
        self.state().loopback_address = address.into();
    }

    /// Credentials reported by the loopback call.
    pub fn set_credentials(&self, proxy: impl Into<String>, local_api: impl Into<String>) {
        let mut state = self.state();
        state.proxy_credential = proxy.into();
        state.local_api_credential = local_api.into();
    }

    pub fn local_api_credential(&self) -> String {
        self.state().local_api_credential.clone()
    }

    /// Make the next `start` of `sd` fail with `message` as its error text.
    pub fn fail_start(&self, sd: SessionHandle, message: impl Into<String>) {
        if let Some(session) = self.state().sessions.get_mut(&sd.as_raw()) {
            session.start_failure = Some(message.into());
        }
    }

    /// Queue an inbound connection from `remote_addr` on `listener`.
    ///
    /// Returns the peer's end of the connection.
    pub fn dial(&self, listener: ListenerHandle, remote_addr: &str) -> io::Result<UnixStream> {
        let mut state = self.state();
        let entry = state.listeners.get_mut(&listener.as_raw()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such listener: {}", listener))
        })?;

        let (peer, local) = UnixStream::pair()?;
        entry.pending.push_back(PendingConnection {
            fd: OwnedFd::from(local),
            remote_addr: remote_addr.to_string(),
        });
        (&entry.ready_tx).write_all(&[1])?;
        Ok(peer)
    }

    /// Queue an inbound connection whose peer reset it before it was accepted.
    ///
    /// The accepted end carries a pending `ECONNRESET` socket error.
    pub fn dial_reset(&self, listener: ListenerHandle, remote_addr: &str) -> io::Result<()> {
        let peer = self.dial(listener, remote_addr)?;
        let mut state = self.state();
        let entry = state.listeners.get_mut(&listener.as_raw()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such listener: {}", listener))
        })?;
        if let Some(pending) = entry.pending.back() {
            // Closing a socket with unread data resets its peer.
            let local = pending.fd.try_clone().map(UnixStream::from)?;
            (&local).write_all(&[0])?;
        }
        drop(peer);
        Ok(())
    }

    /// The most recently opened listener.
    pub fn latest_listener(&self) -> Option<ListenerHandle> {
        self.state().latest_listener.map(ListenerHandle::from_raw)
    }

    /// Total connections handed out by `accept` across all listeners.
    pub fn accepted_count(&self) -> usize {
        self.state().accepted_total
    }

    /// Connections queued on `listener` but not yet accepted.
    pub fn pending_count(&self, listener: ListenerHandle) -> usize {
        self.state()
            .listeners
            .get(&listener.as_raw())
            .map(|l| l.pending.len())
            .unwrap_or(0)
    }

    pub fn is_session_open(&self, sd: SessionHandle) -> bool {
        self.state()
            .sessions
            .get(&sd.as_raw())
            .map(|s| !s.closed)
            .unwrap_or(false)
    }

    /// Value recorded for a setter entry point, e.g. `"tailscale_set_hostname"`.
    pub fn option(&self, sd: SessionHandle, entry_point: &str) -> Option<String> {
        self.state()
            .sessions
            .get(&sd.as_raw())
            .and_then(|s| s.options.get(entry_point).cloned())
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SimulatedEngine")
            .field("sessions", &state.sessions.len())
            .field("listeners", &state.listeners.len())
            .field("accepted_total", &state.accepted_total)
            .finish()
    }
}

fn open_session(state: &mut SimState, sd: c_int) -> Option<&mut SimSession> {
    state.sessions.get_mut(&sd).filter(|s| !s.closed)
}

impl Engine for SimulatedEngine {
    fn new_session(&self) -> c_int {
        let mut state = self.state();
        let sd = state.next_session;
        state.next_session += 1;
        state.sessions.insert(sd, SimSession::default());
        sd
    }

    fn start(&self, sd: c_int) -> c_int {
        let mut state = self.state();
        let Some(session) = open_session(&mut state, sd) else {
            return EBADF;
        };
        if let Some(message) = session.start_failure.take() {
            session.last_error = message;
            return GENERIC_FAILURE;
        }
        session.started = true;
        0
    }

    fn close(&self, sd: c_int) -> c_int {
        let mut state = self.state();
        let Some(session) = open_session(&mut state, sd) else {
            return EBADF;
        };
        session.closed = true;
        state.listeners.retain(|_, l| l.session != sd);
        0
    }

    fn errmsg(&self, sd: c_int, buf: &mut [u8]) -> c_int {
        let mut state = self.state();
        let Some(session) = open_session(&mut state, sd) else {
            return EBADF;
        };
        if write_c_string(buf, &session.last_error) {
            0
        } else {
            ERANGE
        }
    }

    fn set_option(&self, sd: c_int, option: EngineOption<'_>) -> c_int {
        let mut state = self.state();
        let Some(session) = open_session(&mut state, sd) else {
            return EBADF;
        };
        if session.started {
            session.last_error = format!("{}: server already started", option.entry_point());
            return GENERIC_FAILURE;
        }
        let value = match option {
            EngineOption::StateDir(v)
            | EngineOption::Hostname(v)
            | EngineOption::AuthKey(v)
            | EngineOption::ControlUrl(v) => v.to_string_lossy().into_owned(),
            EngineOption::Ephemeral(on) => (if on { "1" } else { "0" }).to_string(),
        };
        session.options.insert(option.entry_point(), value);
        0
    }

    fn listen(&self, sd: c_int, network: &CStr, addr: &CStr, listener_out: &mut c_int) -> c_int {
        let mut state = self.state();
        let Some(session) = open_session(&mut state, sd) else {
            return EBADF;
        };
        if !session.started {
            session.last_error = "tsnet: server not started".to_string();
            return GENERIC_FAILURE;
        }
        if network.to_bytes() != b"tcp" {
            session.last_error = format!(
                "tsnet: unsupported network {:?} for {}",
                network.to_string_lossy(),
                addr.to_string_lossy()
            );
            return GENERIC_FAILURE;
        }

        let pair = UnixStream::pair().and_then(|(rx, tx)| {
            rx.set_nonblocking(true)?;
            Ok((rx, tx))
        });
        let (ready_rx, ready_tx) = match pair {
            Ok(pair) => pair,
            Err(e) => {
                session.last_error = format!("socketpair: {}", e);
                return GENERIC_FAILURE;
            }
        };

        let handle = ready_rx.as_raw_fd();
        state.listeners.insert(
            handle,
            SimListener {
                session: sd,
                ready_rx,
                ready_tx,
                pending: VecDeque::new(),
                accepted: HashMap::new(),
            },
        );
        state.latest_listener = Some(handle);
        *listener_out = handle;
        0
    }

    fn accept(&self, listener: c_int, conn_out: &mut c_int, fd_out: &mut c_int) -> c_int {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(entry) = state.listeners.get_mut(&listener) else {
            return EBADF;
        };
        let failure = if entry.pending.is_empty() {
            Some("accept: no pending connection".to_string())
        } else {
            let mut byte = [0u8; 1];
            match (&entry.ready_rx).read(&mut byte) {
                Ok(1) => None,
                Ok(_) => Some("accept: listener readiness closed".to_string()),
                Err(e) => Some(format!("accept: reading readiness: {}", e)),
            }
        };
        if let Some(message) = failure {
            if let Some(session) = state.sessions.get_mut(&entry.session) {
                session.last_error = message;
            }
            return GENERIC_FAILURE;
        }
        let Some(pending) = entry.pending.pop_front() else {
            return GENERIC_FAILURE;
        };

        let conn = state.next_connection;
        state.next_connection += 1;
        entry.accepted.insert(conn, pending.remote_addr);
        state.accepted_total += 1;

        *conn_out = conn;
        *fd_out = pending.fd.into_raw_fd();
        0
    }

    fn loopback(
        &self,
        sd: c_int,
        addr_out: &mut [u8],
        proxy_cred_out: &mut [u8; CREDENTIAL_LEN],
        local_api_cred_out: &mut [u8; CREDENTIAL_LEN],
    ) -> c_int {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(session) = state.sessions.get_mut(&sd).filter(|s| !s.closed) else {
            return EBADF;
        };
        if !session.started {
            session.last_error = "tsnet: server not started".to_string();
            return GENERIC_FAILURE;
        }
        let fits = write_c_string(addr_out, &state.loopback_address)
            && write_c_string(proxy_cred_out, &state.proxy_credential)
            && write_c_string(local_api_cred_out, &state.local_api_credential);
        if fits {
            0
        } else {
            session.last_error = "loopback: output buffer too small".to_string();
            GENERIC_FAILURE
        }
    }

    fn remote_addr(&self, listener: c_int, conn: c_int, buf: &mut [u8]) -> c_int {
        let state = self.state();
        let Some(addr) = state
            .listeners
            .get(&listener)
            .and_then(|l| l.accepted.get(&conn))
        else {
            return EBADF;
        };
        if write_c_string(buf, addr) {
            0
        } else {
            ERANGE
        }
    }
}
