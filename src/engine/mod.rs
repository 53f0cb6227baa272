//! Native engine boundary.
//!
//! # Data Flow
//! ```text
//! OverlaySession / OverlayListener / OverlayConnection
//!     → Engine trait (integer return codes, caller-owned buffers)
//!     → ffi.rs (libtailscale, feature "libtailscale")
//!       or simulated.rs (in-process engine over Unix socket pairs)
//! ```
//!
//! # Design Decisions
//! - The trait mirrors the C ABI one-to-one so return-code handling lives in
//!   one place and is exercised by the simulated engine in tests
//! - Handles are typed integers; the owning session tracks liveness
//! - Listener handles double as pollable descriptors for readiness

use std::ffi::CStr;
use std::os::raw::c_int;

use crate::error::{OverlayError, OverlayResult};

pub mod buffer;
#[cfg(feature = "libtailscale")]
pub mod ffi;
pub mod simulated;

use buffer::{ScratchBuffer, CREDENTIAL_LEN, ERROR_MESSAGE_LEN};

/// Return code: invalid session, listener or connection.
pub const EBADF: c_int = 0x9;
/// Return code: caller buffer too small.
pub const ERANGE: c_int = 0x22;
/// Return code: generic failure, details via `errmsg`.
pub const GENERIC_FAILURE: c_int = -1;

/// Handle of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(c_int);

/// Handle of one listener, scoped to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(c_int);

/// Engine-assigned id of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeConnectionId(c_int);

macro_rules! raw_handle {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            pub fn from_raw(raw: c_int) -> Self {
                Self(raw)
            }

            pub fn as_raw(&self) -> c_int {
                self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

raw_handle!(SessionHandle, "session");
raw_handle!(ListenerHandle, "listener");
raw_handle!(NativeConnectionId, "native-conn");

/// A pre-start setting forwarded to the engine.
#[derive(Debug, Clone, Copy)]
pub enum EngineOption<'a> {
    StateDir(&'a CStr),
    Hostname(&'a CStr),
    AuthKey(&'a CStr),
    ControlUrl(&'a CStr),
    Ephemeral(bool),
}

impl EngineOption<'_> {
    /// Name of the native entry point this option maps to.
    pub fn entry_point(&self) -> &'static str {
        match self {
            EngineOption::StateDir(_) => "tailscale_set_dir",
            EngineOption::Hostname(_) => "tailscale_set_hostname",
            EngineOption::AuthKey(_) => "tailscale_set_authkey",
            EngineOption::ControlUrl(_) => "tailscale_set_control_url",
            EngineOption::Ephemeral(_) => "tailscale_set_ephemeral",
        }
    }
}

/// The synchronous call interface of the overlay engine.
///
/// Every method returns the native status code unchanged; `0` is success.
/// Implementations must issue listener handles that are pollable file
/// descriptors which become readable while a connection is pending, and
/// connection descriptors that are connected stream sockets whose ownership
/// passes to the caller.
pub trait Engine: Send + Sync + 'static {
    fn new_session(&self) -> c_int;
    fn start(&self, sd: c_int) -> c_int;
    fn close(&self, sd: c_int) -> c_int;
    fn errmsg(&self, sd: c_int, buf: &mut [u8]) -> c_int;
    fn set_option(&self, sd: c_int, option: EngineOption<'_>) -> c_int;
    fn listen(&self, sd: c_int, network: &CStr, addr: &CStr, listener_out: &mut c_int) -> c_int;
    fn accept(&self, listener: c_int, conn_out: &mut c_int, fd_out: &mut c_int) -> c_int;
    fn loopback(
        &self,
        sd: c_int,
        addr_out: &mut [u8],
        proxy_cred_out: &mut [u8; CREDENTIAL_LEN],
        local_api_cred_out: &mut [u8; CREDENTIAL_LEN],
    ) -> c_int;
    fn remote_addr(&self, listener: c_int, conn: c_int, buf: &mut [u8]) -> c_int;
}

/// Fetch the engine's error text for `sd` and turn it into an error.
pub(crate) fn fetch_error(engine: &dyn Engine, sd: SessionHandle) -> OverlayError {
    let mut buf = ScratchBuffer::<ERROR_MESSAGE_LEN>::new();
    match engine.errmsg(sd.as_raw(), buf.as_mut_slice()) {
        0 => match buf.decode("tailscale_errmsg") {
            Ok(message) => OverlayError::EngineFault(message),
            Err(e) => e,
        },
        EBADF => OverlayError::InvalidHandle(format!("{} passed to tailscale_errmsg", sd)),
        ERANGE => OverlayError::InsufficientBuffer {
            call: "tailscale_errmsg",
            capacity: ERROR_MESSAGE_LEN,
        },
        code => OverlayError::EngineFault(format!(
            "unhandled return value {} from tailscale_errmsg",
            code
        )),
    }
}

/// Map a session-level status code: zero is success, anything else carries the engine text.
pub(crate) fn check_status(engine: &dyn Engine, sd: SessionHandle, code: c_int) -> OverlayResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(fetch_error(engine, sd))
    }
}
