//! Binding to the native `libtailscale` engine.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use super::buffer::CREDENTIAL_LEN;
use super::{Engine, EngineOption};

#[link(name = "tailscale")]
extern "C" {
    fn tailscale_new() -> c_int;
    fn tailscale_start(sd: c_int) -> c_int;
    fn tailscale_close(sd: c_int) -> c_int;
    fn tailscale_errmsg(sd: c_int, buf: *mut c_char, buflen: usize) -> c_int;
    fn tailscale_set_dir(sd: c_int, dir: *const c_char) -> c_int;
    fn tailscale_set_hostname(sd: c_int, hostname: *const c_char) -> c_int;
    fn tailscale_set_authkey(sd: c_int, authkey: *const c_char) -> c_int;
    fn tailscale_set_control_url(sd: c_int, control_url: *const c_char) -> c_int;
    fn tailscale_set_ephemeral(sd: c_int, ephemeral: c_int) -> c_int;
    fn tailscale_listen(
        sd: c_int,
        network: *const c_char,
        addr: *const c_char,
        listener_out: *mut c_int,
    ) -> c_int;
    fn tailscale_accept(listener: c_int, conn_out: *mut c_int, fd_out: *mut c_int) -> c_int;
    fn tailscale_loopback(
        sd: c_int,
        addr_out: *mut c_char,
        addrlen: usize,
        proxy_cred_out: *mut c_char,
        local_api_cred_out: *mut c_char,
    ) -> c_int;
    fn tailscale_getremoteaddr(
        listener: c_int,
        conn: c_int,
        buf: *mut c_char,
        buflen: usize,
    ) -> c_int;
}

/// The process-linked libtailscale engine.
///
/// Stateless: all state lives behind the integer handles the library issues.
#[derive(Debug, Default, Clone, Copy)]
pub struct Libtailscale;

// SAFETY (all methods): string arguments are valid NUL-terminated `CStr`s that
// outlive the call; output buffers are exclusively borrowed slices whose exact
// length is passed alongside the pointer; out-parameters point to live locals.
impl Engine for Libtailscale {
    fn new_session(&self) -> c_int {
        unsafe { tailscale_new() }
    }

    fn start(&self, sd: c_int) -> c_int {
        unsafe { tailscale_start(sd) }
    }

    fn close(&self, sd: c_int) -> c_int {
        unsafe { tailscale_close(sd) }
    }

    fn errmsg(&self, sd: c_int, buf: &mut [u8]) -> c_int {
        unsafe { tailscale_errmsg(sd, buf.as_mut_ptr().cast(), buf.len()) }
    }

    fn set_option(&self, sd: c_int, option: EngineOption<'_>) -> c_int {
        unsafe {
            match option {
                EngineOption::StateDir(v) => tailscale_set_dir(sd, v.as_ptr()),
                EngineOption::Hostname(v) => tailscale_set_hostname(sd, v.as_ptr()),
                EngineOption::AuthKey(v) => tailscale_set_authkey(sd, v.as_ptr()),
                EngineOption::ControlUrl(v) => tailscale_set_control_url(sd, v.as_ptr()),
                EngineOption::Ephemeral(on) => tailscale_set_ephemeral(sd, c_int::from(on)),
            }
        }
    }

    fn listen(&self, sd: c_int, network: &CStr, addr: &CStr, listener_out: &mut c_int) -> c_int {
        unsafe { tailscale_listen(sd, network.as_ptr(), addr.as_ptr(), listener_out) }
    }

    fn accept(&self, listener: c_int, conn_out: &mut c_int, fd_out: &mut c_int) -> c_int {
        unsafe { tailscale_accept(listener, conn_out, fd_out) }
    }

    fn loopback(
        &self,
        sd: c_int,
        addr_out: &mut [u8],
        proxy_cred_out: &mut [u8; CREDENTIAL_LEN],
        local_api_cred_out: &mut [u8; CREDENTIAL_LEN],
    ) -> c_int {
        unsafe {
            tailscale_loopback(
                sd,
                addr_out.as_mut_ptr().cast(),
                addr_out.len(),
                proxy_cred_out.as_mut_ptr().cast(),
                local_api_cred_out.as_mut_ptr().cast(),
            )
        }
    }

    fn remote_addr(&self, listener: c_int, conn: c_int, buf: &mut [u8]) -> c_int {
        unsafe { tailscale_getremoteaddr(listener, conn, buf.as_mut_ptr().cast(), buf.len()) }
    }
}
