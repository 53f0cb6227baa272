//! Fixed-size scratch buffers for native string results.
//!
//! The engine writes NUL-terminated strings into caller-owned buffers. A result
//! whose terminated encoding exactly fills the buffer is valid; anything longer
//! is reported by the engine as `ERANGE`. Decoding re-checks for the terminator
//! so a misbehaving engine can never make us read past the buffer or truncate.

use std::ffi::CStr;

use crate::error::{OverlayError, OverlayResult};

/// Capacity of the buffer handed to `tailscale_errmsg`.
pub const ERROR_MESSAGE_LEN: usize = 512;
/// Capacity of the buffer handed to `tailscale_getremoteaddr`.
pub const REMOTE_ADDR_LEN: usize = 512;
/// Capacity of the loopback address buffer handed to `tailscale_loopback`.
pub const LOOPBACK_ADDR_LEN: usize = 1024;
/// Capacity of each credential buffer (32 hex characters plus terminator).
pub const CREDENTIAL_LEN: usize = 33;

/// A zeroed, fixed-capacity byte buffer for one native call.
pub struct ScratchBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> ScratchBuffer<N> {
    pub fn new() -> Self {
        Self { bytes: [0; N] }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn as_mut_array(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Decode the NUL-terminated UTF-8 string written by `call`.
    pub fn decode(&self, call: &'static str) -> OverlayResult<String> {
        CStr::from_bytes_until_nul(&self.bytes)
            .map(|s| s.to_string_lossy().into_owned())
            .map_err(|_| OverlayError::InsufficientBuffer { call, capacity: N })
    }
}

impl<const N: usize> Default for ScratchBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `value` plus a terminator into `dst`, the way the engine fills buffers.
///
/// Returns `false` (leaving `dst` untouched) when it does not fit.
pub fn write_c_string(dst: &mut [u8], value: &str) -> bool {
    let len = value.len();
    if len + 1 > dst.len() {
        return false;
    }
    dst[..len].copy_from_slice(value.as_bytes());
    dst[len] = 0;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_fit_decodes() {
        let mut buf = ScratchBuffer::<ERROR_MESSAGE_LEN>::new();
        let msg = "e".repeat(ERROR_MESSAGE_LEN - 1);
        assert!(write_c_string(buf.as_mut_slice(), &msg));
        assert_eq!(buf.decode("tailscale_errmsg").unwrap(), msg);
    }

    #[test]
    fn one_byte_over_does_not_fit() {
        let mut buf = ScratchBuffer::<REMOTE_ADDR_LEN>::new();
        let addr = "a".repeat(REMOTE_ADDR_LEN);
        assert!(!write_c_string(buf.as_mut_slice(), &addr));
    }

    #[test]
    fn missing_terminator_is_insufficient_buffer() {
        let mut buf = ScratchBuffer::<4>::new();
        buf.as_mut_slice().copy_from_slice(b"abcd");
        match buf.decode("tailscale_getremoteaddr") {
            Err(OverlayError::InsufficientBuffer { call, capacity }) => {
                assert_eq!(call, "tailscale_getremoteaddr");
                assert_eq!(capacity, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn credential_buffer_holds_32_chars() {
        let mut buf = ScratchBuffer::<CREDENTIAL_LEN>::new();
        let cred = "0123456789abcdef0123456789abcdef";
        assert!(write_c_string(buf.as_mut_array(), cred));
        assert_eq!(buf.decode("tailscale_loopback").unwrap(), cred);
        assert_eq!(buf.capacity(), 33);
    }
}
