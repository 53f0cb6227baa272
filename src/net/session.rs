//! Overlay session: one engine instance and its lifecycle.
//!
//! # Responsibilities
//! - Create, configure, start and close the native instance
//! - Start the loopback identity service and keep its client
//! - Open listeners bound to this session
//!
//! # Design Decisions
//! - Lifecycle transitions take `&mut self`, so they cannot race
//! - Listeners and connections share an `Arc<SessionShared>` and check its
//!   liveness flag before every native call

use std::ffi::CString;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::buffer::{ScratchBuffer, CREDENTIAL_LEN, LOOPBACK_ADDR_LEN};
use crate::engine::{check_status, Engine, EngineOption, ListenerHandle, SessionHandle};
use crate::error::{OverlayError, OverlayResult};
use crate::identity::{Credential, IdentityRecord, LoopbackIdentityClient};
use crate::net::listener::OverlayListener;

/// State shared read-only by everything derived from a session.
pub(crate) struct SessionShared {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) handle: SessionHandle,
    open: AtomicBool,
    loopback: OnceLock<LoopbackIdentityClient>,
}

impl SessionShared {
    /// Reject use of a handle derived from a closed session.
    pub(crate) fn ensure_open(&self, what: impl std::fmt::Display) -> OverlayResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(OverlayError::InvalidHandle(format!(
                "{} belongs to closed {}",
                what, self.handle
            )))
        }
    }

    pub(crate) fn loopback_client(&self) -> Option<&LoopbackIdentityClient> {
        self.loopback.get()
    }

    pub(crate) async fn who_is(&self, address: &str) -> OverlayResult<IdentityRecord> {
        let client = self.loopback_client().ok_or(OverlayError::LoopbackUnavailable)?;
        client.who_is(address).await
    }
}

/// One native engine instance.
pub struct OverlaySession {
    shared: Arc<SessionShared>,
    started: bool,
    proxy_credential: Option<Credential>,
}

impl OverlaySession {
    /// Allocate a new engine instance.
    pub fn create(engine: Arc<dyn Engine>) -> Self {
        let handle = SessionHandle::from_raw(engine.new_session());
        tracing::debug!(session = %handle, "Overlay session created");

        Self {
            shared: Arc::new(SessionShared {
                engine,
                handle,
                open: AtomicBool::new(true),
                loopback: OnceLock::new(),
            }),
            started: false,
            proxy_credential: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.shared.handle
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_loopback_started(&self) -> bool {
        self.shared.loopback.get().is_some()
    }

    /// Apply pre-start settings.
    pub fn configure(&mut self, config: &EngineConfig) -> OverlayResult<()> {
        self.shared.ensure_open("configure")?;
        if self.started {
            return Err(OverlayError::EngineFault(format!(
                "{} is already started; settings must be applied before start",
                self.handle()
            )));
        }

        if let Some(dir) = &config.state_dir {
            let dir = CString::new(dir.to_string_lossy().into_owned()).map_err(io::Error::from)?;
            self.set_option(EngineOption::StateDir(&dir))?;
        }
        if let Some(hostname) = &config.hostname {
            let hostname = CString::new(hostname.as_str()).map_err(io::Error::from)?;
            self.set_option(EngineOption::Hostname(&hostname))?;
        }
        if let Some(url) = &config.control_url {
            let url = CString::new(url.as_str()).map_err(io::Error::from)?;
            self.set_option(EngineOption::ControlUrl(&url))?;
        }
        if let Some(var) = &config.auth_key_env {
            match std::env::var(var) {
                Ok(key) => {
                    let key = CString::new(key).map_err(io::Error::from)?;
                    self.set_option(EngineOption::AuthKey(&key))?;
                }
                Err(_) => {
                    tracing::warn!(env = %var, "Auth key variable not set; relying on stored node state");
                }
            }
        }
        if config.ephemeral {
            self.set_option(EngineOption::Ephemeral(true))?;
        }
        Ok(())
    }

    fn set_option(&self, option: EngineOption<'_>) -> OverlayResult<()> {
        let engine = self.shared.engine.as_ref();
        let code = engine.set_option(self.handle().as_raw(), option);
        check_status(engine, self.handle(), code)?;
        tracing::debug!(session = %self.handle(), call = option.entry_point(), "Engine option applied");
        Ok(())
    }

    /// Start the engine.
    pub fn start(&mut self) -> OverlayResult<()> {
        self.shared.ensure_open("start")?;
        let engine = self.shared.engine.as_ref();
        check_status(engine, self.handle(), engine.start(self.handle().as_raw()))?;
        self.started = true;
        tracing::info!(session = %self.handle(), "Overlay session started");
        Ok(())
    }

    /// Start the loopback identity service and build its client.
    ///
    /// Calling it again once the service is up is a no-op.
    pub fn start_loopback(&mut self, timeout: Duration) -> OverlayResult<()> {
        self.shared.ensure_open("start_loopback")?;
        if self.is_loopback_started() {
            tracing::debug!(session = %self.handle(), "Loopback server already running");
            return Ok(());
        }

        let mut addr = ScratchBuffer::<LOOPBACK_ADDR_LEN>::new();
        let mut proxy = ScratchBuffer::<CREDENTIAL_LEN>::new();
        let mut local_api = ScratchBuffer::<CREDENTIAL_LEN>::new();
        let engine = self.shared.engine.as_ref();
        let code = engine.loopback(
            self.handle().as_raw(),
            addr.as_mut_slice(),
            proxy.as_mut_array(),
            local_api.as_mut_array(),
        );
        check_status(engine, self.handle(), code)?;

        let address = addr.decode("tailscale_loopback")?;
        let proxy = Credential::new(proxy.decode("tailscale_loopback")?);
        let local_api = Credential::new(local_api.decode("tailscale_loopback")?);

        let client = LoopbackIdentityClient::new(&address, &local_api, timeout)?;
        self.shared
            .loopback
            .set(client)
            .map_err(|_| OverlayError::EngineFault("loopback client already installed".to_string()))?;
        self.proxy_credential = Some(proxy);

        tracing::info!(session = %self.handle(), address = %address, "Loopback server started");
        Ok(())
    }

    pub fn loopback(&self) -> Option<&LoopbackIdentityClient> {
        self.shared.loopback.get()
    }

    /// Credential for the engine's loopback proxy, once the loopback server runs.
    pub fn proxy_credential(&self) -> Option<&Credential> {
        self.proxy_credential.as_ref()
    }

    /// Open a listener on the overlay.
    pub fn listen(&self, network: &str, address: &str) -> OverlayResult<OverlayListener> {
        self.shared.ensure_open("listen")?;
        if !self.started {
            return Err(OverlayError::EngineFault(format!(
                "cannot listen on {} {}: {} is not started",
                network,
                address,
                self.handle()
            )));
        }

        let c_network = CString::new(network).map_err(io::Error::from)?;
        let c_address = CString::new(address).map_err(io::Error::from)?;
        let engine = self.shared.engine.as_ref();
        let mut raw = -1;
        let code = engine.listen(self.handle().as_raw(), &c_network, &c_address, &mut raw);
        check_status(engine, self.handle(), code)?;

        let listener = ListenerHandle::from_raw(raw);
        tracing::info!(
            session = %self.handle(),
            listener = %listener,
            network = %network,
            address = %address,
            "Overlay listener bound"
        );
        Ok(OverlayListener::new(listener, Arc::clone(&self.shared)))
    }

    /// Resolve `address` through this session's loopback service.
    pub async fn who_is(&self, address: &str) -> OverlayResult<IdentityRecord> {
        self.shared.ensure_open("whois")?;
        self.shared.who_is(address).await
    }

    /// Release the engine instance. Everything derived from it becomes invalid.
    pub fn close(&mut self) -> OverlayResult<()> {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return Err(OverlayError::EngineFault(format!(
                "{} is already closed",
                self.handle()
            )));
        }
        let engine = self.shared.engine.as_ref();
        check_status(engine, self.handle(), engine.close(self.handle().as_raw()))?;
        tracing::info!(session = %self.handle(), "Overlay session closed");
        Ok(())
    }
}

impl Drop for OverlaySession {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                tracing::warn!(session = %self.handle(), error = %e, "Failed to close overlay session");
            }
        }
    }
}

impl std::fmt::Debug for OverlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySession")
            .field("handle", &self.handle())
            .field("open", &self.is_open())
            .field("started", &self.started)
            .field("loopback_started", &self.is_loopback_started())
            .finish()
    }
}
