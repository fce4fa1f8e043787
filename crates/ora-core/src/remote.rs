//! # Remote Management
//!
//! A UDP listener that lets an operator retune a running node. Each
//! datagram carries `key:value` pairs separated by commas:
//!
//! ```text
//! KSI_ND:2,trigger.interval:1500,ptx:-25
//! ```
//!
//! Every pair is written into the [`ReconfigurationProperties`] store and
//! `reset=true` is raised, so the sampler restarts its controller history
//! with the new settings on its next tick.

use crate::error::{OraError, Result};
use crate::properties::{keys, ReconfigurationProperties};
use crate::rt::{self, ThreadConfig};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Read timeout bounding how long `stop()` waits for the listener.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Largest accepted datagram.
const MAX_DATAGRAM: usize = 1024;

/// Split a parameterization message into `(key, value)` pairs.
///
/// Tokens without a `:` or with an empty key are skipped.
pub fn parse_parameterization(message: &str) -> Vec<(String, String)> {
    message
        .split(',')
        .filter_map(|token| {
            let token = token.trim();
            if token.is_empty() {
                return None;
            }
            match token.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Some((key.trim().to_string(), value.trim().to_string()))
                }
                _ => {
                    tracing::warn!(token, "Skipping malformed parameter");
                    None
                }
            }
        })
        .collect()
}

/// Apply a parameterization message. Returns the number of pairs written.
///
/// `reset` is raised when at least one pair was written.
pub fn apply_parameterization(props: &ReconfigurationProperties, message: &str) -> usize {
    let pairs = parse_parameterization(message);
    for (key, value) in &pairs {
        tracing::info!(key = %key, value = %value, "Remote parameter update");
        props.set(key.as_str(), value);
    }
    if !pairs.is_empty() {
        props.set(keys::RESET, true);
    }
    pairs.len()
}

/// Background listener applying remote parameterizations.
pub struct RemoteManagement {
    props: ReconfigurationProperties,
    running: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    local_addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
}

impl RemoteManagement {
    pub fn new(props: ReconfigurationProperties) -> Self {
        Self {
            props,
            running: Arc::new(AtomicBool::new(false)),
            received: Arc::new(AtomicU64::new(0)),
            local_addr: None,
            handle: None,
        }
    }

    /// Bind `addr` and start listening on a named thread.
    pub fn start(&mut self, addr: &str) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(OraError::Runtime("remote management already running".into()));
        }
        let socket = UdpSocket::bind(addr)
            .map_err(|e| OraError::Runtime(format!("failed to bind {addr}: {e}")))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| OraError::Runtime(format!("failed to set read timeout: {e}")))?;
        let local = socket
            .local_addr()
            .map_err(|e| OraError::Runtime(format!("no local address: {e}")))?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let received = self.received.clone();
        let props = self.props.clone();
        let handle = rt::spawn_named(ThreadConfig::new(rt::REMOTE_THREAD), move || {
            listen(socket, props, running, received)
        });
        match handle {
            Ok(h) => {
                self.handle = Some(h);
                self.local_addr = Some(local);
                tracing::info!(addr = %local, "Remote management listening");
                Ok(local)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stop the listener and wait for its thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Remote management thread panicked");
            }
            tracing::info!("Remote management stopped");
        }
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Parameterization messages applied so far.
    pub fn messages_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Drop for RemoteManagement {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(socket: UdpSocket, props: ReconfigurationProperties, running: Arc<AtomicBool>, received: Arc<AtomicU64>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let message = String::from_utf8_lossy(&buf[..len]);
                tracing::info!(%from, message = %message, "Received parameterization");
                if apply_parameterization(&props, &message) > 0 {
                    received.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => tracing::warn!(error = %e, "Parameterization communication error"),
        }
    }
}
