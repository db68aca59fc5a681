//! Tunnel device abstraction
//!
//! The forwarding loop never talks to a platform interface type directly; it
//! is handed a [`TunnelDevice`] by a [`TunnelProvider`] injected at session
//! construction. This keeps the loop testable (see [`memory`]) and keeps the
//! platform glue in one place (see [`linux`] on Linux).
//!
//! # Handle ownership
//!
//! A device handle is exclusively owned by the active session; no two
//! sessions hold a handle concurrently. `close()` is idempotent and may be
//! called from a different thread than the reader, which is how `stop()`
//! interrupts a blocking read.

mod memory;

#[cfg(target_os = "linux")]
mod linux;

use std::io;
use std::sync::Arc;

pub use memory::{MemoryTunnelDevice, MemoryTunnelProvider};

#[cfg(target_os = "linux")]
pub use linux::{LinuxTunDevice, LinuxTunProvider};

use crate::config::TunnelConfig;
use crate::error::TunnelError;

/// A virtual network interface carrying raw IP packets
///
/// `read` blocks until a packet is available or the device is closed;
/// closing the device from another thread must cause a blocked read to
/// return an error.
pub trait TunnelDevice: Send + Sync {
    /// Read one packet into `buf`, returning its length
    ///
    /// A return of `Ok(0)` is a spurious read; callers retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has been closed or the underlying
    /// read fails.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one packet to the device output side
    ///
    /// # Errors
    ///
    /// Returns an error if the device has been closed or the underlying
    /// write fails.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Release the handle; safe to call more than once
    fn close(&self);

    /// Whether the handle has been closed
    fn is_closed(&self) -> bool;
}

/// Creates tunnel devices from a virtual-interface configuration
pub trait TunnelProvider: Send + Sync {
    /// Establish a device for the given configuration
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Establishment`] (or a more specific variant)
    /// when the platform refuses or fails to create the interface.
    fn establish(&self, config: &TunnelConfig) -> Result<Arc<dyn TunnelDevice>, TunnelError>;
}
