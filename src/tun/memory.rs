//! In-memory tunnel device
//!
//! A loopback [`TunnelDevice`] backed by in-process queues. The input side is
//! fed by [`MemoryTunnelDevice::inject`]; packets the firewall forwards land
//! on the output side and can be inspected with
//! [`MemoryTunnelDevice::written`]. Used by the test suite and useful for
//! driving the forwarding loop without a real interface.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{TunnelDevice, TunnelProvider};
use crate::config::TunnelConfig;
use crate::error::TunnelError;

/// In-memory loopback tunnel device
#[derive(Debug, Default)]
pub struct MemoryTunnelDevice {
    /// Packets waiting to be read by the forwarding loop
    inbound: Mutex<VecDeque<Vec<u8>>>,
    /// Signals a blocked reader when a packet arrives or the device closes
    available: Condvar,
    /// Packets the forwarding loop wrote out
    outbound: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    /// Number of effective closes; stays at 1 under repeated close()
    close_count: AtomicUsize,
}

impl MemoryTunnelDevice {
    /// Create an open device with empty queues
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet on the input side, waking a blocked reader
    ///
    /// An empty packet is delivered as a zero-length (spurious) read.
    pub fn inject(&self, packet: Vec<u8>) {
        let mut inbound = self.inbound.lock();
        inbound.push_back(packet);
        self.available.notify_one();
    }

    /// Packets written to the output side so far
    #[must_use]
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().clone()
    }

    /// Number of times `close()` actually released the handle
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }
}

impl TunnelDevice for MemoryTunnelDevice {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock();
        loop {
            if let Some(packet) = inbound.pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "tunnel device closed",
                ));
            }
            self.available.wait(&mut inbound);
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "tunnel device closed",
            ));
        }
        self.outbound.lock().push(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_count.fetch_add(1, Ordering::AcqRel);
            // Wake any reader blocked on an empty queue
            self.available.notify_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Provider handing out fresh in-memory devices
///
/// Keeps a reference to the most recently established device so callers can
/// inject traffic and inspect output.
#[derive(Debug, Default)]
pub struct MemoryTunnelProvider {
    last: Mutex<Option<Arc<MemoryTunnelDevice>>>,
}

impl MemoryTunnelProvider {
    /// Create a provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The device handed out by the most recent `establish` call
    #[must_use]
    pub fn last_device(&self) -> Option<Arc<MemoryTunnelDevice>> {
        self.last.lock().clone()
    }
}

impl TunnelProvider for MemoryTunnelProvider {
    fn establish(&self, _config: &TunnelConfig) -> Result<Arc<dyn TunnelDevice>, TunnelError> {
        let device = Arc::new(MemoryTunnelDevice::new());
        *self.last.lock() = Some(Arc::clone(&device));
        Ok(device)
    }
}
