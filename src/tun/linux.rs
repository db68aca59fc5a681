//! Linux TUN device implementation
//!
//! Opens `/dev/net/tun`, attaches an interface with `TUNSETIFF`
//! (`IFF_TUN | IFF_NO_PI`, so reads and writes carry bare IP packets), and
//! configures the address, MTU, and route with the `ip` tool.
//!
//! Reads go through `poll(2)` on the TUN descriptor paired with an eventfd.
//! `close()` signals the eventfd, which is what wakes a reader parked in the
//! kernel; closing the TUN descriptor alone would not, since the blocked
//! syscall holds its own reference to the open file. The descriptors
//! themselves are released in `Drop`, once no reader can still be polling
//! them.
//!
//! Requires `CAP_NET_ADMIN`.

use std::io;
use std::os::fd::RawFd;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libc::{c_char, c_short, c_ulong, c_void};
use tracing::{debug, info, warn};

use super::{TunnelDevice, TunnelProvider};
use crate::config::TunnelConfig;
use crate::error::TunnelError;

/// TUNSETIFF ioctl number
const TUNSETIFF: c_ulong = 0x4004_54ca;

/// Interface request structure for TUNSETIFF
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; libc::IFNAMSIZ],
    ifr_flags: c_short,
    _pad: [u8; 22],
}

/// Linux TUN device backed by a `/dev/net/tun` file descriptor
///
/// `fd` and `wake_fd` stay open until the last handle is dropped; `close()`
/// only flags the device and signals `wake_fd`.
pub struct LinuxTunDevice {
    fd: RawFd,
    wake_fd: RawFd,
    name: String,
    closed: AtomicBool,
}

impl LinuxTunDevice {
    /// Open the clone device and attach an interface
    ///
    /// If `requested_name` is `None` the kernel assigns a name like `tun0`.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::PermissionDenied`] when the caller lacks
    /// `CAP_NET_ADMIN`, otherwise [`TunnelError::Establishment`] with the
    /// OS error.
    pub fn open(requested_name: Option<&str>) -> Result<Self, TunnelError> {
        // SAFETY: plain open(2) on a constant NUL-terminated path.
        let fd = unsafe { libc::open(b"/dev/net/tun\0".as_ptr().cast::<c_char>(), libc::O_RDWR) };
        if fd < 0 {
            return Err(Self::map_os_error(io::Error::last_os_error()));
        }

        let mut ifr = IfReq {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_flags: (libc::IFF_TUN | libc::IFF_NO_PI) as c_short,
            _pad: [0; 22],
        };

        if let Some(name) = requested_name {
            let bytes = name.as_bytes();
            if bytes.len() >= libc::IFNAMSIZ {
                // SAFETY: fd was just opened above.
                unsafe { libc::close(fd) };
                return Err(TunnelError::establishment(format!(
                    "Interface name too long: {name}"
                )));
            }
            for (dst, src) in ifr.ifr_name.iter_mut().zip(bytes) {
                *dst = *src as c_char;
            }
        }

        // SAFETY: fd is a valid tun clone descriptor and ifr is a properly
        // initialized ifreq for TUNSETIFF.
        let rc = unsafe { libc::ioctl(fd, TUNSETIFF, std::ptr::addr_of_mut!(ifr)) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd was just opened above.
            unsafe { libc::close(fd) };
            return Err(Self::map_os_error(err));
        }

        // SAFETY: eventfd(2) with a zero counter; no pointers involved.
        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if wake_fd < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd was just opened above.
            unsafe { libc::close(fd) };
            return Err(Self::map_os_error(err));
        }

        let name_len = ifr
            .ifr_name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(libc::IFNAMSIZ);
        let name: String = ifr.ifr_name[..name_len]
            .iter()
            .map(|&c| c as u8 as char)
            .collect();

        debug!(interface = %name, "TUN device attached");

        Ok(Self {
            fd,
            wake_fd,
            name,
            closed: AtomicBool::new(false),
        })
    }

    /// Kernel-assigned interface name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assign the address, bring the interface up, and install the route
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Establishment`] if any `ip` invocation fails.
    pub fn configure(&self, config: &TunnelConfig) -> Result<(), TunnelError> {
        run_ip(&[
            "addr",
            "add",
            &format!("{}/{}", config.address, config.prefix_len),
            "dev",
            &self.name,
        ])?;
        run_ip(&[
            "link",
            "set",
            "dev",
            &self.name,
            "up",
            "mtu",
            &config.mtu.to_string(),
        ])?;
        if config.default_route {
            run_ip(&["route", "add", "0.0.0.0/0", "dev", &self.name])?;
        }
        info!(
            interface = %self.name,
            address = %config.address,
            prefix = config.prefix_len,
            mtu = config.mtu,
            "TUN device configured"
        );
        Ok(())
    }

    fn map_os_error(err: io::Error) -> TunnelError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            TunnelError::PermissionDenied
        } else {
            TunnelError::establishment(err.to_string())
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "tunnel device closed")
}

impl TunnelDevice for LinuxTunDevice {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(closed_error());
            }

            let mut fds = [
                libc::pollfd {
                    fd: self.fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake_fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            // SAFETY: fds points at two initialized pollfd entries on this
            // frame; both descriptors stay open until Drop.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            // The wake descriptor only fires from close()
            if fds[1].revents != 0 || self.closed.load(Ordering::Acquire) {
                return Err(closed_error());
            }

            if fds[0].revents != 0 {
                // SAFETY: fd stays open until Drop; buf bounds are passed
                // explicitly.
                let n =
                    unsafe { libc::read(self.fd, buf.as_mut_ptr().cast::<c_void>(), buf.len()) };
                if n < 0 {
                    return Err(io::Error::last_os_error());
                }
                return Ok(n as usize);
            }
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        // SAFETY: fd stays open until Drop; buf bounds are passed explicitly.
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast::<c_void>(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let one: u64 = 1;
            // SAFETY: wake_fd is a valid eventfd until Drop; this writes the
            // 8-byte counter increment that wakes any reader parked in poll.
            let rc = unsafe {
                libc::write(
                    self.wake_fd,
                    std::ptr::addr_of!(one).cast::<c_void>(),
                    std::mem::size_of::<u64>(),
                )
            };
            if rc < 0 {
                warn!(
                    interface = %self.name,
                    error = %io::Error::last_os_error(),
                    "failed to wake reader on close"
                );
            }
            debug!(interface = %self.name, "tunnel device closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for LinuxTunDevice {
    fn drop(&mut self) {
        self.close();
        // Exclusive ownership here: no reader can still be polling these
        // descriptors, so the fd numbers cannot be reused under one.
        // SAFETY: both descriptors were opened in open() and closed nowhere
        // else.
        unsafe {
            libc::close(self.fd);
            libc::close(self.wake_fd);
        }
    }
}

fn run_ip(args: &[&str]) -> Result<(), TunnelError> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| TunnelError::establishment(format!("failed to run ip: {e}")))?;
    if !output.status.success() {
        return Err(TunnelError::establishment(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Provider creating real Linux TUN devices
#[derive(Debug, Default)]
pub struct LinuxTunProvider;

impl LinuxTunProvider {
    /// Create a provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TunnelProvider for LinuxTunProvider {
    fn establish(&self, config: &TunnelConfig) -> Result<Arc<dyn TunnelDevice>, TunnelError> {
        let device = LinuxTunDevice::open(config.name.as_deref())?;
        device.configure(config)?;
        Ok(Arc::new(device))
    }
}
