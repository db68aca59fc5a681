//! The forwarding loop body
//!
//! One iteration: blocking read from the tunnel device, parse the header,
//! evaluate the rule engine, update counters, and either write the original
//! bytes back out or drop them. Packets are handled strictly in read order;
//! there is no per-packet concurrency.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use super::SessionShared;
use crate::error::TunnelError;
use crate::packet::{Ipv4Header, MAX_PACKET_SIZE};
use crate::rules::{RuleEngine, Verdict};
use crate::tun::TunnelDevice;

/// Run the loop until stop is requested or I/O fails
///
/// Returns `Ok(())` on a requested stop. An I/O error after a stop request
/// is the intentional close interrupting the blocking read and is not an
/// error; any other I/O failure is fatal to the session and returned.
pub(super) fn run(
    device: &Arc<dyn TunnelDevice>,
    engine: &RuleEngine,
    shared: &SessionShared,
) -> Result<(), TunnelError> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        if shared.stop_requested.load(Ordering::Acquire) {
            return Ok(());
        }

        let len = match device.read(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                if shared.stop_requested.load(Ordering::Acquire) {
                    trace!("read interrupted by stop request");
                    return Ok(());
                }
                // A close without a stop request means the handle was pulled
                // out from under the session
                if device.is_closed() {
                    return Err(TunnelError::Closed);
                }
                return Err(TunnelError::Io(e));
            }
        };

        // Spurious read; retry
        if len == 0 {
            continue;
        }

        let packet = &buf[..len];
        shared.stats.record_received(len as u64);

        match Ipv4Header::parse(packet) {
            Err(e) => {
                // Cannot evaluate rules without a valid header; drop and
                // keep going
                debug!(len, error = %e, "dropping malformed packet");
                shared.stats.record_malformed();
            }
            Ok(header) => {
                shared.stats.record_analyzed(header.protocol);
                if !header.is_ipv4() {
                    // Fixed-offset parse of non-IPv4 traffic; forwarded
                    // best-effort
                    debug!(version = header.version, "non-IPv4 packet");
                }

                match engine.evaluate(&header) {
                    Verdict::Drop => {
                        debug!(
                            destination = %header.destination,
                            protocol = %header.protocol,
                            "packet dropped by rule"
                        );
                        shared.stats.record_dropped();
                    }
                    Verdict::Allow => {
                        if let Err(e) = device.write(packet) {
                            if shared.stop_requested.load(Ordering::Acquire) {
                                trace!("write interrupted by stop request");
                                return Ok(());
                            }
                            if device.is_closed() {
                                return Err(TunnelError::Closed);
                            }
                            return Err(TunnelError::Io(e));
                        }
                        shared.stats.record_sent();
                        trace!(
                            destination = %header.destination,
                            len,
                            "packet forwarded"
                        );
                    }
                }
            }
        }

        shared.publish_stats();
    }
}
