//! Link device abstraction
//!
//! The engine is generic over [`LinkBus`] so the simulator and real device
//! bindings share one code path. The trait mirrors the physical contract of
//! the link: two level-signaled handshake lines and a synchronous
//! fixed-size full-duplex exchange that always moves bytes in both
//! directions at once.

use std::future::Future;

use crate::error::TransferError;

/// A bound full-duplex link device
///
/// `transfer` is the only suspension point of the engine's cycle; both
/// level reads must be cheap and non-blocking. `rebind` tears down and
/// reopens the underlying device resource; the engine calls it only from
/// inside the resetting state, so implementations do not need their own
/// exclusion.
pub trait LinkBus: Send + 'static {
    /// Peer is ready to accept a transfer (handshake line)
    fn peer_ready(&self) -> bool;

    /// Peer has data queued for the host (data-ready line)
    fn peer_has_data(&self) -> bool;

    /// One fixed-size full-duplex exchange
    ///
    /// `tx` and `rx` are always exactly the configured transfer size. On
    /// error the cycle's buffers are discarded and no received data is
    /// processed.
    fn transfer(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Tear down and re-establish the device binding
    ///
    /// Called when the slave firmware restarts. Failure is logged by the
    /// engine and the link keeps trying; it is not fatal.
    fn rebind(&mut self) -> impl Future<Output = Result<(), TransferError>> + Send;
}
