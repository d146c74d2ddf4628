//! Transaction engine
//!
//! One task owns the bus and drives one fixed-size full-duplex exchange per
//! cycle. The link is synchronous: bytes move in both directions every
//! transfer whether or not either side has real data, so the engine always
//! puts valid fixed-size buffers on both sides: a dequeued frame (or a
//! zero-filled buffer) out, a fresh allocation in.
//!
//! # Cycle
//!
//! 1. Gate on the peer-ready line; while work is pending, retry on a short
//!    timer instead of spinning.
//! 2. Dequeue the highest-priority transmit frame, if any.
//! 3. Run the exchange. A bus error aborts this cycle only.
//! 4. Decode, validate and trim the received buffer; route priv init
//!    events into negotiation, everything else into the receive queues.
//! 5. Reschedule immediately while transmit backlog or the data-ready line
//!    persists, otherwise park until the next interrupt.
//!
//! The engine task is the only mutator of the queues outside the transmit
//! entry point, and the only owner of the bus; reinit runs inline here, so
//! the resetting state needs no extra locking.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use hostlink_wire::header::{FLAG_POWER_SAVE_STARTED, FLAG_POWER_SAVE_STOPPED};
use hostlink_wire::negotiation::PRIV_PACKET_TYPE_EVENT;
use hostlink_wire::{
    check_firmware, parse_init_event, Frame, FwCheckPolicy, InterfaceType, RawTpMode, TypeTag,
    HEADER_SIZE,
};

use crate::bus::LinkBus;
use crate::events::LinkEvent;
use crate::transport::{LinkStatus, Shared, Transport};

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Fixed size of every full-duplex exchange, in bytes
    pub transfer_size: usize,
    /// High watermark for pending Other-class transmit frames
    pub tx_pending_max: usize,
    /// Delay before re-checking a deasserted peer-ready line, in ms
    pub not_ready_retry_ms: u64,
    /// Firmware version compatibility policy
    pub fw_check: FwCheckPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transfer_size: 1600,
            tx_pending_max: 100,
            not_ready_retry_ms: 1,
            fw_check: FwCheckPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Largest payload that fits one transfer
    pub fn max_payload(&self) -> usize {
        self.transfer_size.saturating_sub(HEADER_SIZE)
    }
}

/// What to do after one exchange cycle
enum Cycle {
    /// More work is queued or signaled; run another cycle now
    Again,
    /// Peer not ready but work is pending; retry after a short delay
    NotReady,
    /// Nothing to do; park until the next interrupt
    Idle,
}

/// The engine task driving one link
pub struct TransactionEngine<B: LinkBus> {
    bus: B,
    shared: Arc<Shared>,
    /// First bring-up completed; the next init event means a peer restart
    booted: bool,
}

impl<B: LinkBus> TransactionEngine<B> {
    /// Wire up an engine, its transport handle and the event stream
    ///
    /// The caller spawns [`TransactionEngine::run`] on its runtime.
    pub fn new(
        bus: B,
        config: TransportConfig,
    ) -> (Self, Transport, mpsc::UnboundedReceiver<LinkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::Down);
        let shared = Arc::new(Shared::new(config, event_tx, status_tx));
        let transport = Transport::new(shared.clone(), status_rx);

        let engine = Self {
            bus,
            shared,
            booted: false,
        };
        (engine, transport, event_rx)
    }

    /// Run exchange cycles until shutdown
    pub async fn run(mut self) {
        info!("link transaction engine started");
        let retry = Duration::from_millis(self.shared.config.not_ready_retry_ms.max(1));

        while !self.shared.is_shutdown() {
            match self.cycle().await {
                Cycle::Again => {}
                Cycle::NotReady => sleep(retry).await,
                Cycle::Idle => self.shared.wake.wait().await,
            }
        }
        info!("link transaction engine stopped");
    }

    async fn cycle(&mut self) -> Cycle {
        if !self.bus.peer_ready() {
            if self.bus.peer_has_data() || self.shared.has_tx_backlog() {
                return Cycle::NotReady;
            }
            return Cycle::Idle;
        }

        let rx_pending = self.bus.peer_has_data();
        let tx_frame = self.next_tx_frame();
        if tx_frame.is_none() && !rx_pending {
            return Cycle::Idle;
        }

        // Both sides of the exchange always see full-size valid buffers:
        // real frame bytes padded with zeros, or all zeros when we have
        // nothing to say.
        let size = self.shared.config.transfer_size;
        let mut tx_buf = vec![0u8; size];
        if let Some(frame) = &tx_frame {
            tx_buf[..frame.as_bytes().len()].copy_from_slice(frame.as_bytes());
        }
        let mut rx_buf = vec![0u8; size];

        if let Err(e) = self.bus.transfer(&tx_buf, &mut rx_buf).await {
            warn!("exchange failed: {}", e);
            self.shared
                .stats
                .transfer_failures
                .fetch_add(1, Ordering::Relaxed);
            self.shared.emit(LinkEvent::TransferFailed { error: e });
            // Buffers (tx frame included) are discarded. Retry on the
            // timer while work remains; a failed cycle never escalates.
            if self.shared.has_tx_backlog() || self.bus.peer_has_data() {
                return Cycle::NotReady;
            }
            return Cycle::Idle;
        }

        if tx_frame.is_some() {
            self.shared.stats.tx_frames.fetch_add(1, Ordering::Relaxed);
        }
        drop(tx_frame);

        self.process_rx(rx_buf).await;

        if self.shared.has_tx_backlog() || self.bus.peer_has_data() {
            Cycle::Again
        } else {
            Cycle::Idle
        }
    }

    /// Dequeue the next transmit frame, surfacing a resume edge
    fn next_tx_frame(&self) -> Option<Frame> {
        let out = self.shared.tx.lock().unwrap().pop()?;
        if out.resumed {
            self.shared.emit(LinkEvent::TxResumed);
        }
        Some(out.frame)
    }

    async fn process_rx(&mut self, buf: Vec<u8>) {
        // A peer with nothing to say clocks out zeros; don't count those as
        // malformed noise.
        let idle = buf.iter().take(HEADER_SIZE).all(|b| *b == 0);

        let frame = match Frame::from_transfer(buf) {
            Ok(frame) => frame,
            Err(e) => {
                if !idle {
                    debug!("dropping malformed transfer: {}", e);
                    self.shared
                        .stats
                        .rx_dropped_malformed
                        .fetch_add(1, Ordering::Relaxed);
                }
                return;
            }
        };

        if self.shared.checksum_enabled() && !frame.verify_checksum() {
            debug!(
                "dropping {} frame seq {} on checksum mismatch",
                frame.if_type().name(),
                frame.header().seq_num
            );
            self.shared
                .stats
                .rx_dropped_checksum
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let flags = frame.header().flags;
        if flags & FLAG_POWER_SAVE_STARTED != 0 {
            self.shared.emit(LinkEvent::PowerSave { started: true });
        } else if flags & FLAG_POWER_SAVE_STOPPED != 0 {
            self.shared.emit(LinkEvent::PowerSave { started: false });
        }

        if frame.if_type() == InterfaceType::Priv {
            match frame.header().type_tag {
                TypeTag::Priv(PRIV_PACKET_TYPE_EVENT) => {
                    self.handle_init_event(frame.payload()).await;
                }
                other => debug!("ignoring priv frame with tag {:?}", other),
            }
            return;
        }

        if !self.shared.link_up() {
            debug!(
                "data path closed, dropping {} frame",
                frame.if_type().name()
            );
            return;
        }

        self.shared.rx.lock().unwrap().push(frame);
        self.shared.stats.rx_frames.fetch_add(1, Ordering::Relaxed);
        self.shared.rx_notify.notify_one();
    }

    async fn handle_init_event(&mut self, payload: &[u8]) {
        let report = match parse_init_event(payload) {
            Ok(report) => report,
            Err(e) => {
                warn!("rejecting slave init event: {}", e);
                self.shared
                    .emit(LinkEvent::NegotiationFailed { error: e.clone() });
                self.shared.mark_failed(e);
                return;
            }
        };

        let fw_checked = match check_firmware(&report, self.shared.config.fw_check) {
            Ok(checked) => checked,
            Err(e) => {
                warn!("rejecting slave: {}", e);
                self.shared
                    .emit(LinkEvent::NegotiationFailed { error: e.clone() });
                self.shared.mark_failed(e);
                return;
            }
        };

        info!(
            "slave up: {} [{}]",
            report.chip.name(),
            report.capabilities
        );
        if let Some(mhz) = report.bus_clock_mhz {
            info!("slave requests {} MHz bus clock", mhz);
        }
        if report.raw_tp != RawTpMode::Off {
            info!("raw throughput test mode {:?}", report.raw_tp);
        }

        self.shared.emit(LinkEvent::SlaveInit {
            chip: report.chip,
            capabilities: report.capabilities,
            fw_checked,
        });

        if self.booted {
            // The slave announced itself a second time: it restarted
            // underneath an open data path.
            self.shared.emit(LinkEvent::PeerReset);
            self.reinit().await;
        } else {
            self.booted = true;
        }

        self.shared.open_data_path(report.capabilities);
    }

    /// Tear down and rebuild the link after a detected firmware restart
    async fn reinit(&mut self) {
        if !self.shared.state.try_begin_reset() {
            warn!("reinit already in progress");
            return;
        }
        self.shared.close_data_path();

        let (dropped_tx, was_paused) = self.shared.tx.lock().unwrap().purge();
        let dropped_rx = self.shared.rx.lock().unwrap().purge();
        info!("reinit: purged {} tx / {} rx frames", dropped_tx, dropped_rx);
        if was_paused {
            self.shared.emit(LinkEvent::TxResumed);
        }

        if let Err(e) = self.bus.rebind().await {
            // Keep trying: the next slave event will land on whatever
            // binding we have.
            error!("link rebind failed, continuing: {}", e);
        }

        self.shared.stats.reinits.fetch_add(1, Ordering::Relaxed);
        self.shared.state.finish_reset();
        self.shared.emit(LinkEvent::ReinitDone {
            dropped_tx,
            dropped_rx,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.transfer_size, 1600);
        assert_eq!(config.tx_pending_max, 100);
        assert_eq!(config.max_payload(), 1600 - HEADER_SIZE);
        assert_eq!(config.fw_check, FwCheckPolicy::Strict);
    }
}
