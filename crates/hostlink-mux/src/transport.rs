//! Public transport handle
//!
//! [`Transport`] is the cheap, cloneable surface over the shared link
//! state: the transmit entry point with its classification and
//! backpressure rules, the strict-priority receive drain, and bring-up
//! status. All heavy lifting happens in the engine task; handles only
//! touch the queues under short lock sections and park on notifies.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch, Notify};

use hostlink_wire::{Capabilities, Frame, InterfaceType, NegotiationError, TypeTag};

use crate::dispatch::IrqLine;
use crate::engine::TransportConfig;
use crate::error::{BringUpError, TransmitError};
use crate::events::LinkEvent;
use crate::lifecycle::{LinkState, LinkStateCell};
use crate::queue::{PushOutcome, RxQueues, TxQueues};
use crate::stats::{LinkStats, StatsSnapshot};

/// Bring-up status published on the watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// No init event accepted yet
    Down,
    /// Data path open with the negotiated capabilities
    Up(Capabilities),
    /// The last init event was rejected; a later event may still succeed
    Failed(NegotiationError),
}

/// Flow-control advice returned from a successful transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Keep sending
    Ready,
    /// Frame accepted, but the pending watermark was crossed: pause the
    /// upstream producer until a [`LinkEvent::TxResumed`] arrives
    Pause,
}

/// A received frame handed up to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    /// Interface class
    pub if_type: InterfaceType,
    /// Sub-index within the class
    pub if_num: u8,
    /// Per-interface trailing tag
    pub type_tag: TypeTag,
    /// Header flag bits
    pub flags: u8,
    /// Peer's transmit sequence number
    pub seq_num: u16,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl RxFrame {
    fn from_frame(frame: Frame) -> Self {
        let (hdr, payload) = frame.into_parts();
        Self {
            if_type: hdr.if_type,
            if_num: hdr.if_num,
            type_tag: hdr.type_tag,
            flags: hdr.flags,
            seq_num: hdr.seq_num,
            payload,
        }
    }
}

/// State shared between the engine task and every handle
pub(crate) struct Shared {
    pub config: TransportConfig,
    pub tx: Mutex<TxQueues>,
    pub rx: Mutex<RxQueues>,
    pub rx_notify: Notify,
    pub wake: IrqLine,
    pub state: LinkStateCell,
    pub stats: LinkStats,
    seq: AtomicU16,
    link_up: AtomicBool,
    checksum: AtomicBool,
    capabilities: Mutex<Option<Capabilities>>,
    shutdown: AtomicBool,
    events: mpsc::UnboundedSender<LinkEvent>,
    status: watch::Sender<LinkStatus>,
}

impl Shared {
    pub fn new(
        config: TransportConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
        status: watch::Sender<LinkStatus>,
    ) -> Self {
        Self {
            tx: Mutex::new(TxQueues::new(config.tx_pending_max)),
            rx: Mutex::new(RxQueues::default()),
            rx_notify: Notify::new(),
            wake: IrqLine::new(),
            state: LinkStateCell::new(),
            stats: LinkStats::default(),
            seq: AtomicU16::new(0),
            link_up: AtomicBool::new(false),
            checksum: AtomicBool::new(false),
            capabilities: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            events,
            status,
            config,
        }
    }

    pub fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn checksum_enabled(&self) -> bool {
        self.checksum.load(Ordering::Acquire)
    }

    pub fn next_seq(&self) -> u16 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn has_tx_backlog(&self) -> bool {
        self.tx.lock().unwrap().has_pending()
    }

    /// Publish capabilities and open the data path
    pub fn open_data_path(&self, caps: Capabilities) {
        *self.capabilities.lock().unwrap() = Some(caps);
        self.checksum.store(caps.checksum_enabled(), Ordering::Release);
        self.link_up.store(true, Ordering::Release);
        self.status.send_replace(LinkStatus::Up(caps));
    }

    /// Close the data path for the duration of a reinit
    pub fn close_data_path(&self) {
        self.link_up.store(false, Ordering::Release);
    }

    pub fn mark_failed(&self, error: NegotiationError) {
        self.status.send_replace(LinkStatus::Failed(error));
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.raise();
        self.rx_notify.notify_waiters();
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        *self.capabilities.lock().unwrap()
    }
}

/// Handle to a running transport
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
    status_rx: watch::Receiver<LinkStatus>,
}

impl Transport {
    pub(crate) fn new(shared: Arc<Shared>, status_rx: watch::Receiver<LinkStatus>) -> Self {
        Self { shared, status_rx }
    }

    /// Queue a payload for transmission
    ///
    /// The frame is classified by interface type and enqueued in its
    /// priority class. `Ok(FlowStatus::Pause)` means the frame *was*
    /// accepted but the caller must stop producing Other-class traffic
    /// until a [`LinkEvent::TxResumed`] arrives; once paused, further
    /// Other-class frames are rejected with
    /// [`TransmitError::Backpressure`].
    pub fn transmit(
        &self,
        if_type: InterfaceType,
        if_num: u8,
        payload: &[u8],
    ) -> Result<FlowStatus, TransmitError> {
        self.transmit_tagged(if_type, if_num, 0, payload)
    }

    /// Queue a payload with an explicit type-tag byte (HCI packet type,
    /// priv packet type)
    pub fn transmit_tagged(
        &self,
        if_type: InterfaceType,
        if_num: u8,
        tag: u8,
        payload: &[u8],
    ) -> Result<FlowStatus, TransmitError> {
        let shared = &self.shared;
        if !shared.link_up() {
            return Err(TransmitError::LinkDown);
        }

        let max = shared.config.max_payload();
        if payload.len() > max {
            return Err(TransmitError::TooLarge {
                len: payload.len(),
                max,
            });
        }

        let frame = Frame::build(
            if_type,
            if_num,
            tag,
            payload,
            shared.next_seq(),
            shared.checksum_enabled(),
        )?;

        let outcome = shared.tx.lock().unwrap().push(frame);
        match outcome {
            Ok(PushOutcome::Accepted) => {
                shared.wake.raise();
                Ok(FlowStatus::Ready)
            }
            Ok(PushOutcome::AcceptedPaused) => {
                shared.emit(LinkEvent::TxPaused {
                    pending: shared.config.tx_pending_max,
                });
                shared.wake.raise();
                Ok(FlowStatus::Pause)
            }
            Err(_) => Err(TransmitError::Backpressure),
        }
    }

    /// Pop the highest-priority received frame, if any
    pub fn try_recv(&self) -> Option<RxFrame> {
        let frame = self.shared.rx.lock().unwrap().pop()?;
        Some(RxFrame::from_frame(frame))
    }

    /// Wait for the next received frame
    ///
    /// Returns `None` once the transport has shut down and the queues are
    /// drained.
    pub async fn recv(&self) -> Option<RxFrame> {
        loop {
            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }
            if self.shared.is_shutdown() {
                return None;
            }
            self.shared.rx_notify.notified().await;
        }
    }

    /// Wait until the first init event settles bring-up
    pub async fn wait_ready(&self) -> Result<Capabilities, BringUpError> {
        let mut rx = self.status_rx.clone();
        loop {
            let status = rx.borrow_and_update().clone();
            match status {
                LinkStatus::Up(caps) => return Ok(caps),
                LinkStatus::Failed(e) => return Err(BringUpError::Negotiation(e)),
                LinkStatus::Down => {}
            }
            if rx.changed().await.is_err() {
                return Err(BringUpError::EngineStopped);
            }
        }
    }

    /// Current bring-up status
    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    /// Negotiated capabilities, once the data path has opened
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.capabilities()
    }

    /// Current lifecycle state
    pub fn link_state(&self) -> LinkState {
        self.shared.state.get()
    }

    /// Other-class transmit currently paused
    pub fn tx_paused(&self) -> bool {
        self.shared.tx.lock().unwrap().is_paused()
    }

    /// Frames queued for transmission across all classes
    pub fn tx_pending(&self) -> usize {
        self.shared.tx.lock().unwrap().len()
    }

    /// Snapshot of the link counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Wake signal for the device side's interrupt lines
    pub fn irq_line(&self) -> IrqLine {
        self.shared.wake.clone()
    }

    /// Stop the engine task and wake any parked receivers
    pub fn shutdown(&self) {
        self.shared.request_shutdown();
    }
}
