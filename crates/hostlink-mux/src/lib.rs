//! Hostlink Transport Engine
//!
//! This crate multiplexes Wi-Fi, Bluetooth-HCI, control and test traffic
//! between a host processor and a companion radio device over a byte-
//! oriented full-duplex link, with lossless, order-preserving delivery per
//! priority class and no protocol-level acknowledgements.
//!
//! # Architecture
//!
//! - One [`TransactionEngine`] task owns the bus and runs one fixed-size
//!   full-duplex exchange per cycle, gated by the peer's handshake line.
//! - Three strict-priority FIFO queues per direction (Serial > Control >
//!   Other); Other-class transmit is flow-controlled against a watermark
//!   pair with hysteresis.
//! - Both hardware interrupt lines coalesce into a single-slot
//!   [`IrqLine`] wake, so bursts collapse into one unit of deferred work.
//! - A slave init event negotiates capabilities, chip identity and
//!   firmware version before the data path opens; a repeated init event
//!   means the peer restarted and triggers a purge-and-rebind reinit.
//!
//! # Example
//!
//! ```rust,ignore
//! use hostlink_mux::{TransactionEngine, TransportConfig};
//! use hostlink_wire::InterfaceType;
//!
//! let (engine, transport, mut events) = TransactionEngine::new(bus, TransportConfig::default());
//! tokio::spawn(engine.run());
//!
//! let caps = transport.wait_ready().await?;
//! transport.transmit(InterfaceType::Station, 0, &packet)?;
//! ```

pub mod bus;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod queue;
pub mod stats;
pub mod transport;

pub use bus::LinkBus;
pub use dispatch::IrqLine;
pub use engine::{TransactionEngine, TransportConfig};
pub use error::{BringUpError, TransferError, TransmitError};
pub use events::LinkEvent;
pub use lifecycle::LinkState;
pub use queue::TrafficClass;
pub use stats::StatsSnapshot;
pub use transport::{FlowStatus, LinkStatus, RxFrame, Transport};
