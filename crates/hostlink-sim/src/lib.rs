//! Hostlink Slave Simulator
//!
//! A scriptable in-process stand-in for the companion radio device, so the
//! transport can be exercised end to end without hardware. The simulated
//! slave implements [`hostlink_mux::LinkBus`], boots with a real init
//! event, and can be rebooted, stalled or faulted mid-run.
//!
//! # Example
//!
//! ```rust,no_run
//! use hostlink_mux::{TransactionEngine, TransportConfig};
//! use hostlink_sim::{create_sim_slave, SlaveProfile};
//!
//! # async fn demo() {
//! let (bus, slave) = create_sim_slave(SlaveProfile::default());
//! let (engine, transport, _events) = TransactionEngine::new(bus, TransportConfig::default());
//! slave.connect_irq(transport.irq_line());
//! tokio::spawn(engine.run());
//!
//! let caps = transport.wait_ready().await.unwrap();
//! println!("negotiated: {}", caps);
//! # }
//! ```

pub mod bus;
pub mod slave;

pub use bus::SimBus;
pub use slave::{create_sim_slave, ReceivedFrame, SlaveHandle, SlaveProfile};
