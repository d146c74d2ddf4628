//! Simulated slave device
//!
//! Models the companion firmware's half of the link: it announces itself
//! with an init event on boot, queues frames for the host, answers every
//! exchange with whatever it has pending, and parses what the host clocked
//! out. Tests script it without any hardware: reboot it mid-run, drop the
//! handshake line, inject transfer faults.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use hostlink_mux::IrqLine;
use hostlink_wire::negotiation::{PRIV_EVENT_INIT, PRIV_PACKET_TYPE_EVENT};
use hostlink_wire::{
    Capabilities, ChipId, FirmwareVersion, Frame, InitEventBuilder, InterfaceType, RawTpMode,
};

use crate::bus::SimBus;

/// What kind of slave to simulate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveProfile {
    /// Chip identity reported in the init event
    pub chip: ChipId,
    /// Identity byte override, for exercising the unknown-hardware
    /// rejection path
    pub chip_raw: Option<u8>,
    /// Capability bitmask reported in the init event
    pub capabilities: Capabilities,
    /// Firmware version record, omitted when `None`
    pub firmware: Option<FirmwareVersion>,
    /// Requested bus clock in MHz
    pub bus_clock_mhz: Option<u8>,
    /// Raw throughput test mode
    pub raw_tp: RawTpMode,
    /// Fixed transfer size; must match the host's configuration
    pub transfer_size: usize,
    /// Echo Test-interface frames back to the host
    pub loopback_test_frames: bool,
}

impl Default for SlaveProfile {
    fn default() -> Self {
        Self {
            chip: ChipId::Esp32C3,
            chip_raw: None,
            capabilities: Capabilities::from_bits(
                Capabilities::WLAN_SPI | Capabilities::BT_SPI | Capabilities::CHECKSUM_ENABLED,
            ),
            firmware: Some(FirmwareVersion {
                project: hostlink_wire::negotiation::FW_PROJECT_TAG,
                major1: hostlink_wire::negotiation::SUPPORTED_FW_MAJOR,
                major2: 0,
                minor: 4,
                patch1: 0,
                patch2: 0,
            }),
            bus_clock_mhz: Some(40),
            raw_tp: RawTpMode::Off,
            transfer_size: 1600,
            loopback_test_frames: true,
        }
    }
}

/// A frame the host clocked out to the slave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Interface class
    pub if_type: InterfaceType,
    /// Sub-index within the class
    pub if_num: u8,
    /// Host's transmit sequence number
    pub seq_num: u16,
    /// Payload bytes
    pub payload: Vec<u8>,
}

pub(crate) struct SlaveState {
    pub profile: SlaveProfile,
    /// Handshake line: slave ready to accept a transfer
    pub ready: bool,
    /// Padded transfer buffers queued slave -> host
    pub outgoing: VecDeque<Vec<u8>>,
    /// Host -> slave frames seen so far
    pub received: Vec<ReceivedFrame>,
    /// Remaining transfers to fail
    pub fail_transfers: usize,
    /// Interrupt line into the host engine, once connected
    pub irq: Option<IrqLine>,
    /// Completed rebind calls
    pub rebinds: usize,
    seq: u16,
}

impl SlaveState {
    fn checksumming(&self) -> bool {
        self.profile.capabilities.checksum_enabled()
    }

    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    pub fn raise_irq(&self) {
        if let Some(irq) = &self.irq {
            irq.raise();
        }
    }

    /// Queue a wire frame for the host, padded to the transfer size
    pub fn queue_frame(&mut self, if_type: InterfaceType, if_num: u8, tag: u8, payload: &[u8]) {
        self.queue_frame_with_flags(if_type, if_num, tag, payload, 0);
    }

    pub fn queue_frame_with_flags(
        &mut self,
        if_type: InterfaceType,
        if_num: u8,
        tag: u8,
        payload: &[u8],
        flags: u8,
    ) {
        let seq = self.next_seq();
        let checksum = self.checksumming();
        let frame = match Frame::build(if_type, if_num, tag, payload, seq, checksum) {
            Ok(frame) => frame.with_flags(flags),
            Err(e) => {
                debug!("sim slave dropping unbuildable frame: {}", e);
                return;
            }
        };
        let mut buf = frame.as_bytes().to_vec();
        buf.resize(self.profile.transfer_size, 0);
        self.outgoing.push_back(buf);
        self.raise_irq();
    }

    /// Queue the boot announcement
    pub fn queue_init_event(&mut self) {
        let mut builder = InitEventBuilder::new().capabilities(self.profile.capabilities);
        builder = match self.profile.chip_raw {
            Some(raw) => builder.chip_raw(raw),
            None => builder.chip(self.profile.chip),
        };
        if let Some(mhz) = self.profile.bus_clock_mhz {
            builder = builder.bus_clock(mhz);
        }
        if self.profile.raw_tp != RawTpMode::Off {
            builder = builder.raw_tp(self.profile.raw_tp);
        }
        if let Some(fw) = &self.profile.firmware {
            builder = builder.firmware(fw);
        }
        let payload = builder.finish();
        debug_assert_eq!(payload[0], PRIV_EVENT_INIT);

        self.queue_frame(InterfaceType::Priv, 0, PRIV_PACKET_TYPE_EVENT, &payload);
    }
}

/// Test-side handle to the simulated slave
#[derive(Clone)]
pub struct SlaveHandle {
    state: Arc<Mutex<SlaveState>>,
}

impl SlaveHandle {
    pub(crate) fn new(state: Arc<Mutex<SlaveState>>) -> Self {
        Self { state }
    }

    /// Point the slave's interrupt lines at the host engine
    ///
    /// Any traffic already queued (the boot event, typically) is signaled
    /// immediately.
    pub fn connect_irq(&self, irq: IrqLine) {
        let mut state = self.state.lock().unwrap();
        state.irq = Some(irq);
        if !state.outgoing.is_empty() {
            state.raise_irq();
        }
    }

    /// Queue a data frame for the host
    pub fn send(&self, if_type: InterfaceType, if_num: u8, payload: &[u8]) {
        self.send_tagged(if_type, if_num, 0, payload);
    }

    /// Queue a data frame with an explicit type-tag byte
    pub fn send_tagged(&self, if_type: InterfaceType, if_num: u8, tag: u8, payload: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .queue_frame(if_type, if_num, tag, payload);
    }

    /// Queue a serial frame flagged with a power-save transition
    pub fn send_power_save(&self, started: bool) {
        use hostlink_wire::header::{FLAG_POWER_SAVE_STARTED, FLAG_POWER_SAVE_STOPPED};

        let flags = if started {
            FLAG_POWER_SAVE_STARTED
        } else {
            FLAG_POWER_SAVE_STOPPED
        };
        self.state.lock().unwrap().queue_frame_with_flags(
            InterfaceType::Serial,
            0,
            0,
            &[0],
            flags,
        );
    }

    /// Restart the slave firmware
    ///
    /// Drops everything the slave had queued and announces itself again,
    /// exactly like a crashed-and-rebooted peer.
    pub fn reboot(&self) {
        let mut state = self.state.lock().unwrap();
        state.outgoing.clear();
        state.queue_init_event();
    }

    /// Change the profile for subsequent boots
    pub fn update_profile(&self, f: impl FnOnce(&mut SlaveProfile)) {
        f(&mut self.state.lock().unwrap().profile);
    }

    /// Raise or drop the handshake line
    pub fn set_ready(&self, ready: bool) {
        let mut state = self.state.lock().unwrap();
        state.ready = ready;
        if ready {
            state.raise_irq();
        }
    }

    /// Fail the next `n` exchanges with a bus error
    pub fn fail_next_transfers(&self, n: usize) {
        self.state.lock().unwrap().fail_transfers = n;
    }

    /// Frames the host has clocked out so far
    pub fn received(&self) -> Vec<ReceivedFrame> {
        self.state.lock().unwrap().received.clone()
    }

    /// Frames still queued toward the host
    pub fn pending_to_host(&self) -> usize {
        self.state.lock().unwrap().outgoing.len()
    }

    /// Completed rebind calls (one per host reinit)
    pub fn rebinds(&self) -> usize {
        self.state.lock().unwrap().rebinds
    }
}

/// Create a simulated slave and the bus the host engine drives
///
/// The slave boots immediately: its init event is queued and the
/// data-ready line asserted before the first exchange.
pub fn create_sim_slave(profile: SlaveProfile) -> (SimBus, SlaveHandle) {
    let mut state = SlaveState {
        profile,
        ready: true,
        outgoing: VecDeque::new(),
        received: Vec::new(),
        fail_transfers: 0,
        irq: None,
        rebinds: 0,
        seq: 0,
    };
    state.queue_init_event();

    let state = Arc::new(Mutex::new(state));
    (SimBus::new(state.clone()), SlaveHandle::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_boots_with_init_event() {
        let (_bus, handle) = create_sim_slave(SlaveProfile::default());
        assert_eq!(handle.pending_to_host(), 1);
    }

    #[test]
    fn test_reboot_replaces_queued_traffic() {
        let (_bus, handle) = create_sim_slave(SlaveProfile::default());
        handle.send(InterfaceType::Station, 0, b"stale");
        assert_eq!(handle.pending_to_host(), 2);

        handle.reboot();
        // Only the fresh init event survives
        assert_eq!(handle.pending_to_host(), 1);
    }
}
