//! Bus implementation over the simulated slave
//!
//! One exchange moves a full transfer in both directions at once, like the
//! real link: the slave's next queued buffer is clocked into `rx` while the
//! host's `tx` bytes are parsed and recorded on the slave side.

use std::sync::{Arc, Mutex};

use tracing::debug;

use hostlink_mux::{LinkBus, TransferError};
use hostlink_wire::{Frame, InterfaceType, HEADER_SIZE};

use crate::slave::{ReceivedFrame, SlaveState};

/// Host-side bus driving the simulated slave
pub struct SimBus {
    state: Arc<Mutex<SlaveState>>,
}

impl SimBus {
    pub(crate) fn new(state: Arc<Mutex<SlaveState>>) -> Self {
        Self { state }
    }
}

impl LinkBus for SimBus {
    fn peer_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    fn peer_has_data(&self) -> bool {
        !self.state.lock().unwrap().outgoing.is_empty()
    }

    async fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), TransferError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_transfers > 0 {
            state.fail_transfers -= 1;
            return Err(TransferError::Io("injected transfer fault".into()));
        }

        // Slave → host direction
        if let Some(buf) = state.outgoing.pop_front() {
            let n = buf.len().min(rx.len());
            rx[..n].copy_from_slice(&buf[..n]);
        }

        // Host → slave direction; zero-filled transfers carry nothing
        if tx.iter().take(HEADER_SIZE).any(|b| *b != 0) {
            match Frame::from_transfer(tx.to_vec()) {
                Ok(frame) => {
                    let echo = state.profile.loopback_test_frames
                        && frame.if_type() == InterfaceType::Test;

                    let hdr = *frame.header();
                    let (_, payload) = frame.into_parts();
                    state.received.push(ReceivedFrame {
                        if_type: hdr.if_type,
                        if_num: hdr.if_num,
                        seq_num: hdr.seq_num,
                        payload: payload.clone(),
                    });

                    if echo {
                        state.queue_frame(hdr.if_type, hdr.if_num, 0, &payload);
                    }
                }
                Err(e) => debug!("sim slave ignoring malformed host frame: {}", e),
            }
        }

        Ok(())
    }

    async fn rebind(&mut self) -> Result<(), TransferError> {
        let mut state = self.state.lock().unwrap();
        state.rebinds += 1;
        debug!("sim slave rebind #{}", state.rebinds);
        Ok(())
    }
}
