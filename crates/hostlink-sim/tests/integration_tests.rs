//! End-to-end tests for the hostlink transport over the simulated slave
//!
//! These drive the full stack: bring-up negotiation, priority-ordered
//! transmit, backpressure hysteresis, firmware policy, reinit after a peer
//! restart, and transfer fault recovery.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use hostlink_mux::{
    BringUpError, FlowStatus, LinkEvent, LinkState, TransactionEngine, TransmitError,
    Transport, TransportConfig,
};
use hostlink_sim::{create_sim_slave, SlaveHandle, SlaveProfile};
use hostlink_wire::{
    Capabilities, ChipId, FwCheckPolicy, InterfaceType, NegotiationError, TypeTag,
};

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    transport: Transport,
    slave: SlaveHandle,
    events: UnboundedReceiver<LinkEvent>,
}

fn start(profile: SlaveProfile, config: TransportConfig) -> Harness {
    let (bus, slave) = create_sim_slave(profile);
    let (engine, transport, events) = TransactionEngine::new(bus, config);
    slave.connect_irq(transport.irq_line());
    tokio::spawn(engine.run());
    Harness {
        transport,
        slave,
        events,
    }
}

fn start_default() -> Harness {
    start(SlaveProfile::default(), TransportConfig::default())
}

/// Poll until a condition holds or the test times out
async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Receive events until one matches, returning it
async fn wait_for_event(
    events: &mut UnboundedReceiver<LinkEvent>,
    mut pred: impl FnMut(&LinkEvent) -> bool,
) -> LinkEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Frames the slave received on data interfaces (init-handshake excluded)
fn data_frames(slave: &SlaveHandle) -> Vec<hostlink_sim::ReceivedFrame> {
    slave
        .received()
        .into_iter()
        .filter(|f| f.if_type != InterfaceType::Priv)
        .collect()
}

// ============================================================================
// Bring-up and negotiation
// ============================================================================

mod bring_up {
    use super::*;

    #[tokio::test]
    async fn negotiates_capabilities() {
        let mut h = start_default();

        let caps = h.transport.wait_ready().await.unwrap();
        assert!(caps.checksum_enabled());
        assert!(caps.wlan());
        assert!(caps.bluetooth());
        assert_eq!(h.transport.capabilities(), Some(caps));
        assert_eq!(h.transport.link_state(), LinkState::Running);

        let event = wait_for_event(&mut h.events, |e| {
            matches!(e, LinkEvent::SlaveInit { .. })
        })
        .await;
        match event {
            LinkEvent::SlaveInit {
                chip, fw_checked, ..
            } => {
                assert_eq!(chip, ChipId::Esp32C3);
                assert!(fw_checked);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_chip_rejects_bring_up() {
        let profile = SlaveProfile {
            chip_raw: Some(0x42),
            ..Default::default()
        };
        let mut h = start(profile, TransportConfig::default());

        let err = h.transport.wait_ready().await.unwrap_err();
        assert_eq!(
            err,
            BringUpError::Negotiation(NegotiationError::UnknownChip(0x42))
        );

        // Capabilities stay unset and the data path never opens
        assert_eq!(h.transport.capabilities(), None);
        assert_eq!(
            h.transport.transmit(InterfaceType::Station, 0, b"nope"),
            Err(TransmitError::LinkDown)
        );

        wait_for_event(&mut h.events, |e| {
            matches!(e, LinkEvent::NegotiationFailed { .. })
        })
        .await;
    }

    #[tokio::test]
    async fn strict_policy_rejects_firmware_mismatch() {
        let mut profile = SlaveProfile::default();
        if let Some(fw) = &mut profile.firmware {
            fw.major1 += 1;
        }
        let h = start(profile, TransportConfig::default());

        let err = h.transport.wait_ready().await.unwrap_err();
        assert!(matches!(
            err,
            BringUpError::Negotiation(NegotiationError::IncompatibleFirmware(_))
        ));
    }

    #[tokio::test]
    async fn permissive_policy_warns_and_opens() {
        let mut profile = SlaveProfile::default();
        if let Some(fw) = &mut profile.firmware {
            fw.major1 += 1;
        }
        let config = TransportConfig {
            fw_check: FwCheckPolicy::Permissive,
            ..Default::default()
        };
        let mut h = start(profile, config);

        h.transport.wait_ready().await.unwrap();

        let event = wait_for_event(&mut h.events, |e| {
            matches!(e, LinkEvent::SlaveInit { .. })
        })
        .await;
        assert!(matches!(
            event,
            LinkEvent::SlaveInit {
                fw_checked: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn absent_firmware_is_soft_even_under_strict() {
        let profile = SlaveProfile {
            firmware: None,
            ..Default::default()
        };
        let h = start(profile, TransportConfig::default());

        let caps = h.transport.wait_ready().await.unwrap();
        assert!(caps.wlan());
    }
}

// ============================================================================
// Data path
// ============================================================================

mod data_path {
    use super::*;

    #[tokio::test]
    async fn transmit_reaches_the_slave() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        let status = h
            .transport
            .transmit(InterfaceType::Station, 0, b"uplink packet")
            .unwrap();
        assert_eq!(status, FlowStatus::Ready);

        wait_until(|| !data_frames(&h.slave).is_empty()).await;
        let frames = data_frames(&h.slave);
        assert_eq!(frames[0].if_type, InterfaceType::Station);
        assert_eq!(frames[0].payload, b"uplink packet");
    }

    #[tokio::test]
    async fn receive_drains_by_priority() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        h.slave.send(InterfaceType::Station, 0, b"bulk");
        h.slave.send(InterfaceType::Serial, 0, b"control");

        wait_until(|| h.transport.stats().rx_frames >= 2).await;

        // Serial class drains before Other regardless of arrival order
        let first = h.transport.try_recv().unwrap();
        assert_eq!(first.if_type, InterfaceType::Serial);
        assert_eq!(first.payload, b"control");

        let second = h.transport.try_recv().unwrap();
        assert_eq!(second.if_type, InterfaceType::Station);
        assert_eq!(second.payload, b"bulk");
    }

    #[tokio::test]
    async fn transmit_order_is_strict_priority() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        // Hold the handshake line low so everything queues up first
        h.slave.set_ready(false);
        h.transport
            .transmit(InterfaceType::Station, 0, &[1])
            .unwrap();
        h.transport.transmit(InterfaceType::Ap, 0, &[2]).unwrap();
        h.transport.transmit(InterfaceType::HciBt, 0, &[3]).unwrap();
        h.transport
            .transmit(InterfaceType::Serial, 0, &[4])
            .unwrap();
        h.transport
            .transmit(InterfaceType::Station, 0, &[5])
            .unwrap();
        h.slave.set_ready(true);

        wait_until(|| data_frames(&h.slave).len() == 5).await;
        let order: Vec<u8> = data_frames(&h.slave)
            .iter()
            .map(|f| f.payload[0])
            .collect();
        // Serial, then HCI, then Other in FIFO order
        assert_eq!(order, vec![4, 3, 1, 2, 5]);
    }

    #[tokio::test]
    async fn hci_type_tag_survives_the_round_trip() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        h.slave.send_tagged(InterfaceType::HciBt, 0, 0x04, &[0x0E, 0x03]);

        let frame = timeout(Duration::from_secs(2), h.transport.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.if_type, InterfaceType::HciBt);
        assert_eq!(frame.type_tag, TypeTag::Hci(0x04));
        assert_eq!(frame.payload, vec![0x0E, 0x03]);
    }

    #[tokio::test]
    async fn test_frames_loop_back() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        h.transport
            .transmit(InterfaceType::Test, 0, b"echo me")
            .unwrap();

        let frame = timeout(Duration::from_secs(2), h.transport.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.if_type, InterfaceType::Test);
        assert_eq!(frame.payload, b"echo me");
    }

    #[tokio::test]
    async fn oversized_payload_is_refused() {
        let config = TransportConfig::default();
        let max = config.max_payload();
        let h = start(SlaveProfile::default(), config);
        h.transport.wait_ready().await.unwrap();

        let err = h
            .transport
            .transmit(InterfaceType::Station, 0, &vec![0u8; max + 1])
            .unwrap_err();
        assert!(matches!(err, TransmitError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn power_save_flag_raises_event() {
        let mut h = start_default();
        h.transport.wait_ready().await.unwrap();

        h.slave.send_power_save(true);
        let event =
            wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::PowerSave { .. })).await;
        assert_eq!(event, LinkEvent::PowerSave { started: true });

        h.slave.send_power_save(false);
        let event =
            wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::PowerSave { .. })).await;
        assert_eq!(event, LinkEvent::PowerSave { started: false });
    }

    #[tokio::test]
    async fn shutdown_wakes_parked_receivers() {
        let h = start_default();
        h.transport.wait_ready().await.unwrap();

        let transport = h.transport.clone();
        let receiver = tokio::spawn(async move { transport.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.transport.shutdown();

        let got = timeout(Duration::from_secs(2), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }
}

// ============================================================================
// Backpressure
// ============================================================================

mod backpressure {
    use super::*;

    fn small_queue_config() -> TransportConfig {
        TransportConfig {
            tx_pending_max: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn high_watermark_pauses_and_resume_follows_drain() {
        let mut h = start(SlaveProfile::default(), small_queue_config());
        h.transport.wait_ready().await.unwrap();

        // Stall the link so Other-class frames accumulate
        h.slave.set_ready(false);
        for i in 0..9u8 {
            assert_eq!(
                h.transport
                    .transmit(InterfaceType::Station, 0, &[i])
                    .unwrap(),
                FlowStatus::Ready
            );
        }

        // The tenth frame is accepted but crosses the watermark
        assert_eq!(
            h.transport
                .transmit(InterfaceType::Station, 0, &[9])
                .unwrap(),
            FlowStatus::Pause
        );
        assert!(h.transport.tx_paused());
        wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::TxPaused { .. })).await;

        // While paused, Other-class pushes are rejected outright
        assert_eq!(
            h.transport.transmit(InterfaceType::Station, 0, &[10]),
            Err(TransmitError::Backpressure)
        );
        // Serial traffic is never throttled
        assert_eq!(
            h.transport
                .transmit(InterfaceType::Serial, 0, b"urgent")
                .unwrap(),
            FlowStatus::Ready
        );

        // Let the link drain; pending must cross the low watermark
        h.slave.set_ready(true);
        wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::TxResumed)).await;
        assert!(!h.transport.tx_paused());

        assert_eq!(
            h.transport
                .transmit(InterfaceType::Station, 0, b"flowing again")
                .unwrap(),
            FlowStatus::Ready
        );
    }

    #[tokio::test]
    async fn below_watermark_never_pauses() {
        let h = start(SlaveProfile::default(), small_queue_config());
        h.transport.wait_ready().await.unwrap();

        h.slave.set_ready(false);
        for i in 0..9u8 {
            assert_eq!(
                h.transport
                    .transmit(InterfaceType::Station, 0, &[i])
                    .unwrap(),
                FlowStatus::Ready
            );
        }
        assert!(!h.transport.tx_paused());
        h.slave.set_ready(true);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn peer_restart_purges_and_reopens() {
        let mut h = start_default();
        h.transport.wait_ready().await.unwrap();

        for round in 1..=2u64 {
            // Stall the link and pile up traffic that must not survive
            h.slave.set_ready(false);
            for i in 0..5u8 {
                h.transport
                    .transmit(InterfaceType::Station, 0, &[i])
                    .unwrap();
            }

            h.slave.reboot();
            h.slave.set_ready(true);

            wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::PeerReset)).await;
            wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::ReinitDone { .. })).await;
            wait_until(|| h.transport.stats().reinits == round).await;

            // All queues empty, counters reset, link running again
            assert_eq!(h.transport.tx_pending(), 0);
            assert!(!h.transport.tx_paused());
            assert!(h.transport.try_recv().is_none());
            assert_eq!(h.transport.link_state(), LinkState::Running);
            assert_eq!(h.slave.rebinds(), round as usize);
            h.transport.wait_ready().await.unwrap();
        }

        // At most one stale frame per round can slip into the exchange that
        // delivered the restart announcement; the purged rest never leave.
        assert!(data_frames(&h.slave).len() <= 2);

        // The reopened path carries traffic normally
        h.transport
            .transmit(InterfaceType::Station, 0, b"fresh")
            .unwrap();
        wait_until(|| {
            data_frames(&h.slave)
                .iter()
                .any(|f| f.payload == b"fresh")
        })
        .await;
    }

    #[tokio::test]
    async fn transfer_faults_do_not_trigger_reinit() {
        let mut h = start_default();
        h.transport.wait_ready().await.unwrap();

        h.slave.fail_next_transfers(1);
        h.transport
            .transmit(InterfaceType::Station, 0, b"lost to the fault")
            .unwrap();

        wait_for_event(&mut h.events, |e| {
            matches!(e, LinkEvent::TransferFailed { .. })
        })
        .await;
        assert_eq!(h.transport.stats().transfer_failures, 1);

        // The engine recovers on the next wake; no reinit happened
        h.transport
            .transmit(InterfaceType::Station, 0, b"delivered")
            .unwrap();
        wait_until(|| {
            data_frames(&h.slave)
                .iter()
                .any(|f| f.payload == b"delivered")
        })
        .await;
        assert_eq!(h.transport.stats().reinits, 0);
        assert_eq!(h.slave.rebinds(), 0);

        // The faulted cycle's frame was discarded, not retried
        assert!(!data_frames(&h.slave)
            .iter()
            .any(|f| f.payload == b"lost to the fault"));
    }

    #[tokio::test]
    async fn capabilities_republished_after_restart() {
        let mut h = start_default();
        let caps = h.transport.wait_ready().await.unwrap();
        assert!(caps.checksum_enabled());

        // The restarted firmware negotiates a reduced capability set
        h.slave.update_profile(|p| {
            p.capabilities = Capabilities::from_bits(Capabilities::WLAN_SPI);
        });
        h.slave.reboot();

        wait_for_event(&mut h.events, |e| matches!(e, LinkEvent::ReinitDone { .. })).await;
        wait_until(|| {
            h.transport
                .capabilities()
                .is_some_and(|c| !c.checksum_enabled())
        })
        .await;

        let caps = h.transport.capabilities().unwrap();
        assert!(caps.wlan());
        assert!(!caps.bluetooth());
    }
}
