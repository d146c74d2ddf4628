//! Capability and init-event negotiation
//!
//! After boot (and after every firmware restart) the slave announces itself
//! with an init event on the priv interface: a one-byte event type, a
//! one-byte total length, then a flat TLV stream of `[tag][len][value]`
//! records describing supported features, chip identity and firmware
//! version. The host must validate the chip identity against a fixed
//! allow-list before opening the data path, since buffer sizes and framing
//! conventions are only known for recognized hardware.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::NegotiationError;

/// Priv-interface packet type carrying an event
pub const PRIV_PACKET_TYPE_EVENT: u8 = 0;
/// Event type announcing slave bring-up
pub const PRIV_EVENT_INIT: u8 = 0;

/// TLV tags understood in an init event
const TAG_CAPABILITY: u8 = 0;
const TAG_BUS_CLOCK_MHZ: u8 = 1;
const TAG_CHIP_ID: u8 = 2;
const TAG_RAW_TP: u8 = 3;
const TAG_FW_VERSION: u8 = 4;

/// Negotiated feature bitmask, published once per boot/reinit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities(u8);

impl Capabilities {
    /// WLAN carried over SDIO
    pub const WLAN_SDIO: u8 = 1 << 0;
    /// HCI carried over a dedicated UART
    pub const BT_UART: u8 = 1 << 1;
    /// HCI carried over SDIO
    pub const BT_SDIO: u8 = 1 << 2;
    /// Controller is BLE-only
    pub const BLE_ONLY: u8 = 1 << 3;
    /// Controller is BR/EDR-only
    pub const BR_EDR_ONLY: u8 = 1 << 4;
    /// WLAN carried over SPI
    pub const WLAN_SPI: u8 = 1 << 5;
    /// HCI carried over SPI
    pub const BT_SPI: u8 = 1 << 6;
    /// Slave checksums every frame and expects the same from the host
    pub const CHECKSUM_ENABLED: u8 = 1 << 7;

    /// Wrap a raw bitmask
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bitmask
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Test an arbitrary mask
    pub fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    /// Frame checksumming negotiated
    pub fn checksum_enabled(self) -> bool {
        self.has(Self::CHECKSUM_ENABLED)
    }

    /// WLAN data path available on this link
    pub fn wlan(self) -> bool {
        self.has(Self::WLAN_SPI | Self::WLAN_SDIO)
    }

    /// Bluetooth HCI available on this link or a side channel
    pub fn bluetooth(self) -> bool {
        self.has(Self::BT_SPI | Self::BT_SDIO | Self::BT_UART)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.has(Self::WLAN_SDIO) {
            names.push("wlan-sdio");
        }
        if self.has(Self::WLAN_SPI) {
            names.push("wlan-spi");
        }
        if self.has(Self::BT_UART) {
            names.push("bt-uart");
        }
        if self.has(Self::BT_SDIO) {
            names.push("bt-sdio");
        }
        if self.has(Self::BT_SPI) {
            names.push("bt-spi");
        }
        if self.has(Self::BLE_ONLY) {
            names.push("ble-only");
        }
        if self.has(Self::BR_EDR_ONLY) {
            names.push("br-edr-only");
        }
        if self.has(Self::CHECKSUM_ENABLED) {
            names.push("checksum");
        }
        if names.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

/// Chip identity allow-list
///
/// Unrecognized identities abort the whole negotiation: the transport cannot
/// assume transfer sizes or framing conventions for unknown hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChipId {
    Esp32,
    Esp32S2,
    Esp32C3,
    Esp32S3,
    Esp32C2,
    Esp32C6,
    Esp32C5,
}

impl ChipId {
    /// Identity byte as sent on the wire
    pub fn as_u8(self) -> u8 {
        match self {
            ChipId::Esp32 => 0x00,
            ChipId::Esp32S2 => 0x02,
            ChipId::Esp32C3 => 0x05,
            ChipId::Esp32S3 => 0x09,
            ChipId::Esp32C2 => 0x0C,
            ChipId::Esp32C6 => 0x0D,
            ChipId::Esp32C5 => 0x17,
        }
    }

    /// Marketing name
    pub fn name(self) -> &'static str {
        match self {
            ChipId::Esp32 => "ESP32",
            ChipId::Esp32S2 => "ESP32-S2",
            ChipId::Esp32C3 => "ESP32-C3",
            ChipId::Esp32S3 => "ESP32-S3",
            ChipId::Esp32C2 => "ESP32-C2",
            ChipId::Esp32C6 => "ESP32-C6",
            ChipId::Esp32C5 => "ESP32-C5",
        }
    }
}

impl TryFrom<u8> for ChipId {
    type Error = NegotiationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ChipId::Esp32),
            0x02 => Ok(ChipId::Esp32S2),
            0x05 => Ok(ChipId::Esp32C3),
            0x09 => Ok(ChipId::Esp32S3),
            0x0C => Ok(ChipId::Esp32C2),
            0x0D => Ok(ChipId::Esp32C6),
            0x17 => Ok(ChipId::Esp32C5),
            other => Err(NegotiationError::UnknownChip(other)),
        }
    }
}

/// Raw throughput test configuration announced by the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RawTpMode {
    /// No test traffic
    #[default]
    Off,
    /// Host pushes test frames to the slave
    HostToSlave,
    /// Slave streams test frames to the host
    SlaveToHost,
}

impl RawTpMode {
    fn from_bits(bits: u8) -> Self {
        if bits & 0x01 == 0 {
            RawTpMode::Off
        } else if bits & 0x02 != 0 {
            RawTpMode::SlaveToHost
        } else {
            RawTpMode::HostToSlave
        }
    }

    fn bits(self) -> u8 {
        match self {
            RawTpMode::Off => 0,
            RawTpMode::HostToSlave => 0x01,
            RawTpMode::SlaveToHost => 0x03,
        }
    }
}

/// Project tag stamped into compatible slave firmware builds
pub const FW_PROJECT_TAG: [u8; 3] = *b"hlk";
/// Major firmware release this driver is built against
pub const SUPPORTED_FW_MAJOR: u8 = 1;

/// Structured firmware version reported by the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Three-byte project tag
    pub project: [u8; 3],
    pub major1: u8,
    pub major2: u8,
    pub minor: u8,
    pub patch1: u8,
    pub patch2: u8,
}

impl FirmwareVersion {
    /// Wire size of the version record
    pub const WIRE_SIZE: usize = 8;

    /// Parse from a TLV value
    pub fn parse(value: &[u8]) -> Result<Self, NegotiationError> {
        if value.len() < Self::WIRE_SIZE {
            return Err(NegotiationError::Truncated);
        }
        Ok(Self {
            project: [value[0], value[1], value[2]],
            major1: value[3],
            major2: value[4],
            minor: value[5],
            patch1: value[6],
            patch2: value[7],
        })
    }

    /// Encode into the wire form used in the init event
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        [
            self.project[0],
            self.project[1],
            self.project[2],
            self.major1,
            self.major2,
            self.minor,
            self.patch1,
            self.patch2,
        ]
    }

    /// Whether this build is compatible with the running driver
    pub fn is_supported(&self) -> bool {
        self.project == FW_PROJECT_TAG && self.major1 == SUPPORTED_FW_MAJOR
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}.{}.{}.{}.{}",
            String::from_utf8_lossy(&self.project),
            self.major1,
            self.major2,
            self.minor,
            self.patch1,
            self.patch2
        )
    }
}

/// Firmware version compatibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FwCheckPolicy {
    /// Reject bring-up on a project-tag or major-version mismatch
    #[default]
    Strict,
    /// Log the mismatch and continue
    Permissive,
}

/// Everything a well-formed init event tells us about the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveReport {
    /// Negotiated feature bitmask
    pub capabilities: Capabilities,
    /// Validated chip identity
    pub chip: ChipId,
    /// Bus clock the slave asks for after boot, if any
    pub bus_clock_mhz: Option<u8>,
    /// Raw throughput test mode
    pub raw_tp: RawTpMode,
    /// Firmware version, when the slave reports one
    pub firmware: Option<FirmwareVersion>,
}

/// Parse a priv-interface init event payload
///
/// Unknown tags are skipped with a warning so newer firmware can add records
/// without breaking older hosts. A record whose declared length runs past
/// the end of the event aborts processing.
pub fn parse_init_event(payload: &[u8]) -> Result<SlaveReport, NegotiationError> {
    if payload.len() < 2 {
        return Err(NegotiationError::Truncated);
    }
    if payload[0] != PRIV_EVENT_INIT {
        return Err(NegotiationError::UnsupportedEvent(payload[0]));
    }

    let declared = payload[1] as usize;
    let tlv = payload
        .get(2..2 + declared)
        .ok_or(NegotiationError::Truncated)?;

    let mut capabilities = Capabilities::default();
    let mut chip: Option<ChipId> = None;
    let mut bus_clock_mhz = None;
    let mut raw_tp = RawTpMode::Off;
    let mut firmware = None;

    let mut pos = 0;
    while pos < tlv.len() {
        if pos + 2 > tlv.len() {
            return Err(NegotiationError::Truncated);
        }
        let tag = tlv[pos];
        let len = tlv[pos + 1] as usize;
        let value = tlv
            .get(pos + 2..pos + 2 + len)
            .ok_or(NegotiationError::Truncated)?;

        match tag {
            TAG_CAPABILITY => {
                let bits = *value.first().ok_or(NegotiationError::Truncated)?;
                capabilities = Capabilities::from_bits(bits);
            }
            TAG_BUS_CLOCK_MHZ => {
                bus_clock_mhz = value.first().copied();
            }
            TAG_CHIP_ID => {
                let raw = *value.first().ok_or(NegotiationError::Truncated)?;
                chip = Some(ChipId::try_from(raw)?);
            }
            TAG_RAW_TP => {
                let bits = *value.first().ok_or(NegotiationError::Truncated)?;
                raw_tp = RawTpMode::from_bits(bits);
            }
            TAG_FW_VERSION => {
                firmware = Some(FirmwareVersion::parse(value)?);
            }
            other => {
                warn!("skipping unknown init event tag {}", other);
            }
        }
        pos += 2 + len;
    }

    let chip = chip.ok_or(NegotiationError::UnknownChip(0xFF))?;

    Ok(SlaveReport {
        capabilities,
        chip,
        bus_clock_mhz,
        raw_tp,
        firmware,
    })
}

/// Apply the firmware compatibility policy to a parsed report
///
/// Returns whether the version was actually present and compatible. An
/// absent version record is a warning under either policy; the check only
/// hard-fails under [`FwCheckPolicy::Strict`] with a version that does not
/// match the supported release.
pub fn check_firmware(
    report: &SlaveReport,
    policy: FwCheckPolicy,
) -> Result<bool, NegotiationError> {
    match report.firmware {
        Some(fw) if fw.is_supported() => Ok(true),
        Some(fw) => match policy {
            FwCheckPolicy::Strict => Err(NegotiationError::IncompatibleFirmware(fw.to_string())),
            FwCheckPolicy::Permissive => {
                warn!("slave firmware {} differs from supported release", fw);
                Ok(false)
            }
        },
        None => {
            warn!("slave did not report a firmware version");
            Ok(false)
        }
    }
}

/// Builds init events on the slave side
///
/// Record order follows what real firmware emits: capability first, then
/// identity, then the optional extras.
#[derive(Debug, Default)]
pub struct InitEventBuilder {
    tlv: Vec<u8>,
}

impl InitEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(mut self, tag: u8, value: &[u8]) -> Self {
        self.tlv.push(tag);
        self.tlv.push(value.len() as u8);
        self.tlv.extend_from_slice(value);
        self
    }

    /// Capability bitmask record
    pub fn capabilities(self, caps: Capabilities) -> Self {
        self.record(TAG_CAPABILITY, &[caps.bits()])
    }

    /// Chip identity record
    pub fn chip(self, chip: ChipId) -> Self {
        self.record(TAG_CHIP_ID, &[chip.as_u8()])
    }

    /// Chip identity record with an arbitrary identity byte
    ///
    /// Lets tests exercise the unrecognized-hardware rejection path.
    pub fn chip_raw(self, id: u8) -> Self {
        self.record(TAG_CHIP_ID, &[id])
    }

    /// Requested bus clock record
    pub fn bus_clock(self, mhz: u8) -> Self {
        self.record(TAG_BUS_CLOCK_MHZ, &[mhz])
    }

    /// Raw throughput test record
    pub fn raw_tp(self, mode: RawTpMode) -> Self {
        self.record(TAG_RAW_TP, &[mode.bits()])
    }

    /// Firmware version record
    pub fn firmware(self, fw: &FirmwareVersion) -> Self {
        self.record(TAG_FW_VERSION, &fw.encode())
    }

    /// Arbitrary record, for forward-compatibility tests
    pub fn raw_record(self, tag: u8, value: &[u8]) -> Self {
        self.record(tag, value)
    }

    /// Finish into the priv event payload (`[event type][len][TLV...]`)
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.tlv.len());
        out.push(PRIV_EVENT_INIT);
        out.push(self.tlv.len() as u8);
        out.extend_from_slice(&self.tlv);
        out
    }
}
