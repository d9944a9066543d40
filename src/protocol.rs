//! Command-and-control wire protocol: the identifier space shared by every
//! demonstrator component and the fixed-width frame codec.
//!
//! Peers are built independently (ECU firmware, ignition PC, kiosk) and must
//! agree on these encodings bit-for-bit, so every payload layout is declared
//! here and packed by hand in network byte order.

use heapless::Vec;
use static_assertions::const_assert;

pub const MAX_FRAME_DATA_LEN: usize = 8;
/// Wire header: identifier (4 bytes, big-endian) + data length (1 byte).
pub const FRAME_HEADER_LEN: usize = 5;
pub const MAX_WIRE_FRAME_LEN: usize = FRAME_HEADER_LEN + MAX_FRAME_DATA_LEN;

// A frame must always fit a single small datagram.
const_assert!(MAX_WIRE_FRAME_LEN <= 16);

// ---------------------------------------------------------------------------
// Component / scenario / hack / button identifier space.
//
// Small positive integers partitioned by convention; the name<->value table
// below is the single source of truth shared with peer firmware.
// ---------------------------------------------------------------------------

pub const SCENARIO_BASELINE: u32 = 0x11;
pub const SCENARIO_SECURE_INFOTAINMENT: u32 = 0x12;
pub const SCENARIO_SECURE_ECU: u32 = 0x13;
pub const FUNCTIONALITY_MINIMAL: u32 = 0x16;
pub const FUNCTIONALITY_MEDIUM: u32 = 0x17;
pub const FUNCTIONALITY_FULL: u32 = 0x18;
pub const COMMAND_TOOL: u32 = 0x20;
pub const TARGET_1: u32 = 0x21;
pub const TARGET_2: u32 = 0x22;
pub const TARGET_3: u32 = 0x23;
pub const TARGET_4: u32 = 0x24;
pub const TARGET_5: u32 = 0x25;
pub const TARGET_6: u32 = 0x26;
pub const SUPERVISOR_MCU: u32 = 0x27;
pub const IGNITION: u32 = 0x30;
pub const LED_COMPONENT: u32 = 0x31;
pub const HACKER_KIOSK: u32 = 0x40;
pub const HACK_NONE: u32 = 0x50;
pub const HACK_OTA: u32 = 0x51;
/// Known data-integrity defect: `HACK_BRAKE` aliases `HACK_OTA` (0x51).
/// Carried as published; reverse lookup resolves 0x51 to `HACK_OTA`.
pub const HACK_BRAKE: u32 = 0x51;
pub const HACK_THROTTLE: u32 = 0x52;
pub const HACK_TRANSMISSION: u32 = 0x53;
pub const HACK_LKAS: u32 = 0x54;
pub const HACK_INFOTAINMENT_1: u32 = 0x55;
pub const HACK_INFOTAINMENT_2: u32 = 0x56;
pub const INFOTAINMENT_THIN_CLIENT: u32 = 0x60;
pub const INFOTAINMENT_SERVER_1: u32 = 0x61;
pub const INFOTAINMENT_SERVER_2: u32 = 0x62;
pub const INFOTAINMENT_SERVER_3: u32 = 0x63;
pub const OTA_UPDATE_SERVER_1: u32 = 0x64;
pub const OTA_UPDATE_SERVER_2: u32 = 0x65;
pub const OTA_UPDATE_SERVER_3: u32 = 0x66;
pub const BUTTON_STATION_1: u32 = 0x01;
pub const BUTTON_STATION_2: u32 = 0x02;
pub const BUTTON_STATION_3: u32 = 0x03;
pub const BUTTON_VOLUME_DOWN: u32 = 0x10;
pub const BUTTON_VOLUME_UP: u32 = 0x11;
pub const SENSOR_THROTTLE: u32 = 0xBE;
pub const SENSOR_BRAKE: u32 = 0xBF;
pub const ERROR_UNSPECIFIED: u32 = 0xF0;

/// Bidirectional name<->id table. Id values are unique except for the
/// published `HACK_OTA`/`HACK_BRAKE` alias, which is kept as-is rather than
/// guessing which name is canonical.
const ID_TABLE: &[(&str, u32)] = &[
    ("SCENARIO_BASELINE", SCENARIO_BASELINE),
    ("SCENARIO_SECURE_INFOTAINMENT", SCENARIO_SECURE_INFOTAINMENT),
    ("SCENARIO_SECURE_ECU", SCENARIO_SECURE_ECU),
    ("FUNCTIONALITY_MINIMAL", FUNCTIONALITY_MINIMAL),
    ("FUNCTIONALITY_MEDIUM", FUNCTIONALITY_MEDIUM),
    ("FUNCTIONALITY_FULL", FUNCTIONALITY_FULL),
    ("COMMAND_TOOL", COMMAND_TOOL),
    ("TARGET_1", TARGET_1),
    ("TARGET_2", TARGET_2),
    ("TARGET_3", TARGET_3),
    ("TARGET_4", TARGET_4),
    ("TARGET_5", TARGET_5),
    ("TARGET_6", TARGET_6),
    ("SUPERVISOR_MCU", SUPERVISOR_MCU),
    ("IGNITION", IGNITION),
    ("LED_COMPONENT", LED_COMPONENT),
    ("HACKER_KIOSK", HACKER_KIOSK),
    ("HACK_NONE", HACK_NONE),
    ("HACK_OTA", HACK_OTA),
    ("HACK_BRAKE", HACK_BRAKE),
    ("HACK_THROTTLE", HACK_THROTTLE),
    ("HACK_TRANSMISSION", HACK_TRANSMISSION),
    ("HACK_LKAS", HACK_LKAS),
    ("HACK_INFOTAINMENT_1", HACK_INFOTAINMENT_1),
    ("HACK_INFOTAINMENT_2", HACK_INFOTAINMENT_2),
    ("INFOTAINMENT_THIN_CLIENT", INFOTAINMENT_THIN_CLIENT),
    ("INFOTAINMENT_SERVER_1", INFOTAINMENT_SERVER_1),
    ("INFOTAINMENT_SERVER_2", INFOTAINMENT_SERVER_2),
    ("INFOTAINMENT_SERVER_3", INFOTAINMENT_SERVER_3),
    ("OTA_UPDATE_SERVER_1", OTA_UPDATE_SERVER_1),
    ("OTA_UPDATE_SERVER_2", OTA_UPDATE_SERVER_2),
    ("OTA_UPDATE_SERVER_3", OTA_UPDATE_SERVER_3),
    ("BUTTON_STATION_1", BUTTON_STATION_1),
    ("BUTTON_STATION_2", BUTTON_STATION_2),
    ("BUTTON_STATION_3", BUTTON_STATION_3),
    ("BUTTON_VOLUME_DOWN", BUTTON_VOLUME_DOWN),
    ("BUTTON_VOLUME_UP", BUTTON_VOLUME_UP),
    ("SENSOR_THROTTLE", SENSOR_THROTTLE),
    ("SENSOR_BRAKE", SENSOR_BRAKE),
    ("ERROR_UNSPECIFIED", ERROR_UNSPECIFIED),
];

/// Resolve an identifier to its published name (first registration wins for
/// the known 0x51 alias).
pub fn component_name(id: u32) -> Option<&'static str> {
    ID_TABLE.iter().find(|(_, v)| *v == id).map(|(n, _)| *n)
}

/// Resolve a published name to its identifier.
pub fn component_id(name: &str) -> Option<u32> {
    ID_TABLE.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

pub fn is_scenario(id: u32) -> bool {
    matches!(
        id,
        SCENARIO_BASELINE | SCENARIO_SECURE_INFOTAINMENT | SCENARIO_SECURE_ECU
    )
}

pub fn is_hack(id: u32) -> bool {
    (HACK_NONE..=HACK_INFOTAINMENT_2).contains(&id)
}

// ---------------------------------------------------------------------------
// Frame identifiers and payload layouts.
// ---------------------------------------------------------------------------

pub const CAN_ID_COMPONENT_READY: u32 = 0xAAFE_CB00;
pub const CAN_ID_COMPONENT_ERROR: u32 = 0xAAFE_CC00;
pub const CAN_ID_CMD_RESTART: u32 = 0xAAFE_EB00;
pub const CAN_ID_CMD_ACTIVE_SCENARIO: u32 = 0xAAFE_EB10;
pub const CAN_ID_CMD_HACK_ACTIVE: u32 = 0xAAFE_EB20;
pub const CAN_ID_BUTTON_PRESSED: u32 = 0xAAFE_CA00;
pub const CAN_ID_HEARTBEAT_REQ: u32 = 0xAABE_A737;
pub const CAN_ID_HEARTBEAT_ACK: u32 = 0xAABE_A225;

/// Declared payload width for a registered frame identifier.
pub fn frame_data_len(id: u32) -> Option<usize> {
    match id {
        CAN_ID_COMPONENT_READY => Some(4),
        CAN_ID_COMPONENT_ERROR => Some(8),
        CAN_ID_CMD_RESTART => Some(4),
        CAN_ID_CMD_ACTIVE_SCENARIO => Some(1),
        CAN_ID_CMD_HACK_ACTIVE => Some(1),
        CAN_ID_BUTTON_PRESSED => Some(1),
        CAN_ID_HEARTBEAT_REQ => Some(4),
        CAN_ID_HEARTBEAT_ACK => Some(8),
        _ => None,
    }
}

/// One discrete command message on the bus: identifier plus fixed-width data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub data: Vec<u8, MAX_FRAME_DATA_LEN>,
}

impl Frame {
    pub fn new(id: u32, bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() > MAX_FRAME_DATA_LEN {
            return Err(CodecError::MalformedFrame {
                id,
                expected: MAX_FRAME_DATA_LEN,
                actual: bytes.len(),
            });
        }
        let mut data = Vec::new();
        let _ = data.extend_from_slice(bytes);
        Ok(Self { id, data })
    }

    /// Serialize into `buf`, returning the number of bytes written.
    pub fn to_wire(&self, buf: &mut [u8; MAX_WIRE_FRAME_LEN]) -> usize {
        buf[..4].copy_from_slice(&self.id.to_be_bytes());
        buf[4] = self.data.len() as u8;
        buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + self.data.len()].copy_from_slice(&self.data);
        FRAME_HEADER_LEN + self.data.len()
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: FRAME_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let dlc = bytes[4] as usize;
        if dlc > MAX_FRAME_DATA_LEN || bytes.len() < FRAME_HEADER_LEN + dlc {
            return Err(CodecError::Truncated {
                needed: FRAME_HEADER_LEN + dlc.min(MAX_FRAME_DATA_LEN),
                got: bytes.len(),
            });
        }
        Frame::new(id, &bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + dlc])
    }
}

/// Decoded frame content, one variant per registered identifier.
///
/// Transitions-as-data for the wire: dispatch happens on this enum rather
/// than on raw identifier constants scattered through the coordinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePayload {
    ComponentReady { component: u32 },
    ComponentError { component: u32, error_code: u32 },
    RestartTarget { target: u32 },
    ActiveScenario { scenario: u8 },
    HackActive { hack: u8 },
    ButtonPressed { button: u8 },
    HeartbeatReq { sequence: u32 },
    HeartbeatAck { sender: u32, sequence: u32 },
}

impl FramePayload {
    pub fn id(&self) -> u32 {
        match self {
            FramePayload::ComponentReady { .. } => CAN_ID_COMPONENT_READY,
            FramePayload::ComponentError { .. } => CAN_ID_COMPONENT_ERROR,
            FramePayload::RestartTarget { .. } => CAN_ID_CMD_RESTART,
            FramePayload::ActiveScenario { .. } => CAN_ID_CMD_ACTIVE_SCENARIO,
            FramePayload::HackActive { .. } => CAN_ID_CMD_HACK_ACTIVE,
            FramePayload::ButtonPressed { .. } => CAN_ID_BUTTON_PRESSED,
            FramePayload::HeartbeatReq { .. } => CAN_ID_HEARTBEAT_REQ,
            FramePayload::HeartbeatAck { .. } => CAN_ID_HEARTBEAT_ACK,
        }
    }

    /// Pack this payload into a wire frame using its declared layout.
    pub fn encode(&self) -> Frame {
        let mut data: Vec<u8, MAX_FRAME_DATA_LEN> = Vec::new();
        match *self {
            FramePayload::ComponentReady { component } => {
                let _ = data.extend_from_slice(&component.to_be_bytes());
            }
            FramePayload::ComponentError {
                component,
                error_code,
            } => {
                let _ = data.extend_from_slice(&component.to_be_bytes());
                let _ = data.extend_from_slice(&error_code.to_be_bytes());
            }
            FramePayload::RestartTarget { target } => {
                let _ = data.extend_from_slice(&target.to_be_bytes());
            }
            FramePayload::ActiveScenario { scenario } => {
                let _ = data.push(scenario);
            }
            FramePayload::HackActive { hack } => {
                let _ = data.push(hack);
            }
            FramePayload::ButtonPressed { button } => {
                let _ = data.push(button);
            }
            FramePayload::HeartbeatReq { sequence } => {
                let _ = data.extend_from_slice(&sequence.to_be_bytes());
            }
            FramePayload::HeartbeatAck { sender, sequence } => {
                let _ = data.extend_from_slice(&sender.to_be_bytes());
                let _ = data.extend_from_slice(&sequence.to_be_bytes());
            }
        }
        Frame { id: self.id(), data }
    }

    /// Exact inverse of [`FramePayload::encode`] for every registered
    /// identifier. Fails with `UnknownIdentifier` for unregistered ids and
    /// `MalformedFrame` for a data length that does not match the declared
    /// layout; no other input can fail.
    pub fn decode(frame: &Frame) -> Result<Self, CodecError> {
        let expected = frame_data_len(frame.id).ok_or(CodecError::UnknownIdentifier(frame.id))?;
        if frame.data.len() != expected {
            return Err(CodecError::MalformedFrame {
                id: frame.id,
                expected,
                actual: frame.data.len(),
            });
        }
        let d = &frame.data;
        let u32_at = |off: usize| u32::from_be_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]]);
        Ok(match frame.id {
            CAN_ID_COMPONENT_READY => FramePayload::ComponentReady { component: u32_at(0) },
            CAN_ID_COMPONENT_ERROR => FramePayload::ComponentError {
                component: u32_at(0),
                error_code: u32_at(4),
            },
            CAN_ID_CMD_RESTART => FramePayload::RestartTarget { target: u32_at(0) },
            CAN_ID_CMD_ACTIVE_SCENARIO => FramePayload::ActiveScenario { scenario: d[0] },
            CAN_ID_CMD_HACK_ACTIVE => FramePayload::HackActive { hack: d[0] },
            CAN_ID_BUTTON_PRESSED => FramePayload::ButtonPressed { button: d[0] },
            CAN_ID_HEARTBEAT_REQ => FramePayload::HeartbeatReq { sequence: u32_at(0) },
            CAN_ID_HEARTBEAT_ACK => FramePayload::HeartbeatAck {
                sender: u32_at(0),
                sequence: u32_at(4),
            },
            _ => unreachable!("frame_data_len registered an unhandled id"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    UnknownIdentifier(u32),
    MalformedFrame {
        id: u32,
        expected: usize,
        actual: usize,
    },
    Truncated {
        needed: usize,
        got: usize,
    },
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CodecError::UnknownIdentifier(id) => write!(f, "unknown frame identifier {id:#010x}"),
            CodecError::MalformedFrame {
                id,
                expected,
                actual,
            } => write!(
                f,
                "malformed frame {id:#010x}: expected {expected} data bytes, got {actual}"
            ),
            CodecError::Truncated { needed, got } => {
                write!(f, "truncated wire frame: needed {needed} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_payloads() -> [FramePayload; 8] {
        [
            FramePayload::ComponentReady { component: TARGET_3 },
            FramePayload::ComponentError {
                component: IGNITION,
                error_code: ERROR_UNSPECIFIED,
            },
            FramePayload::RestartTarget { target: TARGET_1 },
            FramePayload::ActiveScenario {
                scenario: SCENARIO_SECURE_ECU as u8,
            },
            FramePayload::HackActive {
                hack: HACK_THROTTLE as u8,
            },
            FramePayload::ButtonPressed {
                button: BUTTON_VOLUME_UP as u8,
            },
            FramePayload::HeartbeatReq { sequence: 42 },
            FramePayload::HeartbeatAck {
                sender: HACKER_KIOSK,
                sequence: 42,
            },
        ]
    }

    #[test]
    fn test_payload_round_trip() {
        for payload in all_payloads() {
            let frame = payload.encode();
            assert_eq!(frame.data.len(), frame_data_len(frame.id).unwrap());
            assert_eq!(FramePayload::decode(&frame).unwrap(), payload);
        }
    }

    #[test]
    fn test_wire_round_trip() {
        for payload in all_payloads() {
            let frame = payload.encode();
            let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
            let n = frame.to_wire(&mut buf);
            assert_eq!(Frame::from_wire(&buf[..n]).unwrap(), frame);
        }
    }

    #[test]
    fn test_decode_unknown_identifier() {
        let frame = Frame::new(0xDEAD_BEEF, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            FramePayload::decode(&frame),
            Err(CodecError::UnknownIdentifier(0xDEAD_BEEF))
        );
    }

    #[test]
    fn test_decode_malformed_length() {
        // restart frames carry exactly 4 bytes
        let frame = Frame::new(CAN_ID_CMD_RESTART, &[0, 0, 0]).unwrap();
        assert_eq!(
            FramePayload::decode(&frame),
            Err(CodecError::MalformedFrame {
                id: CAN_ID_CMD_RESTART,
                expected: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_truncated_wire_frame() {
        let frame = FramePayload::HeartbeatReq { sequence: 7 }.encode();
        let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
        let n = frame.to_wire(&mut buf);
        assert!(matches!(
            Frame::from_wire(&buf[..n - 2]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            Frame::from_wire(&buf[..3]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_component_name_mapping() {
        assert_eq!(component_id("TARGET_3"), Some(TARGET_3));
        assert_eq!(component_name(TARGET_3), Some("TARGET_3"));
        assert_eq!(component_id("NO_SUCH_COMPONENT"), None);
        assert_eq!(component_name(0xFFFF), None);
    }

    #[test]
    fn test_known_duplicate_alias_is_the_only_one() {
        // HACK_OTA/HACK_BRAKE share 0x51 in the published table; any other
        // collision would be a new defect.
        assert_eq!(HACK_OTA, HACK_BRAKE);
        assert_eq!(component_name(HACK_BRAKE), Some("HACK_OTA"));
        for (i, (name_a, id_a)) in ID_TABLE.iter().enumerate() {
            for (name_b, id_b) in &ID_TABLE[i + 1..] {
                if id_a == id_b {
                    assert_eq!(
                        (*name_a, *name_b),
                        ("HACK_OTA", "HACK_BRAKE"),
                        "unexpected id collision: {name_a}/{name_b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_namespace_predicates() {
        assert!(is_scenario(SCENARIO_BASELINE));
        assert!(!is_scenario(TARGET_1));
        assert!(is_hack(HACK_NONE));
        assert!(is_hack(HACK_LKAS));
        assert!(!is_hack(IGNITION));
    }
}
