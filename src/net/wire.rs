//! Wire message and codec shared by the TCP command channel and the UDP
//! availability broadcast.
//!
//! # Frame layout
//!
//! Every transmission is one fixed-size frame:
//!
//! ```text
//! ┌─────────────┬────────────────────────────────┐
//! │ Tag (1 byte)│ Payload (8 bytes, union-sized) │
//! └─────────────┴────────────────────────────────┘
//! ```
//!
//! The payload area is sized to the largest variant (`WheelsState`, four
//! `i16` fields) and is interpreted only according to the tag. Multi-byte
//! fields are big-endian on the wire, host order in memory; `encode` and
//! `decode` are exact inverses for every tag.
//!
//! The single-wheel speed commands reuse the `WheelsState` field offsets:
//! a left-wheel speed always sits at payload offset 0, a right-wheel speed
//! at offset 2, whichever tag carries it.

/// Total frame size: 1 tag byte + 8 payload bytes.
pub const FRAME_LEN: usize = 9;

/// Tag byte values, stable across both ends of the link.
pub mod tag {
    pub const INVALID: u8 = 0x00;
    pub const CMD_SET_LEFT_WHEEL_SPEED: u8 = 0x01;
    pub const CMD_SET_RIGHT_WHEEL_SPEED: u8 = 0x02;
    pub const CMD_SET_WHEELS_SPEED: u8 = 0x03;
    pub const CMD_STOP: u8 = 0x04;
    pub const REQ_WHEELS_STATE: u8 = 0x11;
    pub const REQ_DISTANCE: u8 = 0x12;
    pub const REQ_VIDEO_STREAM_PORT: u8 = 0x13;
    pub const MSG_WHEELS_STATE: u8 = 0x21;
    pub const MSG_DISTANCE: u8 = 0x22;
    pub const MSG_VIDEO_STREAM_PORT: u8 = 0x23;
    pub const MSG_DEVICE_AVAILABILITY: u8 = 0x24;
}

/// Protocol message, tagged union over all command/request/response kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Placeholder tag; also what the pending-command slot holds when empty.
    Invalid,
    SetLeftWheelSpeed {
        speed: i16,
    },
    SetRightWheelSpeed {
        speed: i16,
    },
    SetWheelsSpeed {
        left: i16,
        right: i16,
    },
    Stop,
    RequestWheelsState,
    RequestDistance,
    RequestVideoStreamPort,
    WheelsState {
        left: i16,
        right: i16,
        max: i16,
        min: i16,
    },
    Distance {
        cm: u32,
    },
    VideoStreamPort {
        port: u16,
        running: bool,
    },
    DeviceAvailability {
        available: bool,
    },
}

impl Message {
    /// Wire tag for this message.
    pub fn tag(&self) -> u8 {
        match self {
            Message::Invalid => tag::INVALID,
            Message::SetLeftWheelSpeed { .. } => tag::CMD_SET_LEFT_WHEEL_SPEED,
            Message::SetRightWheelSpeed { .. } => tag::CMD_SET_RIGHT_WHEEL_SPEED,
            Message::SetWheelsSpeed { .. } => tag::CMD_SET_WHEELS_SPEED,
            Message::Stop => tag::CMD_STOP,
            Message::RequestWheelsState => tag::REQ_WHEELS_STATE,
            Message::RequestDistance => tag::REQ_DISTANCE,
            Message::RequestVideoStreamPort => tag::REQ_VIDEO_STREAM_PORT,
            Message::WheelsState { .. } => tag::MSG_WHEELS_STATE,
            Message::Distance { .. } => tag::MSG_DISTANCE,
            Message::VideoStreamPort { .. } => tag::MSG_VIDEO_STREAM_PORT,
            Message::DeviceAvailability { .. } => tag::MSG_DEVICE_AVAILABILITY,
        }
    }

    /// Encode to one wire frame, payload fields in network byte order.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = self.tag();
        let payload = &mut frame[1..];

        match *self {
            Message::Invalid
            | Message::Stop
            | Message::RequestWheelsState
            | Message::RequestDistance
            | Message::RequestVideoStreamPort => {}
            Message::SetLeftWheelSpeed { speed } => {
                payload[0..2].copy_from_slice(&speed.to_be_bytes());
            }
            Message::SetRightWheelSpeed { speed } => {
                payload[2..4].copy_from_slice(&speed.to_be_bytes());
            }
            Message::SetWheelsSpeed { left, right } => {
                payload[0..2].copy_from_slice(&left.to_be_bytes());
                payload[2..4].copy_from_slice(&right.to_be_bytes());
            }
            Message::WheelsState {
                left,
                right,
                max,
                min,
            } => {
                payload[0..2].copy_from_slice(&left.to_be_bytes());
                payload[2..4].copy_from_slice(&right.to_be_bytes());
                payload[4..6].copy_from_slice(&max.to_be_bytes());
                payload[6..8].copy_from_slice(&min.to_be_bytes());
            }
            Message::Distance { cm } => {
                payload[0..4].copy_from_slice(&cm.to_be_bytes());
            }
            Message::VideoStreamPort { port, running } => {
                payload[0..2].copy_from_slice(&port.to_be_bytes());
                payload[2] = running as u8;
            }
            Message::DeviceAvailability { available } => {
                payload[0] = available as u8;
            }
        }

        frame
    }

    /// Decode one wire frame. An unknown tag decodes to [`Message::Invalid`];
    /// the receiving path decides whether that is fatal or merely dropped.
    pub fn decode(frame: &[u8; FRAME_LEN]) -> Message {
        let payload = &frame[1..];
        let i16_at = |off: usize| i16::from_be_bytes([payload[off], payload[off + 1]]);
        let u16_at = |off: usize| u16::from_be_bytes([payload[off], payload[off + 1]]);

        match frame[0] {
            tag::CMD_SET_LEFT_WHEEL_SPEED => Message::SetLeftWheelSpeed { speed: i16_at(0) },
            tag::CMD_SET_RIGHT_WHEEL_SPEED => Message::SetRightWheelSpeed { speed: i16_at(2) },
            tag::CMD_SET_WHEELS_SPEED => Message::SetWheelsSpeed {
                left: i16_at(0),
                right: i16_at(2),
            },
            tag::CMD_STOP => Message::Stop,
            tag::REQ_WHEELS_STATE => Message::RequestWheelsState,
            tag::REQ_DISTANCE => Message::RequestDistance,
            tag::REQ_VIDEO_STREAM_PORT => Message::RequestVideoStreamPort,
            tag::MSG_WHEELS_STATE => Message::WheelsState {
                left: i16_at(0),
                right: i16_at(2),
                max: i16_at(4),
                min: i16_at(6),
            },
            tag::MSG_DISTANCE => Message::Distance {
                cm: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            },
            tag::MSG_VIDEO_STREAM_PORT => Message::VideoStreamPort {
                port: u16_at(0),
                running: payload[2] != 0,
            },
            tag::MSG_DEVICE_AVAILABILITY => Message::DeviceAvailability {
                available: payload[0] != 0,
            },
            _ => Message::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) {
        assert_eq!(Message::decode(&msg.encode()), msg, "{msg:?}");
    }

    #[test]
    fn encode_decode_inverse_for_every_tag() {
        round_trip(Message::Invalid);
        round_trip(Message::SetLeftWheelSpeed { speed: -128 });
        round_trip(Message::SetRightWheelSpeed { speed: 127 });
        round_trip(Message::SetWheelsSpeed {
            left: i16::MIN,
            right: i16::MAX,
        });
        round_trip(Message::Stop);
        round_trip(Message::RequestWheelsState);
        round_trip(Message::RequestDistance);
        round_trip(Message::RequestVideoStreamPort);
        round_trip(Message::WheelsState {
            left: 0,
            right: -1,
            max: i16::MAX,
            min: i16::MIN,
        });
        round_trip(Message::Distance { cm: 0 });
        round_trip(Message::Distance { cm: u32::MAX });
        round_trip(Message::VideoStreamPort {
            port: 1234,
            running: true,
        });
        round_trip(Message::VideoStreamPort {
            port: 0,
            running: false,
        });
        round_trip(Message::DeviceAvailability { available: true });
        round_trip(Message::DeviceAvailability { available: false });
    }

    #[test]
    fn fields_are_big_endian_on_the_wire() {
        let frame = Message::SetWheelsSpeed {
            left: 0x0102,
            right: 0x0304,
        }
        .encode();
        assert_eq!(frame[0], tag::CMD_SET_WHEELS_SPEED);
        assert_eq!(&frame[1..5], &[0x01, 0x02, 0x03, 0x04]);

        let frame = Message::Distance { cm: 0xAABBCCDD }.encode();
        assert_eq!(frame[0], tag::MSG_DISTANCE);
        assert_eq!(&frame[1..5], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn single_wheel_commands_use_wheels_state_offsets() {
        // Left speed lives at payload offset 0, right speed at offset 2,
        // for both the single-wheel commands and the combined command.
        let left = Message::SetLeftWheelSpeed { speed: 0x1122 }.encode();
        assert_eq!(&left[1..3], &[0x11, 0x22]);
        assert_eq!(&left[3..5], &[0x00, 0x00]);

        let right = Message::SetRightWheelSpeed { speed: 0x3344 }.encode();
        assert_eq!(&right[1..3], &[0x00, 0x00]);
        assert_eq!(&right[3..5], &[0x33, 0x44]);
    }

    #[test]
    fn unknown_tag_decodes_to_invalid() {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x7F;
        assert_eq!(Message::decode(&frame), Message::Invalid);
    }

    #[test]
    fn frame_is_fixed_size() {
        assert_eq!(FRAME_LEN, 9);
        assert_eq!(Message::Stop.encode().len(), FRAME_LEN);
    }
}
