//! P2P message envelope and handshake payloads
//!
//! Every message travels as
//! `magic(4) || command(12, zero-padded ASCII) || length(4) || checksum(4) || payload`
//! with the checksum being the first four bytes of dSHA256(payload).
//! Decoding is strict: wrong magic, oversized length and checksum
//! mismatch are protocol violations the peer actor turns into penalties.

use crate::compact_int::CompactInt;
use crate::constants::MAX_PROTOCOL_MESSAGE_LENGTH;
use crate::crypto::sha256d;
use crate::error::{CoreError, Result};
use crate::stream::{ByteReader, ByteWriter};

pub const COMMAND_SIZE: usize = 12;
pub const HEADER_SIZE: usize = 24;

/// First four bytes of the payload's double SHA-256.
pub fn payload_checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: u32,
    pub command: [u8; COMMAND_SIZE],
    pub length: u32,
    pub checksum: [u8; 4],
}

impl MessageHeader {
    pub fn new(magic: u32, command: &str, payload: &[u8]) -> Result<Self> {
        if command.len() > COMMAND_SIZE
            || !command
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(CoreError::Protocol("invalid command name".into()));
        }
        let mut command_bytes = [0u8; COMMAND_SIZE];
        command_bytes[..command.len()].copy_from_slice(command.as_bytes());
        Ok(MessageHeader {
            magic,
            command: command_bytes,
            length: payload.len() as u32,
            checksum: payload_checksum(payload),
        })
    }

    /// The command as text. Fails on embedded NULs or non-ASCII bytes.
    pub fn command_str(&self) -> Result<&str> {
        let end = self
            .command
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(COMMAND_SIZE);
        if self.command[end..].iter().any(|b| *b != 0) {
            return Err(CoreError::Protocol("command has bytes after NUL".into()));
        }
        std::str::from_utf8(&self.command[..end])
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_graphic()))
            .ok_or(CoreError::Protocol("command is not printable ASCII".into()))
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.magic);
        writer.write_bytes(&self.command);
        writer.write_u32(self.length);
        writer.write_bytes(&self.checksum);
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(MessageHeader {
            magic: reader.read_u32()?,
            command: reader.read_array()?,
            length: reader.read_u32()?,
            checksum: reader.read_array()?,
        })
    }
}

/// A complete envelope: header plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    pub fn new(magic: u32, command: &str, payload: Vec<u8>) -> Result<Self> {
        Ok(NetworkMessage {
            header: MessageHeader::new(magic, command, &payload)?,
            payload,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.write(&mut writer);
        writer.write_bytes(&self.payload);
        writer.into_bytes()
    }

    /// Strict decode against the expected network magic.
    pub fn read(reader: &mut ByteReader<'_>, expected_magic: u32) -> Result<Self> {
        let header = MessageHeader::read(reader)?;
        if header.magic != expected_magic {
            return Err(CoreError::Protocol("wrong network magic".into()));
        }
        if header.length as usize > MAX_PROTOCOL_MESSAGE_LENGTH {
            return Err(CoreError::Protocol("oversized message".into()));
        }
        let payload = reader.read_bytes(header.length as usize)?.to_vec();
        if payload_checksum(&payload) != header.checksum {
            return Err(CoreError::Protocol("payload checksum mismatch".into()));
        }
        Ok(NetworkMessage { header, payload })
    }
}

/// Network address as carried inside a version payload: services, a
/// 16-byte IPv6-mapped address, and a big-endian port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddress {
    pub fn from_ipv4(services: u64, octets: [u8; 4], port: u16) -> Self {
        let mut ip = [0u8; 16];
        ip[10] = 0xff;
        ip[11] = 0xff;
        ip[12..].copy_from_slice(&octets);
        NetAddress { services, ip, port }
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.services);
        writer.write_bytes(&self.ip);
        // The one big-endian field in the protocol
        writer.write_bytes(&self.port.to_be_bytes());
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let services = reader.read_u64()?;
        let ip = reader.read_array()?;
        let port = u16::from_be_bytes(reader.read_array()?);
        Ok(NetAddress { services, ip, port })
    }
}

/// The `version` payload opening a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

/// Longest user agent accepted before the peer is considered hostile.
pub const MAX_USER_AGENT_LENGTH: usize = 256;

impl VersionMessage {
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.version);
        writer.write_u64(self.services);
        writer.write_i64(self.timestamp);
        self.receiver.write(writer);
        self.sender.write(writer);
        writer.write_u64(self.nonce);
        CompactInt::from(self.user_agent.len()).write(writer);
        writer.write_bytes(self.user_agent.as_bytes());
        writer.write_i32(self.start_height);
        writer.write_u8(self.relay as u8);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(86 + self.user_agent.len());
        self.write(&mut writer);
        writer.into_bytes()
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let version = reader.read_i32()?;
        let services = reader.read_u64()?;
        let timestamp = reader.read_i64()?;
        let receiver = NetAddress::read(reader)?;
        let sender = NetAddress::read(reader)?;
        let nonce = reader.read_u64()?;

        let agent_len = CompactInt::read(reader)?.value() as usize;
        if agent_len > MAX_USER_AGENT_LENGTH {
            return Err(CoreError::Protocol("user agent too long".into()));
        }
        let user_agent = String::from_utf8(reader.read_bytes(agent_len)?.to_vec())
            .map_err(|_| CoreError::Protocol("user agent is not UTF-8".into()))?;

        let start_height = reader.read_i32()?;
        // Absent on pre-70001 peers, defaulting to relay
        let relay = if reader.is_empty() {
            true
        } else {
            reader.read_u8()? != 0
        };

        Ok(VersionMessage {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// The `sendcmpct` payload (BIP152).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCompactMessage {
    pub announce: bool,
    pub version: u64,
}

impl SendCompactMessage {
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.announce as u8);
        writer.write_u64(self.version);
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let announce = reader.read_u8()? != 0;
        let version = reader.read_u64()?;
        Ok(SendCompactMessage { announce, version })
    }
}

/// The `feefilter` payload (BIP133): minimum fee rate in sat/kvB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeFilterMessage {
    pub fee_rate: i64,
}

impl FeeFilterMessage {
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_i64(self.fee_rate);
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(FeeFilterMessage {
            fee_rate: reader.read_i64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Network;

    #[test]
    fn test_envelope_round_trip() {
        let message =
            NetworkMessage::new(Network::Mainnet.magic(), "verack", Vec::new()).unwrap();
        let bytes = message.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let mut reader = ByteReader::new(&bytes);
        let decoded = NetworkMessage::read(&mut reader, Network::Mainnet.magic()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.header.command_str().unwrap(), "verack");
    }

    #[test]
    fn test_empty_payload_checksum() {
        // dSHA256("") starts 5df6e0e2
        assert_eq!(payload_checksum(&[]), [0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let message = NetworkMessage::new(Network::Mainnet.magic(), "ping", vec![1; 8]).unwrap();
        let bytes = message.to_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            NetworkMessage::read(&mut reader, Network::Testnet.magic()),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let message = NetworkMessage::new(Network::Mainnet.magic(), "ping", vec![1; 8]).unwrap();
        let mut bytes = message.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            NetworkMessage::read(&mut reader, Network::Mainnet.magic()),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut writer = ByteWriter::new();
        let mut header = MessageHeader::new(Network::Mainnet.magic(), "block", &[]).unwrap();
        header.length = (MAX_PROTOCOL_MESSAGE_LENGTH + 1) as u32;
        header.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            NetworkMessage::read(&mut reader, Network::Mainnet.magic()),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_command_names() {
        assert!(MessageHeader::new(0, "version", &[]).is_ok());
        assert!(MessageHeader::new(0, "averyverylongcommand", &[]).is_err());
        assert!(MessageHeader::new(0, "Version", &[]).is_err());

        // Bytes after the NUL terminator are hostile
        let mut header = MessageHeader::new(0, "ping", &[]).unwrap();
        header.command[6] = b'x';
        assert!(header.command_str().is_err());
    }

    #[test]
    fn test_version_message_round_trip() {
        let version = VersionMessage {
            version: 70015,
            services: 1,
            timestamp: 1_600_000_000,
            receiver: NetAddress::from_ipv4(1, [10, 0, 0, 1], 8333),
            sender: NetAddress::from_ipv4(1, [10, 0, 0, 2], 8333),
            nonce: 0xdeadbeef,
            user_agent: "/btcproto:0.1.0/".to_string(),
            start_height: 700_000,
            relay: true,
        };
        let bytes = version.to_bytes();
        let mut reader = ByteReader::new(&bytes);
        let decoded = VersionMessage::read(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, version);
    }

    #[test]
    fn test_version_without_relay_byte() {
        let version = VersionMessage {
            version: 60002,
            services: 1,
            timestamp: 0,
            receiver: NetAddress::from_ipv4(0, [127, 0, 0, 1], 8333),
            sender: NetAddress::from_ipv4(0, [127, 0, 0, 1], 8333),
            nonce: 7,
            user_agent: String::new(),
            start_height: 0,
            relay: false,
        };
        let bytes = version.to_bytes();
        // Strip the relay byte the way an old peer would
        let mut reader = ByteReader::new(&bytes[..bytes.len() - 1]);
        let decoded = VersionMessage::read(&mut reader).unwrap();
        assert!(decoded.relay);
    }

    #[test]
    fn test_net_address_port_is_big_endian() {
        let address = NetAddress::from_ipv4(0, [1, 2, 3, 4], 0x1234);
        let mut writer = ByteWriter::new();
        address.write(&mut writer);
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[24..26], &[0x12, 0x34]);
    }

    #[test]
    fn test_sendcmpct_and_feefilter_round_trip() {
        let sendcmpct = SendCompactMessage {
            announce: true,
            version: 2,
        };
        let mut writer = ByteWriter::new();
        sendcmpct.write(&mut writer);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 9);
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(SendCompactMessage::read(&mut reader).unwrap(), sendcmpct);

        let feefilter = FeeFilterMessage { fee_rate: 1000 };
        let mut writer = ByteWriter::new();
        feefilter.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(FeeFilterMessage::read(&mut reader).unwrap(), feefilter);
    }
}
