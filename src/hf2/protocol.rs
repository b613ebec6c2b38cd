//! HF2 framing and command decoding.

use super::{
    command_id, Hf2Config, CMDPKT_LAST, CMD_HEADER_SIZE, FLAG_MASK, MODE_BOOTLOADER, SERIAL_ERR,
    SERIAL_OUT, SIZE_MASK,
};
use crate::config::{FLASH_PAGE_SIZE, HF2_BUF_SIZE};
use crate::error::ProtocolError;

/// What a packet completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// Body packet stored, more to come.
    Partial,
    /// Last packet stored; [`Accumulator::message`] holds the command.
    Command,
    /// Serial packet carrying `len` bytes, not accumulated.
    Serial { len: usize },
}

/// Reassembly buffer for one command.
pub struct Accumulator {
    size: usize,
    buf: [u8; HF2_BUF_SIZE],
}

impl Accumulator {
    pub const fn new() -> Self {
        Self {
            size: 0,
            buf: [0; HF2_BUF_SIZE],
        }
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn reset(&mut self) {
        self.size = 0;
    }

    /// Reassembled command, valid after `push` returned [`Frame::Command`].
    pub fn message(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    /// Feed one inbound report.
    ///
    /// Framing violations reset the accumulator and drop the packet.
    pub fn push(&mut self, packet: &[u8]) -> Result<Frame, ProtocolError> {
        let Some(&tag) = packet.first() else {
            self.reset();
            return Err(ProtocolError::ShortPacket);
        };
        let size = usize::from(tag & SIZE_MASK);
        let flag = tag & FLAG_MASK;
        let Some(payload) = packet.get(1..1 + size) else {
            self.reset();
            return Err(ProtocolError::ShortPacket);
        };

        if flag == SERIAL_OUT || flag == SERIAL_ERR {
            if self.size != 0 {
                self.reset();
                return Err(ProtocolError::SerialMidCommand);
            }
            return Ok(Frame::Serial { len: size });
        }

        let end = self.size + size;
        if end > self.buf.len() {
            self.reset();
            return Err(ProtocolError::Overflow);
        }
        self.buf[self.size..end].copy_from_slice(payload);
        self.size = end;

        if flag == CMDPKT_LAST {
            Ok(Frame::Command)
        } else {
            Ok(Frame::Partial)
        }
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded command body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    BinInfo,
    Info,
    ResetIntoApp,
    ResetIntoBootloader,
    StartFlash,
    WriteFlashPage {
        target_addr: u32,
        data: &'a [u8; FLASH_PAGE_SIZE],
    },
    ReadWords {
        target_addr: u32,
        num_words: u32,
    },
    /// Known command with a payload of the wrong size.
    Malformed { command_id: u32 },
    Unknown(u32),
}

/// A reassembled command with its tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub tag: u16,
    pub command: Command<'a>,
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

impl<'a> Request<'a> {
    pub fn decode(msg: &'a [u8]) -> Result<Self, ProtocolError> {
        if msg.len() < CMD_HEADER_SIZE {
            return Err(ProtocolError::Truncated);
        }
        let id = le_u32(&msg[0..4]);
        let tag = u16::from_le_bytes([msg[4], msg[5]]);
        let payload = &msg[CMD_HEADER_SIZE..];

        let command = match id {
            command_id::BININFO => Command::BinInfo,
            command_id::INFO => Command::Info,
            command_id::RESET_INTO_APP => Command::ResetIntoApp,
            command_id::RESET_INTO_BOOTLOADER => Command::ResetIntoBootloader,
            command_id::START_FLASH => Command::StartFlash,
            command_id::WRITE_FLASH_PAGE => match payload.len() {
                n if n == 4 + FLASH_PAGE_SIZE => match payload[4..].try_into() {
                    Ok(data) => Command::WriteFlashPage {
                        target_addr: le_u32(&payload[..4]),
                        data,
                    },
                    Err(_) => Command::Malformed { command_id: id },
                },
                _ => Command::Malformed { command_id: id },
            },
            command_id::READ_WORDS if payload.len() == 8 => Command::ReadWords {
                target_addr: le_u32(&payload[..4]),
                num_words: le_u32(&payload[4..8]),
            },
            command_id::READ_WORDS => Command::Malformed { command_id: id },
            other => Command::Unknown(other),
        };

        Ok(Self { tag, command })
    }
}

/// BININFO response payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinInfo {
    pub mode: u32,
    pub flash_page_size: u32,
    pub flash_num_pages: u32,
    pub max_message_size: u32,
    pub family_id: u32,
}

impl BinInfo {
    pub const SIZE: usize = 20;

    pub fn from_config(config: &Hf2Config) -> Self {
        Self {
            mode: MODE_BOOTLOADER,
            flash_page_size: FLASH_PAGE_SIZE as u32,
            flash_num_pages: config.page_count(),
            max_message_size: HF2_BUF_SIZE as u32,
            family_id: config.family_id,
        }
    }

    /// Write the five little-endian words; returns bytes written, or 0 if
    /// `buf` is too small.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        if buf.len() < Self::SIZE {
            return 0;
        }
        let words = [
            self.mode,
            self.flash_page_size,
            self.flash_num_pages,
            self.max_message_size,
            self.family_id,
        ];
        for (chunk, word) in buf.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Self::SIZE
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            mode: le_u32(&buf[0..]),
            flash_page_size: le_u32(&buf[4..]),
            flash_num_pages: le_u32(&buf[8..]),
            max_message_size: le_u32(&buf[12..]),
            family_id: le_u32(&buf[16..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hf2::{CMDPKT_BODY, MAX_CHUNK, PACKET_SIZE};

    /// Split `msg` into reports the way a host does.
    fn packets(msg: &[u8]) -> std::vec::Vec<[u8; PACKET_SIZE]> {
        let mut out = std::vec::Vec::new();
        let mut chunks = msg.chunks(MAX_CHUNK).peekable();
        while let Some(chunk) = chunks.next() {
            let flag = if chunks.peek().is_some() {
                CMDPKT_BODY
            } else {
                CMDPKT_LAST
            };
            let mut p = [0u8; PACKET_SIZE];
            p[0] = flag | chunk.len() as u8;
            p[1..1 + chunk.len()].copy_from_slice(chunk);
            out.push(p);
        }
        out
    }

    fn header(id: u32, tag: u16) -> std::vec::Vec<u8> {
        let mut v = std::vec::Vec::from(id.to_le_bytes());
        v.extend_from_slice(&tag.to_le_bytes());
        v.extend_from_slice(&[0, 0]);
        v
    }

    #[test]
    fn reassembles_payload_across_packets() {
        for len in [1usize, 62, 63, 64, 126, 200, HF2_BUF_SIZE] {
            let msg: std::vec::Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let mut acc = Accumulator::new();
            let packets = packets(&msg);
            let (last, body) = packets.split_last().unwrap();
            for p in body {
                assert_eq!(acc.push(p), Ok(Frame::Partial));
            }
            assert_eq!(acc.push(last), Ok(Frame::Command));
            assert_eq!(acc.len(), len);
            assert_eq!(acc.message(), msg.as_slice());
        }
    }

    #[test]
    fn serial_packet_mid_command_resets() {
        let mut acc = Accumulator::new();
        let mut body = [0u8; PACKET_SIZE];
        body[0] = CMDPKT_BODY | 4;
        assert_eq!(acc.push(&body), Ok(Frame::Partial));

        let mut serial = [0u8; PACKET_SIZE];
        serial[0] = SERIAL_OUT | 3;
        assert_eq!(acc.push(&serial), Err(ProtocolError::SerialMidCommand));
        assert!(acc.is_empty());

        // Between commands serial packets are accepted and not stored.
        assert_eq!(acc.push(&serial), Ok(Frame::Serial { len: 3 }));
        assert!(acc.is_empty());
    }

    #[test]
    fn overflow_resets() {
        let mut acc = Accumulator::new();
        let mut body = [0u8; PACKET_SIZE];
        body[0] = CMDPKT_BODY | MAX_CHUNK as u8;
        for _ in 0..HF2_BUF_SIZE / MAX_CHUNK {
            assert_eq!(acc.push(&body), Ok(Frame::Partial));
        }
        assert_eq!(acc.push(&body), Err(ProtocolError::Overflow));
        assert!(acc.is_empty());
    }

    #[test]
    fn short_packet_is_rejected() {
        let mut acc = Accumulator::new();
        assert_eq!(acc.push(&[CMDPKT_LAST | 10, 1, 2]), Err(ProtocolError::ShortPacket));
        assert_eq!(acc.push(&[]), Err(ProtocolError::ShortPacket));
    }

    #[test]
    fn decodes_commands() {
        let msg = header(command_id::BININFO, 0x1234);
        let req = Request::decode(&msg).unwrap();
        assert_eq!(req.tag, 0x1234);
        assert_eq!(req.command, Command::BinInfo);

        let mut msg = header(command_id::READ_WORDS, 7);
        msg.extend_from_slice(&0x1_0000u32.to_le_bytes());
        msg.extend_from_slice(&4u32.to_le_bytes());
        assert_eq!(
            Request::decode(&msg).unwrap().command,
            Command::ReadWords {
                target_addr: 0x1_0000,
                num_words: 4
            }
        );

        let mut msg = header(command_id::WRITE_FLASH_PAGE, 9);
        msg.extend_from_slice(&0x2_0000u32.to_le_bytes());
        msg.extend_from_slice(&[0xA5; FLASH_PAGE_SIZE]);
        match Request::decode(&msg).unwrap().command {
            Command::WriteFlashPage { target_addr, data } => {
                assert_eq!(target_addr, 0x2_0000);
                assert!(data.iter().all(|&b| b == 0xA5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_payload_sizes_are_malformed() {
        let mut msg = header(command_id::WRITE_FLASH_PAGE, 1);
        msg.extend_from_slice(&[0; 4 + 100]);
        assert_eq!(
            Request::decode(&msg).unwrap().command,
            Command::Malformed {
                command_id: command_id::WRITE_FLASH_PAGE
            }
        );

        let mut msg = header(command_id::READ_WORDS, 1);
        msg.extend_from_slice(&[0; 4]);
        assert_eq!(
            Request::decode(&msg).unwrap().command,
            Command::Malformed {
                command_id: command_id::READ_WORDS
            }
        );
    }

    #[test]
    fn unknown_and_truncated_commands() {
        let msg = header(0xFFFF_FFFF, 3);
        assert_eq!(
            Request::decode(&msg).unwrap().command,
            Command::Unknown(0xFFFF_FFFF)
        );
        assert_eq!(Request::decode(&msg[..6]), Err(ProtocolError::Truncated));
    }

    #[test]
    fn bininfo_encodes_five_words() {
        let config = Hf2Config {
            flash_size: 131_072,
            family_id: 0x5ee2_1072,
            ..Hf2Config::new()
        };
        let info = BinInfo::from_config(&config);
        let mut buf = [0u8; 32];
        assert_eq!(info.encode(&mut buf), 20);
        assert_eq!(BinInfo::decode(&buf), Some(info));
        assert_eq!(info.flash_num_pages, 512);
        assert_eq!(info.encode(&mut buf[..19]), 0);
    }
}
