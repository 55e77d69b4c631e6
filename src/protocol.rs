//! Wire format for UDP audio transmission
//!
//! Packet layout (header followed by payload, all integers little-endian):
//!
//! | field        | type  | bytes |
//! |--------------|-------|-------|
//! | magic        | u32   | 4     |
//! | sample_rate  | u32   | 4     |
//! | channels     | u16   | 2     |
//! | samples      | u32   | 4     |
//! | timestamp_us | u64   | 8     |
//! | sequence     | u32   | 4     |
//! | audio data   | f32[] | 4 × channels × samples |
//!
//! Audio data is interleaved frame-major: `s0c0, s0c1, s1c0, s1c1, ...`.
//!
//! Note on sizing: a 10 ms stereo packet at 48 kHz carries 480 frames and
//! serializes to 3866 bytes, which exceeds a typical 1500-byte MTU and
//! relies on IP fragmentation on most paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::ProtocolError;

/// One packet of timestamped, sequenced audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Samples per channel
    pub samples: u32,
    /// Microseconds since stream start
    pub timestamp_us: u64,
    /// Sequence number for loss detection on the receiver
    pub sequence: u32,
    /// Interleaved audio samples
    pub data: Vec<f32>,
}

impl Default for AudioPacket {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            samples: 0,
            timestamp_us: 0,
            sequence: 0,
            data: Vec::new(),
        }
    }
}

impl AudioPacket {
    /// "M2G0"
    pub const MAGIC: u32 = 0x4D32_4730;

    /// Bytes before the audio data
    pub const HEADER_SIZE: usize = 26;

    /// Total serialized size in bytes, or `None` if the computation overflows
    pub fn total_size(&self) -> Option<usize> {
        self.data.len().checked_mul(4)?.checked_add(Self::HEADER_SIZE)
    }

    /// Serialize for network transmission.
    ///
    /// Fails when the size computation overflows or when the payload length
    /// disagrees with the `channels`/`samples` header fields.
    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        let overflow = || ProtocolError::SizeOverflow {
            channels: self.channels,
            samples: self.samples,
        };

        let expected = (self.channels as usize)
            .checked_mul(self.samples as usize)
            .ok_or_else(overflow)?;
        if self.data.len() != expected {
            return Err(ProtocolError::PayloadMismatch {
                expected,
                actual: self.data.len(),
            });
        }

        let total = expected
            .checked_mul(4)
            .and_then(|bytes| bytes.checked_add(Self::HEADER_SIZE))
            .ok_or_else(overflow)?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(Self::MAGIC);
        buf.put_u32_le(self.sample_rate);
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.samples);
        buf.put_u64_le(self.timestamp_us);
        buf.put_u32_le(self.sequence);
        for &sample in &self.data {
            buf.put_f32_le(sample);
        }

        Ok(buf.freeze())
    }

    /// Deserialize a received datagram.
    ///
    /// Rejects inputs shorter than the header or with the wrong magic.
    /// Extra trailing bytes are ignored; a short payload truncates the
    /// sample vector to whole frames.
    pub fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::TooShort(data.len()));
        }

        let mut buf = data;
        let magic = buf.get_u32_le();
        if magic != Self::MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let sample_rate = buf.get_u32_le();
        let channels = buf.get_u16_le();
        let samples = buf.get_u32_le();
        let timestamp_us = buf.get_u64_le();
        let sequence = buf.get_u32_le();

        let expected = (channels as usize)
            .checked_mul(samples as usize)
            .ok_or(ProtocolError::SizeOverflow { channels, samples })?;
        let available = buf.remaining() / 4;
        let mut take = available.min(expected);
        if channels > 0 {
            take -= take % channels as usize;
        }

        let mut audio = Vec::with_capacity(take);
        for _ in 0..take {
            audio.push(buf.get_f32_le());
        }

        Ok(Self {
            sample_rate,
            channels,
            samples,
            timestamp_us,
            sequence,
            data: audio,
        })
    }

    /// Fill the payload by interleaving planar channel slices frame-major.
    ///
    /// Each slice in `channels` must hold at least `samples` samples.
    pub fn set_from_channels(&mut self, channels: &[&[f32]], samples: usize, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.channels = channels.len() as u16;
        self.samples = samples as u32;

        self.data.clear();
        self.data.reserve(channels.len() * samples);
        for frame in 0..samples {
            for channel in channels {
                self.data.push(channel[frame]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_packet(channels: u16, samples: u32) -> AudioPacket {
        let count = channels as usize * samples as usize;
        // Deterministic pseudo-audio covering negatives and magnitudes > 1
        let data: Vec<f32> = (0..count)
            .map(|i| ((i as f32 * 0.37).sin() * 1.5) - 0.25)
            .collect();
        AudioPacket {
            sample_rate: 48_000,
            channels,
            samples,
            timestamp_us: 1_234_567,
            sequence: 42,
            data,
        }
    }

    #[test]
    fn test_round_trip() {
        for channels in 1..=8u16 {
            for samples in [0u32, 1, 7, 480, 4096] {
                let packet = test_packet(channels, samples);
                let bytes = packet.serialize().unwrap();
                assert_eq!(
                    bytes.len(),
                    AudioPacket::HEADER_SIZE + 4 * channels as usize * samples as usize
                );

                let decoded = AudioPacket::deserialize(&bytes).unwrap();
                assert_eq!(decoded, packet);
            }
        }
    }

    #[test]
    fn test_header_layout() {
        let packet = test_packet(2, 4);
        let bytes = packet.serialize().unwrap();

        assert_eq!(&bytes[0..4], &0x4D32_4730u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &48_000u32.to_le_bytes());
        assert_eq!(&bytes[8..10], &2u16.to_le_bytes());
        assert_eq!(&bytes[10..14], &4u32.to_le_bytes());
        assert_eq!(&bytes[14..22], &1_234_567u64.to_le_bytes());
        assert_eq!(&bytes[22..26], &42u32.to_le_bytes());
    }

    #[test]
    fn test_rejects_short_input() {
        let packet = test_packet(2, 4);
        let bytes = packet.serialize().unwrap();

        for len in 0..AudioPacket::HEADER_SIZE {
            let err = AudioPacket::deserialize(&bytes[..len]).unwrap_err();
            assert!(matches!(err, ProtocolError::TooShort(n) if n == len));
        }
    }

    #[test]
    fn test_rejects_bad_magic() {
        let packet = test_packet(1, 8);
        let mut bytes = packet.serialize().unwrap().to_vec();
        bytes[0] ^= 0xFF;

        let err = AudioPacket::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic(_)));
    }

    #[test]
    fn test_short_payload_truncates_to_whole_frames() {
        let packet = test_packet(2, 8);
        let bytes = packet.serialize().unwrap();

        // Drop the last 6 bytes: one full sample plus a partial one.
        let truncated = &bytes[..bytes.len() - 6];
        let decoded = AudioPacket::deserialize(truncated).unwrap();

        // 14 whole samples remain, truncated down to 7 whole frames.
        assert_eq!(decoded.samples, 8);
        assert_eq!(decoded.data.len(), 14);
        assert_eq!(decoded.data, packet.data[..14]);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let packet = test_packet(2, 4);
        let mut bytes = packet.serialize().unwrap().to_vec();
        bytes.extend_from_slice(&[0xAA; 32]);

        let decoded = AudioPacket::deserialize(&bytes).unwrap();
        assert_eq!(decoded.data.len(), 8);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_serialize_checks_payload_length() {
        let mut packet = test_packet(2, 4);
        packet.data.pop();

        let err = packet.serialize().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadMismatch {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_interleaving_is_frame_major() {
        let left = [1.0f32, 2.0, 3.0];
        let right = [-1.0f32, -2.0, -3.0];

        let mut packet = AudioPacket::default();
        packet.set_from_channels(&[&left[..], &right[..]], 3, 44_100);

        assert_eq!(packet.channels, 2);
        assert_eq!(packet.samples, 3);
        assert_eq!(packet.data, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }
}
