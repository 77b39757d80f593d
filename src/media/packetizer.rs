//! RFC 6184 RTP packetizer: single-NAL and FU-A fragmentation.
//!
//! Stateful per session — it owns the RTP sequence counter. Packet headers are built with
//! the `rtp` crate's [`rtp::header::Header`] (which already encodes `V=2,P=0,X=0,CC=0` via
//! its `Default` impl) rather than hand-rolled byte twiddling, the same way the rest of this
//! crate leans on `rtp`/`webrtc` for wire format instead of reimplementing it.

use bytes::{Bytes, BytesMut};
use rtp::header::Header;
use rtp::packet::Packet;

const FUA_INDICATOR_TYPE: u8 = 28;
const NALU_TYPE_MASK: u8 = 0x1f;
const NALU_REF_IDC_MASK: u8 = 0x60;

/// Owns the monotonic RTP sequence counter for one peer session.
#[derive(Debug)]
pub struct RtpPacketizer {
    payload_type: u8,
    ssrc: u32,
    mtu: usize,
    seq: u16,
}

impl RtpPacketizer {
    pub fn new(ssrc: u32, payload_type: u8, mtu: usize) -> Self {
        Self {
            payload_type,
            ssrc,
            mtu,
            seq: 0,
        }
    }

    /// Current sequence number (next one to be assigned), exposed for tests.
    pub fn next_seq(&self) -> u16 {
        self.seq
    }

    /// Packetize one NAL unit (header byte included) into one or more RTP packets, all
    /// sharing `timestamp`. `marker` is applied to the single packet (single-NAL mode) or to
    /// the final fragment (FU-A mode) only.
    pub fn packetize(&mut self, nal: &[u8], marker: bool, timestamp: u32) -> Vec<Packet> {
        if nal.is_empty() {
            return Vec::new();
        }

        if nal.len() <= self.mtu.saturating_sub(12) {
            let packet = self.build_packet(Bytes::copy_from_slice(nal), marker, timestamp);
            return vec![packet];
        }

        self.fragment_fua(nal, marker, timestamp)
    }

    fn fragment_fua(&mut self, nal: &[u8], marker: bool, timestamp: u32) -> Vec<Packet> {
        let header_byte = nal[0];
        let nri = header_byte & NALU_REF_IDC_MASK;
        let nal_type = header_byte & NALU_TYPE_MASK;
        let fu_indicator = FUA_INDICATOR_TYPE | nri;

        let max_fragment_size = self.mtu.saturating_sub(14).max(1);
        let body = &nal[1..];
        let mut packets = Vec::with_capacity(body.len().div_ceil(max_fragment_size));

        let mut offset = 0;
        while offset < body.len() {
            let end = (offset + max_fragment_size).min(body.len());
            let is_first = offset == 0;
            let is_last = end == body.len();

            let mut fu_header = nal_type;
            if is_first {
                fu_header |= 0x80;
            }
            if is_last {
                fu_header |= 0x40;
            }

            let mut payload = BytesMut::with_capacity(2 + (end - offset));
            payload.extend_from_slice(&[fu_indicator, fu_header]);
            payload.extend_from_slice(&body[offset..end]);

            let packet_marker = is_last && marker;
            packets.push(self.build_packet(payload.freeze(), packet_marker, timestamp));

            offset = end;
        }

        packets
    }

    fn build_packet(&mut self, payload: Bytes, marker: bool, timestamp: u32) -> Packet {
        let header = Header {
            marker,
            payload_type: self.payload_type,
            sequence_number: self.seq,
            timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        };
        self.seq = self.seq.wrapping_add(1);
        Packet { header, payload }
    }
}
