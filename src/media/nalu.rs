//! Annex-B NAL unit framer.
//!
//! Reassembles H.264 NAL units out of an arbitrarily-split byte stream (UDP datagram
//! payloads). A NAL is only emitted once its trailing start code has been observed, so the
//! very last NAL of a stream may sit buffered forever on clean shutdown — acceptable for a
//! live relay that never stops mid-stream under normal operation.

use bytes::{Bytes, BytesMut};

/// A single framed NAL unit (header byte + RBSP, start code and emulation-prevention bytes
/// untouched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nal {
    pub data: Bytes,
}

impl Nal {
    /// `forbidden_zero_bit(1) | nal_ref_idc(2) | nal_unit_type(5)`, low 5 bits of the header.
    pub fn nal_type(&self) -> u8 {
        self.data[0] & 0x1f
    }
}

/// Find the next Annex-B start code at or after `start`.
///
/// A start code is a run of two or more `0x00` bytes followed by a `0x01`; this covers both
/// the 3-byte and 4-byte forms (and tolerates longer zero runs) by reporting the position of
/// the *first* zero in the run, matching the RFC's "leading_zero_8bits" tolerance.
/// Returns `(position, length)`, or `None` if no start code is present in `data[start..]`.
fn find_start_code(data: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut zero_count = 0usize;
    for (i, &b) in data[start..].iter().enumerate() {
        if b == 0 {
            zero_count += 1;
            continue;
        }
        if b == 1 && zero_count >= 2 {
            return Some((start + i - zero_count, zero_count + 1));
        }
        zero_count = 0;
    }
    None
}

/// Stateful Annex-B scanner. Feed it datagram payloads in arrival order; drain framed NALs
/// with [`NaluFramer::next_nal`].
#[derive(Debug, Default)]
pub struct NaluFramer {
    carry: BytesMut,
    ready: std::collections::VecDeque<Nal>,
}

impl NaluFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a datagram payload and frame as many complete NAL units as possible.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
        self.scan();
    }

    /// Pop the next framed NAL unit in arrival order, if any is ready.
    pub fn next_nal(&mut self) -> Option<Nal> {
        self.ready.pop_front()
    }

    fn scan(&mut self) {
        loop {
            let buf = &self.carry[..];
            let Some((p, l)) = find_start_code(buf, 0) else {
                // No start code at all in the carry; nothing to frame yet, keep the carry.
                return;
            };
            let nal_start = p + l;
            let Some((q, _)) = find_start_code(buf, nal_start) else {
                // Trailing boundary not yet observed — retain from `p` onward and wait for
                // more data.
                if p > 0 {
                    let remaining = self.carry.split_off(p);
                    self.carry = remaining;
                }
                return;
            };

            let nal_bytes = self.carry[nal_start..q].to_vec();
            if !nal_bytes.is_empty() {
                self.ready.push_back(Nal {
                    data: Bytes::from(nal_bytes),
                });
            }

            // Advance past this NAL; the next start code at `q` starts the next one.
            let remaining = self.carry.split_off(q);
            self.carry = remaining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annexb(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nal);
        }
        out
    }

    fn drain_all(framer: &mut NaluFramer) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(nal) = framer.next_nal() {
            out.push(nal.data.to_vec());
        }
        out
    }

    #[test]
    fn frames_single_datagram_stream() {
        let sps: &[u8] = &[0x67, 0x42, 0x00, 0x1f];
        let pps: &[u8] = &[0x68, 0xce, 0x38, 0x80];
        let idr: &[u8] = &[0x65, 0x88, 0x84];
        let mut stream = annexb(&[sps, pps, idr]);
        // One trailing byte so the IDR's end boundary is observable.
        stream.push(0x00);

        let mut framer = NaluFramer::new();
        framer.feed(&stream);
        // The IDR has no confirmed trailing start code yet (only a stray 0x00 byte), so it
        // stays buffered; SPS and PPS are fully bounded.
        let got = drain_all(&mut framer);
        assert_eq!(got, vec![sps.to_vec(), pps.to_vec()]);
    }

    #[test]
    fn frames_per_byte_datagrams_identically() {
        let sps: &[u8] = &[0x67, 0x42, 0x00, 0x1f];
        let pps: &[u8] = &[0x68, 0xce, 0x38, 0x80];
        let idr: &[u8] = &[0x65, 0x88, 0x84];
        let mut stream = annexb(&[sps, pps, idr]);
        stream.extend_from_slice(&[0, 0, 0, 1]); // boundary for the IDR

        let mut framer = NaluFramer::new();
        for byte in &stream {
            framer.feed(&[*byte]);
        }
        let got = drain_all(&mut framer);
        assert_eq!(got, vec![sps.to_vec(), pps.to_vec(), idr.to_vec()]);
    }

    #[test]
    fn nal_type_extraction() {
        let nal = Nal {
            data: Bytes::from_static(&[0x67, 0x01, 0x02]),
        };
        assert_eq!(nal.nal_type(), 7);
    }

    #[test]
    fn malformed_bytes_never_error_just_delay() {
        let mut framer = NaluFramer::new();
        framer.feed(&[0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(framer.next_nal().is_none());
        framer.feed(&[0, 0, 0, 1, 0x67, 0, 0, 0, 1]);
        assert_eq!(framer.next_nal().unwrap().data.as_ref(), &[0x67][..]);
    }

    #[test]
    fn three_byte_start_code_supported() {
        let mut framer = NaluFramer::new();
        framer.feed(&[0, 0, 1, 0x67, 0x42, 0, 0, 1]);
        let nal = framer.next_nal().unwrap();
        assert_eq!(nal.data.as_ref(), &[0x67, 0x42][..]);
    }
}
