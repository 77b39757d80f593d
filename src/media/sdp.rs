//! Rewrites a locally-generated SDP answer to advertise cached SPS/PPS in-band via
//! `sprop-parameter-sets`, so a peer's first IDR is decodable without waiting for a
//! keyframe request, even if the answer was produced before any parameter sets arrived on
//! ingest.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

/// Rewrite the `a=rtpmap:<pt> <name>/<clock>` line for `payload_type`/`clock_rate` into an
/// rtpmap + fmtp pair carrying base64 SPS/PPS. Returns the SDP unchanged if either cached
/// value is absent, or if no matching rtpmap line is found. Only the first match is rewritten.
pub fn inject_parameter_sets(
    sdp: &str,
    payload_type: u8,
    clock_rate: u32,
    sps: Option<&Bytes>,
    pps: Option<&Bytes>,
) -> String {
    let (Some(sps), Some(pps)) = (sps, pps) else {
        return sdp.to_string();
    };

    let needle = format!("a=rtpmap:{payload_type} ");
    let suffix = format!("/{clock_rate}");

    let Some(line_start) = sdp.find(&needle) else {
        return sdp.to_string();
    };
    let line_end = sdp[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(sdp.len());
    let line = &sdp[line_start..line_end];
    // Tolerate a trailing \r before the \n.
    let trimmed = line.trim_end_matches('\r');
    if !trimmed.ends_with(&suffix) {
        return sdp.to_string();
    }

    let replacement = format!(
        "a=rtpmap:{payload_type} H264/{clock_rate}\r\na=fmtp:{payload_type} level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f;sprop-parameter-sets={},{}",
        BASE64.encode(sps),
        BASE64.encode(pps),
    );

    let mut out = String::with_capacity(sdp.len() + replacement.len());
    out.push_str(&sdp[..line_start]);
    out.push_str(&replacement);
    out.push_str(&sdp[line_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sdp() -> String {
        "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=rtpmap:96 H264/90000\r\na=ssrc:12345 cname:x\r\n".to_string()
    }

    #[test]
    fn injects_fmtp_when_both_cached() {
        let sdp = sample_sdp();
        let sps = Bytes::from_static(&[1, 2, 3]);
        let pps = Bytes::from_static(&[4, 5]);
        let out = inject_parameter_sets(&sdp, 96, 90000, Some(&sps), Some(&pps));

        assert!(out.contains("a=rtpmap:96 H264/90000"));
        let expected_fmtp = format!(
            "a=fmtp:96 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f;sprop-parameter-sets={},{}",
            BASE64.encode(&sps),
            BASE64.encode(&pps),
        );
        assert!(out.contains(&expected_fmtp));
        // Rest of the SDP is preserved.
        assert!(out.contains("a=ssrc:12345 cname:x"));
    }

    #[test]
    fn unchanged_when_sps_missing() {
        let sdp = sample_sdp();
        let pps = Bytes::from_static(&[4, 5]);
        let out = inject_parameter_sets(&sdp, 96, 90000, None, Some(&pps));
        assert_eq!(out, sdp);
    }

    #[test]
    fn unchanged_when_pps_missing() {
        let sdp = sample_sdp();
        let sps = Bytes::from_static(&[1, 2, 3]);
        let out = inject_parameter_sets(&sdp, 96, 90000, Some(&sps), None);
        assert_eq!(out, sdp);
    }

    #[test]
    fn unchanged_when_no_matching_rtpmap() {
        let sdp = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 97\r\na=rtpmap:97 VP8/90000\r\n".to_string();
        let sps = Bytes::from_static(&[1]);
        let pps = Bytes::from_static(&[2]);
        let out = inject_parameter_sets(&sdp, 96, 90000, Some(&sps), Some(&pps));
        assert_eq!(out, sdp);
    }

    #[test]
    fn only_first_match_is_rewritten() {
        let sdp = "a=rtpmap:96 H264/90000\r\nm=video\r\na=rtpmap:96 H264/90000\r\n".to_string();
        let sps = Bytes::from_static(&[9]);
        let pps = Bytes::from_static(&[8]);
        let out = inject_parameter_sets(&sdp, 96, 90000, Some(&sps), Some(&pps));
        assert_eq!(out.matches("sprop-parameter-sets").count(), 1);
        // The second, untouched rtpmap line survives verbatim.
        assert!(out.contains("m=video\r\na=rtpmap:96 H264/90000"));
    }
}
