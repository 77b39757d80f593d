//! The ICE/DTLS/SRTP stack as a real dependency treated like a black box by the media
//! plane: this module is the only place that touches `RTCPeerConnection` internals. It
//! exposes one operation, [`peer::negotiate`], and hands the media plane nothing but an
//! [`crate::media::sender::RtpSender`].

pub mod config;
pub mod peer;

pub use peer::{negotiate, NegotiatedSession};
