//! The media plane: C1-C6 of the spec. Everything here is agnostic to HTTP signaling and
//! the `webrtc` crate's connection-state machinery — those live in `crate::webrtc` and
//! `crate::web`, and talk to this module only through [`fanout::MediaPlane`] and
//! [`sender::RtpSender`].

pub mod fanout;
pub mod nalu;
pub mod packetizer;
pub mod param_cache;
pub mod sdp;
pub mod sender;
pub mod session;

pub use fanout::MediaPlane;
pub use nalu::{Nal, NaluFramer};
pub use packetizer::RtpPacketizer;
pub use param_cache::ParamCache;
pub use sender::{RtpSender, TrackRtpSender};
pub use session::{PeerSession, SessionId, SessionStats};
