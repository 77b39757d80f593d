//! A5 — the UDP ingest task. Owns the socket, feeds datagrams to the NALU framer, and
//! dispatches framed NALs to the fan-out engine. Runs for the process lifetime; a read
//! error is logged and the loop continues, since one malformed/short read must not take
//! down ingest for every connected peer.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::config::UdpConfig;
use crate::error::Result;
use crate::ingest::stats::IngestStats;
use crate::media::fanout::MediaPlane;
use crate::media::nalu::NaluFramer;
use crate::utils::bind_udp_socket;

/// Conservative upper bound on a single UDP datagram; larger payloads are rare for an
/// H.264 encoder targeting Ethernet MTUs and would otherwise require a growable buffer.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Bind the ingest socket and loop forever, framing and dispatching NALs. Returns only on a
/// fatal bind error; per-datagram read errors are logged and do not end the loop.
pub async fn run(config: &UdpConfig, plane: Arc<MediaPlane>, stats: Arc<IngestStats>) -> Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    let std_socket = bind_udp_socket(addr)?;
    let socket = UdpSocket::from_std(std_socket)?;
    info!("UDP ingest listening on {}", addr);

    let mut framer = NaluFramer::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                stats.record_datagram(n);
                framer.feed(&buf[..n]);
                while let Some(nal) = framer.next_nal() {
                    plane.dispatch_nal(&nal).await;
                }
            }
            Err(e) => {
                error!("UDP ingest read error: {e}");
            }
        }
    }
}
