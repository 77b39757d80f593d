//! Translates `crate::config::IceConfig` into the `webrtc` crate's ICE server list.

use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::config::IceConfig;

pub fn ice_servers(config: &IceConfig) -> Vec<RTCIceServer> {
    let mut servers = Vec::new();

    if let Some(stun) = &config.stun {
        servers.push(RTCIceServer {
            urls: vec![stun.clone()],
            ..Default::default()
        });
    }

    if let Some(turn) = &config.turn {
        servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnServer;

    #[test]
    fn stun_only() {
        let config = IceConfig {
            stun: Some("stun:example.org:3478".to_string()),
            turn: None,
        };
        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["stun:example.org:3478".to_string()]);
    }

    #[test]
    fn stun_and_turn() {
        let config = IceConfig {
            stun: Some("stun:example.org:3478".to_string()),
            turn: Some(TurnServer {
                urls: vec!["turn:example.org:3478".to_string()],
                username: "u".to_string(),
                credential: "p".to_string(),
            }),
        };
        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].username, "u");
    }

    #[test]
    fn empty_when_unset() {
        let config = IceConfig { stun: None, turn: None };
        assert!(ice_servers(&config).is_empty());
    }
}
