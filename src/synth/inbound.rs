//! Per-node inbound synthesis.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::engine::config::{
    InboundConfig, InboundUser, Network, Protocol, TlsConfig, TransportConfig, DIRECT_TAG,
};
use crate::node::descriptor::{NodeDescriptor, UserInfo};
use crate::synth::SynthesisError;

/// Build the inbound for one node. `known` holds every outbound tag.
pub fn build_inbound(
    node: &NodeDescriptor,
    known: &HashSet<&str>,
) -> Result<InboundConfig, SynthesisError> {
    let protocol =
        Protocol::from_name(&node.protocol).ok_or_else(|| SynthesisError::UnknownProtocol {
            tag: node.tag.clone(),
            protocol: node.protocol.clone(),
        })?;

    let network = Network::from_name(&node.network).ok_or_else(|| SynthesisError::UnknownNetwork {
        tag: node.tag.clone(),
        network: node.network.clone(),
    })?;

    let listen = listen_addr(node)?;

    let cipher = match protocol {
        Protocol::Shadowsocks => match node.cipher.as_deref() {
            Some(c) if !c.is_empty() => Some(c.to_string()),
            _ => return Err(SynthesisError::MissingCipher { tag: node.tag.clone() }),
        },
        _ => node.cipher.clone(),
    };

    let default_outbound = node
        .default_outbound
        .clone()
        .unwrap_or_else(|| DIRECT_TAG.to_string());
    if !known.contains(default_outbound.as_str()) {
        return Err(SynthesisError::UnknownOutbound {
            node: node.tag.clone(),
            outbound: default_outbound,
        });
    }

    let users = build_users(&node.tag, protocol, &node.users)?;

    Ok(InboundConfig {
        tag: node.tag.clone(),
        protocol,
        listen,
        transport: TransportConfig {
            network,
            settings: node.network_settings.clone(),
        },
        tls: node.tls.as_ref().map(|tls| TlsConfig {
            server_name: tls.server_name.clone(),
            cert_file: tls.cert_file.clone(),
            key_file: tls.key_file.clone(),
            alpn: tls.alpn.clone(),
        }),
        cipher,
        server_key: node.server_key.clone(),
        flow: node.flow.clone(),
        users,
        default_outbound,
        sniffing: true,
    })
}

fn listen_addr(node: &NodeDescriptor) -> Result<SocketAddr, SynthesisError> {
    let ip: IpAddr = node.listen_ip.parse().map_err(|_| SynthesisError::InvalidListen {
        tag: node.tag.clone(),
        reason: format!("{:?} is not an IP address", node.listen_ip),
    })?;
    if node.port == 0 {
        return Err(SynthesisError::InvalidListen {
            tag: node.tag.clone(),
            reason: "port must not be 0".to_string(),
        });
    }
    Ok(SocketAddr::new(ip, node.port))
}

/// Validate and convert a node's users into engine users.
pub fn build_users(
    tag: &str,
    protocol: Protocol,
    users: &[UserInfo],
) -> Result<Vec<InboundUser>, SynthesisError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(users.len());

    for user in users {
        let invalid = |reason: &str| SynthesisError::InvalidUser {
            tag: tag.to_string(),
            user: user.id.clone(),
            reason: reason.to_string(),
        };

        if user.id.is_empty() {
            return Err(invalid("empty id"));
        }
        if !seen.insert(user.id.as_str()) {
            return Err(invalid("duplicate id"));
        }
        if protocol.requires_uuid() && Uuid::parse_str(user.credential()).is_err() {
            return Err(invalid("credential is not a UUID"));
        }

        out.push(InboundUser {
            email: InboundUser::email_for(tag, &user.id),
            id: user.id.clone(),
            credential: user.credential().to_string(),
            level: 0,
            speed_limit: user.speed_limit,
            device_limit: user.device_limit,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::tests::node;

    fn known() -> HashSet<&'static str> {
        ["direct", "block"].into_iter().collect()
    }

    #[test]
    fn test_vmess_users_need_uuid() {
        let mut n = node("A", "vmess", 10086);
        n.users.push(UserInfo::new("u1"));
        let err = build_inbound(&n, &known()).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidUser { .. }));

        n.users[0].uuid = Some("b831381d-6324-4d53-ad4f-8cda48b30811".into());
        let inbound = build_inbound(&n, &known()).unwrap();
        assert_eq!(inbound.users[0].email, "A|u1");
        assert_eq!(inbound.users[0].credential, "b831381d-6324-4d53-ad4f-8cda48b30811");
    }

    #[test]
    fn test_shadowsocks_needs_cipher() {
        let mut n = node("S", "shadowsocks", 8388);
        assert_eq!(
            build_inbound(&n, &known()).unwrap_err(),
            SynthesisError::MissingCipher { tag: "S".into() }
        );
        n.cipher = Some("aes-128-gcm".into());
        assert!(build_inbound(&n, &known()).is_ok());
    }

    #[test]
    fn test_bad_listen_rejected() {
        let mut n = node("A", "trojan", 443);
        n.listen_ip = "not-an-ip".into();
        assert!(matches!(
            build_inbound(&n, &known()).unwrap_err(),
            SynthesisError::InvalidListen { .. }
        ));

        let n = node("A", "trojan", 0);
        assert!(matches!(
            build_inbound(&n, &known()).unwrap_err(),
            SynthesisError::InvalidListen { .. }
        ));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let users = vec![UserInfo::new("u1"), UserInfo::new("u1")];
        assert!(build_users("A", Protocol::Trojan, &users).is_err());
    }

    #[test]
    fn test_unknown_network_rejected() {
        let mut n = node("A", "trojan", 443);
        n.network = "carrier".into();
        assert!(matches!(
            build_inbound(&n, &known()).unwrap_err(),
            SynthesisError::UnknownNetwork { .. }
        ));
    }
}
