//! Outbound set synthesis.

use crate::engine::config::{OutboundConfig, OutboundProtocol};
use crate::node::descriptor::{NodeDescriptor, OutboundDescriptor};
use crate::synth::SynthesisError;

/// Built-ins first (`direct`, `block`), then node outbounds in node order.
pub fn build_outbounds(nodes: &[NodeDescriptor]) -> Result<Vec<OutboundConfig>, SynthesisError> {
    let mut outbounds = vec![OutboundConfig::direct(), OutboundConfig::block()];

    for desc in nodes.iter().flat_map(|n| n.outbounds.iter()) {
        let outbound = build_outbound(desc)?;
        match outbounds.iter().find(|o| o.tag == outbound.tag) {
            Some(existing) if *existing == outbound => continue,
            Some(_) => return Err(SynthesisError::DuplicateOutbound(outbound.tag)),
            None => outbounds.push(outbound),
        }
    }

    Ok(outbounds)
}

fn build_outbound(desc: &OutboundDescriptor) -> Result<OutboundConfig, SynthesisError> {
    if desc.tag.is_empty() {
        return Err(SynthesisError::InvalidOutbound {
            tag: desc.tag.clone(),
            reason: "empty tag".to_string(),
        });
    }

    let protocol = OutboundProtocol::from_name(&desc.protocol).ok_or_else(|| {
        SynthesisError::InvalidOutbound {
            tag: desc.tag.clone(),
            reason: format!("unknown protocol {:?}", desc.protocol),
        }
    })?;

    let address = match (&desc.address, protocol.needs_address()) {
        (Some(addr), _) => Some(validate_host_port(addr).map_err(|reason| {
            SynthesisError::InvalidOutbound {
                tag: desc.tag.clone(),
                reason,
            }
        })?),
        (None, true) => {
            return Err(SynthesisError::InvalidOutbound {
                tag: desc.tag.clone(),
                reason: format!("{:?} requires an address", desc.protocol),
            })
        }
        (None, false) => None,
    };

    Ok(OutboundConfig {
        tag: desc.tag.clone(),
        protocol,
        address,
        settings: desc.settings.clone(),
    })
}

/// Accepts "host:port", "1.2.3.4:port" and "[v6]:port".
pub(crate) fn validate_host_port(addr: &str) -> Result<String, String> {
    if let Ok(socket) = addr.parse::<std::net::SocketAddr>() {
        if socket.port() == 0 {
            return Err(format!("{:?} has port 0", addr));
        }
        return Ok(addr.to_string());
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("{:?} is missing a port", addr))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("{:?} has an invalid port", addr))?;
    if port == 0 {
        return Err(format!("{:?} has port 0", addr));
    }
    let valid_host = !host.is_empty()
        && !host.contains(':')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
    if !valid_host {
        return Err(format!("{:?} has an invalid host", addr));
    }
    Ok(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(tag: &str, protocol: &str, address: Option<&str>) -> OutboundDescriptor {
        OutboundDescriptor {
            tag: tag.into(),
            protocol: protocol.into(),
            address: address.map(Into::into),
            settings: None,
        }
    }

    #[test]
    fn test_host_port_validation() {
        assert!(validate_host_port("127.0.0.1:1080").is_ok());
        assert!(validate_host_port("[::1]:1080").is_ok());
        assert!(validate_host_port("proxy.example.com:443").is_ok());
        assert!(validate_host_port("proxy.example.com").is_err());
        assert!(validate_host_port("host:0").is_err());
        assert!(validate_host_port("1.2.3.4:0").is_err());
        assert!(validate_host_port("[::1]:0").is_err());
        assert!(validate_host_port("bad host:80").is_err());
        assert!(validate_host_port(":80").is_err());
    }

    #[test]
    fn test_relay_requires_address() {
        let err = build_outbound(&desc("up", "socks", None)).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidOutbound { .. }));
        assert!(build_outbound(&desc("free", "freedom", None)).is_ok());
    }

    #[test]
    fn test_unknown_outbound_protocol() {
        let err = build_outbound(&desc("x", "carrier-pigeon", None)).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidOutbound { .. }));
    }
}
