/// Gateway port used when a profile does not set `gateway.port`.
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;

const CONTROL_PORT_OFFSET: u16 = 2;
const RELAY_PORT_OFFSET: u16 = 3;

const MASK_VISIBLE_CHARS: usize = 8;
const MASK_PLACEHOLDER: &str = "***";

/// Ports the gateway opens next to its own listener. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedPorts {
    pub gateway: u16,
    pub control: u16,
    pub relay: u16,
}

impl DerivedPorts {
    /// Returns `None` when an offset would run past `u16::MAX`.
    pub fn from_gateway(gateway: u16) -> Option<Self> {
        Some(Self {
            gateway,
            control: gateway.checked_add(CONTROL_PORT_OFFSET)?,
            relay: gateway.checked_add(RELAY_PORT_OFFSET)?,
        })
    }
}

/// Display form of a secret: the first eight characters and an ellipsis,
/// or a fixed placeholder when the secret is too short to reveal any of it.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > MASK_VISIBLE_CHARS {
        let visible: String = secret.chars().take(MASK_VISIBLE_CHARS).collect();
        format!("{visible}...")
    } else {
        MASK_PLACEHOLDER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_derivation() {
        let ports = DerivedPorts::from_gateway(DEFAULT_GATEWAY_PORT).unwrap();
        assert_eq!(ports.control, 18791);
        assert_eq!(ports.relay, 18792);
    }

    #[test]
    fn custom_gateway_port_derivation() {
        let ports = DerivedPorts::from_gateway(9000).unwrap();
        assert_eq!((ports.gateway, ports.control, ports.relay), (9000, 9002, 9003));
    }

    #[test]
    fn port_overflow_is_rejected() {
        assert!(DerivedPorts::from_gateway(u16::MAX - 2).is_none());
        assert!(DerivedPorts::from_gateway(u16::MAX - 3).is_some());
    }

    #[test]
    fn long_secret_keeps_prefix() {
        assert_eq!(mask_secret("1234567890"), "12345678...");
        assert_eq!(mask_secret("123456:ABC-DEF1234ghIkl"), "123456:A...");
    }

    #[test]
    fn short_secret_is_fully_redacted() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("12345678"), "***");
        assert_eq!(mask_secret(""), "***");
    }
}
