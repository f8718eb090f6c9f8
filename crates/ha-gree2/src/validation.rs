//! Onboarding input checks

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use ha_config_entries::FlowInput;

const HOST_PATTERN: &str = r"^(2(5[0-5]|[0-4]\d)|1\d{2}|[1-9]?\d)(\.(2(5[0-5]|[0-4]\d)|1\d{2}|[1-9]?\d)){3}$";
const MAC_PATTERN: &str = r"^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$";

static HOST_RE: OnceLock<Regex> = OnceLock::new();
static MAC_RE: OnceLock<Regex> = OnceLock::new();

/// Form errors, reported under `base`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("host is not a dotted IPv4 address")]
    IpFormat,

    #[error("port is not in 0..=65535")]
    Port,

    #[error("mac_addr is not a colon separated hardware address")]
    MacAddrFormat,
}

impl ValidationError {
    /// Form error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::IpFormat => "ip_format_error",
            ValidationError::Port => "port_error",
            ValidationError::MacAddrFormat => "mac_addr_format_error",
        }
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("input pattern is a valid regex"))
}

/// Check host, port and hardware address, in that order
pub fn check_input(input: &FlowInput) -> Result<(), ValidationError> {
    let host = input.get("host").and_then(Value::as_str).unwrap_or("");
    if !regex(&HOST_RE, HOST_PATTERN).is_match(host) {
        return Err(ValidationError::IpFormat);
    }

    let port = input.get("port").and_then(Value::as_i64).unwrap_or(-1);
    if !(0..=65535).contains(&port) {
        return Err(ValidationError::Port);
    }

    let mac_addr = input.get("mac_addr").and_then(Value::as_str).unwrap_or("");
    if !regex(&MAC_RE, MAC_PATTERN).is_match(mac_addr) {
        return Err(ValidationError::MacAddrFormat);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(host: &str, port: Value, mac_addr: &str) -> FlowInput {
        FlowInput::from([
            ("host".to_string(), json!(host)),
            ("port".to_string(), port),
            ("mac_addr".to_string(), json!(mac_addr)),
        ])
    }

    #[test]
    fn test_patterns_compile() {
        assert!(Regex::new(HOST_PATTERN).is_ok());
        assert!(Regex::new(MAC_PATTERN).is_ok());
        assert!(regex(&HOST_RE, HOST_PATTERN).is_match("10.0.0.1"));
        assert!(regex(&MAC_RE, MAC_PATTERN).is_match("00:11:22:33:44:55"));
    }

    #[test]
    fn test_valid_input() {
        assert_eq!(
            check_input(&input("192.168.1.1", json!(7000), "AA:BB:CC:DD:EE:FF")),
            Ok(())
        );
        assert_eq!(
            check_input(&input("0.0.0.0", json!(0), "aa:bb:cc:dd:ee:ff")),
            Ok(())
        );
        assert_eq!(
            check_input(&input("255.255.255.255", json!(65535), "00:11:22:33:44:55")),
            Ok(())
        );
    }

    #[test]
    fn test_host_errors() {
        for host in ["256.1.1.1", "192.168.1", "192.168.01.1", "host.local", ""] {
            let err = check_input(&input(host, json!(7000), "AA:BB:CC:DD:EE:FF")).unwrap_err();
            assert_eq!(err.code(), "ip_format_error", "host {host:?}");
        }
    }

    #[test]
    fn test_port_errors() {
        for port in [json!(-1), json!(65536), json!("7000"), Value::Null] {
            let err = check_input(&input("192.168.1.1", port, "AA:BB:CC:DD:EE:FF")).unwrap_err();
            assert_eq!(err, ValidationError::Port);
        }

        let mut missing = input("192.168.1.1", json!(7000), "AA:BB:CC:DD:EE:FF");
        missing.remove("port");
        assert_eq!(check_input(&missing), Err(ValidationError::Port));
    }

    #[test]
    fn test_mac_errors() {
        for mac in ["AABBCCDDEEFF", "AA:BB:CC:DD:EE", "GG:BB:CC:DD:EE:FF", "AA-BB-CC-DD-EE-FF"] {
            let err = check_input(&input("192.168.1.1", json!(7000), mac)).unwrap_err();
            assert_eq!(err.code(), "mac_addr_format_error");
        }
    }

    #[test]
    fn test_host_checked_first() {
        let err = check_input(&input("999.1.1.1", json!(-5), "nope")).unwrap_err();
        assert_eq!(err, ValidationError::IpFormat);
    }
}
