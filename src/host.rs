use if_addrs::{get_if_addrs, IfAddr};
use sysinfo::{System, SystemExt};
use tracing::debug;

/// IPv4 address of the named interface, used as the stable host identity key.
/// Returns `None` when the interface is missing or has no IPv4 address; the
/// caller decides whether persistence proceeds.
pub fn resolve_host_key(interface: &str) -> Option<String> {
    let addrs = match get_if_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            debug!(error = %err, "failed to enumerate network interfaces");
            return None;
        }
    };

    for addr in addrs {
        if addr.name != interface {
            continue;
        }
        if let IfAddr::V4(v4) = addr.addr {
            return Some(v4.ip.to_string());
        }
    }

    None
}

/// Uppercased hostname, stored as the host identity display label.
pub fn display_name() -> String {
    System::new()
        .host_name()
        .unwrap_or_else(|| "UNKNOWN".to_string())
        .to_uppercase()
}
