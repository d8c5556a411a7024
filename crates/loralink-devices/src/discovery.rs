/*!
 * Serial port discovery.
 *
 * Transceivers enumerate as USB CDC-ACM devices, so candidates are the
 * ports whose name contains a configurable substring.
 */
use serde::Serialize;

use loralink_core::config::SerialConfig;

/// A serial port that might have a transceiver behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name, e.g. `/dev/ttyACM0`
    pub name: String,
    /// USB product or manufacturer string, when known
    pub description: Option<String>,
}

impl PortInfo {
    /// Create port info without a description
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Keep the ports whose name contains `filter`; an empty filter keeps all
pub fn filter_ports<I>(ports: I, filter: &str) -> Vec<PortInfo>
where
    I: IntoIterator<Item = PortInfo>,
{
    let mut matched: Vec<PortInfo> = ports
        .into_iter()
        .filter(|p| filter.is_empty() || p.name.contains(filter))
        .collect();
    matched.sort_by(|a, b| a.name.cmp(&b.name));
    matched
}

/// Choose the port to connect to by default.
///
/// The configured default wins when it is among the candidates, otherwise the
/// first candidate is used.
pub fn preferred_port<'a>(candidates: &'a [PortInfo], default_port: &str) -> Option<&'a PortInfo> {
    candidates
        .iter()
        .find(|p| p.name == default_port)
        .or_else(|| candidates.first())
}

/// List the candidate ports on this machine
#[cfg(feature = "serial")]
pub fn available_ports(config: &SerialConfig) -> crate::link::Result<Vec<PortInfo>> {
    use serialport::SerialPortType;

    let ports = serialport::available_ports().map_err(std::io::Error::from)?;
    let infos = ports.into_iter().map(|p| {
        let description = match p.port_type {
            SerialPortType::UsbPort(usb) => usb.product.or(usb.manufacturer),
            SerialPortType::PciPort => Some("PCI".to_string()),
            SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
            SerialPortType::Unknown => None,
        };
        PortInfo {
            name: p.port_name,
            description,
        }
    });
    let candidates = filter_ports(infos, &config.port_filter);
    tracing::debug!(
        "Found {} candidate ports matching {:?}",
        candidates.len(),
        config.port_filter
    );
    Ok(candidates)
}

/// Without serial support there is nothing to enumerate
#[cfg(not(feature = "serial"))]
pub fn available_ports(_config: &SerialConfig) -> crate::link::Result<Vec<PortInfo>> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[&str]) -> Vec<PortInfo> {
        names.iter().map(|n| PortInfo::new(*n)).collect()
    }

    #[test]
    fn test_filter_keeps_acm_ports() {
        let found = filter_ports(
            ports(&["/dev/ttyS0", "/dev/ttyACM1", "/dev/ttyUSB0", "/dev/ttyACM0"]),
            "ACM",
        );
        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["/dev/ttyACM0", "/dev/ttyACM1"]);

        assert_eq!(filter_ports(ports(&["COM3", "COM4"]), "").len(), 2);
    }

    #[test]
    fn test_preferred_port() {
        let candidates = ports(&["/dev/ttyACM0", "/dev/ttyACM1"]);
        assert_eq!(
            preferred_port(&candidates, "/dev/ttyACM1").map(|p| p.name.as_str()),
            Some("/dev/ttyACM1")
        );
        assert_eq!(
            preferred_port(&candidates, "/dev/ttyACM7").map(|p| p.name.as_str()),
            Some("/dev/ttyACM0")
        );
        assert!(preferred_port(&[], "/dev/ttyACM0").is_none());
    }
}
