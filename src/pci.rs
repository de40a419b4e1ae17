//! Physical bus address (BDF) handling.
//!
//! A PCI address uniquely identifies one accelerator slot at a given
//! instant and is the correlation key between the HIP runtime's device
//! ordinals and the SMI libraries' device handles.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Domain/bus/device/function tuple of a PCI slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }

    /// Packed integer form used by the ROCm SMI PCI id query.
    pub const fn packed(self) -> u32 {
        (self.domain as u32) << 13
            | (self.bus as u32) << 8
            | (self.device as u32) << 3
            | self.function as u32
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:01x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = Error;

    /// Parses `dddd:bb:dd.f`. The function component may be omitted
    /// (`dddd:bb:dd`), in which case it is taken as zero.
    fn from_str(s: &str) -> Result<Self, Error> {
        let malformed = || Error::AddressParse { raw: s.to_string() };

        let mut parts = s.split(':');
        let domain = parts.next().ok_or_else(malformed)?;
        let bus = parts.next().ok_or_else(malformed)?;
        let rest = parts.next().ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        let (device, function) = match rest.split_once('.') {
            Some((device, function)) => (device, function),
            None => (rest, "0"),
        };

        Ok(Self {
            domain: u16::from_str_radix(domain, 16).map_err(|_| malformed())?,
            bus: u8::from_str_radix(bus, 16).map_err(|_| malformed())?,
            device: u8::from_str_radix(device, 16).map_err(|_| malformed())?,
            function: u8::from_str_radix(function, 16).map_err(|_| malformed())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_form() {
        let addr: PciAddress = "0000:03:00.0".parse().unwrap();
        assert_eq!(addr, PciAddress::new(0, 3, 0, 0));
    }

    #[test]
    fn parse_without_function() {
        let addr: PciAddress = "0001:c4:1f".parse().unwrap();
        assert_eq!(addr, PciAddress::new(1, 0xc4, 0x1f, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        for raw in ["", "03:00.0", "zzzz:03:00.0", "0000:03:00.0.1", "0000:03:00:0"] {
            let err = raw.parse::<PciAddress>().unwrap_err();
            assert!(matches!(err, Error::AddressParse { .. }), "accepted {raw:?}");
        }
    }

    #[test]
    fn display_round_trips() {
        let addr = PciAddress::new(0x0002, 0xa1, 0x1e, 0x3);
        let shown = addr.to_string();
        assert_eq!(shown, "0002:a1:1e.3");
        assert_eq!(shown.parse::<PciAddress>().unwrap(), addr);
    }

    #[test]
    fn packed_form() {
        let addr = PciAddress::new(0, 0x03, 0x00, 0x0);
        assert_eq!(addr.packed(), 0x03 << 8);
        let addr = PciAddress::new(1, 0, 2, 1);
        assert_eq!(addr.packed(), (1 << 13) | (2 << 3) | 1);
    }
}
