//! Device identity resolution across management APIs.
//!
//! The HIP runtime and the SMI libraries number devices independently; the
//! only identifier they share is the physical bus address. Resolution
//! enumerates the management API and returns the first device sitting at
//! the target address.

use crate::error::{Error, Result};
use crate::pci::PciAddress;
use crate::telemetry::DeviceEnumeration;

/// Finds the management-API index of the device at `target`.
///
/// `ordinal` is the compute-runtime ordinal being resolved; it is carried
/// into the error when no enumerated device matches. Bus addresses are
/// unique per slot, so the first match is the match; a miss is fatal to
/// the caller (there is no retry and no partial mode).
pub fn resolve<E: DeviceEnumeration>(
    devices: &E,
    ordinal: i32,
    target: PciAddress,
) -> Result<usize> {
    let count = devices.device_count()?;
    for index in 0..count {
        if devices.address_matches(index, target)? {
            return Ok(index);
        }
    }
    Err(Error::IdentityResolution {
        ordinal,
        address: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic enumeration backed by a fixed address list.
    struct FakeEnumeration {
        addresses: Vec<PciAddress>,
    }

    impl DeviceEnumeration for FakeEnumeration {
        fn device_count(&self) -> Result<usize> {
            Ok(self.addresses.len())
        }

        fn address_matches(&self, index: usize, target: PciAddress) -> Result<bool> {
            Ok(self.addresses[index] == target)
        }
    }

    fn enumeration_of(n: u8) -> FakeEnumeration {
        FakeEnumeration {
            addresses: (0..n).map(|bus| PciAddress::new(0, bus, 0, 0)).collect(),
        }
    }

    #[test]
    fn resolves_each_enumerated_address_to_its_index() {
        let devices = enumeration_of(4);
        for (k, &addr) in devices.addresses.iter().enumerate() {
            assert_eq!(resolve(&devices, 0, addr).unwrap(), k);
        }
    }

    #[test]
    fn absent_address_is_an_identity_error() {
        let devices = enumeration_of(4);
        let absent = PciAddress::new(0, 0x99, 0, 0);
        let err = resolve(&devices, 2, absent).unwrap_err();
        match err {
            Error::IdentityResolution { ordinal, address } => {
                assert_eq!(ordinal, 2);
                assert_eq!(address, absent);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_enumeration_never_matches() {
        let devices = enumeration_of(0);
        let err = resolve(&devices, 0, PciAddress::new(0, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::IdentityResolution { .. }));
    }

    #[test]
    fn duplicate_addresses_resolve_to_first_match() {
        let addr = PciAddress::new(0, 3, 0, 0);
        let devices = FakeEnumeration {
            addresses: vec![PciAddress::new(0, 1, 0, 0), addr, addr],
        };
        assert_eq!(resolve(&devices, 0, addr).unwrap(), 1);
    }

    #[test]
    fn probe_failure_propagates() {
        struct FailingEnumeration;

        impl DeviceEnumeration for FailingEnumeration {
            fn device_count(&self) -> Result<usize> {
                Ok(1)
            }

            fn address_matches(&self, _index: usize, _target: PciAddress) -> Result<bool> {
                Err(Error::Telemetry {
                    backend: "test",
                    code: 7,
                    msg: "probe failed".to_string(),
                })
            }
        }

        let err = resolve(&FailingEnumeration, 0, PciAddress::new(0, 0, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::Telemetry { code: 7, .. }));
    }
}
