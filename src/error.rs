//! Crate-wide error type.
//!
//! Every vendor-API failure is mapped onto one discriminated enum carrying
//! the originating status code and the vendor's rendering of it, so callers
//! can branch on kind without inspecting backend-specific code spaces.

use thiserror::Error;

use crate::pci::PciAddress;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A HIP runtime call failed.
    #[error("HIP error {code}: {msg}")]
    Runtime { code: i32, msg: String },

    /// An SMI management-library call failed. The code space is specific
    /// to the backend named in `backend`.
    #[error("{backend} error {code}: {msg}")]
    Telemetry {
        backend: &'static str,
        code: i32,
        msg: String,
    },

    /// No SMI device reports the bus address of the target compute device.
    #[error("no SMI device matches PCI address {address} of compute device {ordinal}")]
    IdentityResolution { ordinal: i32, address: PciAddress },

    /// A device-reported PCI bus-address string did not parse.
    #[error("malformed PCI bus address '{raw}'")]
    AddressParse { raw: String },

    /// A vendor shared library could not be loaded or is missing a symbol.
    #[error("failed to load {library}: {reason}")]
    Load {
        library: &'static str,
        reason: String,
    },
}
