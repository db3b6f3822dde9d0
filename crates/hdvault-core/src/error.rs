//! Error types for the hdvault foundation crate.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58: {0}")] InvalidBase58(String),
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid checksum")] InvalidChecksum,
    #[error("address version {found:#04x} does not match network version {expected:#04x}")] WrongNetwork { expected: u8, found: u8 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")] Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wrong_network() {
        let e = AddressError::WrongNetwork { expected: 0x00, found: 0x6f };
        assert_eq!(
            e.to_string(),
            "address version 0x6f does not match network version 0x00"
        );
    }

    #[test]
    fn display_backend() {
        let e = StoreError::Backend("disk full".into());
        assert_eq!(e.to_string(), "storage backend: disk full");
    }
}
