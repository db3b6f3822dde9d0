//! Account naming rules and persisted account records.

use serde::Serialize;

use crate::error::ManagerError;

/// Name given to account 0 at creation.
pub const DEFAULT_ACCOUNT_NAME: &str = "default";

/// Reserved name for the account holding imported keys.
pub const IMPORTED_ACCOUNT_NAME: &str = "imported";

/// Account index reserved for imported keys.
pub const IMPORTED_ACCOUNT_NUM: u32 = 0x7fff_ffff;

/// Highest index a derived account may take.
pub const MAX_ACCOUNT_NUM: u32 = IMPORTED_ACCOUNT_NUM - 1;

/// Reject empty and reserved account names.
pub fn validate_account_name(name: &str) -> Result<(), ManagerError> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if name == IMPORTED_ACCOUNT_NAME {
        "name is reserved"
    } else {
        return Ok(());
    };
    Err(ManagerError::InvalidAccountName {
        name: name.to_string(),
        reason,
    })
}

/// Persisted account row.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AccountRow {
    /// Unique account name.
    pub name: String,
    /// Account xpub sealed under the public crypto key.
    pub pub_sealed: Vec<u8>,
    /// Account xprv sealed under the private crypto key. `None` once the
    /// manager is watching-only.
    pub priv_sealed: Option<Vec<u8>>,
    /// Number of external addresses handed out.
    pub next_external: u32,
    /// Number of internal addresses handed out.
    pub next_internal: u32,
}

/// Public summary of an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub index: u32,
    pub name: String,
    /// Number of external addresses handed out.
    pub external_count: u32,
    /// Number of internal addresses handed out.
    pub internal_count: u32,
    /// Encoded account extended public key.
    pub xpub: String,
}
