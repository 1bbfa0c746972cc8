use std::fmt;

/// Raw `SECURITY_STATUS` returned by the provider function table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SecurityStatus(pub i32);

impl SecurityStatus {
    pub const SUCCESS: SecurityStatus = SecurityStatus(0);
    /// `NTE_NO_MORE_ITEMS`: enumeration exhausted.
    pub const NO_MORE_ITEMS: SecurityStatus = SecurityStatus(0x8009_002A_u32 as i32);
    /// `NTE_BAD_KEYSET`
    pub const BAD_KEYSET: SecurityStatus = SecurityStatus(0x8009_0016_u32 as i32);
    /// `NTE_NOT_SUPPORTED`
    pub const NOT_SUPPORTED: SecurityStatus = SecurityStatus(0x8009_0029_u32 as i32);
    /// `NTE_BUFFER_TOO_SMALL`
    pub const BUFFER_TOO_SMALL: SecurityStatus = SecurityStatus(0x8009_0028_u32 as i32);
    /// `NTE_INVALID_PARAMETER`
    pub const INVALID_PARAMETER: SecurityStatus = SecurityStatus(0x8009_0027_u32 as i32);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Converts a raw status into `Ok(())` on success.
    pub fn check(self) -> Result<(), SecurityStatus> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}
