//! Export-policy override.
//!
//! The software KSP keeps a key's export policy inside the key object that
//! its `NCRYPT_KEY_HANDLE` points to. No public entry point lets a caller
//! turn on plaintext export for a key that was persisted without it, so the
//! override pokes the bit directly. The offset is not a documented or stable
//! ABI: it belongs to one provider build and is kept here, in
//! [`SOFTWARE_KSP_LAYOUT`], and nowhere else. Anything that replaces this with
//! a supported API only needs a new [`PolicyOverride`] implementation.

use crate::provider::RawHandle;
use std::ptr;

/// `NCRYPT_ALLOW_PLAINTEXT_EXPORT_FLAG`
pub const ALLOW_PLAINTEXT_EXPORT_FLAG: u8 = 0x02;

/// Location of the export-policy bits inside a provider key object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyLayout {
    pub version: &'static str,
    pub offset: usize,
    pub mask: u8,
}

/// Key object layout of the Microsoft Software Key Storage Provider
/// (`ncryptprov.dll`) this tool targets.
pub const SOFTWARE_KSP_LAYOUT: PolicyLayout = PolicyLayout {
    version: "ncryptprov-keyobj-v1",
    offset: 0x24,
    mask: ALLOW_PLAINTEXT_EXPORT_FLAG,
};

/// Reads and forces the "plaintext export allowed" bit of an open key.
pub trait PolicyOverride {
    fn export_allowed(&self, key: RawHandle) -> bool;

    fn allow_export(&self, key: RawHandle);
}

/// Flips the policy bit in the key object's memory.
#[derive(Debug)]
pub struct LayoutPolicyOverride {
    layout: PolicyLayout,
}

impl LayoutPolicyOverride {
    /// # Safety
    ///
    /// Every key handle later passed to this override must point to a live
    /// key object of at least `layout.offset + 1` bytes, laid out as `layout`
    /// describes. Handles from any other provider build are undefined
    /// behaviour.
    pub unsafe fn new(layout: PolicyLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> PolicyLayout {
        self.layout
    }

    fn policy_byte(&self, key: RawHandle) -> *mut u8 {
        (key as *mut u8).wrapping_add(self.layout.offset)
    }
}

impl PolicyOverride for LayoutPolicyOverride {
    fn export_allowed(&self, key: RawHandle) -> bool {
        // SAFETY: upheld by the contract of `LayoutPolicyOverride::new`.
        let value = unsafe { ptr::read_volatile(self.policy_byte(key)) };
        value & self.layout.mask != 0
    }

    fn allow_export(&self, key: RawHandle) {
        let byte = self.policy_byte(key);
        // SAFETY: upheld by the contract of `LayoutPolicyOverride::new`.
        unsafe {
            let value = ptr::read_volatile(byte);
            ptr::write_volatile(byte, value | self.layout.mask);
        }
        tracing::debug!(
            layout = self.layout.version,
            offset = self.layout.offset,
            "export policy bit set"
        );
    }
}
