//! In-memory key storage provider that records every call, for tests.

use crate::policy::PolicyOverride;
use crate::provider::{KeyEntry, KeyStorageProvider, RawHandle, MACHINE_KEY_FLAG};
use crate::status::SecurityStatus;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockCounts {
    pub provider_opened: usize,
    pub provider_freed: usize,
    pub cursors_allocated: usize,
    pub cursors_freed: usize,
    pub keys_opened: usize,
    pub keys_freed: usize,
    pub invalid_frees: usize,
    pub policy_writes: usize,
}

struct MockKey {
    name: String,
    blob: Vec<u8>,
    exportable: bool,
    machine: bool,
}

struct Cursor {
    next: usize,
    yielded: usize,
}

#[derive(Default)]
struct MockState {
    keys: Vec<MockKey>,
    providers: HashSet<RawHandle>,
    open_keys: HashMap<RawHandle, usize>,
    cursors: HashMap<RawHandle, Cursor>,
    next_handle: RawHandle,
    counts: MockCounts,
    fail_open_provider: Option<SecurityStatus>,
    fail_enum_at: Option<(usize, SecurityStatus)>,
    fail_export_call: Option<(usize, SecurityStatus)>,
    short_fill: usize,
    reported_size: Option<usize>,
    export_attempts: usize,
    export_calls: Vec<(Option<usize>, usize)>,
    last_blob_type: Option<String>,
}

impl MockState {
    fn allocate(&mut self) -> RawHandle {
        self.next_handle += 0x10;
        0x1000 + self.next_handle
    }
}

#[derive(Clone, Default)]
pub struct MockProvider {
    state: Rc<RefCell<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, name: &str, blob: Vec<u8>, exportable: bool) {
        self.state.borrow_mut().keys.push(MockKey {
            name: name.to_string(),
            blob,
            exportable,
            machine: true,
        });
    }

    pub fn add_user_key(&self, name: &str) {
        self.state.borrow_mut().keys.push(MockKey {
            name: name.to_string(),
            blob: Vec::new(),
            exportable: true,
            machine: false,
        });
    }

    pub fn fail_open_provider(&self, status: SecurityStatus) {
        self.state.borrow_mut().fail_open_provider = Some(status);
    }

    /// Fails the enumeration step that would yield the `index`-th key.
    pub fn fail_enum_at(&self, index: usize, status: SecurityStatus) {
        self.state.borrow_mut().fail_enum_at = Some((index, status));
    }

    /// Fails the `index`-th `export_key` call (0 is the first size query).
    pub fn fail_export_call(&self, index: usize, status: SecurityStatus) {
        self.state.borrow_mut().fail_export_call = Some((index, status));
    }

    /// Makes every buffer fill report `bytes` fewer bytes than queried.
    pub fn short_fill(&self, bytes: usize) {
        self.state.borrow_mut().short_fill = bytes;
    }

    /// Makes every size query report `len` instead of the blob length.
    pub fn report_size(&self, len: usize) {
        self.state.borrow_mut().reported_size = Some(len);
    }

    pub fn counts(&self) -> MockCounts {
        self.state.borrow().counts
    }

    /// `(buffer length, returned length)` of every successful export call.
    pub fn export_calls(&self) -> Vec<(Option<usize>, usize)> {
        self.state.borrow().export_calls.clone()
    }

    pub fn last_blob_type(&self) -> Option<String> {
        self.state.borrow().last_blob_type.clone()
    }

    pub fn is_exportable(&self, name: &str) -> Option<bool> {
        let state = self.state.borrow();
        state
            .keys
            .iter()
            .find(|k| k.name == name)
            .map(|k| k.exportable)
    }
}

impl KeyStorageProvider for MockProvider {
    fn open_provider(&self, _name: &str, _flags: u32) -> Result<RawHandle, SecurityStatus> {
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.fail_open_provider {
            return Err(status);
        }
        let handle = state.allocate();
        state.providers.insert(handle);
        state.counts.provider_opened += 1;
        Ok(handle)
    }

    fn enum_keys(
        &self,
        provider: RawHandle,
        cursor: &mut Option<RawHandle>,
        flags: u32,
    ) -> Result<KeyEntry, SecurityStatus> {
        let mut state = self.state.borrow_mut();
        if !state.providers.contains(&provider) {
            return Err(SecurityStatus::INVALID_PARAMETER);
        }
        let id = match *cursor {
            Some(id) => id,
            None => {
                let id = state.allocate();
                state.cursors.insert(
                    id,
                    Cursor {
                        next: 0,
                        yielded: 0,
                    },
                );
                state.counts.cursors_allocated += 1;
                *cursor = Some(id);
                id
            }
        };
        let (next, yielded) = match state.cursors.get(&id) {
            Some(c) => (c.next, c.yielded),
            None => return Err(SecurityStatus::INVALID_PARAMETER),
        };
        if let Some((index, status)) = state.fail_enum_at {
            if index == yielded {
                return Err(status);
            }
        }
        let machine_only = flags & MACHINE_KEY_FLAG != 0;
        let found = state
            .keys
            .iter()
            .enumerate()
            .skip(next)
            .find(|(_, k)| k.machine == machine_only)
            .map(|(i, k)| (i, k.name.clone()));
        let Some((index, name)) = found else {
            return Err(SecurityStatus::NO_MORE_ITEMS);
        };
        if let Some(c) = state.cursors.get_mut(&id) {
            c.next = index + 1;
            c.yielded += 1;
        }
        Ok(KeyEntry {
            name,
            algorithm: "RSA".to_string(),
            legacy_key_spec: 0,
            flags,
        })
    }

    fn open_key(
        &self,
        provider: RawHandle,
        name: &str,
        _legacy_key_spec: u32,
        flags: u32,
    ) -> Result<RawHandle, SecurityStatus> {
        let mut state = self.state.borrow_mut();
        if !state.providers.contains(&provider) {
            return Err(SecurityStatus::INVALID_PARAMETER);
        }
        let machine_only = flags & MACHINE_KEY_FLAG != 0;
        let index = state
            .keys
            .iter()
            .position(|k| k.name == name && k.machine == machine_only)
            .ok_or(SecurityStatus::BAD_KEYSET)?;
        let handle = state.allocate();
        state.open_keys.insert(handle, index);
        state.counts.keys_opened += 1;
        Ok(handle)
    }

    fn export_key(
        &self,
        provider: RawHandle,
        key: RawHandle,
        blob_type: &str,
        output: Option<&mut [u8]>,
        _flags: u32,
    ) -> Result<usize, SecurityStatus> {
        let mut state = self.state.borrow_mut();
        if !state.providers.contains(&provider) {
            return Err(SecurityStatus::INVALID_PARAMETER);
        }
        let index = *state
            .open_keys
            .get(&key)
            .ok_or(SecurityStatus::INVALID_PARAMETER)?;
        let attempt = state.export_attempts;
        state.export_attempts += 1;
        state.last_blob_type = Some(blob_type.to_string());
        if let Some((n, status)) = state.fail_export_call {
            if n == attempt {
                return Err(status);
            }
        }
        if !state.keys[index].exportable {
            return Err(SecurityStatus::NOT_SUPPORTED);
        }
        let len = state.keys[index].blob.len();
        let (buffer_len, returned) = match output {
            None => (None, state.reported_size.unwrap_or(len)),
            Some(buffer) => {
                if buffer.len() < len {
                    return Err(SecurityStatus::BUFFER_TOO_SMALL);
                }
                buffer[..len].copy_from_slice(&state.keys[index].blob);
                (Some(buffer.len()), len.saturating_sub(state.short_fill))
            }
        };
        state.export_calls.push((buffer_len, returned));
        Ok(returned)
    }

    fn free_buffer(&self, buffer: RawHandle) -> SecurityStatus {
        let mut state = self.state.borrow_mut();
        if state.cursors.remove(&buffer).is_some() {
            state.counts.cursors_freed += 1;
            SecurityStatus::SUCCESS
        } else {
            state.counts.invalid_frees += 1;
            SecurityStatus::INVALID_PARAMETER
        }
    }

    fn free_key(&self, provider: RawHandle, key: RawHandle) -> SecurityStatus {
        let mut state = self.state.borrow_mut();
        if state.providers.contains(&provider) && state.open_keys.remove(&key).is_some() {
            state.counts.keys_freed += 1;
            SecurityStatus::SUCCESS
        } else {
            state.counts.invalid_frees += 1;
            SecurityStatus::INVALID_PARAMETER
        }
    }

    fn free_provider(&self, provider: RawHandle) -> SecurityStatus {
        let mut state = self.state.borrow_mut();
        if !state.open_keys.is_empty() || !state.cursors.is_empty() {
            // Freed out of order: keys and cursors must go first.
            state.counts.invalid_frees += 1;
        }
        if state.providers.remove(&provider) {
            state.counts.provider_freed += 1;
            SecurityStatus::SUCCESS
        } else {
            state.counts.invalid_frees += 1;
            SecurityStatus::INVALID_PARAMETER
        }
    }
}

/// Policy override backed by the mock's key table.
pub struct MockPolicy {
    state: Option<Rc<RefCell<MockState>>>,
}

impl MockPolicy {
    pub fn new(provider: &MockProvider) -> Self {
        Self {
            state: Some(provider.state.clone()),
        }
    }

    /// Reports every key as exportable and never writes.
    pub fn inert() -> Self {
        Self { state: None }
    }
}

impl PolicyOverride for MockPolicy {
    fn export_allowed(&self, key: RawHandle) -> bool {
        let Some(state) = &self.state else {
            return true;
        };
        let state = state.borrow();
        state
            .open_keys
            .get(&key)
            .map(|&i| state.keys[i].exportable)
            .unwrap_or(false)
    }

    fn allow_export(&self, key: RawHandle) {
        let Some(state) = &self.state else {
            return;
        };
        let mut state = state.borrow_mut();
        let index = state.open_keys.get(&key).copied();
        if let Some(i) = index {
            state.keys[i].exportable = true;
            state.counts.policy_writes += 1;
        }
    }
}
