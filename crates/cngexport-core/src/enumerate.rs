use crate::error::{KspError, Result};
use crate::provider::{KeyEntry, KeyStorageProvider, RawHandle};
use crate::session::ProviderSession;
use crate::status::SecurityStatus;
use std::iter::FusedIterator;

/// Lazy enumeration of the keys in a session.
///
/// Owns the provider's enumeration cursor and frees it once: on exhaustion,
/// before an error is yielded, or on drop if iteration is abandoned early.
pub struct KeyNames<'s, 'p, P: KeyStorageProvider> {
    session: &'s ProviderSession<'p, P>,
    state: Option<RawHandle>,
    flags: u32,
    done: bool,
}

impl<'s, 'p, P: KeyStorageProvider> KeyNames<'s, 'p, P> {
    pub(crate) fn new(session: &'s ProviderSession<'p, P>, flags: u32) -> Self {
        Self {
            session,
            state: None,
            flags,
            done: false,
        }
    }

    fn release_cursor(&mut self) {
        if let Some(state) = self.state.take() {
            let status = self.session.provider().free_buffer(state);
            if !status.is_success() {
                tracing::warn!(%status, "free enumeration state failed");
            }
        }
    }
}

impl<P: KeyStorageProvider> Iterator for KeyNames<'_, '_, P> {
    type Item = Result<KeyEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let provider = self.session.provider();
        match provider.enum_keys(self.session.handle(), &mut self.state, self.flags) {
            Ok(entry) => {
                tracing::trace!(key = %entry.name, "enumerated key");
                Some(Ok(entry))
            }
            Err(status) => {
                self.done = true;
                self.release_cursor();
                if status == SecurityStatus::NO_MORE_ITEMS {
                    None
                } else {
                    tracing::error!(%status, "key enumeration failed");
                    Some(Err(KspError::Enumeration { status }))
                }
            }
        }
    }
}

impl<P: KeyStorageProvider> FusedIterator for KeyNames<'_, '_, P> {}

impl<P: KeyStorageProvider> Drop for KeyNames<'_, '_, P> {
    fn drop(&mut self) {
        self.release_cursor();
    }
}
