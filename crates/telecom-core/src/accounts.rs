//! In-memory directory of registered phone accounts
//!
//! Providers register the accounts calls can be placed through. The
//! directory answers which accounts can handle a URI scheme and which one
//! the user picked as default for it. Nothing here is persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TelecomError, TelecomResult};
use crate::types::{AccountHandle, SCHEME_TEL};

/// A registered account and what it can do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneAccount {
    pub handle: AccountHandle,
    /// URI schemes the account can place calls to
    pub schemes: Vec<String>,
    pub video_calling: bool,
    pub emergency_video_calling: bool,
    /// Account can place ordinary calls; emergency-only accounts cannot
    pub call_capable: bool,
}

impl PhoneAccount {
    /// Call-capable `tel` account with no video support
    pub fn new(handle: AccountHandle) -> Self {
        Self {
            handle,
            schemes: vec![SCHEME_TEL.to_string()],
            video_calling: false,
            emergency_video_calling: false,
            call_capable: true,
        }
    }

    pub fn with_schemes(mut self, schemes: &[&str]) -> Self {
        self.schemes = schemes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_video_calling(mut self, emergency_too: bool) -> Self {
        self.video_calling = true;
        self.emergency_video_calling = emergency_too;
        self
    }

    pub fn with_call_capable(mut self, call_capable: bool) -> Self {
        self.call_capable = call_capable;
        self
    }

    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s == scheme)
    }
}

#[derive(Debug, Default)]
pub struct AccountDirectory {
    /// Registration order is kept; candidate lists follow it
    accounts: Vec<PhoneAccount>,
    defaults: HashMap<String, AccountHandle>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account, replacing any earlier registration of the same handle
    pub fn register(&mut self, account: PhoneAccount) {
        info!("Registering account {} for {:?}", account.handle, account.schemes);
        self.accounts.retain(|a| a.handle != account.handle);
        self.accounts.push(account);
    }

    pub fn unregister(&mut self, handle: &AccountHandle) -> Option<PhoneAccount> {
        let position = self.accounts.iter().position(|a| &a.handle == handle)?;
        self.defaults.retain(|_, default| default != handle);
        info!("Unregistered account {}", handle);
        Some(self.accounts.remove(position))
    }

    pub fn get(&self, handle: &AccountHandle) -> Option<&PhoneAccount> {
        self.accounts.iter().find(|a| &a.handle == handle)
    }

    pub fn contains(&self, handle: &AccountHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhoneAccount> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Accounts that can place an ordinary call to `scheme`
    pub fn call_capable_accounts(&self, scheme: &str) -> Vec<AccountHandle> {
        self.accounts
            .iter()
            .filter(|a| a.call_capable && a.supports_scheme(scheme))
            .map(|a| a.handle.clone())
            .collect()
    }

    /// Every account that can reach `scheme`, emergency-only ones included
    pub fn emergency_accounts(&self, scheme: &str) -> Vec<AccountHandle> {
        self.accounts
            .iter()
            .filter(|a| a.supports_scheme(scheme))
            .map(|a| a.handle.clone())
            .collect()
    }

    pub fn default_for_scheme(&self, scheme: &str) -> Option<&AccountHandle> {
        self.defaults.get(scheme)
    }

    pub fn set_default_for_scheme(&mut self, scheme: &str, handle: AccountHandle) -> TelecomResult<()> {
        if !self.contains(&handle) {
            return Err(TelecomError::AccountNotFound { account: handle });
        }
        debug!("Default account for {} is now {}", scheme, handle);
        self.defaults.insert(scheme.to_string(), handle);
        Ok(())
    }

    pub fn supports_video(&self, handle: &AccountHandle) -> bool {
        self.get(handle).map(|a| a.video_calling).unwrap_or(false)
    }

    pub fn supports_emergency_video(&self, handle: &AccountHandle) -> bool {
        self.get(handle).map(|a| a.emergency_video_calling).unwrap_or(false)
    }
}
