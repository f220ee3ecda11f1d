//! Credential store: the normalized account map, resolved once per request.

use std::collections::HashMap;
use std::fmt;

use crate::config;

/// One account's API credential bundle. Immutable after startup.
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub handle: String,
    pub user_id: String,
    pub app_key: String,
    pub app_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Read-only lookup from account id to credential, shared across batches.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    accounts: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn from_config(accounts: &[config::Account]) -> Self {
        let accounts = accounts
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    Credential {
                        id: a.id.clone(),
                        handle: a.handle.clone(),
                        user_id: a.user_id.clone(),
                        app_key: a.app_key.clone(),
                        app_secret: a.app_secret.clone(),
                        access_token: a.access_token.clone(),
                        access_token_secret: a.access_token_secret.clone(),
                    },
                )
            })
            .collect();
        Self { accounts }
    }

    pub fn resolve(&self, account_id: &str) -> Option<&Credential> {
        self.accounts.get(account_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}
