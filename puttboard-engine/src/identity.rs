//! Identity resolution against the player directory.

use std::collections::HashMap;

use crate::model::{PlayerIdentity, RawSession};
use crate::presence::{clean_name, find_player, fold_name};

#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Bulk-read identity directory.
///
/// Uid lookups are point reads; email lookups scan, matching how the store
/// serves them (keyed documents vs. a filtered query).
#[derive(Debug, Clone, Default)]
pub struct IdentityDirectory {
    by_uid: HashMap<String, PlayerIdentity>,
    identities: Vec<PlayerIdentity>,
}

impl IdentityDirectory {
    #[must_use]
    pub fn new(identities: Vec<PlayerIdentity>) -> Self {
        let by_uid = identities
            .iter()
            .filter_map(|identity| {
                let uid = identity.uid.as_deref()?.trim();
                (!uid.is_empty()).then(|| (uid.to_string(), identity.clone()))
            })
            .collect();
        Self {
            by_uid,
            identities,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    #[must_use]
    pub fn find_uid(&self, uid: &str) -> Option<&PlayerIdentity> {
        self.by_uid.get(uid.trim())
    }

    #[must_use]
    pub fn find_email(&self, email: &str) -> Option<&PlayerIdentity> {
        let wanted = normalize_email(email);
        if wanted.is_empty() {
            return None;
        }
        self.identities.iter().find(|identity| {
            identity
                .email
                .as_deref()
                .is_some_and(|candidate| normalize_email(candidate) == wanted)
        })
    }
}

/// Per-run memoizing resolver. Build a fresh one for every run.
#[derive(Debug)]
pub struct IdentityResolver<'d> {
    directory: &'d IdentityDirectory,
    uid_cache: HashMap<String, Option<PlayerIdentity>>,
    email_cache: HashMap<String, Option<PlayerIdentity>>,
    directory_reads: usize,
}

impl<'d> IdentityResolver<'d> {
    #[must_use]
    pub fn new(directory: &'d IdentityDirectory) -> Self {
        Self {
            directory,
            uid_cache: HashMap::new(),
            email_cache: HashMap::new(),
            directory_reads: 0,
        }
    }

    /// Number of lookups that missed the cache and hit the directory.
    #[must_use]
    pub const fn directory_reads(&self) -> usize {
        self.directory_reads
    }

    /// Resolve a raw roster name to a canonical identity.
    ///
    /// Tries the session's uid mapping, then its email mapping, then keeps the
    /// raw name with no uid/email. Never fails.
    pub fn resolve(&mut self, raw_name: &str, session: &RawSession) -> PlayerIdentity {
        if let Some(uid) = find_player(&session.player_uids, raw_name)
            && let Some(identity) = self.lookup_uid(uid)
        {
            return identity;
        }
        if let Some(email) = find_player(&session.player_emails, raw_name)
            && let Some(identity) = self.lookup_email(email)
        {
            return identity;
        }
        PlayerIdentity::unresolved(&clean_name(raw_name))
    }

    fn lookup_uid(&mut self, uid: &str) -> Option<PlayerIdentity> {
        let key = uid.trim().to_string();
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.uid_cache.get(&key) {
            return cached.clone();
        }
        self.directory_reads += 1;
        let found = self.directory.find_uid(&key).map(|identity| PlayerIdentity {
            uid: Some(key.clone()),
            ..identity.clone()
        });
        self.uid_cache.insert(key, found.clone());
        found
    }

    fn lookup_email(&mut self, email: &str) -> Option<PlayerIdentity> {
        let key = normalize_email(email);
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.email_cache.get(&key) {
            return cached.clone();
        }
        self.directory_reads += 1;
        let found = self.directory.find_email(&key).cloned();
        self.email_cache.insert(key, found.clone());
        found
    }
}

/// Stable identity component of a signature.
///
/// Uid beats email beats folded name; `None` when nothing usable remains.
#[must_use]
pub fn identity_key(uid: Option<&str>, email: &str, name: &str) -> Option<String> {
    if let Some(uid) = uid.map(str::trim).filter(|uid| !uid.is_empty()) {
        return Some(format!("uid:{uid}"));
    }
    let email = normalize_email(email);
    if !email.is_empty() {
        return Some(format!("email:{email}"));
    }
    let name = fold_name(name);
    (!name.is_empty()).then(|| format!("name:{name}"))
}
