//! Short opaque identifiers for plugin instances and graphs: a CSPRNG
//! draw encoded as a short string, retried on collision against a
//! registry of previously issued ids. Kept as an explicit service rather
//! than global state so tests (and multiple graphs, should the facade
//! ever grow multi-graph support) don't share mutable state.

use std::collections::HashSet;

use crate::error::{Result, TrnxError};

const ALPHABET: &[u8] = b"0123456789abcdef";
const ID_LEN: usize = 10;
const MAX_ATTEMPTS: usize = 16;

/// Issues short, collision-free identifiers.
pub struct IdentifierService {
    issued: HashSet<String>,
}

impl IdentifierService {
    pub fn new() -> Self {
        Self {
            issued: HashSet::new(),
        }
    }

    /// Draw a fresh id, retrying on collision against every id this service
    /// has issued so far. Fails with `IdConflict` if `MAX_ATTEMPTS`
    /// consecutive draws all collide — astronomically unlikely at
    /// `ID_LEN` = 10 hex characters, but bounded rather than looped forever.
    pub fn generate(&mut self) -> Result<String> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = draw();
            if self.issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(TrnxError::IdConflict(format!(
            "exhausted {MAX_ATTEMPTS} attempts drawing a fresh id"
        )))
    }

    /// Register a caller-supplied id (e.g. a plugin's declared class name
    /// used as its own identity). Fails with `IdConflict` if already
    /// registered.
    pub fn register(&mut self, id: &str) -> Result<()> {
        if !self.issued.insert(id.to_string()) {
            return Err(TrnxError::IdConflict(id.to_string()));
        }
        Ok(())
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.issued.contains(id)
    }

    /// Release a previously registered or generated id so it may be
    /// reused, e.g. after a plugin is unloaded.
    pub fn release(&mut self, id: &str) {
        self.issued.remove(id);
    }
}

impl Default for IdentifierService {
    fn default() -> Self {
        Self::new()
    }
}

fn draw() -> String {
    let mut buf = [0u8; ID_LEN];
    getrandom::fill(&mut buf).expect("system CSPRNG unavailable");
    buf.iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let mut svc = IdentifierService::new();
        let a = svc.generate().unwrap();
        let b = svc.generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), ID_LEN);
    }

    #[test]
    fn register_rejects_duplicate() {
        let mut svc = IdentifierService::new();
        svc.register("Alpha").unwrap();
        let err = svc.register("Alpha").unwrap_err();
        assert_eq!(err.code(), "id_conflict");
    }

    #[test]
    fn has_id_reflects_registration_and_release() {
        let mut svc = IdentifierService::new();
        svc.register("Alpha").unwrap();
        assert!(svc.has_id("Alpha"));
        svc.release("Alpha");
        assert!(!svc.has_id("Alpha"));
    }
}
