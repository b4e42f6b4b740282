// One-time connection code and the set of chats allowed to issue commands

use crate::error::{Error, Result};
use rand::Rng;
use std::collections::HashSet;
use tracing::{info, warn};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

/// Per-client authorization. Clients move to authorized by presenting the
/// process code and back only through [`SessionAuthorizer::disconnect`].
#[derive(Debug, Clone)]
pub struct SessionAuthorizer {
    code: String,
    authorized: HashSet<String>,
}

impl SessionAuthorizer {
    /// Create an authorizer with a freshly generated code
    pub fn new() -> Self {
        Self::with_code(generate_code(&mut rand::thread_rng()))
    }

    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into().trim().to_uppercase(),
            authorized: HashSet::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Authorize a client without a code (the configured owner chat)
    pub fn preauthorize(&mut self, client: impl Into<String>) {
        self.authorized.insert(client.into());
    }

    /// Compare `attempt` to the code, trimmed and case-insensitive
    pub fn connect(&mut self, client: &str, attempt: &str) -> Result<()> {
        if attempt.trim().to_uppercase() == self.code {
            if self.authorized.insert(client.to_string()) {
                info!("Client {} authorized", client);
            }
            Ok(())
        } else {
            warn!("Client {} supplied a wrong connection code", client);
            Err(Error::Authorization("invalid connection code".to_string()))
        }
    }

    /// Returns whether the client was authorized
    pub fn disconnect(&mut self, client: &str) -> bool {
        let removed = self.authorized.remove(client);
        if removed {
            info!("Client {} disconnected", client);
        }
        removed
    }

    pub fn is_authorized(&self, client: &str) -> bool {
        self.authorized.contains(client)
    }

    pub fn authorized_count(&self) -> usize {
        self.authorized.len()
    }
}

impl Default for SessionAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Random code drawn from an alphabet without look-alike characters
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code(&mut rng);
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_connect_trimmed_case_insensitive() {
        let mut auth = SessionAuthorizer::with_code("AB12CD");
        assert!(!auth.is_authorized("chat-1"));
        auth.connect("chat-1", "  ab12cd \n").unwrap();
        assert!(auth.is_authorized("chat-1"));
        assert!(!auth.is_authorized("chat-2"));
    }

    #[test]
    fn test_wrong_code_rejected() {
        let mut auth = SessionAuthorizer::with_code("AB12CD");
        let err = auth.connect("chat-1", "AB12C").unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
        assert!(!auth.is_authorized("chat-1"));
    }

    #[test]
    fn test_disconnect_only_affects_client() {
        let mut auth = SessionAuthorizer::with_code("XYZ789");
        auth.connect("a", "xyz789").unwrap();
        auth.connect("b", "XYZ789").unwrap();
        assert!(auth.disconnect("a"));
        assert!(!auth.disconnect("a"));
        assert!(!auth.is_authorized("a"));
        assert!(auth.is_authorized("b"));
        assert_eq!(auth.authorized_count(), 1);
    }

    #[test]
    fn test_preauthorized_owner() {
        let mut auth = SessionAuthorizer::new();
        auth.preauthorize("42");
        assert!(auth.is_authorized("42"));
    }
}
