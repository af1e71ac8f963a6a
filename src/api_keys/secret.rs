use rand::Rng;

use crate::error::AuthResult;

/// Number of random Base62 characters in a generated secret.
/// Entropy: log2(62^32) ≈ 190 bits.
const SECRET_LEN: usize = 32;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Source of new API key secrets. Must return unique, unguessable values.
pub trait SecretGenerator: Send + Sync {
    fn new_secret(&self) -> AuthResult<String>;
}

/// Base62 secrets drawn from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSecrets;

impl SecretGenerator for RandomSecrets {
    fn new_secret(&self) -> AuthResult<String> {
        let mut rng = rand::rng();
        Ok((0..SECRET_LEN)
            .map(|_| {
                let idx = rng.random_range(0..BASE62_CHARS.len());
                BASE62_CHARS[idx] as char
            })
            .collect())
    }
}
