//! RSA password encryption and symmetric session-key generation for the
//! encrypted login flow (§4.6).
//!
//! When the server negotiates an encrypted login, it hands the client a
//! public key and a nonce (`Params(asymmetric-type, public key, nonce)`);
//! the client prefixes that server-supplied nonce to the plaintext
//! before RSA-OAEP-encrypting it, so the server can confirm the
//! encryption happened against the exact challenge it issued rather than
//! a replayed ciphertext. Padding is RSA-OAEP with SHA-256.

use rand::RngCore;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Error, Result};

/// The two symmetric key widths ODCE negotiates, in bytes: DES-class (8)
/// and AES-128-class (16) session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricKeyWidth {
    Des = 8,
    Aes128 = 16,
}

impl SymmetricKeyWidth {
    pub fn len(self) -> usize {
        self as usize
    }
}

/// A freshly generated, never-reused symmetric session key for on-demand
/// command encryption.
#[derive(Clone)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn generate(width: SymmetricKeyWidth) -> Self {
        let mut bytes = vec![0u8; width.len()];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SessionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey(<{} bytes>)", self.0.len())
    }
}

/// Encrypts `plaintext` (a password or a symmetric session key) under
/// the server's RSA public key, prefixing the server-supplied `nonce`
/// so the ciphertext is bound to this login attempt's own challenge.
pub fn rsa_encrypt(public_key: &RsaPublicKey, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(nonce.len() + plaintext.len());
    buf.extend_from_slice(nonce);
    buf.extend_from_slice(plaintext);

    let padding = Oaep::new::<Sha256>();
    public_key
        .encrypt(&mut rand::rngs::OsRng, padding, &buf)
        .map_err(Error::Crypto)
}

/// Parses a server-provided RSA public key from its modulus bytes. The
/// TDS 5.0 encrypted-login handshake sends only the modulus; the public
/// exponent is the fixed value ASE always uses for this key (65537).
pub fn public_key_from_modulus(modulus: &[u8]) -> Result<RsaPublicKey> {
    use rsa::BigUint;
    RsaPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from(65537u32)).map_err(Error::Crypto)
}

#[cfg(test)]
mod test {
    use super::*;
    use rsa::{RsaPrivateKey, traits::PublicKeyParts};

    #[test]
    fn session_key_has_requested_width() {
        let des = SessionKey::generate(SymmetricKeyWidth::Des);
        let aes = SessionKey::generate(SymmetricKeyWidth::Aes128);
        assert_eq!(des.as_bytes().len(), 8);
        assert_eq!(aes.as_bytes().len(), 16);
    }

    #[test]
    fn two_generated_keys_differ() {
        let a = SessionKey::generate(SymmetricKeyWidth::Aes128);
        let b = SessionKey::generate(SymmetricKeyWidth::Aes128);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rsa_encrypt_round_trips_through_private_key() {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let nonce = [1u8; 8];
        let plaintext = b"hunter2";
        let ciphertext = rsa_encrypt(&public_key, &nonce, plaintext).unwrap();

        let padding = Oaep::new::<Sha256>();
        let decrypted = private_key.decrypt(padding, &ciphertext).unwrap();
        assert_eq!(&decrypted[decrypted.len() - plaintext.len()..], plaintext);
        assert_eq!(&decrypted[..nonce.len()], &nonce);
    }

    #[test]
    fn public_key_from_modulus_matches_and_uses_fixed_exponent() {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new_with_exp(&mut rng, 512, &rsa::BigUint::from(65537u32)).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let modulus = public_key.n().to_bytes_be();

        let rebuilt = public_key_from_modulus(&modulus).unwrap();
        assert_eq!(rebuilt.n(), public_key.n());
        assert_eq!(rebuilt.e(), &rsa::BigUint::from(65537u32));
    }
}
