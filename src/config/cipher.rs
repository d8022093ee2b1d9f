//! Field encryption for the credential record
//!
//! AES-256-CBC with PKCS#7 padding. Every call draws a fresh 16-byte IV,
//! which is prepended to the ciphertext before base64 encoding:
//! `base64(IV || ciphertext)`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use super::keystore::KEY_LEN;

/// CBC initialization vector length
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key length")]
    InvalidKey,

    #[error("Invalid base64 encoding")]
    Encoding,

    #[error("Ciphertext too short")]
    Truncated,

    #[error("Decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    #[error("Decrypted field is not valid UTF-8")]
    Utf8,
}

/// Encrypt one field under `key` with a random IV
pub fn encrypt_field(plaintext: &str, key: &[u8]) -> Result<String, CipherError> {
    let key = key.get(..KEY_LEN).ok_or(CipherError::InvalidKey)?;

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CipherError::InvalidKey)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut payload = Vec::with_capacity(IV_LEN + ciphertext.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(payload))
}

/// Decrypt one `base64(IV || ciphertext)` field
pub fn decrypt_field(encoded: &str, key: &[u8]) -> Result<Zeroizing<String>, CipherError> {
    let key = key.get(..KEY_LEN).ok_or(CipherError::InvalidKey)?;

    let payload = BASE64
        .decode(encoded.trim())
        .map_err(|_| CipherError::Encoding)?;

    // At least one full block must follow the IV
    if payload.len() < IV_LEN * 2 {
        return Err(CipherError::Truncated);
    }
    let (iv, ciphertext) = payload.split_at(IV_LEN);

    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidKey)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::Utf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for text in ["admin", "", "p@ss wörd ñ", "192.168.101.86"] {
            let encoded = encrypt_field(text, &KEY).unwrap();
            let decoded = decrypt_field(&encoded, &KEY).unwrap();
            assert_eq!(decoded.as_str(), text);
        }
    }

    #[test]
    fn test_iv_is_prepended_and_fresh() {
        let a = BASE64.decode(encrypt_field("same", &KEY).unwrap()).unwrap();
        let b = BASE64.decode(encrypt_field("same", &KEY).unwrap()).unwrap();

        // IV + one padded block
        assert_eq!(a.len(), IV_LEN + 16);
        assert_ne!(a[..IV_LEN], b[..IV_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encoded = encrypt_field("secret-password", &KEY).unwrap();
        let other = [0x17u8; 32];

        // A wrong key almost always breaks the padding; if the padding happens
        // to validate, the plaintext still differs.
        match decrypt_field(&encoded, &other) {
            Ok(text) => assert_ne!(text.as_str(), "secret-password"),
            Err(e) => assert!(matches!(
                e,
                CipherError::DecryptionFailed | CipherError::Utf8
            )),
        }
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            encrypt_field("x", &[0u8; 16]),
            Err(CipherError::InvalidKey)
        ));
    }

    #[test]
    fn test_garbage_input() {
        assert!(matches!(
            decrypt_field("not base64 !!", &KEY),
            Err(CipherError::Encoding)
        ));
        assert!(matches!(
            decrypt_field(&BASE64.encode([1u8; 20]), &KEY),
            Err(CipherError::Truncated)
        ));
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip_any_text(text in "\\PC{0,64}", key in prop::array::uniform32(any::<u8>())) {
            let encoded = encrypt_field(&text, &key).unwrap();
            prop_assert!(!encoded.contains('\n'));

            let raw = BASE64.decode(&encoded).unwrap();
            prop_assert_eq!(raw.len(), IV_LEN + (text.len() / 16 + 1) * 16);

            let decoded = decrypt_field(&encoded, &key).unwrap();
            prop_assert_eq!(decoded.as_str(), text.as_str());
        }
    }
}
