//! C1: Page Codec — subkey derivation, page-1 MAC validation, and
//! authenticated per-page decryption for WeChat V4 database pages.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use cipher::block_padding::NoPadding;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CoreError;
use crate::key::MasterKey;

pub const PAGE_SIZE: usize = 4096;
pub const SALT_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;
pub const MAC_TAG_SIZE: usize = 20;
pub const RESERVED_TRAILER_SIZE: usize = 48;
const MAC_SALT_MASK: u8 = 0x3a;
const PBKDF2_ENC_ITERS: u32 = 256_000;
const PBKDF2_MAC_ITERS: u32 = 2;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// `encKey` (AES-256-CBC) and `macKey` (HMAC-SHA512), both derived once
/// per file and zeroized together when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Subkeys {
    pub enc_key: [u8; 32],
    pub mac_key: [u8; 32],
}

/// Derive `(encKey, macKey)` from the master key and the 16-byte page-0 salt.
pub fn derive_subkeys(master_key: &MasterKey, salt: &[u8; SALT_SIZE]) -> Subkeys {
    let mut enc_key = [0u8; 32];
    pbkdf2_hmac::<Sha512>(master_key.as_bytes(), salt, PBKDF2_ENC_ITERS, &mut enc_key);

    let mut mac_salt = *salt;
    for byte in mac_salt.iter_mut() {
        *byte ^= MAC_SALT_MASK;
    }

    let mut mac_key = [0u8; 32];
    pbkdf2_hmac::<Sha512>(&enc_key, &mac_salt, PBKDF2_MAC_ITERS, &mut mac_key);

    Subkeys { enc_key, mac_key }
}

fn compute_tag(mac_key: &[u8; 32], body: &[u8], iv: &[u8], page_index: u32) -> [u8; MAC_TAG_SIZE] {
    let mut mac =
        HmacSha512::new_from_slice(mac_key).expect("HMAC-SHA512 accepts any key length");
    mac.update(body);
    mac.update(iv);
    mac.update(&page_index.to_le_bytes());
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; MAC_TAG_SIZE];
    tag.copy_from_slice(&full[..MAC_TAG_SIZE]);
    tag
}

/// Returns true iff the MAC of page 1 verifies under the derived keys.
/// Used as a cheap key-correctness oracle; writes nothing.
pub fn validate_first_page(page: &[u8; PAGE_SIZE], master_key: &MasterKey) -> bool {
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&page[..SALT_SIZE]);
    let subkeys = derive_subkeys(master_key, &salt);

    let body = &page[..PAGE_SIZE - RESERVED_TRAILER_SIZE];
    let iv = &page[PAGE_SIZE - RESERVED_TRAILER_SIZE..PAGE_SIZE - RESERVED_TRAILER_SIZE + IV_SIZE];
    let tag_start = PAGE_SIZE - RESERVED_TRAILER_SIZE + IV_SIZE;
    let stored_tag = &page[tag_start..tag_start + MAC_TAG_SIZE];

    let computed = compute_tag(&subkeys.mac_key, body, iv, 1);
    computed.ct_eq(stored_tag).into()
}

/// A fully decrypted page: 4048 bytes of plaintext followed by the
/// untouched 48-byte trailer (IV || tag || reserved).
pub struct DecryptedPage {
    pub plaintext_body: Vec<u8>,
    pub trailer: [u8; RESERVED_TRAILER_SIZE],
}

/// Decrypt one page (1-based `page_index`). For page 1 the caller is
/// expected to have already extracted the salt; `page` here still
/// contains the raw 4096 bytes with the salt as `body[0..16]` — the
/// codec treats it as opaque MAC/ciphertext input and the database
/// pipeline is responsible for substituting the SQLite magic.
pub fn decrypt_page(
    page_index: u32,
    page: &[u8; PAGE_SIZE],
    subkeys: &Subkeys,
) -> Result<DecryptedPage, CoreError> {
    let body = &page[..PAGE_SIZE - RESERVED_TRAILER_SIZE];
    let iv = &page[PAGE_SIZE - RESERVED_TRAILER_SIZE..PAGE_SIZE - RESERVED_TRAILER_SIZE + IV_SIZE];
    let tag_start = PAGE_SIZE - RESERVED_TRAILER_SIZE + IV_SIZE;
    let stored_tag = &page[tag_start..tag_start + MAC_TAG_SIZE];
    let reserved_start = tag_start + MAC_TAG_SIZE;
    let reserved = &page[reserved_start..PAGE_SIZE];

    let computed = compute_tag(&subkeys.mac_key, body, iv, page_index);
    if !bool::from(computed.ct_eq(stored_tag)) {
        return Err(CoreError::MacMismatch { page: page_index });
    }

    let mut buffer = body.to_vec();
    let cipher = Aes256CbcDec::new(subkeys.enc_key.as_slice().into(), iv.into());
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| CoreError::CryptoFailure(format!("AES-256-CBC decrypt failed: {e}")))?;

    let mut trailer = [0u8; RESERVED_TRAILER_SIZE];
    trailer[..IV_SIZE].copy_from_slice(iv);
    trailer[IV_SIZE..IV_SIZE + MAC_TAG_SIZE].copy_from_slice(stored_tag);
    trailer[IV_SIZE + MAC_TAG_SIZE..].copy_from_slice(reserved);

    Ok(DecryptedPage {
        plaintext_body: buffer,
        trailer,
    })
}
