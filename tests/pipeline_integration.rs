//! End-to-end exercise of the public library surface: build a synthetic
//! encrypted vault on disk, then run it through `batch`, `db` and `image`
//! exactly as the CLI would.

use std::fs;

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tempfile::tempdir;

use wx4vault::batch::{decrypt_batch, BatchOptions};
use wx4vault::db::{decrypt_database, get_database_info, validate_key, DecryptOptions};
use wx4vault::image::{auto_decrypt, detect_version, ImageVersion};
use wx4vault::page_codec::{derive_subkeys, PAGE_SIZE, RESERVED_TRAILER_SIZE, SALT_SIZE};
use wx4vault::MasterKey;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128EcbEnc = ecb::Encryptor<Aes128>;

fn build_page(master_key: &MasterKey, salt: [u8; SALT_SIZE], page_index: u32) -> Vec<u8> {
    let subkeys = derive_subkeys(master_key, &salt);
    let mut page = vec![0u8; PAGE_SIZE];
    if page_index == 1 {
        page[..SALT_SIZE].copy_from_slice(&salt);
    }

    let body_len = PAGE_SIZE - RESERVED_TRAILER_SIZE;
    let iv = [page_index as u8; 16];
    let plain = page[..body_len].to_vec();
    let cipher = Aes256CbcEnc::new(subkeys.enc_key.as_slice().into(), (&iv).into());
    let body = cipher.encrypt_padded_vec_mut::<NoPadding>(&plain);

    let mut mac = Hmac::<Sha512>::new_from_slice(&subkeys.mac_key).unwrap();
    mac.update(&body);
    mac.update(&iv);
    mac.update(&page_index.to_le_bytes());
    let tag = mac.finalize().into_bytes()[..20].to_vec();

    page[..body_len].copy_from_slice(&body);
    page[body_len..body_len + 16].copy_from_slice(&iv);
    page[body_len + 16..body_len + 36].copy_from_slice(&tag);
    page
}

fn build_vault_db(master_key: &MasterKey, salt: [u8; SALT_SIZE], num_pages: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(num_pages as usize * PAGE_SIZE);
    for page_index in 1..=num_pages {
        out.extend_from_slice(&build_page(master_key, salt, page_index));
    }
    out
}

#[test]
fn single_file_pipeline_info_validate_decrypt() {
    let key = MasterKey::from_hex(&"a1".repeat(64)).unwrap();
    let wrong_key = MasterKey::from_hex(&"a2".repeat(64)).unwrap();
    let salt = [0x5au8; SALT_SIZE];
    let encrypted = build_vault_db(&key, salt, 2);

    let dir = tempdir().unwrap();
    let in_path = dir.path().join("MSG0.db");
    let out_path = dir.path().join("MSG0_decrypted.db");
    fs::write(&in_path, &encrypted).unwrap();

    let info = get_database_info(&in_path).unwrap();
    assert!(info.is_encrypted);
    assert_eq!(info.page_count, 2);

    assert!(validate_key(&in_path, &key).unwrap());
    assert!(!validate_key(&in_path, &wrong_key).unwrap());

    let stats = decrypt_database(&in_path, &out_path, &key, DecryptOptions::default()).unwrap();
    assert_eq!(stats.pages_written, 2);

    let decrypted_info = get_database_info(&out_path).unwrap();
    assert!(!decrypted_info.is_encrypted);
}

#[test]
fn batch_over_a_multi_directory_vault_mirrors_tree_and_reports_per_file_stats() {
    let key = MasterKey::from_hex(&"b3".repeat(64)).unwrap();
    let dir = tempdir().unwrap();
    let root = dir.path().join("vault");
    let out_root = dir.path().join("decrypted");

    fs::create_dir_all(root.join("Msg")).unwrap();
    fs::create_dir_all(root.join("Media")).unwrap();
    for (rel, salt_byte, pages) in [
        ("Msg/MSG0.db", 0x10u8, 1u32),
        ("Msg/MSG1.db", 0x11u8, 2u32),
        ("Media/Media0.db", 0x12u8, 1u32),
    ] {
        let salt = [salt_byte; SALT_SIZE];
        fs::write(root.join(rel), build_vault_db(&key, salt, pages)).unwrap();
    }

    let report = decrypt_batch(
        &root,
        &out_root,
        &key,
        BatchOptions {
            workers: 3,
            ..BatchOptions::default()
        },
    )
    .unwrap();

    assert_eq!(report.successes.len(), 3);
    assert!(report.failures.is_empty());

    let mut relative_paths: Vec<_> = report
        .successes
        .iter()
        .map(|s| s.relative_path.clone())
        .collect();
    relative_paths.sort();
    assert_eq!(
        relative_paths,
        vec!["Media/Media0.db", "Msg/MSG0.db", "Msg/MSG1.db"]
    );

    for rel in ["Msg/MSG0.db", "Msg/MSG1.db", "Media/Media0.db"] {
        let out_path = out_root.join(rel);
        assert!(out_path.exists());
        let bytes = fs::read(&out_path).unwrap();
        assert_eq!(&bytes[..16], b"SQLite format 3\0");
    }
}

#[test]
fn image_v4_container_round_trips_through_auto_decrypt() {
    let aes_key = [0x7cu8; 16];
    let plain_aes_segment = b"wechat-dat-block".to_vec(); // one AES block
    let cipher = Aes128EcbEnc::new(aes_key.as_slice().into());
    let aes_cipher = cipher.encrypt_padded_vec_mut::<Pkcs7>(&plain_aes_segment);

    let middle = b"untouched-middle-bytes".to_vec();
    let xor_key = 0x5au8;
    let plain_tail = b"trailing-plaintext".to_vec();
    let xor_cipher: Vec<u8> = plain_tail.iter().map(|b| b ^ xor_key).collect();

    let mut file_bytes = vec![0x07, 0x08, 0x56, 0x32, 0x08, 0x07];
    file_bytes.extend_from_slice(&(aes_cipher.len() as u32).to_le_bytes());
    file_bytes.extend_from_slice(&(xor_cipher.len() as u32).to_le_bytes());
    file_bytes.push(0);
    file_bytes.extend_from_slice(&aes_cipher);
    file_bytes.extend_from_slice(&middle);
    file_bytes.extend_from_slice(&xor_cipher);

    let dir = tempdir().unwrap();
    let in_path = dir.path().join("1234.dat");
    let out_path = dir.path().join("1234.png");
    fs::write(&in_path, &file_bytes).unwrap();

    assert_eq!(detect_version(&file_bytes), ImageVersion::V4v2);
    let version = auto_decrypt(&in_path, &out_path, xor_key, Some(&aes_key)).unwrap();
    assert_eq!(version, ImageVersion::V4v2);

    let mut expected = plain_aes_segment;
    expected.extend_from_slice(&middle);
    expected.extend_from_slice(&plain_tail);
    assert_eq!(fs::read(&out_path).unwrap(), expected);
}
