use std::fs;
use std::path::Path;

use aes::Aes128;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, KeyInit};

use crate::error::{CoreError, CoreResult};

const V4_HEADER_LEN: usize = 15;
const V4V1_SIGNATURE: [u8; 6] = [0x07, 0x08, 0x56, 0x31, 0x08, 0x07];
const V4V2_SIGNATURE: [u8; 6] = [0x07, 0x08, 0x56, 0x32, 0x08, 0x07];

/// One byte of a signature pattern: either a fixed value or a wildcard
/// (used for WEBP's 4-byte RIFF chunk size field).
#[derive(Clone, Copy)]
enum SigByte {
    Fixed(u8),
    Any,
}

/// Known image magic numbers, used both to recognize the decrypted
/// output and to brute-force a V3 XOR key.
const IMAGE_SIGNATURES: &[&[SigByte]] = &[
    &[SigByte::Fixed(0xFF), SigByte::Fixed(0xD8), SigByte::Fixed(0xFF)], // JPEG
    &[
        SigByte::Fixed(0x89),
        SigByte::Fixed(0x50),
        SigByte::Fixed(0x4E),
        SigByte::Fixed(0x47),
        SigByte::Fixed(0x0D),
        SigByte::Fixed(0x0A),
        SigByte::Fixed(0x1A),
        SigByte::Fixed(0x0A),
    ], // PNG
    &[
        SigByte::Fixed(0x47),
        SigByte::Fixed(0x49),
        SigByte::Fixed(0x46),
        SigByte::Fixed(0x38),
    ], // GIF
    &[SigByte::Fixed(0x42), SigByte::Fixed(0x4D)], // BMP
    &[
        SigByte::Fixed(0x52),
        SigByte::Fixed(0x49),
        SigByte::Fixed(0x46),
        SigByte::Fixed(0x46),
        SigByte::Any,
        SigByte::Any,
        SigByte::Any,
        SigByte::Any,
        SigByte::Fixed(0x57),
        SigByte::Fixed(0x45),
        SigByte::Fixed(0x42),
        SigByte::Fixed(0x50),
    ], // WEBP: "RIFF" + 4-byte size + "WEBP"
];

type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// The three `.dat` container variants distinguished by the leading
/// signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVersion {
    V3,
    V4v1,
    V4v2,
}

/// Pure function of the first bytes of the file; no I/O.
pub fn detect_version(first_bytes: &[u8]) -> ImageVersion {
    if first_bytes.len() >= 6 {
        if first_bytes[..6] == V4V1_SIGNATURE {
            return ImageVersion::V4v1;
        }
        if first_bytes[..6] == V4V2_SIGNATURE {
            return ImageVersion::V4v2;
        }
    }
    ImageVersion::V3
}

/// XOR-decrypt an entire V3 image with a single-byte key.
/// Involution: `decrypt_v3(decrypt_v3(b, k), k) == b`.
pub fn decrypt_v3(bytes: &[u8], xor_key: u8) -> Vec<u8> {
    bytes.iter().map(|b| b ^ xor_key).collect()
}

struct V4Header {
    aes_size: usize,
    xor_size: usize,
}

fn parse_v4_header(bytes: &[u8]) -> CoreResult<V4Header> {
    if bytes.len() < V4_HEADER_LEN {
        return Err(CoreError::CorruptInput {
            reason: "V4 image header truncated".to_string(),
        });
    }
    let aes_size = u32::from_le_bytes(bytes[6..10].try_into().unwrap()) as usize;
    let xor_size = u32::from_le_bytes(bytes[10..14].try_into().unwrap()) as usize;

    if aes_size % 16 != 0 {
        return Err(CoreError::CorruptInput {
            reason: format!("aesSize {aes_size} is not a multiple of 16"),
        });
    }
    let available = bytes.len().saturating_sub(V4_HEADER_LEN);
    if aes_size.checked_add(xor_size).map_or(true, |sum| sum > available) {
        return Err(CoreError::CorruptInput {
            reason: format!(
                "aesSize({aes_size}) + xorSize({xor_size}) exceeds available body ({available})"
            ),
        });
    }

    Ok(V4Header { aes_size, xor_size })
}

/// Decrypt a V4 `.dat` payload: AES-128-ECB over the AES segment (PKCS#7
/// stripped from that segment only), the middle section copied verbatim,
/// and the trailing XOR segment XOR-decrypted; all three concatenated.
pub fn decrypt_v4(bytes: &[u8], xor_key: u8, aes_key: &[u8; 16]) -> CoreResult<Vec<u8>> {
    let header = parse_v4_header(bytes)?;
    let body = &bytes[V4_HEADER_LEN..];

    let aes_segment = &body[..header.aes_size];
    let middle_len = body.len() - header.aes_size - header.xor_size;
    let middle = &body[header.aes_size..header.aes_size + middle_len];
    let xor_segment = &body[header.aes_size + middle_len..];

    let mut aes_buffer = aes_segment.to_vec();
    let decrypted_aes = if header.aes_size == 0 {
        Vec::new()
    } else {
        let cipher = Aes128EcbDec::new(aes_key.as_slice().into());
        cipher
            .decrypt_padded_mut::<Pkcs7>(&mut aes_buffer)
            .map_err(|_| CoreError::BadPadding)?
            .to_vec()
    };

    let decrypted_xor: Vec<u8> = xor_segment.iter().map(|b| b ^ xor_key).collect();

    let mut out = Vec::with_capacity(decrypted_aes.len() + middle.len() + decrypted_xor.len());
    out.extend_from_slice(&decrypted_aes);
    out.extend_from_slice(middle);
    out.extend_from_slice(&decrypted_xor);
    Ok(out)
}

/// Dispatch on `detect_version` and write the reconstructed image to
/// `out_path`. `aes_key` is required iff the detected version is V4.
pub fn auto_decrypt(
    in_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    xor_key: u8,
    aes_key: Option<&[u8; 16]>,
) -> CoreResult<ImageVersion> {
    let in_path = in_path.as_ref();
    let out_path = out_path.as_ref();
    let data = fs::read(in_path).map_err(|e| CoreError::io(in_path, e))?;

    let version = detect_version(&data);
    let plaintext = match version {
        ImageVersion::V3 => decrypt_v3(&data, xor_key),
        ImageVersion::V4v1 | ImageVersion::V4v2 => {
            let aes_key = aes_key.ok_or_else(|| {
                CoreError::CorruptInput {
                    reason: "AES key required for V4 image container".to_string(),
                }
            })?;
            decrypt_v4(&data, xor_key, aes_key)?
        }
    };

    fs::write(out_path, &plaintext).map_err(|e| CoreError::io(out_path, e))?;
    Ok(version)
}

/// Brute-force a single-byte XOR key against the known image signature
/// table. Only meaningful for V3 payloads.
pub fn detect_xor_key(in_path: impl AsRef<Path>) -> CoreResult<Option<u8>> {
    let in_path = in_path.as_ref();
    let data = fs::read(in_path).map_err(|e| CoreError::io(in_path, e))?;
    Ok(detect_xor_key_in_bytes(&data))
}

fn detect_xor_key_in_bytes(data: &[u8]) -> Option<u8> {
    if data.is_empty() {
        return None;
    }
    let head_len = data.len().min(16);
    let head = &data[..head_len];

    for candidate in 0u16..=255 {
        let candidate = candidate as u8;
        for signature in IMAGE_SIGNATURES {
            if signature.len() > head.len() {
                continue;
            }
            let matches = signature.iter().enumerate().all(|(i, sig_byte)| match sig_byte {
                SigByte::Fixed(expected) => head[i] ^ candidate == *expected,
                SigByte::Any => true,
            });
            if matches {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_version_is_pure_and_recognizes_all_three() {
        assert_eq!(detect_version(&[0u8; 16]), ImageVersion::V3);
        let mut v1 = V4V1_SIGNATURE.to_vec();
        v1.extend_from_slice(&[0u8; 10]);
        assert_eq!(detect_version(&v1), ImageVersion::V4v1);
        let mut v2 = V4V2_SIGNATURE.to_vec();
        v2.extend_from_slice(&[0u8; 10]);
        assert_eq!(detect_version(&v2), ImageVersion::V4v2);
    }

    #[test]
    fn xor_is_involutive() {
        let plain = b"some arbitrary image bytes \x00\x01\xff".to_vec();
        for key in [0u8, 0x42, 0xff] {
            let encrypted = decrypt_v3(&plain, key);
            let restored = decrypt_v3(&encrypted, key);
            assert_eq!(restored, plain);
        }
    }

    #[test]
    fn detect_xor_key_finds_jpeg_signature() {
        let plain = [0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
        let key = 0x7Bu8;
        let encrypted: Vec<u8> = plain.iter().map(|b| b ^ key).collect();
        assert_eq!(detect_xor_key_in_bytes(&encrypted), Some(key));
        assert_eq!(&decrypt_v3(&encrypted, key)[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn detect_xor_key_matches_webp_wildcard_size_field() {
        let mut plain = vec![0x52, 0x49, 0x46, 0x46]; // "RIFF"
        plain.extend_from_slice(&1234u32.to_le_bytes()); // arbitrary chunk size
        plain.extend_from_slice(b"WEBP");
        let key = 0x33u8;
        let encrypted: Vec<u8> = plain.iter().map(|b| b ^ key).collect();
        assert_eq!(detect_xor_key_in_bytes(&encrypted), Some(key));
    }

    #[test]
    fn v4_header_overrun_is_corrupt_input() {
        let mut data = V4V1_SIGNATURE.to_vec();
        data.extend_from_slice(&80u32.to_le_bytes());
        data.extend_from_slice(&80u32.to_le_bytes());
        data.push(0);
        data.extend(vec![0u8; 100 - data.len()]);

        let result = decrypt_v4(&data, 0, &[0u8; 16]);
        assert!(matches!(result, Err(CoreError::CorruptInput { .. })));
    }

    #[test]
    fn v4_round_trip_with_middle_section_preserved() {
        use aes::Aes128;
        use cipher::{BlockEncryptMut, KeyInit};
        type Enc = ecb::Encryptor<Aes128>;

        let aes_key = [0x5Au8; 16];
        let aes_plain = b"0123456789abcdef".to_vec(); // exactly one block
        let cipher = Enc::new(aes_key.as_slice().into());
        let aes_cipher = cipher.encrypt_padded_vec_mut::<Pkcs7>(&aes_plain);

        let middle = b"middle-section-bytes".to_vec();
        let xor_key = 0x11u8;
        let xor_plain = b"tail-bytes".to_vec();
        let xor_cipher: Vec<u8> = xor_plain.iter().map(|b| b ^ xor_key).collect();

        let mut file = V4V2_SIGNATURE.to_vec();
        file.extend_from_slice(&(aes_cipher.len() as u32).to_le_bytes());
        file.extend_from_slice(&(xor_cipher.len() as u32).to_le_bytes());
        file.push(0);
        file.extend_from_slice(&aes_cipher);
        file.extend_from_slice(&middle);
        file.extend_from_slice(&xor_cipher);

        assert_eq!(detect_version(&file), ImageVersion::V4v2);
        let decrypted = decrypt_v4(&file, xor_key, &aes_key).unwrap();

        let mut expected = aes_plain;
        expected.extend_from_slice(&middle);
        expected.extend_from_slice(&xor_plain);
        assert_eq!(decrypted, expected);
    }
}
