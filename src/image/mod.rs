//! C3: Image Codec — detects WeChat `.dat` image container versions and
//! reconstructs the original image bytes.

mod codec;

pub use codec::{
    auto_decrypt, decrypt_v3, decrypt_v4, detect_version, detect_xor_key, ImageVersion,
};
