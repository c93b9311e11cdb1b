//! Profile hashing.
//!
//! A spell's profile is the textual pre-image of its signature: the base
//! description of what the action will do, followed by the signature of
//! every spell factor and the `path mtime` pair of every source factor, in
//! declaration order. The signature is base64(MD5(profile)), unpadded, which
//! keeps it at a fixed 22 characters with no whitespace.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use md5::{Digest, Md5};

/// Hash a profile into its signature.
///
/// The empty profile maps to the empty signature: a spell with no effect has
/// nothing worth recording.
pub fn signature_of(profile: &str) -> String {
    if profile.is_empty() {
        return String::new();
    }
    STANDARD_NO_PAD.encode(Md5::digest(profile.as_bytes()))
}

/// Append a factor spell's signature to a profile under construction.
pub(crate) fn push_spell_factor(profile: &mut String, signature: &str) {
    profile.push_str(signature);
}

/// Append a source file's `path mtime` contribution to a profile.
pub(crate) fn push_source_factor(profile: &mut String, path: &str, mtime: u64) {
    profile.push(' ');
    profile.push_str(path);
    profile.push(' ');
    profile.push_str(&mtime.to_string());
}
