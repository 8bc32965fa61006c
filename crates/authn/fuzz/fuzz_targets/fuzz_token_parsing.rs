//! Fuzz target for token and key set parsing.
//!
//! Feeds arbitrary byte strings as tokens and as key set documents. Every
//! input must produce a result, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tollgate_authn::{validate_algorithm, validation::validate_kid, verifier::parse_token};
use tollgate_keys::PublicKeySet;

fuzz_target!(|data: &[u8]| {
    // Key set documents arrive as raw bytes from the network
    let _ = PublicKeySet::from_json(data);

    // Tokens are always UTF-8 strings
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(header) = parse_token(token) {
        let _ = validate_algorithm(&format!("{:?}", header.alg));
        if let Some(ref kid) = header.kid {
            let _ = validate_kid(kid);
        }
    }
});
