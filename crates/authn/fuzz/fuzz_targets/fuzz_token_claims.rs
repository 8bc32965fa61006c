//! Structured fuzz target for token claim parsing.
//!
//! Uses the `arbitrary` crate to generate structured token-like inputs,
//! assembles them into compact tokens, and feeds them through header and
//! claim parsing. This reaches deeper code paths than raw byte fuzzing
//! because the inputs have plausible structure.

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};
use tollgate_authn::{validate_algorithm, validation::validate_kid, verifier::parse_token};

/// Structured input representing a fuzzed token.
#[derive(Debug, Arbitrary)]
struct FuzzedToken {
    alg: FuzzedAlg,
    kid: Option<String>,
    sub: String,
    iss: String,
    exp: u64,
    iat: Option<u64>,
    role: FuzzedRole,
    signature_bytes: Vec<u8>,
    include_typ: bool,
}

/// Algorithm values covering known attack vectors.
#[derive(Debug, Arbitrary)]
enum FuzzedAlg {
    RS256,
    EdDSA,
    None,
    HS256,
    HS384,
    HS512,
    ES256,
    Other(String),
}

impl FuzzedAlg {
    fn as_str(&self) -> &str {
        match self {
            Self::RS256 => "RS256",
            Self::EdDSA => "EdDSA",
            Self::None => "none",
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::ES256 => "ES256",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzedRole {
    User,
    Privileged,
    Missing,
    Other(String),
}

fn build_token(input: &FuzzedToken) -> String {
    let mut header = Map::new();
    header.insert("alg".to_owned(), Value::from(input.alg.as_str()));
    if input.include_typ {
        header.insert("typ".to_owned(), Value::from("JWT"));
    }
    if let Some(ref kid) = input.kid {
        header.insert("kid".to_owned(), Value::from(kid.as_str()));
    }

    let mut payload = Map::new();
    payload.insert("sub".to_owned(), Value::from(input.sub.as_str()));
    payload.insert("iss".to_owned(), Value::from(input.iss.as_str()));
    payload.insert("exp".to_owned(), Value::from(input.exp));
    if let Some(iat) = input.iat {
        payload.insert("iat".to_owned(), Value::from(iat));
    }
    match input.role {
        FuzzedRole::User => {
            payload.insert("ROLE".to_owned(), Value::from("USER"));
        },
        FuzzedRole::Privileged => {
            payload.insert("ROLE".to_owned(), Value::from("PRIVILEGED"));
        },
        FuzzedRole::Missing => {},
        FuzzedRole::Other(ref role) => {
            payload.insert("ROLE".to_owned(), Value::from(role.as_str()));
        },
    }

    let header_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Value::Object(header)).unwrap_or_default());
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Value::Object(payload)).unwrap_or_default());
    let sig_b64 = URL_SAFE_NO_PAD.encode(&input.signature_bytes);

    format!("{header_b64}.{payload_b64}.{sig_b64}")
}

fuzz_target!(|input: FuzzedToken| {
    let token = build_token(&input);

    if let Ok(header) = parse_token(&token) {
        let _ = validate_algorithm(&format!("{:?}", header.alg));
        if let Some(ref kid) = header.kid {
            let _ = validate_kid(kid);
        }
    }
});
