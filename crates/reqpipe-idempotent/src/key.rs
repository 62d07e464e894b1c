//! Idempotency key derivation.
//!
//! The key is a digest of the canonical request description: method, url,
//! canonical body, canonical params, and the selected headers. Identical
//! requests therefore collapse onto one key regardless of param insertion
//! order.

use sha2::{Digest, Sha256};

use reqpipe_core::canonical::{body_canonical, fnv1a_hex, simple_digest, stable_stringify};
use reqpipe_core::RequestConfig;

use crate::config::{HashAlgorithm, IdempotentOptions};

pub(crate) fn derive_key(config: &RequestConfig, options: &IdempotentOptions) -> String {
    if let Some(key) = &options.key {
        return key.clone();
    }

    let mut input = String::new();
    input.push_str(config.method.as_str());
    input.push('|');
    input.push_str(&config.url);
    input.push('|');
    match &config.data {
        Some(body) => input.push_str(&stable_stringify(&body_canonical(body))),
        None => input.push_str("null"),
    }
    input.push('|');
    let params: serde_json::Map<String, serde_json::Value> = config
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    input.push_str(&stable_stringify(&serde_json::Value::Object(params)));
    input.push('|');
    write_headers(&mut input, config, options);

    match options.hash_algorithm {
        HashAlgorithm::Fnv1a => format!("idem-{}", fnv1a_hex(input.as_bytes())),
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(input.as_bytes());
            let mut hex = String::with_capacity(digest.len() * 2 + 5);
            hex.push_str("idem-");
            for byte in digest {
                hex.push_str(&format!("{byte:02x}"));
            }
            hex
        }
        HashAlgorithm::Simple => format!("idem-{}", simple_digest(&input)),
    }
}

fn write_headers(input: &mut String, config: &RequestConfig, options: &IdempotentOptions) {
    if options.include_all_headers {
        // Headers iterate in sorted (lowercased) order already.
        for (name, value) in config.headers.iter() {
            input.push_str(name);
            input.push('=');
            input.push_str(value);
            input.push(';');
        }
        return;
    }
    let mut names: Vec<String> = options
        .include_headers
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    names.sort();
    names.dedup();
    for name in names {
        if let Some(value) = config.headers.get(&name) {
            input.push_str(&name);
            input.push('=');
            input.push_str(value);
            input.push(';');
        }
    }
}
