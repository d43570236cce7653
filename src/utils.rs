//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

const DOCUMENT_HRP: &str = "doc_";

// construct a unique id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human shareable token given to every document at creation
pub fn new_document_token() -> anyhow::Result<String> {
    new_uuid_to_bech32(DOCUMENT_HRP)
}
