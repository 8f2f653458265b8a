/*
[INPUT]:  API key pair and request parameters
[OUTPUT]: HMAC-SHA256 signatures and signed auth payloads
[POS]:    Auth layer - signing for the authenticated trade stream
[UPDATE]: When auth flow or signature methods change
*/

pub mod signer;

pub use signer::{
    Credentials, HmacSigner, SIGNATURE_METHOD, SIGNATURE_VERSION, compute_hmac256,
    encode_canonical_query,
};
