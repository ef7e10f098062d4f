//! rsync-style signature, delta and patch primitives
//!
//! thin wrappers over `fast_rsync`. the engine treats signature and delta
//! bytes as opaque: they are stored verbatim as SIGDATA / DELTADATA payloads
//! and never interpreted, so the diffing implementation can change without
//! touching the object model.

use fast_rsync::{apply, diff, Signature, SignatureOptions};

use crate::error::{Error, Result};

/// rolling-hash block size for signatures (16 KiB)
const SIG_BLOCK_SIZE: u32 = 16 * 1024;

/// strong hash size per block, in bytes
const SIG_CRYPTO_HASH_SIZE: u32 = 8;

/// compute the signature of a file's current content
pub fn compute_signature(data: &[u8]) -> Vec<u8> {
    let options = SignatureOptions {
        block_size: SIG_BLOCK_SIZE,
        crypto_hash_size: SIG_CRYPTO_HASH_SIZE,
    };
    Signature::calculate(data, options).serialized().to_vec()
}

/// compute a delta from a stored signature to new content
pub fn compute_delta(signature: &[u8], new_data: &[u8]) -> Result<Vec<u8>> {
    let signature = Signature::deserialize(signature.to_vec())
        .map_err(|e| Error::Delta(e.to_string()))?;
    let indexed = signature.index();
    let mut out = Vec::new();
    diff(&indexed, new_data, &mut out).map_err(|e| Error::Delta(e.to_string()))?;
    Ok(out)
}

/// apply a delta to basis content, reconstructing the newer content
pub fn apply_delta(basis: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    apply(basis, delta, &mut out).map_err(|e| Error::Delta(e.to_string()))?;
    Ok(out)
}
