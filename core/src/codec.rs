use crate::types::BlockChecksum;
use crate::{Error, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compress a block payload for upload.
pub fn compress_block(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Decompress a stored block and verify the plaintext against the checksum
/// it is addressed by. A mismatch means the store handed back a block that
/// does not match its name.
pub fn decompress_and_verify(data: &[u8], expected: &BlockChecksum) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut payload = Vec::new();
    decoder
        .read_to_end(&mut payload)
        .map_err(|e| Error::CorruptBlock(e.to_string()))?;

    let actual = BlockChecksum::from_data(&payload);
    if actual != *expected {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }

    Ok(Bytes::from(payload))
}
