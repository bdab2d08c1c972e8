//! Cluster decompression for the ZIM format.
//!
//! The low 4 bits of a cluster's first byte select the algorithm:
//! - 0 / 1: no compression
//! - 4: DEFLATE
//! - 5: LZMA/XZ, with a zstd fallback for mislabeled archives
//! - 6: zstd

use std::io::Read;

use flate2::read::DeflateDecoder;
use log::trace;
use xz2::read::XzDecoder;

use super::error::{Result, ZimError};

/// Compression tags as stored in the cluster info byte.
pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_NONE_ALT: u8 = 1;
pub const COMPRESSION_DEFLATE: u8 = 4;
pub const COMPRESSION_XZ: u8 = 5;
pub const COMPRESSION_ZSTD: u8 = 6;

/// Maximum zstd window log accepted in low-memory mode (8 MiB window).
const LOW_MEMORY_WINDOW_LOG_MAX: u32 = 23;

/// Decompresses a raw cluster payload according to its compression tag.
///
/// Tag 5 is nominally XZ, but some archives in the wild label zstd
/// clusters with it; when XZ decoding fails the payload is retried as
/// zstd before the error is surfaced.
pub fn decompress_cluster(tag: u8, payload: &[u8], low_memory: bool) -> Result<Vec<u8>> {
    match tag {
        COMPRESSION_NONE | COMPRESSION_NONE_ALT => {
            trace!("cluster uncompressed, copying {} bytes", payload.len());
            Ok(payload.to_vec())
        }
        COMPRESSION_DEFLATE => {
            trace!("decompressing DEFLATE cluster: {} bytes", payload.len());
            let mut out = Vec::new();
            DeflateDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| {
                    ZimError::DecompressionFailed(format!("DEFLATE decompression failed: {e}"))
                })?;
            Ok(out)
        }
        COMPRESSION_XZ => {
            trace!("decompressing XZ cluster: {} bytes", payload.len());
            let mut out = Vec::new();
            match XzDecoder::new(payload).read_to_end(&mut out) {
                Ok(_) => Ok(out),
                Err(xz_err) => decompress_zstd(payload, low_memory).map_err(|zstd_err| {
                    ZimError::DecompressionFailed(format!(
                        "XZ decompression failed ({xz_err}); zstd fallback also failed ({zstd_err})"
                    ))
                }),
            }
        }
        COMPRESSION_ZSTD => {
            trace!("decompressing zstd cluster: {} bytes", payload.len());
            decompress_zstd(payload, low_memory)
                .map_err(|e| ZimError::DecompressionFailed(format!("zstd decompression failed: {e}")))
        }
        other => Err(ZimError::UnsupportedCompression(other)),
    }
}

// Streaming decode keeps the working set at one window rather than one
// frame; low-memory mode additionally caps the window the decoder will
// accept.
fn decompress_zstd(payload: &[u8], low_memory: bool) -> std::io::Result<Vec<u8>> {
    let mut decoder = zstd::stream::read::Decoder::new(payload)?;
    if low_memory {
        decoder.window_log_max(LOW_MEMORY_WINDOW_LOG_MAX)?;
    }
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
