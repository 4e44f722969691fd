//! Paste content compression.

use async_compression::tokio::write::{GzipDecoder, GzipEncoder};
use async_compression::Level;
use bytes::Bytes;
use snip_core::config::CompressionConfig;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compress(std::io::Error),

    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("decompressed content is not valid UTF-8")]
    InvalidUtf8,
}

/// Gzip codec with a size threshold.
///
/// Content below the threshold passes through unchanged; everything else is
/// compressed at the configured level. Deterministic, stateless, and an
/// exact inverse of itself for every input including empty content.
#[derive(Clone, Copy, Debug)]
pub struct ContentCodec {
    threshold_bytes: usize,
    level: u32,
}

impl ContentCodec {
    /// Create a codec from configuration.
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            threshold_bytes: config.threshold_bytes,
            level: config.level,
        }
    }

    /// Compress content if it clears the threshold.
    ///
    /// Returns the stored representation and whether compression was
    /// applied.
    pub async fn compress(&self, data: &[u8]) -> Result<(Bytes, bool), CodecError> {
        if data.len() < self.threshold_bytes {
            return Ok((Bytes::copy_from_slice(data), false));
        }

        let mut encoder =
            GzipEncoder::with_quality(Vec::new(), Level::Precise(self.level as i32));
        encoder.write_all(data).await.map_err(CodecError::Compress)?;
        encoder.shutdown().await.map_err(CodecError::Compress)?;
        Ok((Bytes::from(encoder.into_inner()), true))
    }

    /// Invert [`ContentCodec::compress`].
    pub async fn decompress(&self, data: &[u8], compressed: bool) -> Result<Bytes, CodecError> {
        if !compressed {
            return Ok(Bytes::copy_from_slice(data));
        }

        let mut decoder = GzipDecoder::new(Vec::new());
        decoder
            .write_all(data)
            .await
            .map_err(CodecError::Decompress)?;
        decoder.shutdown().await.map_err(CodecError::Decompress)?;
        Ok(Bytes::from(decoder.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(threshold: usize) -> ContentCodec {
        ContentCodec::new(CompressionConfig {
            threshold_bytes: threshold,
            level: 6,
        })
    }

    #[tokio::test]
    async fn test_roundtrip_empty() {
        let codec = codec(0);
        let (stored, compressed) = codec.compress(b"").await.unwrap();
        let back = codec.decompress(&stored, compressed).await.unwrap();
        assert_eq!(back.as_ref(), b"");
    }

    #[tokio::test]
    async fn test_below_threshold_passes_through() {
        let codec = codec(1024);
        let data = b"short content";
        let (stored, compressed) = codec.compress(data).await.unwrap();

        assert!(!compressed);
        assert_eq!(stored.as_ref(), data);

        let back = codec.decompress(&stored, compressed).await.unwrap();
        assert_eq!(back.as_ref(), data);
    }

    #[tokio::test]
    async fn test_above_threshold_compresses_and_roundtrips() {
        let codec = codec(64);
        let data = "repetitive paste content ".repeat(100);
        let (stored, compressed) = codec.compress(data.as_bytes()).await.unwrap();

        assert!(compressed);
        assert!(stored.len() < data.len());

        let back = codec.decompress(&stored, compressed).await.unwrap();
        assert_eq!(back.as_ref(), data.as_bytes());
    }

    #[tokio::test]
    async fn test_roundtrip_at_exact_threshold() {
        let codec = codec(16);
        let data = vec![7u8; 16];
        let (stored, compressed) = codec.compress(&data).await.unwrap();
        assert!(compressed);

        let back = codec.decompress(&stored, compressed).await.unwrap();
        assert_eq!(back.as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_roundtrip_incompressible_data() {
        let codec = codec(1);
        // A fixed pseudo-random byte pattern; gzip gains nothing here but
        // the roundtrip must still be exact.
        let data: Vec<u8> = (0u32..4096)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let (stored, compressed) = codec.compress(&data).await.unwrap();
        assert!(compressed);

        let back = codec.decompress(&stored, compressed).await.unwrap();
        assert_eq!(back.as_ref(), &data[..]);
    }
}
