//! Single-file sample bundles and on-disk manifests.
//!
//! A bundle packs a demuxed source into one blob so it can travel as plain
//! bytes:
//!
//! ```text
//! "RCSB" | manifest length (u32 BE) | manifest JSON | payload
//! ```
//!
//! Sample offsets in the manifest are relative to the start of the payload.

use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::{DemuxedSource, SourceManifest};

use crate::backend::Demuxer;

/// Magic bytes at the start of every bundle.
pub const BUNDLE_MAGIC: &[u8; 4] = b"RCSB";

const HEADER_LEN: usize = 8;

/// Serialize a demuxed source into a bundle.
pub fn encode_bundle(source: &DemuxedSource) -> ReelcutResult<Bytes> {
    let (manifest, payload) = source.to_manifest();
    let manifest = serde_json::to_vec(&manifest)?;
    let manifest_len = u32::try_from(manifest.len())
        .map_err(|_| ReelcutError::invalid_input("bundle manifest exceeds 4 GiB"))?;

    let mut out = BytesMut::with_capacity(HEADER_LEN + manifest.len() + payload.len());
    out.put_slice(BUNDLE_MAGIC);
    out.put_u32(manifest_len);
    out.put_slice(&manifest);
    out.put_slice(&payload);
    Ok(out.freeze())
}

/// Whether `data` starts like a bundle.
pub fn is_bundle(data: &[u8]) -> bool {
    data.len() >= HEADER_LEN && &data[..4] == BUNDLE_MAGIC
}

/// Parse a bundle. Sample payloads are zero-copy slices of `data`.
pub fn decode_bundle(data: Bytes) -> ReelcutResult<DemuxedSource> {
    if !is_bundle(&data) {
        return Err(ReelcutError::demux("not a sample bundle"));
    }
    let mut header = &data[4..HEADER_LEN];
    let manifest_len = header.get_u32() as usize;
    let manifest_end = HEADER_LEN
        .checked_add(manifest_len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            ReelcutError::demux(format!(
                "bundle manifest of {manifest_len} bytes exceeds bundle of {} bytes",
                data.len()
            ))
        })?;

    let manifest: SourceManifest = serde_json::from_slice(&data[HEADER_LEN..manifest_end])
        .map_err(|e| ReelcutError::demux(format!("invalid bundle manifest: {e}")))?;
    let payload = data.slice(manifest_end..);
    Ok(DemuxedSource::from_manifest(&manifest, payload)?)
}

/// Demuxer for sample bundles.
#[derive(Debug, Default)]
pub struct BundleDemuxer;

impl Demuxer for BundleDemuxer {
    fn demux(&mut self, data: Bytes) -> ReelcutResult<DemuxedSource> {
        let source = decode_bundle(data)?;
        tracing::debug!(
            name = %source.name,
            duration_us = source.duration_us,
            has_audio = source.has_audio(),
            "Bundle demuxed"
        );
        Ok(source)
    }
}

/// Load a `manifest.json` and the payload file it names.
///
/// The payload path is resolved relative to the manifest. When the manifest
/// names none, `<manifest stem>.bin` next to it is used.
pub fn load_manifest(path: &Path) -> ReelcutResult<DemuxedSource> {
    if !path.exists() {
        return Err(ReelcutError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let manifest: SourceManifest = serde_json::from_str(&content)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let payload_path = match &manifest.payload {
        Some(p) => dir.join(p),
        None => path.with_extension("bin"),
    };
    let payload = if payload_path.exists() {
        Bytes::from(std::fs::read(&payload_path)?)
    } else if manifest.video.is_none() && manifest.audio.is_none() {
        Bytes::new()
    } else {
        return Err(ReelcutError::FileNotFound { path: payload_path });
    };

    tracing::info!(
        manifest = %path.display(),
        payload = %payload_path.display(),
        bytes = payload.len(),
        "Loaded source manifest"
    );
    Ok(DemuxedSource::from_manifest(&manifest, payload)?)
}

/// Load either a bundle or a manifest, judged by the file's first bytes.
pub fn load_source(path: &Path) -> ReelcutResult<DemuxedSource> {
    if !path.exists() {
        return Err(ReelcutError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let data = std::fs::read(path)?;
    if is_bundle(&data) {
        decode_bundle(Bytes::from(data))
    } else {
        load_manifest(path)
    }
}
