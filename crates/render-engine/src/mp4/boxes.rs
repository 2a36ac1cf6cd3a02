//! ISO BMFF box serialization for progressive (non-fragmented) MP4.
//!
//! Every box is `size (u32 BE) | type (4 ASCII bytes) | content`. Full boxes
//! prefix their content with `version (u8) | flags (u24)`.

use bytes::{BufMut, BytesMut};

/// Timescale of the movie header and edit lists (milliseconds).
pub(crate) const MOVIE_TIMESCALE: u32 = 1_000;

const IDENTITY_MATRIX: [u32; 9] = [
    0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000,
];

pub(crate) fn write_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + content.len());
    out.put_u32((8 + content.len()) as u32);
    out.put_slice(box_type);
    out.put_slice(content);
    out
}

pub(crate) fn write_container_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let len: usize = children.iter().map(|c| c.len()).sum();
    let mut out = Vec::with_capacity(8 + len);
    out.put_u32((8 + len) as u32);
    out.put_slice(box_type);
    for child in children {
        out.put_slice(child);
    }
    out
}

/// Start the content of a full box.
fn fullbox(version: u8, flags: u32, capacity: usize) -> BytesMut {
    let mut content = BytesMut::with_capacity(4 + capacity);
    content.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    content
}

pub(crate) fn write_ftyp() -> Vec<u8> {
    let mut content = BytesMut::with_capacity(20);
    content.put_slice(b"isom");
    content.put_u32(0x200);
    content.put_slice(b"isom");
    content.put_slice(b"iso2");
    content.put_slice(b"mp41");
    write_box(b"ftyp", &content)
}

/// `mdat` header, switching to a 64-bit size when the payload needs it.
pub(crate) fn write_mdat_header(data_size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    if data_size + 8 > u32::MAX as u64 {
        out.put_u32(1);
        out.put_slice(b"mdat");
        out.put_u64(data_size + 16);
    } else {
        out.put_u32((data_size + 8) as u32);
        out.put_slice(b"mdat");
    }
    out
}

pub(crate) fn write_mvhd(duration_ms: u64, next_track_id: u32) -> Vec<u8> {
    let mut c = fullbox(1, 0, 108);
    c.put_u64(0); // creation_time
    c.put_u64(0); // modification_time
    c.put_u32(MOVIE_TIMESCALE);
    c.put_u64(duration_ms);
    c.put_u32(0x0001_0000); // rate 1.0
    c.put_u16(0x0100); // volume 1.0
    c.put_bytes(0, 10);
    for v in IDENTITY_MATRIX {
        c.put_u32(v);
    }
    c.put_bytes(0, 24);
    c.put_u32(next_track_id);
    write_box(b"mvhd", &c)
}

pub(crate) fn write_tkhd(track_id: u32, duration_ms: u64, width: u32, height: u32, is_audio: bool) -> Vec<u8> {
    // enabled | in_movie | in_preview
    let mut c = fullbox(1, 7, 92);
    c.put_u64(0);
    c.put_u64(0);
    c.put_u32(track_id);
    c.put_u32(0);
    c.put_u64(duration_ms);
    c.put_bytes(0, 8);
    c.put_u16(0); // layer
    c.put_u16(0); // alternate_group
    c.put_u16(if is_audio { 0x0100 } else { 0 });
    c.put_u16(0);
    for v in IDENTITY_MATRIX {
        c.put_u32(v);
    }
    c.put_u32(width << 16);
    c.put_u32(height << 16);
    write_box(b"tkhd", &c)
}

/// Edit list delaying a track that starts after zero.
pub(crate) fn write_edts(start_ms: u64, duration_ms: u64) -> Vec<u8> {
    let mut c = fullbox(1, 0, 44);
    c.put_u32(2);
    // Empty edit.
    c.put_u64(start_ms);
    c.put_i64(-1);
    c.put_u32(0x0001_0000);
    // Media from its first sample.
    c.put_u64(duration_ms);
    c.put_i64(0);
    c.put_u32(0x0001_0000);
    let elst = write_box(b"elst", &c);
    write_container_box(b"edts", &[&elst])
}

pub(crate) fn write_mdhd(timescale: u32, duration: u64) -> Vec<u8> {
    let mut c = fullbox(1, 0, 32);
    c.put_u64(0);
    c.put_u64(0);
    c.put_u32(timescale);
    c.put_u64(duration);
    c.put_u16(0x55C4); // language: und
    c.put_u16(0);
    write_box(b"mdhd", &c)
}

pub(crate) fn write_hdlr(handler_type: &[u8; 4], name: &str) -> Vec<u8> {
    let mut c = fullbox(0, 0, 21 + name.len());
    c.put_u32(0);
    c.put_slice(handler_type);
    c.put_bytes(0, 12);
    c.put_slice(name.as_bytes());
    c.put_u8(0);
    write_box(b"hdlr", &c)
}

pub(crate) fn write_vmhd() -> Vec<u8> {
    let mut c = fullbox(0, 1, 8);
    c.put_u16(0);
    c.put_bytes(0, 6);
    write_box(b"vmhd", &c)
}

pub(crate) fn write_smhd() -> Vec<u8> {
    let mut c = fullbox(0, 0, 4);
    c.put_u16(0);
    c.put_u16(0);
    write_box(b"smhd", &c)
}

pub(crate) fn write_dinf() -> Vec<u8> {
    // Self-contained data reference.
    let url = write_box(b"url ", &fullbox(0, 1, 0));
    let mut dref = fullbox(0, 0, 4 + url.len());
    dref.put_u32(1);
    dref.put_slice(&url);
    let dref = write_box(b"dref", &dref);
    write_container_box(b"dinf", &[&dref])
}

pub(crate) fn write_stsd(sample_entry: &[u8]) -> Vec<u8> {
    let mut c = fullbox(0, 0, 4 + sample_entry.len());
    c.put_u32(1);
    c.put_slice(sample_entry);
    write_box(b"stsd", &c)
}

/// Visual sample entry with an optional codec configuration box.
pub(crate) fn write_visual_sample_entry(
    fourcc: &[u8; 4],
    width: u32,
    height: u32,
    config: Option<(&[u8; 4], &[u8])>,
) -> Vec<u8> {
    let mut e = BytesMut::with_capacity(78);
    e.put_bytes(0, 6);
    e.put_u16(1); // data_reference_index
    e.put_bytes(0, 16);
    e.put_u16(width as u16);
    e.put_u16(height as u16);
    e.put_u32(0x0048_0000); // 72 dpi
    e.put_u32(0x0048_0000);
    e.put_u32(0);
    e.put_u16(1); // frame_count
    e.put_bytes(0, 32); // compressorname
    e.put_u16(0x0018);
    e.put_i16(-1);
    if let Some((box_type, payload)) = config {
        e.put_slice(&write_box(box_type, payload));
    }
    write_box(fourcc, &e)
}

/// Audio sample entry with an optional codec configuration box.
pub(crate) fn write_audio_sample_entry(
    fourcc: &[u8; 4],
    sample_rate: u32,
    channels: u16,
    sample_size: u16,
    config: Option<(&[u8; 4], &[u8])>,
) -> Vec<u8> {
    let mut e = BytesMut::with_capacity(28);
    e.put_bytes(0, 6);
    e.put_u16(1);
    e.put_bytes(0, 8);
    e.put_u16(channels);
    e.put_u16(sample_size);
    e.put_u16(0);
    e.put_u16(0);
    // 16.16 fixed point; rates that do not fit are left to the config box.
    e.put_u32(if sample_rate > 0xFFFF { 0 } else { sample_rate << 16 });
    if let Some((box_type, payload)) = config {
        e.put_slice(&write_box(box_type, payload));
    }
    write_box(fourcc, &e)
}

/// `esds` content wrapping an AudioSpecificConfig.
pub(crate) fn esds_payload(audio_specific_config: &[u8], bitrate: u32) -> Vec<u8> {
    fn descriptor(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut d = Vec::with_capacity(5 + body.len());
        d.put_u8(tag);
        // Four-byte expandable length.
        let len = body.len() as u32;
        d.put_u8(0x80 | ((len >> 21) & 0x7F) as u8);
        d.put_u8(0x80 | ((len >> 14) & 0x7F) as u8);
        d.put_u8(0x80 | ((len >> 7) & 0x7F) as u8);
        d.put_u8((len & 0x7F) as u8);
        d.put_slice(body);
        d
    }

    let dsi = descriptor(0x05, audio_specific_config);

    let mut dcd = Vec::with_capacity(13 + dsi.len());
    dcd.put_u8(0x40); // MPEG-4 audio
    dcd.put_u8(0x15); // audio stream
    dcd.put_slice(&[0, 0, 0]); // buffer size
    dcd.put_u32(bitrate);
    dcd.put_u32(bitrate);
    dcd.put_slice(&dsi);
    let dcd = descriptor(0x04, &dcd);

    let sl = descriptor(0x06, &[0x02]);

    let mut es = Vec::with_capacity(3 + dcd.len() + sl.len());
    es.put_u16(1); // ES_ID
    es.put_u8(0);
    es.put_slice(&dcd);
    es.put_slice(&sl);
    let es = descriptor(0x03, &es);

    let mut c = fullbox(0, 0, es.len());
    c.put_slice(&es);
    c.to_vec()
}

/// `dOps` content for an Opus track without an explicit description.
pub(crate) fn dops_payload(sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut c = Vec::with_capacity(11);
    c.put_u8(0); // version
    c.put_u8(channels as u8);
    c.put_u16(0); // pre-skip
    c.put_u32(sample_rate);
    c.put_i16(0); // output gain
    c.put_u8(0); // channel mapping family
    c
}

/// Per-sample timing and size, in media timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SampleEntry {
    pub size: u32,
    pub duration: u32,
    pub is_sync: bool,
}

/// Sample table for a track stored as one contiguous chunk at `chunk_offset`.
pub(crate) fn write_stbl(stsd: &[u8], samples: &[SampleEntry], chunk_offset: u64) -> Vec<u8> {
    // stts: run-length encoded durations.
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for s in samples {
        match runs.last_mut() {
            Some((count, delta)) if *delta == s.duration => *count += 1,
            _ => runs.push((1, s.duration)),
        }
    }
    let mut stts = fullbox(0, 0, 4 + runs.len() * 8);
    stts.put_u32(runs.len() as u32);
    for (count, delta) in &runs {
        stts.put_u32(*count);
        stts.put_u32(*delta);
    }
    let stts = write_box(b"stts", &stts);

    // stss is omitted when every sample is a sync sample.
    let stss = if samples.iter().all(|s| s.is_sync) {
        Vec::new()
    } else {
        let sync: Vec<u32> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_sync)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        let mut c = fullbox(0, 0, 4 + sync.len() * 4);
        c.put_u32(sync.len() as u32);
        for n in sync {
            c.put_u32(n);
        }
        write_box(b"stss", &c)
    };

    let mut stsc = fullbox(0, 0, 16);
    if samples.is_empty() {
        stsc.put_u32(0);
    } else {
        stsc.put_u32(1);
        stsc.put_u32(1); // first_chunk
        stsc.put_u32(samples.len() as u32);
        stsc.put_u32(1); // sample_description_index
    }
    let stsc = write_box(b"stsc", &stsc);

    let mut stsz = fullbox(0, 0, 8 + samples.len() * 4);
    stsz.put_u32(0);
    stsz.put_u32(samples.len() as u32);
    for s in samples {
        stsz.put_u32(s.size);
    }
    let stsz = write_box(b"stsz", &stsz);

    let mut co64 = fullbox(0, 0, 12);
    if samples.is_empty() {
        co64.put_u32(0);
    } else {
        co64.put_u32(1);
        co64.put_u64(chunk_offset);
    }
    let co64 = write_box(b"co64", &co64);

    write_container_box(b"stbl", &[stsd, &stts, &stss, &stsc, &stsz, &co64])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    #[test]
    fn test_write_box_size_and_type() {
        let b = write_box(b"test", &[1, 2, 3]);
        assert_eq!(read_u32(&b, 0), 11);
        assert_eq!(&b[4..8], b"test");
    }

    #[test]
    fn test_mdat_header_switches_to_large_size() {
        assert_eq!(write_mdat_header(100).len(), 8);
        let large = write_mdat_header(u32::MAX as u64);
        assert_eq!(large.len(), 16);
        assert_eq!(read_u32(&large, 0), 1);
    }

    #[test]
    fn test_stts_is_run_length_encoded() {
        let samples = [
            SampleEntry { size: 1, duration: 3000, is_sync: true },
            SampleEntry { size: 1, duration: 3000, is_sync: false },
            SampleEntry { size: 1, duration: 1500, is_sync: false },
        ];
        let stbl = write_stbl(&write_stsd(&[]), &samples, 0);
        let pos = stbl.windows(4).position(|w| w == b"stts").unwrap();
        // entry_count follows type + version/flags.
        assert_eq!(read_u32(&stbl, pos + 8), 2);
        assert!(stbl.windows(4).any(|w| w == b"stss"));
    }

    #[test]
    fn test_esds_lengths_are_consistent() {
        let esds = esds_payload(&[0x12, 0x10], 128_000);
        // version/flags + ES descriptor tag.
        assert_eq!(esds[4], 0x03);
        assert_eq!(esds.len(), 4 + 5 + 3 + (5 + 13 + (5 + 2)) + (5 + 1));
    }
}
