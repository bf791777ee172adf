//! JFIF/progressive-JPEG marker-segment splitting, for framing a JPEG as a
//! replay-safe header (things a receiver needs before it can start
//! rendering) and data (entropy-coded scan segments, retransmittable
//! independently). Mirrors `jfif_splitter.jfif_splitter` byte for byte,
//! including its handling of `0xFF 0x00` byte-stuffing inside scan data
//! (the stuffing `0x00` is dropped rather than preserved — the same
//! simplification the original makes).

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::{Error, Result};

pub const SOI: u8 = 0xD8;
pub const APP0: u8 = 0xE0;
pub const DQT: u8 = 0xDB;
pub const DHT: u8 = 0xC4;
pub const SOS: u8 = 0xDA;
pub const EOI: u8 = 0xD9;
pub const SOF0: u8 = 0xC0;
pub const SOF2: u8 = 0xC2;

/// Splits a JFIF byte stream into a header (APP0/DQT/SOFn/DHT, depending on
/// `progressive`) and data (scan segments) part, and can merge them back
/// into a decodable image.
pub struct JfifSplitter {
    header: Vec<u8>,
    data: Vec<u8>,
    progressive: bool,
    header_complete: bool,
}

impl JfifSplitter {
    pub fn new(progressive: bool) -> Self {
        JfifSplitter {
            header: Vec::new(),
            data: Vec::new(),
            progressive,
            header_complete: false,
        }
    }

    /// Encodes `img` as JPEG and splits it.
    ///
    /// The `image` crate's JPEG encoder only produces baseline-sequential
    /// output (`SOF0`), never a true progressive (`SOF2`) bitstream. `split`
    /// routes whichever of the two actually shows up to the header, so
    /// progressive mode degrades to sequential mode on the wire rather than
    /// losing the frame header outright. See the JPEG open question in the
    /// design notes.
    pub fn set_image(&mut self, img: &DynamicImage, size: Option<(u32, u32)>, quality: u8) -> Result<()> {
        let resized;
        let source = if let Some((w, h)) = size {
            resized = img.resize_exact(w, h, image::imageops::FilterType::Lanczos3);
            &resized
        } else {
            img
        };

        let mut encoded = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
        encoder
            .encode_image(source)
            .map_err(|e| Error::Image(e.to_string()))?;

        self.split(&encoded);
        Ok(())
    }

    /// Reassembles the currently held header+data into a decodable image.
    pub fn get_image(&self) -> Option<DynamicImage> {
        if !self.header_complete {
            return None;
        }
        image::load_from_memory_with_format(&self.merge(), ImageFormat::Jpeg).ok()
    }

    pub fn reset(&mut self) {
        self.header.clear();
        self.data.clear();
        self.header_complete = false;
    }

    pub fn add_header(&mut self, header: &[u8], complete: bool) {
        self.header.extend_from_slice(header);
        self.header_complete = complete;
    }

    pub fn header_finish(&mut self) {
        self.header_complete = true;
    }

    pub fn is_header_complete(&self) -> bool {
        self.header_complete
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn header_size(&self) -> usize {
        self.header.len()
    }

    pub fn add_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    fn merge(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.header.len() + self.data.len());
        out.push(0xFF);
        out.push(SOI);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.data);
        out.push(0xFF);
        out.push(EOI);
        out
    }

    fn split(&mut self, bytes: &[u8]) {
        self.header.clear();
        self.data.clear();

        let mut pos = 0usize;
        while pos < bytes.len() {
            let b = bytes[pos];
            pos += 1;
            if b != 0xFF {
                continue;
            }
            if pos >= bytes.len() {
                break;
            }
            let marker = bytes[pos];
            pos += 1;

            if marker == EOI {
                break;
            } else if marker == APP0
                || marker == DQT
                || marker == SOF2
                || marker == SOF0
                || (marker == DHT && !self.progressive)
            {
                // SOF0/SOF2 both always route to the header regardless of
                // `self.progressive`: the `image` crate's encoder only ever
                // emits baseline SOF0, even when progressive mode is
                // requested, so gating SOF0 on `!self.progressive` would
                // silently drop the frame header from every
                // progressive-configured transfer.
                match append_tag(bytes, pos, marker) {
                    Some((next, bytes_out)) => {
                        self.header.extend_from_slice(&bytes_out);
                        pos = next;
                    }
                    None => break,
                }
            } else if marker == DHT && self.progressive {
                match append_tag(bytes, pos, marker) {
                    Some((next, bytes_out)) => {
                        self.data.extend_from_slice(&bytes_out);
                        pos = next;
                    }
                    None => break,
                }
            } else if marker == SOS {
                pos = append_sos(bytes, pos, &mut self.data);
            }
        }

        self.header_complete = true;
    }
}

/// Reads a length-prefixed marker segment (`FF <marker> <len_hi> <len_lo>
/// <len-2 bytes of data>`) and returns the segment bytes (including the
/// `FF <marker>` prefix) plus the position just past it.
fn append_tag(bytes: &[u8], pos: usize, marker: u8) -> Option<(usize, Vec<u8>)> {
    if pos + 2 > bytes.len() {
        return None;
    }
    let size = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
    if size < 2 || pos + size > bytes.len() {
        return None;
    }
    let data_end = pos + size;
    let mut out = Vec::with_capacity(2 + size);
    out.push(0xFF);
    out.push(marker);
    out.extend_from_slice(&bytes[pos..data_end]);
    Some((data_end, out))
}

/// Copies a start-of-scan segment's entropy-coded data until the next real
/// marker, collapsing `FF 00` byte-stuffing down to a bare `FF`.
fn append_sos(bytes: &[u8], mut pos: usize, target: &mut Vec<u8>) -> usize {
    target.push(0xFF);
    target.push(SOS);

    while pos < bytes.len() {
        let b = bytes[pos];
        pos += 1;
        if b == 0xFF {
            if pos >= bytes.len() {
                break;
            }
            let next = bytes[pos];
            pos += 1;
            if next == 0x00 {
                target.push(0xFF);
            } else {
                pos -= 2;
                break;
            }
        } else {
            target.push(b);
        }
    }

    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_jfif(sof_marker: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, SOI];
        // APP0
        bytes.extend_from_slice(&[0xFF, APP0, 0x00, 0x04, 0xAA, 0xBB]);
        // DQT
        bytes.extend_from_slice(&[0xFF, DQT, 0x00, 0x04, 0xCC, 0xDD]);
        // SOFn
        bytes.extend_from_slice(&[0xFF, sof_marker, 0x00, 0x04, 0x11, 0x22]);
        // DHT
        bytes.extend_from_slice(&[0xFF, DHT, 0x00, 0x04, 0x33, 0x44]);
        // SOS with stuffed 0xFF in entropy data
        bytes.extend_from_slice(&[0xFF, SOS, 0x00, 0x04, 0x55, 0x66]);
        bytes.extend_from_slice(&[0x01, 0x02, 0xFF, 0x00, 0x03]);
        bytes.extend_from_slice(&[0xFF, EOI]);
        bytes
    }

    #[test]
    fn sequential_routes_sof0_and_dht_to_header() {
        let raw = build_minimal_jfif(SOF0);
        let mut splitter = JfifSplitter::new(false);
        splitter.split(&raw);
        assert!(splitter.is_header_complete());
        assert!(splitter.header().windows(2).any(|w| w == [0xFF, SOF0]));
        assert!(splitter.header().windows(2).any(|w| w == [0xFF, DHT]));
    }

    #[test]
    fn progressive_routes_sof2_to_header_and_dht_to_data() {
        let raw = build_minimal_jfif(SOF2);
        let mut splitter = JfifSplitter::new(true);
        splitter.split(&raw);
        assert!(splitter.header().windows(2).any(|w| w == [0xFF, SOF2]));
        assert!(splitter.data().windows(2).any(|w| w == [0xFF, DHT]));
    }

    #[test]
    fn sos_collapses_ff00_stuffing() {
        let raw = build_minimal_jfif(SOF0);
        let mut splitter = JfifSplitter::new(false);
        splitter.split(&raw);
        // data = SOS header (FF DA 00 04 55 66) + entropy (01 02 FF 03)
        assert_eq!(
            splitter.data(),
            &[0xFF, SOS, 0x00, 0x04, 0x55, 0x66, 0x01, 0x02, 0xFF, 0x03]
        );
    }

    #[test]
    fn merge_roundtrips_the_wrapper_bytes() {
        let raw = build_minimal_jfif(SOF0);
        let mut splitter = JfifSplitter::new(false);
        splitter.split(&raw);
        let merged = splitter.merge();
        assert_eq!(&merged[0..2], &[0xFF, SOI]);
        assert_eq!(&merged[merged.len() - 2..], &[0xFF, EOI]);
    }

    #[test]
    fn incomplete_split_before_any_split_call() {
        let splitter = JfifSplitter::new(true);
        assert!(!splitter.is_header_complete());
        assert!(splitter.get_image().is_none());
    }

    #[test]
    fn progressive_config_survives_the_real_encoders_baseline_output() {
        // The image crate's encoder emits SOF0 even when `progressive` is
        // set, so this exercises the exact mismatch that used to drop the
        // frame header entirely.
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
        }));

        let mut splitter = JfifSplitter::new(true);
        splitter.set_image(&img, None, 60).unwrap();

        assert!(splitter.header_size() > 0);
        assert!(splitter.header().windows(2).any(|w| w == [0xFF, SOF0]));
        assert!(splitter.get_image().is_some());
    }
}
