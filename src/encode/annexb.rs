use crate::job::model::Codec;

const H264_AUD: u8 = 9;
const H264_IDR: u8 = 5;
const HEVC_AUD: u8 = 35;

/// NAL unit type of the header byte(s) following a start code.
fn nal_type(codec: Codec, header: u8) -> u8 {
    match codec {
        Codec::H264 => header & 0x1f,
        Codec::H265 => (header >> 1) & 0x3f,
    }
}

/// Positions `(start, header)` of every start code in `buf` at or after `from`.
///
/// `start` includes the leading zero of a 4-byte start code; `header` is the first NAL byte.
fn start_codes(buf: &[u8], from: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let end = buf.len().saturating_sub(3);
    (from..end).filter_map(move |i| {
        (buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1).then(|| {
            let start = if i > 0 && buf[i - 1] == 0 { i - 1 } else { i };
            (start, i + 3)
        })
    })
}

/// `true` when the access unit contains a random access point.
pub fn is_keyframe(codec: Codec, au: &[u8]) -> bool {
    start_codes(au, 0).any(|(_, h)| {
        let t = nal_type(codec, au[h]);
        match codec {
            Codec::H264 => t == H264_IDR,
            Codec::H265 => (16..=21).contains(&t),
        }
    })
}

/// Incremental splitter of an Annex-B byte stream into access units at access unit delimiters.
///
/// The encoder is configured to emit a delimiter before every access unit, so a unit is complete
/// as soon as the next delimiter arrives.
#[derive(Debug)]
pub struct AccessUnitSplitter {
    codec: Codec,
    buf: Vec<u8>,
    scanned: usize,
}

impl AccessUnitSplitter {
    /// Empty splitter for `codec`.
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Append bytes, returning every access unit they completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.next_delimiter() {
            let rest = self.buf.split_off(pos);
            out.push(std::mem::replace(&mut self.buf, rest));
            self.scanned = 0;
        }
        // a start code may straddle the end of the buffer
        self.scanned = self.buf.len().saturating_sub(4);
        out
    }

    /// The trailing access unit, if any bytes are left.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        (!self.buf.is_empty()).then(|| std::mem::take(&mut self.buf))
    }

    fn next_delimiter(&self) -> Option<usize> {
        let aud = match self.codec {
            Codec::H264 => H264_AUD,
            Codec::H265 => HEVC_AUD,
        };
        start_codes(&self.buf, self.scanned)
            .find(|&(start, h)| start > 0 && nal_type(self.codec, self.buf[h]) == aud)
            .map(|(start, _)| start)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/annexb.rs"]
mod tests;
