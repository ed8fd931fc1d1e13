//! Container sniffing and MPEG frame handling for raw concatenation.

/// Audio container formats that can be concatenated without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    /// Detect the format from leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WAVE" {
            return Some(Self::Wav);
        }
        if data.starts_with(b"ID3") || is_frame_sync(data) {
            return Some(Self::Mp3);
        }
        None
    }

    /// File extension for segments of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

const ID3V1_LEN: usize = 128;

fn is_frame_sync(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0
}

/// Strip ID3v2 headers and an ID3v1 trailer, leaving bare MPEG frames.
///
/// Returns `None` if what remains does not start with a frame sync.
pub fn mp3_frames(data: &[u8]) -> Option<&[u8]> {
    let mut body = data;

    // Several ID3v2 tags may be stacked.
    while body.len() >= 10 && body.starts_with(b"ID3") {
        let flags = body[5];
        let size = syncsafe(&body[6..10])?;
        let footer = if flags & 0x10 != 0 { 10 } else { 0 };
        let tag_len = 10 + size + footer;
        if tag_len > body.len() {
            return None;
        }
        body = &body[tag_len..];
    }

    if has_id3v1_trailer(body) {
        body = &body[..body.len() - ID3V1_LEN];
    }

    if is_frame_sync(body) { Some(body) } else { None }
}

/// True when the last 128 bytes are a `TAG` block that begins exactly where
/// the frame sequence ends. `TAG` bytes inside frame data do not count.
fn has_id3v1_trailer(body: &[u8]) -> bool {
    if body.len() < ID3V1_LEN {
        return false;
    }
    let tag_start = body.len() - ID3V1_LEN;
    if &body[tag_start..tag_start + 3] != b"TAG" {
        return false;
    }

    let mut pos = 0;
    while pos < tag_start {
        match frame_len(&body[pos..]) {
            Some(len) => pos += len,
            None => return false,
        }
    }
    pos == tag_start
}

/// Byte length of the MPEG audio frame whose header starts `data`.
fn frame_len(data: &[u8]) -> Option<usize> {
    if data.len() < 4 || !is_frame_sync(data) {
        return None;
    }

    // 0 = MPEG 2.5, 2 = MPEG 2, 3 = MPEG 1
    let version = (data[1] >> 3) & 0x03;
    // 1 = Layer III, 2 = Layer II, 3 = Layer I
    let layer = (data[1] >> 1) & 0x03;
    let bitrate_index = (data[2] >> 4) as usize;
    let rate_index = ((data[2] >> 2) & 0x03) as usize;
    let padding = ((data[2] >> 1) & 0x01) as usize;

    if version == 1 || layer == 0 || bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
        return None;
    }

    let mpeg1 = version == 3;
    let kbps: [usize; 15] = match (mpeg1, layer) {
        (true, 3) => [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        (true, 2) => [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        (true, _) => [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
        (false, 3) => [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        (false, _) => [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    };
    let base_rate = [44100, 48000, 32000][rate_index];
    let sample_rate = match version {
        3 => base_rate,
        2 => base_rate / 2,
        _ => base_rate / 4,
    };
    let bitrate = kbps[bitrate_index] * 1000;

    let len = match layer {
        3 => (12 * bitrate / sample_rate + padding) * 4,
        2 => 144 * bitrate / sample_rate + padding,
        _ if mpeg1 => 144 * bitrate / sample_rate + padding,
        _ => 72 * bitrate / sample_rate + padding,
    };
    Some(len)
}

/// Decode a 4-byte ID3 syncsafe integer.
fn syncsafe(bytes: &[u8]) -> Option<usize> {
    if bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    Some(bytes.iter().fold(0usize, |acc, b| (acc << 7) | *b as usize))
}
