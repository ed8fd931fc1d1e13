//! Lossless in-process concatenation of MP3 or WAV segments.

use super::format::{AudioFormat, mp3_frames};
use super::{AudioAssembler, AudioSegment};
use crate::error::MergeError;
use hound::{SampleFormat, WavReader, WavWriter};
use log::debug;
use std::io::{Cursor, Read, Seek, Write};

/// Upper bound on the header bytes hound writes ahead of the sample data.
const WAV_HEADER_MAX: u64 = 80;

/// Concatenates segments without re-encoding.
///
/// MP3 segments are stripped of ID3 tags and their frames appended. WAV
/// segments must share one `WavSpec`; their samples are copied into a single
/// WAV stream. All segments must have the format of the first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatAssembler;

impl AudioAssembler for ConcatAssembler {
    fn merge(&self, segments: &[AudioSegment]) -> Result<Vec<u8>, MergeError> {
        if segments.is_empty() {
            return Err(MergeError::NoSegments);
        }

        let mut payloads = Vec::with_capacity(segments.len());
        for segment in segments {
            let bytes = std::fs::read(&segment.path).map_err(|e| MergeError::UnreadableSegment {
                index: segment.index,
                message: e.to_string(),
            })?;
            payloads.push((segment.index, bytes));
        }

        let (first_index, first) = &payloads[0];
        let format = AudioFormat::sniff(first)
            .ok_or(MergeError::UnrecognizedFormat { index: *first_index })?;

        let merged = match format {
            AudioFormat::Mp3 => concat_mp3(&payloads)?,
            AudioFormat::Wav => concat_wav(&payloads)?,
        };

        debug!(
            "Merged {} {} segments into {} bytes",
            segments.len(),
            format.extension(),
            merged.len()
        );
        Ok(merged)
    }
}

fn concat_mp3(payloads: &[(usize, Vec<u8>)]) -> Result<Vec<u8>, MergeError> {
    let mut out = Vec::with_capacity(payloads.iter().map(|(_, b)| b.len()).sum());

    for (index, bytes) in payloads {
        if AudioFormat::sniff(bytes) != Some(AudioFormat::Mp3) {
            return Err(format_error(*index, bytes));
        }
        let frames = mp3_frames(bytes).ok_or(MergeError::UnrecognizedFormat { index: *index })?;
        out.extend_from_slice(frames);
    }

    Ok(out)
}

fn concat_wav(payloads: &[(usize, Vec<u8>)]) -> Result<Vec<u8>, MergeError> {
    let mut readers = Vec::with_capacity(payloads.len());
    for (index, bytes) in payloads {
        if AudioFormat::sniff(bytes) != Some(AudioFormat::Wav) {
            return Err(format_error(*index, bytes));
        }
        let reader = WavReader::new(Cursor::new(bytes.as_slice()))
            .map_err(|_| MergeError::UnrecognizedFormat { index: *index })?;
        readers.push((*index, reader));
    }

    let spec = readers.first().map(|(_, r)| r.spec()).ok_or(MergeError::NoSegments)?;
    let bytes_per_sample = u64::from(spec.bits_per_sample.div_ceil(8));
    let mut data_bytes = 0u64;
    for (index, reader) in &readers {
        if reader.spec() != spec {
            return Err(MergeError::FormatMismatch { index: *index });
        }
        data_bytes += u64::from(reader.len()) * bytes_per_sample;
    }
    ensure_wav_fits(data_bytes)?;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
        for (index, mut reader) in readers {
            match spec.sample_format {
                SampleFormat::Int => copy_samples::<i32, _, _>(&mut reader, &mut writer, index)?,
                SampleFormat::Float => copy_samples::<f32, _, _>(&mut reader, &mut writer, index)?,
            }
        }
        writer.finalize().map_err(encode_error)?;
    }

    Ok(cursor.into_inner())
}

fn copy_samples<S, R, W>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<W>,
    index: usize,
) -> Result<(), MergeError>
where
    S: hound::Sample,
    R: Read,
    W: Write + Seek,
{
    for sample in reader.samples::<S>() {
        let sample = sample.map_err(|e| MergeError::UnreadableSegment {
            index,
            message: e.to_string(),
        })?;
        writer.write_sample(sample).map_err(encode_error)?;
    }
    Ok(())
}

/// RIFF sizes are 32-bit, so the joined file must stay under 4 GiB.
fn ensure_wav_fits(data_bytes: u64) -> Result<(), MergeError> {
    if data_bytes + WAV_HEADER_MAX > u64::from(u32::MAX) {
        return Err(MergeError::TooLarge { bytes: data_bytes });
    }
    Ok(())
}

fn encode_error(err: hound::Error) -> MergeError {
    MergeError::Encode(err.to_string())
}

/// A segment whose format differs from the first is a mismatch; one with no
/// recognizable format at all is unrecognized.
fn format_error(index: usize, bytes: &[u8]) -> MergeError {
    match AudioFormat::sniff(bytes) {
        Some(_) => MergeError::FormatMismatch { index },
        None => MergeError::UnrecognizedFormat { index },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::mock::mp3_frame;
    use hound::WavSpec;
    use std::path::Path;
    use tempfile::TempDir;

    fn mono_16bit(sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn wav_bytes(spec: WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for sample in samples {
                writer.write_sample(*sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn read_wav(bytes: &[u8]) -> (WavSpec, Vec<i16>) {
        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (reader.spec(), samples)
    }

    fn write_segment(dir: &Path, index: usize, bytes: &[u8]) -> AudioSegment {
        let path = dir.join(format!("chunk_{:04}.bin", index));
        std::fs::write(&path, bytes).unwrap();
        AudioSegment::new(index, path)
    }

    #[test]
    fn test_empty_input_is_error() {
        assert_eq!(ConcatAssembler.merge(&[]), Err(MergeError::NoSegments));
    }

    #[test]
    fn test_mp3_segments_joined_in_order() {
        let dir = TempDir::new().unwrap();
        let segments = vec![
            write_segment(dir.path(), 1, &mp3_frame(1)),
            write_segment(dir.path(), 3, &mp3_frame(3)),
        ];

        let merged = ConcatAssembler.merge(&segments).unwrap();
        let mut expected = mp3_frame(1);
        expected.extend(mp3_frame(3));
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_mp3_id3_tags_removed() {
        let dir = TempDir::new().unwrap();
        let mut tagged = b"ID3\x04\x00\x00\x00\x00\x00\x02ab".to_vec();
        tagged.extend(mp3_frame(7));

        let merged = ConcatAssembler
            .merge(&[write_segment(dir.path(), 0, &tagged)])
            .unwrap();
        assert_eq!(merged, mp3_frame(7));
    }

    #[test]
    fn test_wav_segments_joined_in_order() {
        let dir = TempDir::new().unwrap();
        let spec = mono_16bit(24000);
        let segments = vec![
            write_segment(dir.path(), 0, &wav_bytes(spec, &[1, 2])),
            write_segment(dir.path(), 2, &wav_bytes(spec, &[3, 4, -5])),
        ];

        let merged = ConcatAssembler.merge(&segments).unwrap();
        assert_eq!(AudioFormat::sniff(&merged), Some(AudioFormat::Wav));
        assert_eq!(read_wav(&merged), (spec, vec![1, 2, 3, 4, -5]));
    }

    #[test]
    fn test_wav_chunks_after_empty_data_are_not_samples() {
        // data chunk with length 0 followed by a LIST/INFO chunk
        let mut empty = b"RIFF\x00\x00\x00\x00WAVEfmt ".to_vec();
        empty.extend_from_slice(&16u32.to_le_bytes());
        empty.extend_from_slice(&1u16.to_le_bytes());
        empty.extend_from_slice(&1u16.to_le_bytes());
        empty.extend_from_slice(&24000u32.to_le_bytes());
        empty.extend_from_slice(&48000u32.to_le_bytes());
        empty.extend_from_slice(&2u16.to_le_bytes());
        empty.extend_from_slice(&16u16.to_le_bytes());
        empty.extend_from_slice(b"data");
        empty.extend_from_slice(&0u32.to_le_bytes());
        empty.extend_from_slice(b"LIST");
        empty.extend_from_slice(&4u32.to_le_bytes());
        empty.extend_from_slice(b"INFO");
        let riff_len = (empty.len() - 8) as u32;
        empty[4..8].copy_from_slice(&riff_len.to_le_bytes());

        let dir = TempDir::new().unwrap();
        let spec = mono_16bit(24000);
        let segments = vec![
            write_segment(dir.path(), 0, &empty),
            write_segment(dir.path(), 1, &wav_bytes(spec, &[7, 8])),
        ];

        let merged = ConcatAssembler.merge(&segments).unwrap();
        assert_eq!(read_wav(&merged), (spec, vec![7, 8]));
    }

    #[test]
    fn test_wav_sample_rate_mismatch() {
        let dir = TempDir::new().unwrap();
        let segments = vec![
            write_segment(dir.path(), 0, &wav_bytes(mono_16bit(24000), &[1, 2])),
            write_segment(dir.path(), 1, &wav_bytes(mono_16bit(16000), &[3, 4])),
        ];

        assert_eq!(
            ConcatAssembler.merge(&segments),
            Err(MergeError::FormatMismatch { index: 1 })
        );
    }

    #[test]
    fn test_wav_size_limit() {
        assert_eq!(ensure_wav_fits(1024), Ok(()));
        let limit = u64::from(u32::MAX) - WAV_HEADER_MAX;
        assert_eq!(ensure_wav_fits(limit), Ok(()));
        assert_eq!(
            ensure_wav_fits(limit + 1),
            Err(MergeError::TooLarge { bytes: limit + 1 })
        );
        assert_eq!(
            ensure_wav_fits(5 * 1024 * 1024 * 1024),
            Err(MergeError::TooLarge {
                bytes: 5 * 1024 * 1024 * 1024
            })
        );
    }

    #[test]
    fn test_mixed_formats_rejected() {
        let dir = TempDir::new().unwrap();
        let segments = vec![
            write_segment(dir.path(), 0, &mp3_frame(0)),
            write_segment(dir.path(), 4, &wav_bytes(mono_16bit(24000), &[1, 2])),
        ];

        assert_eq!(
            ConcatAssembler.merge(&segments),
            Err(MergeError::FormatMismatch { index: 4 })
        );
    }

    #[test]
    fn test_unrecognized_payload() {
        let dir = TempDir::new().unwrap();
        let segments = vec![write_segment(dir.path(), 2, b"plain text, not audio")];

        assert_eq!(
            ConcatAssembler.merge(&segments),
            Err(MergeError::UnrecognizedFormat { index: 2 })
        );
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let segment = AudioSegment::new(5, dir.path().join("missing.mp3"));

        assert!(matches!(
            ConcatAssembler.merge(&[segment]),
            Err(MergeError::UnreadableSegment { index: 5, .. })
        ));
    }
}
