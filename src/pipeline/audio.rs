//! In-memory PCM buffers and WAV I/O.
//!
//! Everything between the speech engine and the final encoder is mono 16-bit
//! PCM. Engines may emit stereo or other sample widths; [`AudioBuffer::read_wav`]
//! folds those down so concatenation is a plain `extend`.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Mono 16-bit PCM audio at a fixed sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Decoded audio for one chunk; `index` is the source chunk's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub index: usize,
    pub buffer: AudioBuffer,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Append `other`, resampling it first if its rate differs.
    pub fn append(&mut self, other: &AudioBuffer) {
        if other.sample_rate == self.sample_rate {
            self.samples.extend_from_slice(&other.samples);
        } else {
            let converted = resample(&other.samples, other.sample_rate, self.sample_rate);
            self.samples.extend(converted);
        }
    }

    /// Decode a WAV stream, mixing channels down to mono.
    pub fn read_wav<R: Read>(reader: R) -> Result<Self, hound::Error> {
        let mut reader = WavReader::new(reader)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<i32> = match spec.sample_format {
            SampleFormat::Int => {
                let shift = spec.bits_per_sample.saturating_sub(16) as u32;
                let widen = 16u32.saturating_sub(spec.bits_per_sample as u32);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) << widen))
                    .collect::<Result<_, _>>()?
            }
            SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i32))
                .collect::<Result<_, _>>()?,
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().sum();
                (sum / frame.len() as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        Ok(Self::new(samples, spec.sample_rate))
    }

    pub fn read_wav_file(path: &Path) -> Result<Self, hound::Error> {
        let file = std::fs::File::open(path)?;
        Self::read_wav(std::io::BufReader::new(file))
    }

    /// Encode as a mono 16-bit WAV stream.
    pub fn write_wav<W: Write + Seek>(&self, writer: W) -> Result<(), hound::Error> {
        let mut wav = WavWriter::new(writer, self.wav_spec())?;
        for &s in &self.samples {
            wav.write_sample(s)?;
        }
        wav.finalize()
    }

    pub fn write_wav_file(&self, path: &Path) -> Result<(), hound::Error> {
        let mut wav = WavWriter::create(path, self.wav_spec())?;
        for &s in &self.samples {
            wav.write_sample(s)?;
        }
        wav.finalize()
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }
}

/// Linear-interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = samples[idx.min(samples.len() - 1)] as f64;
            let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}
