use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Sixteen = 16,
    TwentyFour = 24,
    ThirtyTwo = 32,
}

impl BitDepth {
    pub fn bytes(self) -> usize {
        self as usize / 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono = 1,
    Stereo = 2,
}

impl Channels {
    pub fn count(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// spec §3 `AudioFormat`. Invariant: `sample_rate ∈ [44100, 384000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    pub channels: Channels,
    pub endianness: Endianness,
    pub signedness: Signedness,
}

impl AudioFormat {
    /// The RAOP wire format: 44100 Hz, 16-bit, stereo, signed little-endian
    /// (spec §4.4).
    pub const RAOP: AudioFormat = AudioFormat {
        sample_rate: 44_100,
        bit_depth: BitDepth::Sixteen,
        channels: Channels::Stereo,
        endianness: Endianness::Little,
        signedness: Signedness::Signed,
    };

    pub fn bytes_per_sample(&self) -> usize {
        self.bit_depth.bytes()
    }

    /// Bytes for one PCM frame (all channels, one sample period).
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels.count()
    }

    /// Bytes per second of audio at this format — used for fade_bytes,
    /// duration correction, and byte/frame-alignment checks.
    pub fn bytes_per_second(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// `fade_bytes = sample_rate · channels · bytes_per_sample · crossfade_duration_s`.
    pub fn fade_bytes(&self, crossfade_duration_s: u32) -> usize {
        self.bytes_per_second() * crossfade_duration_s as usize
    }

    /// Clamp+default per spec §4.2 sample-rate negotiation / §8 boundary behavior.
    pub fn negotiate_sample_rate(requested: Option<u32>) -> u32 {
        match requested {
            Some(rate) if (44_100..=384_000).contains(&rate) => rate,
            _ => 96_000,
        }
    }

    /// `sox`-style codec argv for this format (`-b N -c N -e signed-integer -r R`).
    pub fn sox_encoding_args(&self) -> Vec<String> {
        let encoding = match self.signedness {
            Signedness::Signed => "signed-integer",
            Signedness::Unsigned => "unsigned-integer",
        };
        vec![
            "-b".to_string(),
            self.bit_depth.bytes().to_string(),
            "-c".to_string(),
            self.channels.count().to_string(),
            "-e".to_string(),
            encoding.to_string(),
            "-r".to_string(),
            self.sample_rate.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_defaults_to_96000() {
        assert_eq!(AudioFormat::negotiate_sample_rate(None), 96_000);
        assert_eq!(AudioFormat::negotiate_sample_rate(Some(22_050)), 96_000);
        assert_eq!(AudioFormat::negotiate_sample_rate(Some(480_000)), 96_000);
    }

    #[test]
    fn negotiate_keeps_in_range_values() {
        assert_eq!(AudioFormat::negotiate_sample_rate(Some(48_000)), 48_000);
    }

    #[test]
    fn fade_bytes_matches_spec_formula() {
        let format = AudioFormat {
            sample_rate: 48_000,
            bit_depth: BitDepth::ThirtyTwo,
            channels: Channels::Stereo,
            endianness: Endianness::Little,
            signedness: Signedness::Signed,
        };
        // 48000 * 2 * 4 * 6 = 2,304,000
        assert_eq!(format.fade_bytes(6), 2_304_000);
    }
}
