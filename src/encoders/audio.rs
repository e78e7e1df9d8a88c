use ffmpeg_next::{self as ffmpeg, format::Sample, util::channel_layout::ChannelLayout};

use crate::error::{GsrError, Result};
use crate::types::packet::EncodedPacket;

pub const SAMPLE_RATE: u32 = 48_000;
pub const FRAME_SIZE: usize = 1024;

/// AAC encoder: FLTP stereo at 48kHz, matching `original_source`'s
/// `create_audio_codec_context` (global-header flag set so the container
/// can carry extradata, as required for fragmented/streamed mp4 output).
pub struct AudioEncoder {
    encoder: ffmpeg::codec::encoder::Audio,
    stream_index: usize,
}

impl AudioEncoder {
    pub fn new(stream_index: usize) -> Result<Self> {
        let codec = ffmpeg::codec::encoder::find(ffmpeg::codec::Id::AAC)
            .ok_or_else(|| GsrError::CodecUnavailable("AAC encoder not available".to_string()))?;

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut encoder = context.encoder().audio().map_err(GsrError::from)?;

        encoder.set_rate(SAMPLE_RATE as i32);
        encoder.set_format(Sample::F32(ffmpeg::format::sample::Type::Planar));
        encoder.set_channel_layout(ChannelLayout::STEREO);
        encoder.set_time_base(ffmpeg::Rational(1, SAMPLE_RATE as i32));
        encoder.set_bit_rate(160_000);

        unsafe {
            (*encoder.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }

        let encoder = encoder.open().map_err(GsrError::from)?;

        Ok(Self {
            encoder,
            stream_index,
        })
    }

    pub fn send_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        self.encoder.send_frame(frame).map_err(GsrError::from)
    }

    pub fn drain(&mut self) -> Result<()> {
        self.encoder.send_eof().map_err(GsrError::from)
    }

    pub fn receive_packets(&mut self) -> Vec<EncodedPacket> {
        let mut out = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            out.push(EncodedPacket::from_ffmpeg(&packet, self.stream_index));
            packet = ffmpeg::Packet::empty();
        }
        out
    }

    pub fn time_base(&self) -> ffmpeg::Rational {
        self.encoder.time_base()
    }

    pub fn parameters(&self) -> ffmpeg::codec::Parameters {
        ffmpeg::codec::Parameters::from(&self.encoder)
    }

    /// Builds a silent FLTP stereo frame of `FRAME_SIZE` samples, used both
    /// for silent-only tracks and for the jitter-compensation silence
    /// insertion in `pipeline::audio_worker`.
    pub fn silent_frame(pts: i64) -> ffmpeg::frame::Audio {
        let mut frame = ffmpeg::frame::Audio::new(
            Sample::F32(ffmpeg::format::sample::Type::Planar),
            FRAME_SIZE,
            ChannelLayout::STEREO,
        );
        frame.set_rate(SAMPLE_RATE);
        frame.set_pts(Some(pts));
        for plane in 0..frame.planes() {
            frame.data_mut(plane).fill(0);
        }
        frame
    }
}

/// S16 interleaved stereo -> FLTP stereo at `SAMPLE_RATE`, via ffmpeg's
/// software resampler. Spec.md explicitly scopes out anything beyond
/// sample-format conversion (no frame-accurate resampling), so this is a
/// straight passthrough at a fixed rate, never a rate-matching resample.
pub struct Resampler {
    inner: ffmpeg::software::resampling::Context,
}

impl Resampler {
    pub fn new(input_rate: u32) -> Result<Self> {
        let inner = ffmpeg::software::resampler(
            (Sample::I16(ffmpeg::format::sample::Type::Packed), ChannelLayout::STEREO, input_rate),
            (Sample::F32(ffmpeg::format::sample::Type::Planar), ChannelLayout::STEREO, SAMPLE_RATE),
        )
        .map_err(GsrError::from)?;
        Ok(Self { inner })
    }

    pub fn resample(&mut self, input: &ffmpeg::frame::Audio) -> Result<ffmpeg::frame::Audio> {
        let mut output = ffmpeg::frame::Audio::empty();
        self.inner.run(input, &mut output).map_err(GsrError::from)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_spec_nominal_value() {
        assert_eq!(FRAME_SIZE, 1024);
    }
}
