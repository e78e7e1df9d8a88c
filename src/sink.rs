use std::sync::{Arc, Mutex};

use ffmpeg_next::{self as ffmpeg, Rational};

use crate::replay::buffer::ReplayBuffer;
use crate::types::packet::EncodedPacket;

/// Packet Sink: live mode rescales and writes under a mutex (serializing
/// the video main thread and N audio workers); replay mode instead pushes
/// into the Replay Buffer. Writers never retry — a muxer write failure is
/// logged and the packet dropped (spec.md section 4.6).
pub enum PacketSink {
    Live(LiveMuxer),
    Replay(Arc<Mutex<ReplayBuffer>>),
}

pub struct LiveMuxer {
    output: ffmpeg::format::context::Output,
    stream_time_bases: Vec<Rational>,
    header_written: bool,
}

impl LiveMuxer {
    pub fn new(output: ffmpeg::format::context::Output, stream_time_bases: Vec<Rational>) -> Self {
        Self {
            output,
            stream_time_bases,
            header_written: false,
        }
    }

    pub fn write_header(&mut self) -> crate::error::Result<()> {
        self.output.write_header().map_err(crate::error::GsrError::from)?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_trailer(&mut self) -> crate::error::Result<()> {
        if self.header_written {
            self.output.write_trailer().map_err(crate::error::GsrError::from)?;
        }
        Ok(())
    }

    fn write(&mut self, packet: &EncodedPacket, codec_time_base: Rational) {
        let mut ff_packet = ffmpeg::Packet::copy(&packet.data);
        ff_packet.set_stream(packet.stream_index);
        ff_packet.set_pts(Some(packet.pts));
        ff_packet.set_dts(Some(packet.dts));
        if packet.is_keyframe {
            ff_packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        let stream_tb = self.stream_time_bases[packet.stream_index];
        ff_packet.rescale_ts(codec_time_base, stream_tb);

        if let Err(e) = ff_packet.write_interleaved(&mut self.output) {
            log::error!("muxer write failed, dropping packet: {e}");
        }
    }
}

impl PacketSink {
    pub fn submit(&mut self, packet: EncodedPacket, codec_time_base: Rational) {
        match self {
            PacketSink::Live(muxer) => muxer.write(&packet, codec_time_base),
            PacketSink::Replay(buffer) => {
                buffer.lock().unwrap().push(packet, codec_time_base);
            }
        }
    }
}
