/// An encoded packet handed from an encoder to the Packet Sink. `pts == dts`
/// always: the encoders are configured with zero B-frames, so there is never
/// a decode/presentation reorder.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub is_keyframe: bool,
}

impl EncodedPacket {
    pub fn new(data: Vec<u8>, stream_index: usize, pts: i64, is_keyframe: bool) -> Self {
        Self {
            data,
            stream_index,
            pts,
            dts: pts,
            is_keyframe,
        }
    }

    pub fn from_ffmpeg(packet: &ffmpeg_next::Packet, stream_index: usize) -> Self {
        let pts = packet.pts().unwrap_or(0);
        Self {
            data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
            stream_index,
            pts,
            dts: pts,
            is_keyframe: packet.is_key(),
        }
    }
}
