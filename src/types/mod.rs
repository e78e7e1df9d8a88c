pub mod audio_track;
pub mod frame;
pub mod packet;

pub use audio_track::AudioTrack;
pub use frame::{CapturedRegion, Frame};
pub use packet::EncodedPacket;
