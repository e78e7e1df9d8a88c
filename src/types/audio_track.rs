/// A requested audio input, `[name/]device` split on the first `/`
/// (`original_source::parse_audio_input_arg`). An input with both halves
/// empty (`-a ""`) names a silent track: no PulseAudio handle is ever
/// opened for it and it always "misses" in the worker loop, so its output
/// is an AAC stream of pure silence at the nominal sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInputSpec {
    pub name: String,
    pub device: String,
}

impl AudioInputSpec {
    pub fn parse(arg: &str) -> Self {
        match arg.split_once('/') {
            Some((name, device)) => Self {
                name: name.to_string(),
                device: device.to_string(),
            },
            None => Self {
                name: String::new(),
                device: arg.to_string(),
            },
        }
    }

    pub fn is_silent(&self) -> bool {
        self.name.is_empty() && self.device.is_empty()
    }
}

/// Bookkeeping the pipeline carries per audio input. `assigned_stream_index`
/// is allocated sequentially starting at 1 (video is always stream 0).
/// `pts_counter` advances by `frame_size` samples per emitted frame.
pub struct AudioTrack {
    pub input_spec: AudioInputSpec,
    pub assigned_stream_index: usize,
    pub pts_counter: i64,
}

impl AudioTrack {
    pub fn new(input_spec: AudioInputSpec, assigned_stream_index: usize) -> Self {
        Self {
            input_spec,
            assigned_stream_index,
            pts_counter: 0,
        }
    }

    /// Advance the pts counter by one frame's worth of samples, returning
    /// the pts the frame just emitted should have carried.
    pub fn advance(&mut self, frame_size: i64) -> i64 {
        let pts = self.pts_counter;
        self.pts_counter += frame_size;
        pts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_slash() {
        let s = AudioInputSpec::parse("mic/alsa_input.usb-foo");
        assert_eq!(s.name, "mic");
        assert_eq!(s.device, "alsa_input.usb-foo");
    }

    #[test]
    fn parse_with_no_slash_has_empty_name() {
        let s = AudioInputSpec::parse("default");
        assert_eq!(s.name, "");
        assert_eq!(s.device, "default");
    }

    #[test]
    fn fully_empty_input_is_silent() {
        let s = AudioInputSpec::parse("");
        assert!(s.is_silent());
    }

    #[test]
    fn named_with_empty_device_is_not_silent() {
        let s = AudioInputSpec::parse("mic/");
        assert!(!s.is_silent());
    }

    #[test]
    fn pts_counter_forms_arithmetic_sequence() {
        let mut track = AudioTrack::new(AudioInputSpec::parse("default"), 1);
        let mut pts_values = Vec::new();
        for _ in 0..4 {
            pts_values.push(track.advance(1024));
        }
        assert_eq!(pts_values, vec![0, 1024, 2048, 3072]);
    }
}
