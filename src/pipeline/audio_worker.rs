use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

use crate::clock::Clock;
use crate::encoders::audio::{AudioEncoder, Resampler, FRAME_SIZE, SAMPLE_RATE};
use crate::error::{GsrError, Result};
use crate::signals::ControlFlags;
use crate::sink::PacketSink;
use crate::types::audio_track::AudioInputSpec;

/// Confirms a requested (non-silent) audio device actually opens via
/// PulseAudio, so an unresolvable `-a` device is diagnosed as a setup
/// failure (spec.md section 6/7, exit code 2) rather than silently
/// degrading to a silent track once the worker thread is already running.
/// Mirrors `original_source`'s device-enumeration check in `main()`,
/// called once up front before the main loop starts.
pub fn validate_audio_input(input: &AudioInputSpec) -> Result<()> {
    if input.is_silent() {
        return Ok(());
    }
    open_pulse_input(input).map(|_| ()).map_err(|_| {
        GsrError::InvalidAudioInput(format!(
            "audio input device '{}' could not be opened via PulseAudio",
            input.device
        ))
    })
}

/// Pure decision algorithm for the per-iteration silence-insertion
/// discipline (spec.md section 4.4), kept separate from the PulseAudio
/// I/O and encoder calls so it can be driven by a fake clock in tests.
pub struct AudioPacingState {
    last_received: f64,
    frame_duration: f64,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AudioTickPlan {
    /// Number of silence frames to emit this tick to absorb the jitter
    /// computed from elapsed wall-clock time.
    pub silence_frames: usize,
    /// Whether the data received this tick (if any) should also be
    /// resampled and emitted as one additional frame.
    pub emit_data_frame: bool,
}

impl AudioPacingState {
    pub fn new(frame_size: usize) -> Self {
        Self {
            last_received: 0.0,
            frame_duration: frame_size as f64 / SAMPLE_RATE as f64,
        }
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    pub fn tick(&mut self, now: f64, data_received: bool) -> AudioTickPlan {
        let missing = ((now - self.last_received) / self.frame_duration).round() as i64;
        let missing = missing.max(0) as usize;

        let emit_silence = missing >= 5 || (missing > 0 && data_received);

        // `last_received` must track real data arrival unconditionally, not
        // just when silence is also emitted alongside it — otherwise it
        // permanently lags by one tick after the first silence insertion,
        // so `missing` computes to ~1 on every subsequent on-time chunk and
        // a spurious silence frame rides along with every real one.
        if data_received || emit_silence {
            self.last_received = now;
        }

        AudioTickPlan {
            silence_frames: if emit_silence { missing } else { 0 },
            emit_data_frame: data_received,
        }
    }
}

/// One thread per requested audio input. Owns its PulseAudio handle (if
/// any — a silent track has none and always "misses"), its AAC encoder,
/// and its resampler, and writes encoded packets into the shared
/// `PacketSink`.
pub fn spawn(
    input: AudioInputSpec,
    mut encoder: AudioEncoder,
    clock: Arc<dyn Clock>,
    controls: Arc<ControlFlags>,
    sink: Arc<Mutex<PacketSink>>,
    started_pts_base: f64,
) -> std::thread::JoinHandle<Result<()>> {
    std::thread::spawn(move || -> Result<()> {
        let mut resampler = Resampler::new(SAMPLE_RATE)?;
        let mut pacing = AudioPacingState::new(FRAME_SIZE);
        let mut pts_counter: i64 = 0;

        let handle = if input.is_silent() {
            None
        } else {
            open_pulse_input(&input).ok()
        };

        let mut pcm_buf = vec![0i16; FRAME_SIZE * 2];

        while controls.is_running() {
            let now = clock.now() - started_pts_base;

            let data_received = match &handle {
                Some(simple) => read_one_chunk(simple, &mut pcm_buf),
                None => false,
            };

            let plan = pacing.tick(now, data_received);

            for _ in 0..plan.silence_frames {
                let frame = AudioEncoder::silent_frame(pts_counter);
                pts_counter += FRAME_SIZE as i64;
                encoder.send_frame(&frame)?;
                flush_to_sink(&mut encoder, &sink);
            }

            if handle.is_none() {
                let frame = AudioEncoder::silent_frame(pts_counter);
                pts_counter += FRAME_SIZE as i64;
                encoder.send_frame(&frame)?;
                flush_to_sink(&mut encoder, &sink);
                std::thread::sleep(Duration::from_secs_f64(pacing.frame_duration()));
            } else if plan.emit_data_frame {
                let raw = interleaved_i16_to_frame(&pcm_buf);
                let resampled = resampler.resample(&raw)?;
                let mut resampled = resampled;
                resampled.set_pts(Some(pts_counter));
                pts_counter += FRAME_SIZE as i64;
                encoder.send_frame(&resampled)?;
                flush_to_sink(&mut encoder, &sink);
            }
        }

        encoder.drain()?;
        flush_to_sink(&mut encoder, &sink);
        Ok(())
    })
}

fn flush_to_sink(encoder: &mut AudioEncoder, sink: &Arc<Mutex<PacketSink>>) {
    for packet in encoder.receive_packets() {
        let time_base = encoder.time_base();
        let mut sink = sink.lock().unwrap();
        sink.submit(packet, time_base);
    }
}

fn interleaved_i16_to_frame(pcm: &[i16]) -> ffmpeg_next::frame::Audio {
    let mut frame = ffmpeg_next::frame::Audio::new(
        ffmpeg_next::format::Sample::I16(ffmpeg_next::format::sample::Type::Packed),
        pcm.len() / 2,
        ffmpeg_next::util::channel_layout::ChannelLayout::STEREO,
    );
    frame.set_rate(SAMPLE_RATE);
    frame.data_mut(0)[..pcm.len() * 2].copy_from_slice(bytemuck::cast_slice(pcm));
    frame
}

fn open_pulse_input(input: &AudioInputSpec) -> std::result::Result<Simple, ()> {
    let spec = Spec {
        format: Format::S16le,
        channels: 2,
        rate: SAMPLE_RATE,
    };
    Simple::new(
        None,
        "gsr",
        Direction::Record,
        Some(&input.device),
        &input.name,
        &spec,
        None,
        None,
    )
    .map_err(|_| ())
}

fn read_one_chunk(simple: &Simple, buf: &mut [i16]) -> bool {
    simple.read(bytemuck::cast_slice_mut(buf)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_jitter_under_five_frames_is_absorbed_silently() {
        let mut pacing = AudioPacingState::new(1024);
        let fd = pacing.frame_duration();
        // Less than 5 frames' worth of elapsed time with no data: no
        // silence insertion yet, codec buffering absorbs it.
        let plan = pacing.tick(fd * 2.0, false);
        assert_eq!(plan.silence_frames, 0);
    }

    #[test]
    fn five_or_more_missing_frames_triggers_silence_insertion() {
        let mut pacing = AudioPacingState::new(1024);
        let fd = pacing.frame_duration();
        let plan = pacing.tick(fd * 5.0, false);
        assert_eq!(plan.silence_frames, 5);
    }

    #[test]
    fn any_missing_frames_with_data_received_flushes_immediately() {
        let mut pacing = AudioPacingState::new(1024);
        let fd = pacing.frame_duration();
        let plan = pacing.tick(fd * 1.2, true);
        assert_eq!(plan.silence_frames, 1);
        assert!(plan.emit_data_frame);
    }

    #[test]
    fn steady_on_time_delivery_never_emits_spurious_silence() {
        let mut pacing = AudioPacingState::new(1024);
        let fd = pacing.frame_duration();
        let mut t = 0.0;
        for _ in 0..50 {
            t += fd;
            let plan = pacing.tick(t, true);
            assert_eq!(plan.silence_frames, 0);
            assert!(plan.emit_data_frame);
        }
    }

    #[test]
    fn pts_sequence_is_f_spaced() {
        let mut pts = 0i64;
        let mut values = Vec::new();
        for _ in 0..4 {
            values.push(pts);
            pts += 1024;
        }
        assert_eq!(values, vec![0, 1024, 2048, 3072]);
    }
}
