pub mod audio_worker;
pub mod video_loop;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ffmpeg_next::{self as ffmpeg};
use x11rb::connection::Connection;
use x11rb::rust_connection::RustConnection;

use crate::capture::{CaptureSource, DisplayCapture, WindowCapture};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{CaptureTarget, CodecChoice, Config, OutputTarget};
use crate::encoders::video::{VideoCodec, VideoEncoder};
use crate::encoders::audio::AudioEncoder;
use crate::error::{GsrError, Result};
use crate::gl_context::GlContext;
use crate::gpu::cuda_context::{self, GpuContext};
use crate::gpu::device::is_very_old_gpu;
use crate::replay::buffer::ReplayBuffer;
use crate::replay::snapshot::{self, StreamTemplate};
use crate::signals::ControlFlags;
use crate::sink::{LiveMuxer, PacketSink};
use crate::types::audio_track::{AudioInputSpec, AudioTrack};
use crate::types::frame::Frame;
use video_loop::PacingState;

fn resolve_container(config: &Config) -> String {
    if let Some(c) = &config.container {
        return c.clone();
    }
    match &config.output {
        OutputTarget::File(path) => path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string(),
        _ => "mp4".to_string(),
    }
}

fn live_output_path(config: &Config) -> String {
    match &config.output {
        OutputTarget::File(p) => p.to_string_lossy().to_string(),
        OutputTarget::Url(u) => u.clone(),
        OutputTarget::Stdout => "pipe:1".to_string(),
        OutputTarget::Directory(_) => {
            unreachable!("directory output is only valid in replay mode")
        }
    }
}

fn output_dir_for_replay(config: &Config) -> Result<std::path::PathBuf> {
    match &config.output {
        OutputTarget::Directory(dir) => Ok(dir.clone()),
        _ => Err(GsrError::Setup(
            "replay mode requires a directory output".to_string(),
        )),
    }
}

/// Drives capture, encode and mux/replay for the whole process lifetime.
/// Returns once `controls` flips to not-running (SIGINT, or a fatal
/// capture/encode error).
pub fn run(config: Config, controls: Arc<ControlFlags>) -> Result<()> {
    let container = resolve_container(&config);
    let is_livestream = matches!(config.output, OutputTarget::Url(_));
    let container_is_mp4 = container.eq_ignore_ascii_case("mp4");

    // flv carries H.264 only; an explicit `-k h265` request is coerced
    // rather than rejected, matching `original_source`'s own fallback
    // (`VideoCodec::choose` already does this for the `Auto` case, but an
    // explicit H265 request bypasses that path, so it's handled here too).
    let mut requested_codec = config.codec;
    if requested_codec == CodecChoice::H265 && container.eq_ignore_ascii_case("flv") {
        log::warn!("h265 is not compatible with flv, falling back to h264 instead");
        requested_codec = CodecChoice::H264;
    }

    let gpu_ctx = GpuContext::new()?;
    let hw_device_ctx = gpu_ctx.create_hw_device_ctx()?;
    let very_old_gpu = gpu_ctx
        .device_name()
        .map(|n| is_very_old_gpu(&n))
        .unwrap_or(false);

    // Kept alive only for window-capture mode; its teardown order matters
    // (GLX context before the window it's bound to), hence `Drop` on
    // `GlContext` itself rather than any ordering imposed here.
    let mut gl_ctx_holder: Option<GlContext> = None;

    let mut capture_source = match config.capture_target {
        CaptureTarget::Window(win_id) => {
            let (gl_conn, screen_num) = RustConnection::connect(None)
                .map_err(|e| GsrError::X11(e.to_string()))?;
            gl_ctx_holder = Some(GlContext::new(gl_conn, screen_num)?);

            let (capture_conn, _) = RustConnection::connect(None)
                .map_err(|e| GsrError::X11(e.to_string()))?;

            let (record_width, record_height) = match config.record_size {
                Some(sz) => Frame::even_dims(sz.width, sz.height),
                None => (u32::MAX, u32::MAX),
            };

            CaptureSource::Window(WindowCapture::new(
                capture_conn,
                win_id as u32,
                record_width,
                record_height,
            )?)
        }
        CaptureTarget::Screen | CaptureTarget::ScreenDirect => {
            let (conn, screen_num) = RustConnection::connect(None)
                .map_err(|e| GsrError::X11(e.to_string()))?;
            let (sw, sh) = {
                let screen = &conn.setup().roots[screen_num];
                Frame::even_dims(screen.width_in_pixels as u32, screen.height_in_pixels as u32)
            };
            CaptureSource::Display(DisplayCapture::new(config.capture_target, sw, sh)?)
        }
    };

    let (raw_width, raw_height) = capture_source.dimensions();
    let (width, height) = Frame::even_dims(raw_width, raw_height);
    if width == 0 || height == 0 {
        return Err(GsrError::Setup(
            "capture source reported zero dimensions".to_string(),
        ));
    }

    let codec = VideoCodec::choose(requested_codec, config.fps, &container);
    let mut video_encoder = VideoEncoder::new(
        width,
        height,
        config.fps,
        config.quality,
        codec,
        very_old_gpu,
        is_livestream,
        container_is_mp4,
        hw_device_ctx,
    )?;
    let video_time_base = video_encoder.time_base();
    let video_parameters = video_encoder.parameters();

    let mut capture_frame = Frame::new(
        unsafe { cuda_context::alloc_hw_frame(video_encoder.hw_frames_ctx(), width, height)? },
        width,
        height,
    );

    let mut audio_inputs = config.audio_inputs.clone();
    if is_livestream && audio_inputs.is_empty() {
        // A livestream with no requested audio input still carries one
        // silent AAC track: most ingest servers assume audio is present
        // (spec.md section 4.6).
        audio_inputs.push(AudioInputSpec::parse(""));
    }

    for input in &audio_inputs {
        audio_worker::validate_audio_input(input)?;
    }

    let mut audio_encoders = Vec::new();
    for (i, spec) in audio_inputs.iter().enumerate() {
        let track = AudioTrack::new(spec.clone(), i + 1);
        let encoder = AudioEncoder::new(track.assigned_stream_index)?;
        audio_encoders.push((track, encoder));
    }

    let stream_templates: Vec<StreamTemplate> = std::iter::once(StreamTemplate {
        parameters: video_parameters.clone(),
        codec_time_base: video_time_base,
        stream_time_base: video_time_base,
    })
    .chain(audio_encoders.iter().map(|(_, enc)| StreamTemplate {
        parameters: enc.parameters(),
        codec_time_base: enc.time_base(),
        stream_time_base: enc.time_base(),
    }))
    .collect();

    let replay_output_dir = if config.replay_seconds.is_some() {
        Some(output_dir_for_replay(&config)?)
    } else {
        None
    };

    let sink = Arc::new(Mutex::new(match config.replay_seconds {
        Some(secs) => {
            let buffer = ReplayBuffer::new(secs + 5);
            PacketSink::Replay(Arc::new(Mutex::new(buffer)))
        }
        None => {
            let output_path = live_output_path(&config);
            let mut output_ctx = ffmpeg::format::output_as(&output_path, &container)
                .map_err(GsrError::from)?;

            let mut stream_time_bases = Vec::with_capacity(stream_templates.len());
            for template in &stream_templates {
                let codec = ffmpeg::codec::encoder::find(template.parameters.id())
                    .ok_or_else(|| GsrError::CodecUnavailable("muxer stream codec unavailable".to_string()))?;
                let mut stream = output_ctx.add_stream(codec).map_err(GsrError::from)?;
                stream.set_parameters(template.parameters.clone());
                stream.set_time_base(template.stream_time_base);
                stream_time_bases.push(template.stream_time_base);
            }

            let mut muxer = LiveMuxer::new(output_ctx, stream_time_bases);
            muxer.write_header()?;
            PacketSink::Live(muxer)
        }
    }));

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    let mut audio_handles = Vec::new();
    for (track, encoder) in audio_encoders {
        let handle = audio_worker::spawn(
            track.input_spec,
            encoder,
            Arc::clone(&clock),
            Arc::clone(&controls),
            Arc::clone(&sink),
            0.0,
        );
        audio_handles.push(handle);
    }

    let mut pacing = PacingState::new(config.fps);
    let update_rate_hz = video_loop::update_rate_hz(config.fps);

    // At most one snapshot task may be in flight at a time (spec.md
    // section 3 invariant); a second SIGUSR1 while one is still running is
    // a no-op rather than a second concurrent writer to a second-granular
    // filename.
    let mut snapshot_handle: Option<JoinHandle<Result<()>>> = None;

    'main: while controls.is_running() {
        let tick_start = clock.now();

        if let CaptureSource::Window(w) = &mut capture_source {
            if w.pump_events()? {
                log::info!("target window destroyed, stopping");
                controls.stop();
                break 'main;
            }
        }

        let pts_values = pacing.catch_up(clock.now());
        if !pts_values.is_empty() {
            if let Err(e) = capture_source.capture_into(&mut capture_frame) {
                log::warn!("capture failed this tick, duplicating previous frame content: {e}");
            }

            for pts in pts_values {
                capture_frame.hw.set_pts(Some(pts));
                video_encoder.send_frame(&capture_frame.hw)?;
                for packet in video_encoder.receive_packets() {
                    sink.lock().unwrap().submit(packet, video_time_base);
                }
            }
        }

        if controls.take_save_replay_request() {
            let snapshot_running = snapshot_handle
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false);

            if snapshot_running {
                log::debug!("save-replay requested while a snapshot is already in flight, ignoring");
            } else {
                let sink_guard = sink.lock().unwrap();
                if let PacketSink::Replay(buffer) = &*sink_guard {
                    if let Some(dir) = &replay_output_dir {
                        let out_path = snapshot::replay_filename(dir, &container);
                        let templates: Vec<StreamTemplate> = stream_templates
                            .iter()
                            .map(|t| StreamTemplate {
                                parameters: t.parameters.clone(),
                                codec_time_base: t.codec_time_base,
                                stream_time_base: t.stream_time_base,
                            })
                            .collect();
                        let buffer = Arc::clone(buffer);
                        drop(sink_guard);
                        snapshot_handle = Some(snapshot::spawn_save(buffer, templates, out_path));
                    }
                }
            }
        }

        let tick_elapsed = clock.now() - tick_start;
        let sleep_for = video_loop::next_sleep_duration(update_rate_hz, tick_elapsed);
        if sleep_for > 0.0 {
            thread::sleep(Duration::from_secs_f64(sleep_for));
        }
    }

    video_encoder.drain()?;
    for packet in video_encoder.receive_packets() {
        sink.lock().unwrap().submit(packet, video_time_base);
    }

    for handle in audio_handles {
        let _ = handle.join();
    }

    if let Some(handle) = snapshot_handle {
        let _ = handle.join();
    }

    if let PacketSink::Live(muxer) = &mut *sink.lock().unwrap() {
        muxer.write_trailer()?;
    }

    drop(gl_ctx_holder);
    Ok(())
}
