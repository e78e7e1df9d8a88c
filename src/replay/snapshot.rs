use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::Local;
use ffmpeg_next::{self as ffmpeg, Rational};

use crate::error::{GsrError, Result};
use crate::replay::buffer::ReplayBuffer;

/// Everything `save_replay` needs to stand up an independent muxer for one
/// stream, captured once at pipeline start-up from the live encoders
/// (spec.md section 4.5 — replay mode never touches the live muxer).
pub struct StreamTemplate {
    pub parameters: ffmpeg::codec::Parameters,
    pub codec_time_base: Rational,
    pub stream_time_base: Rational,
}

/// `Replay_YYYY-MM-DD_HH-MM-SS.<container>`, per spec.md section 4.5.
pub fn replay_filename(output_dir: &std::path::Path, container: &str) -> PathBuf {
    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    output_dir.join(format!("Replay_{stamp}.{container}"))
}

/// Spawns the save as a background thread so the video/audio loops never
/// block on disk I/O (mirrors `original_source::save_replay_async`, done
/// here with a plain OS thread since nothing in this workspace pulls in an
/// async runtime).
pub fn spawn_save(
    buffer: Arc<Mutex<ReplayBuffer>>,
    templates: Vec<StreamTemplate>,
    output_path: PathBuf,
) -> JoinHandle<Result<()>> {
    std::thread::spawn(move || save(&buffer, &templates, &output_path))
}

fn save(
    buffer: &Arc<Mutex<ReplayBuffer>>,
    templates: &[StreamTemplate],
    output_path: &std::path::Path,
) -> Result<()> {
    let (start_index, entries) = {
        let buf = buffer.lock().unwrap();
        let Some(start_index) = buf.earliest_keyframe_index() else {
            log::warn!("replay save requested but buffer has no keyframe yet, skipping");
            return Ok(());
        };
        (start_index, buf.snapshot_from(start_index))
    };

    if entries.is_empty() {
        return Ok(());
    }

    let mut output = ffmpeg::format::output(output_path).map_err(GsrError::from)?;
    for template in templates {
        let mut stream = output
            .add_stream(ffmpeg::codec::encoder::find(template.parameters.id()))
            .map_err(GsrError::from)?;
        stream.set_parameters(template.parameters.clone());
        stream.set_time_base(template.stream_time_base);
    }
    output.write_header().map_err(GsrError::from)?;

    // Offsets so the snapshot's first video packet has pts 0 (spec.md
    // section 8: "snapshot's first video packet is a keyframe with pts
    // approximately 0").
    let mut pts_offsets = vec![None; templates.len()];

    for (packet, codec_time_base) in &entries {
        let offset = match pts_offsets[packet.stream_index] {
            Some(o) => o,
            None => {
                pts_offsets[packet.stream_index] = Some(packet.pts);
                packet.pts
            }
        };

        let mut ff_packet = ffmpeg::Packet::copy(&packet.data);
        ff_packet.set_stream(packet.stream_index);
        ff_packet.set_pts(Some(packet.pts - offset));
        ff_packet.set_dts(Some(packet.dts - offset));
        if packet.is_keyframe {
            ff_packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        let stream_tb = templates[packet.stream_index].stream_time_base;
        ff_packet.rescale_ts(*codec_time_base, stream_tb);

        if let Err(e) = ff_packet.write_interleaved(&mut output) {
            log::error!("replay muxer write failed, dropping packet: {e}");
        }
    }

    output.write_trailer().map_err(GsrError::from)?;
    log::info!("replay saved to {}", output_path.display());
    let _ = start_index;
    Ok(())
}
