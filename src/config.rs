use std::path::PathBuf;

use crate::cli::CliArgs;
use crate::error::{GsrError, Result};
use crate::types::audio_track::AudioInputSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Window(u64),
    Screen,
    ScreenDirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    Medium,
    High,
    VeryHigh,
    Ultra,
}

impl QualityPreset {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "very_high" => Ok(Self::VeryHigh),
            "ultra" => Ok(Self::Ultra),
            other => Err(GsrError::Setup(format!(
                "invalid quality preset '{other}': expected medium, high, very_high, or ultra"
            ))),
        }
    }

    /// `(qp_modern, qp_very_old_gpu)` per spec.md section 4.2.
    pub fn qp(self) -> (i32, i32) {
        match self {
            Self::Medium => (40, 37),
            Self::High => (35, 32),
            Self::VeryHigh => (30, 27),
            Self::Ultra => (24, 21),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecChoice {
    Auto,
    H264,
    H265,
}

impl CodecChoice {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "h264" => Ok(Self::H264),
            "h265" => Ok(Self::H265),
            other => Err(GsrError::Setup(format!(
                "invalid codec '{other}': expected auto, h264, or h265"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OutputTarget {
    File(PathBuf),
    Directory(PathBuf),
    Stdout,
    /// A livestream URL (`http(s)://`, `rtmp(s)://`); see
    /// `is_livestream_path`.
    Url(String),
}

/// `^(http|https|rtmp|rtmps)://` per spec.md section 6.
pub fn is_livestream_path(path: &str) -> bool {
    for scheme in ["http://", "https://", "rtmp://", "rtmps://"] {
        if path.starts_with(scheme) {
            return true;
        }
    }
    false
}

/// `-w`: hex (`0x...`), decimal, `screen`, or `screen-direct`.
/// Mirrors `original_source`'s `is_hex_num`/`contains_non_hex_number` dispatch.
pub fn parse_window_spec(s: &str) -> Result<CaptureTarget> {
    match s {
        "screen" => return Ok(CaptureTarget::Screen),
        "screen-direct" => return Ok(CaptureTarget::ScreenDirect),
        _ => {}
    }

    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>().or_else(|_| u64::from_str_radix(s, 16))
    };

    parsed
        .map(CaptureTarget::Window)
        .map_err(|_| GsrError::Setup(format!("invalid window id '{s}'")))
}

#[derive(Debug, Clone, Copy)]
pub struct RecordSize {
    pub width: u32,
    pub height: u32,
}

fn parse_record_size(s: &str) -> Result<RecordSize> {
    let (w, h) = s
        .split_once('x')
        .or_else(|| s.split_once('X'))
        .ok_or_else(|| GsrError::Setup(format!("invalid record size '{s}', expected WxH")))?;
    let width: u32 = w
        .parse()
        .map_err(|_| GsrError::Setup(format!("invalid record size '{s}', expected WxH")))?;
    let height: u32 = h
        .parse()
        .map_err(|_| GsrError::Setup(format!("invalid record size '{s}', expected WxH")))?;
    Ok(RecordSize { width, height })
}

pub struct Config {
    pub capture_target: CaptureTarget,
    pub container: Option<String>,
    pub fps: u32,
    pub record_size: Option<RecordSize>,
    pub audio_inputs: Vec<AudioInputSpec>,
    pub quality: QualityPreset,
    /// Internal padding of +5s is applied here, per spec.md section 4.5.
    pub replay_seconds: Option<u32>,
    pub codec: CodecChoice,
    pub output: OutputTarget,
}

impl Config {
    pub fn from_cli(args: CliArgs) -> Result<Self> {
        let capture_target = parse_window_spec(&args.window)?;

        if args.fps < 1 {
            return Err(GsrError::Setup("fps must be at least 1".to_string()));
        }

        let record_size = match args.size {
            Some(ref s) => {
                if matches!(capture_target, CaptureTarget::Screen | CaptureTarget::ScreenDirect) {
                    return Err(GsrError::Setup(
                        "-s (record size) is only valid in window capture mode".to_string(),
                    ));
                }
                Some(parse_record_size(s)?)
            }
            None => None,
        };

        let audio_inputs: Vec<AudioInputSpec> = args
            .audio
            .iter()
            .map(|a| AudioInputSpec::parse(a))
            .collect();

        let quality = QualityPreset::parse(&args.quality)?;
        let codec = CodecChoice::parse(&args.codec)?;

        let replay_seconds = match args.replay {
            Some(secs) => {
                if !(5..=1200).contains(&secs) {
                    return Err(GsrError::Setup(
                        "-r (replay seconds) must be in 5..=1200".to_string(),
                    ));
                }
                Some(secs)
            }
            None => None,
        };

        let output = match args.output {
            Some(ref path) if is_livestream_path(path) => OutputTarget::Url(path.clone()),
            Some(path) => {
                let pb = PathBuf::from(&path);
                if replay_seconds.is_some() {
                    OutputTarget::Directory(pb)
                } else if path.ends_with('/') || pb.extension().is_none() {
                    OutputTarget::Directory(pb)
                } else {
                    OutputTarget::File(pb)
                }
            }
            None => {
                if replay_seconds.is_some() {
                    return Err(GsrError::Setup(
                        "-o (output directory) is required when -r is set".to_string(),
                    ));
                }
                OutputTarget::Stdout
            }
        };

        Ok(Config {
            capture_target,
            container: args.container,
            fps: args.fps,
            record_size,
            audio_inputs,
            quality,
            replay_seconds,
            codec,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_window_spec_hex() {
        assert_eq!(
            parse_window_spec("0x1234567").unwrap(),
            CaptureTarget::Window(0x1234567)
        );
    }

    #[test]
    fn parse_window_spec_decimal() {
        assert_eq!(parse_window_spec("42").unwrap(), CaptureTarget::Window(42));
    }

    #[test]
    fn parse_window_spec_screen_literals() {
        assert_eq!(parse_window_spec("screen").unwrap(), CaptureTarget::Screen);
        assert_eq!(
            parse_window_spec("screen-direct").unwrap(),
            CaptureTarget::ScreenDirect
        );
    }

    #[test]
    fn livestream_detection() {
        assert!(is_livestream_path("rtmp://localhost/live/x"));
        assert!(is_livestream_path("https://example.com/ingest"));
        assert!(!is_livestream_path("/tmp/out.mp4"));
    }

    #[test]
    fn replay_seconds_out_of_range_rejected() {
        let args = CliArgs {
            window: "screen".into(),
            container: None,
            fps: 60,
            size: None,
            audio: vec![],
            quality: "very_high".into(),
            replay: Some(4),
            codec: "auto".into(),
            output: Some("/tmp/replays".into()),
        };
        assert!(Config::from_cli(args).is_err());
    }

    #[test]
    fn replay_without_output_dir_rejected() {
        let args = CliArgs {
            window: "screen".into(),
            container: None,
            fps: 60,
            size: None,
            audio: vec![],
            quality: "very_high".into(),
            replay: Some(10),
            codec: "auto".into(),
            output: None,
        };
        assert!(Config::from_cli(args).is_err());
    }

    #[test]
    fn quality_qp_table_matches_spec() {
        assert_eq!(QualityPreset::Medium.qp(), (40, 37));
        assert_eq!(QualityPreset::High.qp(), (35, 32));
        assert_eq!(QualityPreset::VeryHigh.qp(), (30, 27));
        assert_eq!(QualityPreset::Ultra.qp(), (24, 21));
    }
}
