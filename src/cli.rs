use clap::Parser;

/// Low-overhead NVIDIA GPU screen and audio capture.
///
/// Mirrors the flag surface described for `gpu-screen-recorder`; see
/// `crate::config` for validation and defaults.
#[derive(Parser, Debug)]
#[command(name = "gsr", version, about)]
pub struct CliArgs {
    /// Window id (hex `0x...` or decimal), or `screen`, or `screen-direct`.
    #[arg(short = 'w', long = "window")]
    pub window: String,

    /// Container format (mp4, mkv, flv, ...). Inferred from `-o` if omitted.
    #[arg(short = 'c', long = "container")]
    pub container: Option<String>,

    /// Target frames per second.
    #[arg(short = 'f', long = "fps", default_value_t = 60)]
    pub fps: u32,

    /// Record size `WxH`. Window mode only.
    #[arg(short = 's', long = "size")]
    pub size: Option<String>,

    /// Audio input `[name/]device`. Repeatable.
    #[arg(short = 'a', long = "audio", action = clap::ArgAction::Append)]
    pub audio: Vec<String>,

    /// Quality preset.
    #[arg(short = 'q', long = "quality", default_value = "very_high")]
    pub quality: String,

    /// Replay buffer length in seconds (5..=1200). Enables replay mode.
    #[arg(short = 'r', long = "replay")]
    pub replay: Option<u32>,

    /// Codec selection.
    #[arg(short = 'k', long = "codec", default_value = "auto")]
    pub codec: String,

    /// Output file or directory (directory required with `-r`). Defaults to
    /// standard output if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,
}
