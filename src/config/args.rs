//! CLI argument parsing using clap

use crate::ntv2::{IoSelection, SdiTransport4K, VideoFormat};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ajacap - AJA capture card acquisition
///
/// Capture video and embedded audio from capture card inputs shared between clients
#[derive(Parser, Debug)]
#[command(name = "ajacap")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file (default: ajacap.toml next to the executable, then the user
    /// config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// 4K link layout on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport4K {
    Squares,
    Tsi,
}

impl From<Transport4K> for SdiTransport4K {
    fn from(t: Transport4K) -> Self {
        match t {
            Transport4K::Squares => SdiTransport4K::Squares,
            Transport4K::Tsi => SdiTransport4K::TwoSampleInterleave,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List capture devices
    List {
        /// Include output-only devices
        #[arg(long)]
        all: bool,

        /// Show device IDs (useful for scripting)
        #[arg(long)]
        show_ids: bool,
    },

    /// Show detailed device information
    Info {
        /// Device ID or model name to show info for
        device_id: String,
    },

    /// Capture from one input until Ctrl+C
    Capture {
        /// Named source from the configuration file
        #[arg(short, long)]
        source: Option<String>,

        /// Device ID to capture from
        #[arg(short, long)]
        device: Option<String>,

        /// Input selection (sdi1, sdi1_2, sdi1_4, hdmi1, ...)
        #[arg(short, long)]
        input: Option<IoSelection>,

        /// Video format or "auto"
        #[arg(long)]
        video_format: Option<String>,

        /// Pixel format or "auto"
        #[arg(long)]
        pixel_format: Option<String>,

        /// SDI transport or "auto"
        #[arg(long)]
        sdi_transport: Option<String>,

        /// 4K link layout
        #[arg(long, value_enum)]
        transport_4k: Option<Transport4K>,

        /// Signal the simulated card presents on the selected inputs
        #[arg(long, default_value = "1080i5994")]
        signal: VideoFormat,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Write a sample configuration file
    InitConfig {
        /// Destination (default: user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// Get the log level based on verbose/quiet flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Level given on the command line, if any flag was passed
    pub fn explicit_log_level(&self) -> Option<tracing::Level> {
        (self.quiet || self.verbose > 0).then(|| self.log_level())
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::List {
            all: false,
            show_ids: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_flags() {
        let args = Args::parse_from(["ajacap", "-vv", "list"]);
        assert_eq!(args.log_level(), tracing::Level::TRACE);
        let args = Args::parse_from(["ajacap", "--quiet"]);
        assert_eq!(args.explicit_log_level(), Some(tracing::Level::ERROR));
        let args = Args::parse_from(["ajacap"]);
        assert_eq!(args.explicit_log_level(), None);
    }

    #[test]
    fn test_capture_arguments() {
        let args = Args::parse_from([
            "ajacap",
            "capture",
            "--device",
            "sim-0",
            "--input",
            "sdi1_2",
            "--signal",
            "1080p50_b",
            "--transport-4k",
            "squares",
        ]);
        match args.command {
            Some(Command::Capture {
                device,
                input,
                signal,
                transport_4k,
                video_format,
                ..
            }) => {
                assert_eq!(device.as_deref(), Some("sim-0"));
                assert_eq!(input, Some(IoSelection::Sdi1_2));
                assert_eq!(signal, VideoFormat::F1080p50B);
                assert_eq!(transport_4k.map(SdiTransport4K::from), Some(SdiTransport4K::Squares));
                assert_eq!(video_format, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bad_input_rejected() {
        assert!(Args::try_parse_from(["ajacap", "capture", "--input", "sdi9"]).is_err());
    }
}
