use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lime8::{Chip8, Machine, Quirks, ShiftQuirk, SpriteEdge};
use log::info;
use thiserror::Error;

use crate::platform::Platform;

mod platform;

/// Errors from the host side: files, SDL, and whatever the core reports.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Core(#[from] lime8::Error),

    #[error("platform error: {0}")]
    Platform(String),
}

#[derive(Parser, Debug)]
#[command(version, about = "A CHIP-8 interpreter", long_about = None)]
struct Args {
    /// Window pixels per CHIP-8 pixel.
    #[arg(short, long, default_value_t = 10)]
    scale: u32,

    /// Milliseconds between instructions. Timers tick once per instruction,
    /// so around 16 keeps them close to 60 Hz.
    #[arg(short, long, default_value_t = 2)]
    delay: u64,

    /// 80-byte font file to use instead of the built-in one.
    #[arg(short, long)]
    font: Option<PathBuf>,

    /// Which register the shift instructions operate on.
    #[arg(long, value_enum, default_value_t = ShiftQuirk::InPlace)]
    shift_quirk: ShiftQuirk,

    /// Wrap sprites around the screen edges instead of clipping them.
    #[arg(long)]
    wrap_sprites: bool,

    /// Path to the ROM to run.
    rom: PathBuf,
}

fn main() -> Result<(), HostError> {
    env_logger::init();

    let args = Args::parse();

    let mut machine = match &args.font {
        Some(path) => Machine::with_font(&fs::read(path)?)?,
        None => Machine::new(),
    };
    machine.load_rom(&fs::read(&args.rom)?)?;
    info!("running {}", args.rom.display());

    let edge = if args.wrap_sprites {
        SpriteEdge::Wrap
    } else {
        SpriteEdge::Clip
    };
    let quirks = Quirks::default()
        .with_shift(args.shift_quirk)
        .with_edge(edge);

    let chip8 = Chip8::new().with_quirks(quirks);

    let mut platform = Platform::new(machine, chip8, args.scale, Duration::from_millis(args.delay))?;

    platform.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_are_wrapped_not_flattened() {
        let error: HostError = lime8::Error::EmptyRom.into();

        assert!(matches!(error, HostError::Core(lime8::Error::EmptyRom)));
        assert_eq!(error.to_string(), "ROM is empty");
    }
}
