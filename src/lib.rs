//! A CHIP-8 interpreter core.
//!
//! [`Machine`] holds the state of one virtual machine and [`Chip8`] executes
//! it one instruction at a time. Neither knows about windows, files or real
//! time: the host loads a ROM image, latches keys, calls [`Chip8::step`] and
//! reads the framebuffer back out.
//!
//! ```
//! use lime8::{Chip8, Machine};
//!
//! let mut machine = Machine::new();
//! // LD V0, 0x2A
//! machine.load_rom(&[0x60, 0x2A]).unwrap();
//!
//! let mut chip8 = Chip8::new();
//! chip8.step(&mut machine).unwrap();
//!
//! assert_eq!(machine.register(0), 0x2A);
//! ```

pub mod chip8;
pub mod error;
pub mod machine;
pub mod quirks;

pub use crate::chip8::Chip8;
pub use crate::error::Error;
pub use crate::machine::{Machine, DISPLAY_HEIGHT, DISPLAY_WIDTH};
pub use crate::quirks::{Quirks, ShiftQuirk, SpriteEdge};
