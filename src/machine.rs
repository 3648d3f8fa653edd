use log::debug;

use crate::error::Error;

pub const MEMORY_SIZE: usize = 0x1000;
pub const FONT_START: u16 = 0x50;
pub const ROM_START: u16 = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START as usize;

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

pub const REGISTER_COUNT: usize = 0x10;
pub const STACK_SIZE: usize = 0x10;
pub const KEY_COUNT: usize = 0x10;

/// Bytes per glyph in the font table.
pub const GLYPH_SIZE: u16 = 5;

/// Value of a lit pixel in the framebuffer.
pub const PIXEL_ON: u32 = u32::MAX;
pub const PIXEL_OFF: u32 = 0;

pub const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// The complete state of one CHIP-8 virtual machine.
///
/// The machine has no behaviour of its own beyond keeping its invariants:
/// every access that could leave the backing arrays goes through a checked
/// accessor and fails with an [`Error`] instead of panicking. The engine in
/// [`crate::chip8`] is what drives it.
pub struct Machine {
    pub(crate) memory: [u8; MEMORY_SIZE],
    pub(crate) registers: [u8; REGISTER_COUNT],

    pub(crate) stack: [u16; STACK_SIZE],
    // Next free slot, so 0 means the stack is empty.
    pub(crate) stack_pointer: usize,

    pub(crate) index: u16,
    pub(crate) program_counter: u16,
    pub(crate) delay_timer: u8,
    pub(crate) sound_timer: u8,

    pub(crate) video: [u32; DISPLAY_WIDTH * DISPLAY_HEIGHT],
    pub(crate) keys: [bool; KEY_COUNT],

    pub(crate) op_code: u16,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Creates a machine with the built-in hexadecimal font.
    pub fn new() -> Self {
        let mut machine = Self {
            memory: [0; MEMORY_SIZE],
            registers: [0; REGISTER_COUNT],

            stack: [0; STACK_SIZE],
            stack_pointer: 0,

            index: 0,
            program_counter: ROM_START,
            delay_timer: 0,
            sound_timer: 0,

            video: [PIXEL_OFF; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            keys: [false; KEY_COUNT],

            op_code: 0,
        };

        machine.install_font(&FONT);

        machine
    }

    /// Creates a machine with a font supplied by the host, for example one
    /// read from a file. The machine can't run without a complete font, so
    /// anything other than 16 glyphs of 5 bytes is rejected.
    pub fn with_font(font: &[u8]) -> Result<Self, Error> {
        if font.len() != FONT.len() {
            return Err(Error::InvalidFont { len: font.len() });
        }

        let mut machine = Self::new();
        machine.install_font(font);

        Ok(machine)
    }

    fn install_font(&mut self, font: &[u8]) {
        let start = FONT_START as usize;
        self.memory[start..start + font.len()].copy_from_slice(font);

        debug!("font loaded at {:#05X}", FONT_START);
    }

    /// Loads a program image at `0x200`.
    ///
    /// Images that don't fit are rejected rather than truncated.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Error> {
        self.load_rom_with_limit(rom, MAX_ROM_SIZE)
    }

    /// Same as [`Machine::load_rom`], but the image must also fit within
    /// `limit` bytes. The limit can only tighten the memory bound.
    pub fn load_rom_with_limit(&mut self, rom: &[u8], limit: usize) -> Result<(), Error> {
        let max = limit.min(MAX_ROM_SIZE);

        if rom.is_empty() {
            return Err(Error::EmptyRom);
        }

        if rom.len() > max {
            return Err(Error::RomTooLarge {
                size: rom.len(),
                max,
            });
        }

        let start = ROM_START as usize;
        self.memory[start..].fill(0);
        self.memory[start..start + rom.len()].copy_from_slice(rom);
        self.program_counter = ROM_START;

        debug!("loaded {} byte ROM at {:#05X}", rom.len(), ROM_START);

        Ok(())
    }

    pub(crate) fn read(&self, address: usize) -> Result<u8, Error> {
        self.memory
            .get(address)
            .copied()
            .ok_or(Error::MemoryOutOfBounds { address })
    }

    pub(crate) fn slice(&self, address: u16, len: usize) -> Result<&[u8], Error> {
        let start = address as usize;

        self.memory
            .get(start..start + len)
            .ok_or(Error::MemoryOutOfBounds {
                address: start + len - 1,
            })
    }

    /// Writable view of memory for program stores. The font table is
    /// read-only to programs, so any range overlapping it is refused.
    pub(crate) fn slice_mut(&mut self, address: u16, len: usize) -> Result<&mut [u8], Error> {
        let start = address as usize;
        let font = FONT_START as usize..FONT_START as usize + FONT.len();

        if len > 0 && start < font.end && start + len > font.start {
            return Err(Error::ProtectedMemory {
                address: start.max(font.start),
            });
        }

        self.memory
            .get_mut(start..start + len)
            .ok_or(Error::MemoryOutOfBounds {
                address: start + len - 1,
            })
    }

    /// Register `x`. Only the low nibble of `x` is used.
    pub fn register(&self, x: usize) -> u8 {
        self.registers[x & 0xF]
    }

    pub(crate) fn set_register(&mut self, x: usize, value: u8) {
        self.registers[x & 0xF] = value;
    }

    pub(crate) fn push(&mut self, address: u16) -> Result<(), Error> {
        let slot = self
            .stack
            .get_mut(self.stack_pointer)
            .ok_or(Error::StackOverflow {
                pc: self.program_counter.wrapping_sub(2),
            })?;

        *slot = address;
        self.stack_pointer += 1;

        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<u16, Error> {
        if self.stack_pointer == 0 {
            return Err(Error::StackUnderflow {
                pc: self.program_counter.wrapping_sub(2),
            });
        }

        self.stack_pointer -= 1;

        Ok(self.stack[self.stack_pointer])
    }

    /// Whether `key` is held down. Keys past `0xF` don't exist.
    pub fn is_key_down(&self, key: u8) -> Result<bool, Error> {
        self.keys
            .get(key as usize)
            .copied()
            .ok_or(Error::InvalidKey { key })
    }

    /// Latches the state of one key. The host calls this between steps.
    pub fn set_key(&mut self, key: u8, down: bool) -> Result<(), Error> {
        let slot = self
            .keys
            .get_mut(key as usize)
            .ok_or(Error::InvalidKey { key })?;

        *slot = down;

        Ok(())
    }

    pub fn keys(&self) -> &[bool; KEY_COUNT] {
        &self.keys
    }

    /// Row-major framebuffer, `x + y * DISPLAY_WIDTH`.
    pub fn video(&self) -> &[u32; DISPLAY_WIDTH * DISPLAY_HEIGHT] {
        &self.video
    }

    /// Whether the pixel at `(x, y)` is lit. Coordinates outside the display
    /// are never lit.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT && self.video[x + y * DISPLAY_WIDTH] != PIXEL_OFF
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.program_counter
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn sp(&self) -> usize {
        self.stack_pointer
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    /// The most recently fetched instruction.
    pub fn opcode(&self) -> u16 {
        self.op_code
    }

    pub(crate) fn tick_timers(&mut self) {
        // Decrement the delay timer if it's been set.
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }

        // Decrement the sound timer if it's been set.
        if self.sound_timer > 0 {
            self.sound_timer -= 1;
        }
    }
}
