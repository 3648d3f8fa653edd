use log::{debug, trace, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::Error;
use crate::machine::{
    Machine, DISPLAY_HEIGHT, DISPLAY_WIDTH, FONT_START, GLYPH_SIZE, PIXEL_OFF, PIXEL_ON,
};
use crate::quirks::{Quirks, ShiftQuirk, SpriteEdge};

/// Extracts `_nnn` from an opcode.
macro_rules! nnn {
    ($opcode:expr) => {
        $opcode & 0x0FFF
    };
}

/// Extracts `___n` from an opcode.
macro_rules! n {
    ($opcode:expr) => {
        $opcode & 0x000F
    };
}

/// Extracts `_x__` from an opcode. Since `x` is used to index registers, it is
/// returned as a `usize`.
macro_rules! x {
    ($opcode:expr) => {
        (($opcode & 0x0F00) >> 8) as usize
    };
}

/// Extracts `__y_` from an opcode. Since `y` is used to index registers, it is
/// returned as a `usize`.
macro_rules! y {
    ($opcode:expr) => {
        (($opcode & 0x00F0) >> 4) as usize
    };
}

/// Extracts `__kk` from an opcode. Since `kk` is used to compare values against
/// registers, it is returned as a `u8`.
macro_rules! kk {
    ($opcode:expr) => {
        ($opcode & 0x00FF) as u8
    };
}

/// An opcode handler. Handlers read their operands from `Machine::op_code`.
type Handler<R> = fn(&mut Chip8<R>, &mut Machine) -> Result<(), Error>;

/// The execution engine.
///
/// The engine owns nothing but the settings and the random number generator
/// used by `Cxkk`; all machine state lives in the [`Machine`] passed to
/// [`Chip8::step`].
pub struct Chip8<R: Rng> {
    quirks: Quirks,

    // There is an instruction that places a random number in a register. So, we
    // need a random number generator.
    rng: R,

    // Most recent fault, so a program stuck on one doesn't flood the log.
    last_fault: Option<Error>,
}

impl Chip8<SmallRng> {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }
}

impl Default for Chip8<SmallRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Chip8<R> {
    /// Builds an engine around a specific generator, e.g. a seeded one.
    pub fn with_rng(rng: R) -> Self {
        Self {
            quirks: Quirks::default(),
            rng,
            last_fault: None,
        }
    }

    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Runs one fetch, decode, execute and timer cycle.
    ///
    /// The timers are decremented once per call, whatever instruction ran, so
    /// the host has to pace its calls to roughly 60 Hz for ROMs that count on
    /// the timers to keep time. Faults raised by the program (stack overflow,
    /// out-of-bounds memory, a key past `0xF`) leave the machine exactly as
    /// the fetch left it, still tick the timers, and are returned so the host
    /// can decide whether to keep stepping. A fault identical to the previous
    /// step's is only logged at debug level.
    pub fn step(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let result = self
            .fetch(machine)
            .and_then(|()| self.execute(machine));

        machine.tick_timers();

        match &result {
            Err(fault) if self.last_fault.as_ref() == Some(fault) => debug!("again: {fault}"),
            Err(fault) => {
                warn!("{fault}");
                self.last_fault = Some(fault.clone());
            }
            Ok(()) => self.last_fault = None,
        }

        result
    }

    fn fetch(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let pc = machine.program_counter as usize;
        let high = machine.read(pc)?;
        let low = machine.read(pc + 1)?;

        machine.op_code = u16::from_be_bytes([high, low]);

        // Increment the program counter by 2 to get to the next opcode. Jumps
        // and skips overwrite it from here.
        machine.program_counter += 2;

        Ok(())
    }

    fn execute(&mut self, machine: &mut Machine) -> Result<(), Error> {
        trace!(
            "{:#05X}: {:04X}",
            machine.program_counter - 2,
            machine.op_code
        );

        Self::TABLE[(machine.op_code >> 12) as usize](self, machine)
    }

    // The first level of dispatch is on the top nibble. Groups `0`, `8`, `E`
    // and `F` hold several instructions each and dispatch again.
    const TABLE: [Handler<R>; 16] = [
        Self::table_0,
        Self::op_1nnn,
        Self::op_2nnn,
        Self::op_3xkk,
        Self::op_4xkk,
        Self::op_5xy0,
        Self::op_6xkk,
        Self::op_7xkk,
        Self::table_8,
        Self::op_9xy0,
        Self::op_annn,
        Self::op_bnnn,
        Self::op_cxkk,
        Self::op_dxyn,
        Self::table_e,
        Self::table_f,
    ];

    // Keyed on the low nibble.
    const TABLE_0: [Handler<R>; 16] = {
        let mut table = [Self::op_null as Handler<R>; 16];
        table[0x0] = Self::op_00e0;
        table[0xE] = Self::op_00ee;
        table
    };

    // Keyed on the low nibble.
    const TABLE_8: [Handler<R>; 16] = {
        let mut table = [Self::op_null as Handler<R>; 16];
        table[0x0] = Self::op_8xy0;
        table[0x1] = Self::op_8xy1;
        table[0x2] = Self::op_8xy2;
        table[0x3] = Self::op_8xy3;
        table[0x4] = Self::op_8xy4;
        table[0x5] = Self::op_8xy5;
        table[0x6] = Self::op_8xy6;
        table[0x7] = Self::op_8xy7;
        table[0xE] = Self::op_8xye;
        table
    };

    // Keyed on the low byte.
    const TABLE_E: [Handler<R>; 256] = {
        let mut table = [Self::op_null as Handler<R>; 256];
        table[0x9E] = Self::op_ex9e;
        table[0xA1] = Self::op_exa1;
        table
    };

    // Keyed on the low byte.
    const TABLE_F: [Handler<R>; 256] = {
        let mut table = [Self::op_null as Handler<R>; 256];
        table[0x07] = Self::op_fx07;
        table[0x0A] = Self::op_fx0a;
        table[0x15] = Self::op_fx15;
        table[0x18] = Self::op_fx18;
        table[0x1E] = Self::op_fx1e;
        table[0x29] = Self::op_fx29;
        table[0x33] = Self::op_fx33;
        table[0x55] = Self::op_fx55;
        table[0x65] = Self::op_fx65;
        table
    };

    fn table_0(&mut self, machine: &mut Machine) -> Result<(), Error> {
        Self::TABLE_0[n!(machine.op_code) as usize](self, machine)
    }

    fn table_8(&mut self, machine: &mut Machine) -> Result<(), Error> {
        Self::TABLE_8[n!(machine.op_code) as usize](self, machine)
    }

    fn table_e(&mut self, machine: &mut Machine) -> Result<(), Error> {
        Self::TABLE_E[kk!(machine.op_code) as usize](self, machine)
    }

    fn table_f(&mut self, machine: &mut Machine) -> Result<(), Error> {
        Self::TABLE_F[kk!(machine.op_code) as usize](self, machine)
    }

    /// Anything that isn't a known instruction does nothing. The program
    /// counter has already moved past it.
    fn op_null(&mut self, machine: &mut Machine) -> Result<(), Error> {
        debug!("ignoring unknown opcode {:04X}", machine.op_code);

        Ok(())
    }
}

/// The Chip-8 has 35 instructions that we need to emulate.
///
/// Where interpreters disagree (the shifts and sprites running off the edge of
/// the screen) the behaviour comes from [`Quirks`].
impl<R: Rng> Chip8<R> {
    /// `CLS`: opcode `00E0`
    ///
    /// Clear the display.
    fn op_00e0(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.video.fill(PIXEL_OFF);

        Ok(())
    }

    /// `RET`: opcode `00EE`
    ///
    /// Return from a subroutine.
    fn op_00ee(&mut self, machine: &mut Machine) -> Result<(), Error> {
        // The top of the stack has the address of one instruction past the one
        // that called the subroutine.
        machine.program_counter = machine.pop()?;

        Ok(())
    }

    /// `JP addr`: opcode `1nnn`
    ///
    /// Jump to location `nnn`.
    fn op_1nnn(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.program_counter = nnn!(machine.op_code);

        Ok(())
    }

    /// `CALL addr`: opcode `2nnn`
    ///
    /// Call subroutine at `nnn`.
    fn op_2nnn(&mut self, machine: &mut Machine) -> Result<(), Error> {
        // The program counter already holds the instruction after this `CALL`,
        // which is where the matching `RET` has to land.
        machine.push(machine.program_counter)?;
        machine.program_counter = nnn!(machine.op_code);

        Ok(())
    }

    /// `SE Vx, byte`: opcode `3xkk`
    ///
    /// Skip next instruction if `Vx = kk`.
    fn op_3xkk(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let kk = kk!(machine.op_code);

        if machine.register(x) == kk {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `SNE Vx, byte`: opcode `4xkk`
    ///
    /// Skip next instruction if `Vx != kk`.
    fn op_4xkk(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let kk = kk!(machine.op_code);

        if machine.register(x) != kk {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `SE Vx, Vy`: opcode `5xy0`
    ///
    /// Skip next instruction if `Vx = Vy`.
    fn op_5xy0(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        if machine.register(x) == machine.register(y) {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `LD Vx, byte`: opcode `6xkk`
    ///
    /// Set `Vx = kk`.
    fn op_6xkk(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let kk = kk!(machine.op_code);

        machine.set_register(x, kk);

        Ok(())
    }

    /// `ADD Vx, byte`: opcode `7xkk`
    ///
    /// Set `Vx = Vx + kk`. No carry flag.
    fn op_7xkk(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let kk = kk!(machine.op_code);

        machine.set_register(x, machine.register(x).wrapping_add(kk));

        Ok(())
    }

    /// `LD Vx, Vy`: opcode `8xy0`
    fn op_8xy0(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        machine.set_register(x, machine.register(y));

        Ok(())
    }

    /// `OR Vx, Vy`: opcode `8xy1`
    fn op_8xy1(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        machine.set_register(x, machine.register(x) | machine.register(y));

        Ok(())
    }

    /// `AND Vx, Vy`: opcode `8xy2`
    fn op_8xy2(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        machine.set_register(x, machine.register(x) & machine.register(y));

        Ok(())
    }

    /// `XOR Vx, Vy`: opcode `8xy3`
    fn op_8xy3(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        machine.set_register(x, machine.register(x) ^ machine.register(y));

        Ok(())
    }

    /// `ADD Vx, Vy`: opcode `8xy4`
    ///
    /// Set `Vx = Vx + Vy`, set `VF = carry`.
    ///
    /// Only the lowest 8 bits of the sum are kept. The flag is written after
    /// the result, so `8Fy4` leaves the carry in `VF`.
    fn op_8xy4(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        let (result, overflow) = machine.register(x).overflowing_add(machine.register(y));

        machine.set_register(x, result);
        machine.set_register(0xF, overflow as u8);

        Ok(())
    }

    /// `SUB Vx, Vy`: opcode `8xy5`
    ///
    /// Set `Vx = Vx - Vy`, set `VF = NOT borrow`.
    fn op_8xy5(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        let (result, borrow) = machine.register(x).overflowing_sub(machine.register(y));

        machine.set_register(x, result);
        machine.set_register(0xF, !borrow as u8);

        Ok(())
    }

    /// `SHR Vx {, Vy}`: opcode `8xy6`
    ///
    /// Set `Vx = Vx SHR 1` (or `Vy SHR 1`, see [`ShiftQuirk`]). `VF` gets the
    /// bit shifted out.
    fn op_8xy6(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let operand = self.shift_operand(machine);

        machine.set_register(x, operand >> 1);
        machine.set_register(0xF, operand & 0x1);

        Ok(())
    }

    /// `SUBN Vx, Vy`: opcode `8xy7`
    ///
    /// Set `Vx = Vy - Vx`, set `VF = NOT borrow`.
    fn op_8xy7(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        let (result, borrow) = machine.register(y).overflowing_sub(machine.register(x));

        machine.set_register(x, result);
        machine.set_register(0xF, !borrow as u8);

        Ok(())
    }

    /// `SHL Vx {, Vy}`: opcode `8xye`
    ///
    /// Set `Vx = Vx SHL 1` (or `Vy SHL 1`, see [`ShiftQuirk`]). `VF` gets the
    /// bit shifted out.
    fn op_8xye(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let operand = self.shift_operand(machine);

        machine.set_register(x, operand << 1);
        machine.set_register(0xF, (operand & 0b1000_0000) >> 7);

        Ok(())
    }

    fn shift_operand(&self, machine: &Machine) -> u8 {
        match self.quirks.shift {
            ShiftQuirk::InPlace => machine.register(x!(machine.op_code)),
            ShiftQuirk::CopyVy => machine.register(y!(machine.op_code)),
        }
    }

    /// `SNE Vx, Vy`: opcode `9xy0`
    ///
    /// Skip next instruction if `Vx != Vy`.
    fn op_9xy0(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);

        if machine.register(x) != machine.register(y) {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `LD I, addr`: opcode `Annn`
    fn op_annn(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.index = nnn!(machine.op_code);

        Ok(())
    }

    /// `JP V0, addr`: opcode `Bnnn`
    ///
    /// Jump to location `nnn + V0`.
    fn op_bnnn(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.program_counter = nnn!(machine.op_code) + machine.register(0) as u16;

        Ok(())
    }

    /// `RND Vx, byte`: opcode `Cxkk`
    ///
    /// Set `Vx = random byte AND kk`.
    fn op_cxkk(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let kk = kk!(machine.op_code);

        machine.set_register(x, self.rng.gen::<u8>() & kk);

        Ok(())
    }

    /// `DRW Vx, Vy, nibble`: opcode `Dxyn`
    ///
    /// Display the `n`-byte sprite at `I` at `(Vx, Vy)`, set `VF = collision`.
    ///
    /// The origin always wraps onto the screen. Pixels past the right or
    /// bottom edge are clipped or wrapped according to [`SpriteEdge`].
    fn op_dxyn(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let x = x!(machine.op_code);
        let y = y!(machine.op_code);
        let n = n!(machine.op_code) as usize;

        let origin_x = machine.register(x) as usize % DISPLAY_WIDTH;
        let origin_y = machine.register(y) as usize % DISPLAY_HEIGHT;

        let mut sprite = [0u8; 0xF];
        sprite[..n].copy_from_slice(machine.slice(machine.index, n)?);

        let mut collision = false;

        for (row, &sprite_byte) in sprite[..n].iter().enumerate() {
            for col in 0..8 {
                if sprite_byte & (0b1000_0000 >> col) == 0 {
                    continue;
                }

                let (px, py) = match self.quirks.edge {
                    SpriteEdge::Clip => {
                        let (px, py) = (origin_x + col, origin_y + row);
                        if px >= DISPLAY_WIDTH || py >= DISPLAY_HEIGHT {
                            continue;
                        }
                        (px, py)
                    }
                    SpriteEdge::Wrap => (
                        (origin_x + col) % DISPLAY_WIDTH,
                        (origin_y + row) % DISPLAY_HEIGHT,
                    ),
                };

                let pixel = &mut machine.video[px + py * DISPLAY_WIDTH];

                // Turning a lit pixel off is a collision.
                if *pixel != PIXEL_OFF {
                    collision = true;
                }

                *pixel ^= PIXEL_ON;
            }
        }

        machine.set_register(0xF, collision as u8);

        Ok(())
    }

    /// `SKP Vx`: opcode `Ex9E`
    ///
    /// Skip next instruction if key with the value of `Vx` is pressed.
    fn op_ex9e(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let key = machine.register(x!(machine.op_code));

        if machine.is_key_down(key)? {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `SKNP Vx`: opcode `ExA1`
    ///
    /// Skip next instruction if key with the value of `Vx` is not pressed.
    fn op_exa1(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let key = machine.register(x!(machine.op_code));

        if !machine.is_key_down(key)? {
            machine.program_counter += 2;
        }

        Ok(())
    }

    /// `LD Vx, DT`: opcode `Fx07`
    fn op_fx07(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.set_register(x!(machine.op_code), machine.delay_timer);

        Ok(())
    }

    /// `LD Vx, K`: opcode `Fx0A`
    ///
    /// Wait for a key press, store the value of the key in `Vx`.
    fn op_fx0a(&mut self, machine: &mut Machine) -> Result<(), Error> {
        // Waiting means running the same instruction again on the next step,
        // so control still goes back to the host every step.
        match machine.keys.iter().position(|&down| down) {
            Some(key) => machine.set_register(x!(machine.op_code), key as u8),
            None => machine.program_counter -= 2,
        }

        Ok(())
    }

    /// `LD DT, Vx`: opcode `Fx15`
    fn op_fx15(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.delay_timer = machine.register(x!(machine.op_code));

        Ok(())
    }

    /// `LD ST, Vx`: opcode `Fx18`
    fn op_fx18(&mut self, machine: &mut Machine) -> Result<(), Error> {
        machine.sound_timer = machine.register(x!(machine.op_code));

        Ok(())
    }

    /// `ADD I, Vx`: opcode `Fx1E`
    fn op_fx1e(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let value = machine.register(x!(machine.op_code)) as u16;

        machine.index = machine.index.wrapping_add(value);

        Ok(())
    }

    /// `LD F, Vx`: opcode `Fx29`
    ///
    /// Set `I = location of sprite for digit Vx`.
    fn op_fx29(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let digit = machine.register(x!(machine.op_code)) as u16;

        machine.index = FONT_START + GLYPH_SIZE * digit;

        Ok(())
    }

    /// `LD B, Vx`: opcode `Fx33`
    ///
    /// Store the BCD representation of `Vx` at `I`, `I+1` and `I+2`, hundreds
    /// first.
    fn op_fx33(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let value = machine.register(x!(machine.op_code));
        let digits = [value / 100, value / 10 % 10, value % 10];

        machine
            .slice_mut(machine.index, digits.len())?
            .copy_from_slice(&digits);

        Ok(())
    }

    /// `LD [I], Vx`: opcode `Fx55`
    ///
    /// Store registers `V0` through `Vx` in memory starting at `I`, then
    /// advance `I` past them.
    fn op_fx55(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let count = x!(machine.op_code) + 1;
        let registers = machine.registers;

        machine
            .slice_mut(machine.index, count)?
            .copy_from_slice(&registers[..count]);
        machine.index = machine.index.wrapping_add(count as u16);

        Ok(())
    }

    /// `LD Vx, [I]`: opcode `Fx65`
    ///
    /// Read registers `V0` through `Vx` from memory starting at `I`, then
    /// advance `I` past them.
    fn op_fx65(&mut self, machine: &mut Machine) -> Result<(), Error> {
        let count = x!(machine.op_code) + 1;

        let mut values = [0u8; 0x10];
        values[..count].copy_from_slice(machine.slice(machine.index, count)?);

        machine.registers[..count].copy_from_slice(&values[..count]);
        machine.index = machine.index.wrapping_add(count as u16);

        Ok(())
    }
}
