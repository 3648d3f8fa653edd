use lime8::machine::{FONT, MAX_ROM_SIZE, PIXEL_OFF};
use lime8::{Chip8, Machine};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn engine() -> Chip8<SmallRng> {
    Chip8::with_rng(SmallRng::seed_from_u64(42))
}

fn load(program: &[u16]) -> Machine {
    let rom: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
    let mut machine = Machine::new();
    machine.load_rom(&rom).unwrap();
    machine
}

fn step_n(chip8: &mut Chip8<SmallRng>, machine: &mut Machine, n: usize) {
    for _ in 0..n {
        chip8.step(machine).unwrap();
    }
}

#[test]
fn loaded_rom_sits_at_0x200_with_pc_there() {
    for len in [1, 2, 255, 1024, MAX_ROM_SIZE - 1] {
        let rom: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
        let mut machine = Machine::new();

        machine.load_rom(&rom).unwrap();

        assert_eq!(machine.pc(), 0x200);
        assert_eq!(&machine.memory()[0x200..0x200 + len], &rom[..]);
        assert_eq!(&machine.memory()[0x50..0xA0], &FONT[..]);
    }
}

#[test]
fn clear_screen_empties_a_drawn_framebuffer() {
    // Draw glyph "8", then clear.
    let mut machine = load(&[0x6008, 0xF029, 0xD005, 0x00E0]);
    let mut chip8 = engine();

    step_n(&mut chip8, &mut machine, 3);
    assert!(machine.video().iter().any(|&p| p != PIXEL_OFF));

    chip8.step(&mut machine).unwrap();
    assert_eq!(machine.video().len(), 64 * 32);
    assert!(machine.video().iter().all(|&p| p == PIXEL_OFF));
}

#[test]
fn matching_skip_advances_four_bytes() {
    let mut machine = load(&[0x6C99, 0x3C99]);
    let mut chip8 = engine();
    chip8.step(&mut machine).unwrap();
    let before = machine.pc();

    chip8.step(&mut machine).unwrap();
    assert_eq!(machine.pc(), before + 4);

    let mut machine = load(&[0x6C99, 0x3C98]);
    chip8.step(&mut machine).unwrap();
    let before = machine.pc();

    chip8.step(&mut machine).unwrap();
    assert_eq!(machine.pc(), before + 2);
}

#[test]
fn call_and_return_resume_after_the_call() {
    // 0x200: JP 0x204, 0x202: RET, 0x204: CALL 0x202, 0x206: LD V1, 1
    let mut machine = load(&[0x1204, 0x00EE, 0x2202, 0x6101]);
    let mut chip8 = engine();

    step_n(&mut chip8, &mut machine, 3);
    assert_eq!(machine.pc(), 0x206);
    assert_eq!(machine.sp(), 0);

    chip8.step(&mut machine).unwrap();
    assert_eq!(machine.register(1), 1);
}

#[test]
fn add_with_carry() {
    let mut machine = load(&[0x61FF, 0x6201, 0x8124]);
    step_n(&mut engine(), &mut machine, 3);
    assert_eq!((machine.register(1), machine.register(0xF)), (0x00, 1));

    let mut machine = load(&[0x61FF, 0x6200, 0x8124]);
    step_n(&mut engine(), &mut machine, 3);
    assert_eq!((machine.register(1), machine.register(0xF)), (0xFF, 0));
}

#[test]
fn sprite_drawn_twice_cancels_out_with_collision() {
    // 0xFF at 0x300, drawn twice at (10, 10).
    let mut machine = load(&[0x60FF, 0xA300, 0xF055, 0xA300, 0x600A, 0xD001, 0xD001]);
    let mut chip8 = engine();

    step_n(&mut chip8, &mut machine, 6);
    assert_eq!(machine.register(0xF), 0);
    assert!((10..18).all(|x| machine.pixel(x, 10)));

    chip8.step(&mut machine).unwrap();
    assert_eq!(machine.register(0xF), 1);
    assert!(machine.video().iter().all(|&p| p == PIXEL_OFF));
}

#[test]
fn bcd_of_123() {
    let mut machine = load(&[0x637B, 0xA400, 0xF333]);
    step_n(&mut engine(), &mut machine, 3);

    assert_eq!(&machine.memory()[0x400..0x403], &[1, 2, 3]);
}

#[test]
fn register_store_and_load_round_trip() {
    let mut machine = load(&[
        0x60DE, 0x61AD, 0x62BE, 0x63EF, 0xA500, 0xF355, // V0..V3 -> 0x500
        0x6000, 0x6100, 0x6200, 0x6300, 0xA500, 0xF365, // 0x500 -> V0..V3
    ]);
    let mut chip8 = engine();

    step_n(&mut chip8, &mut machine, 6);
    let after_store = machine.index();

    step_n(&mut chip8, &mut machine, 6);

    assert_eq!(
        [0, 1, 2, 3].map(|x| machine.register(x)),
        [0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert_eq!(machine.index(), after_store);
    assert_eq!(after_store, 0x504);
}

#[test]
fn faulting_rom_keeps_running() {
    // RET with nothing to return to, then a normal instruction.
    let mut machine = load(&[0x00EE, 0x6501]);
    let mut chip8 = engine();

    assert!(chip8.step(&mut machine).is_err());
    chip8.step(&mut machine).unwrap();

    assert_eq!(machine.register(5), 1);
}
