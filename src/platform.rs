use std::time::{Duration, Instant};

use lime8::{Chip8, Machine, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use log::{debug, info};
use rand::Rng;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::Color;
use sdl2::rect::Rect;
use sdl2::VideoSubsystem;

use crate::HostError;

/// The SDL2 side of the emulator: a window, the keyboard and the clock.
pub struct Platform<R: Rng> {
    video: VideoSubsystem,

    machine: Machine,
    chip8: Chip8<R>,

    scale: u32,
    delay: Duration,
}

impl<R: Rng> Platform<R> {
    pub fn new(machine: Machine, chip8: Chip8<R>, scale: u32, delay: Duration) -> Result<Self, HostError> {
        let context = sdl2::init().map_err(HostError::Platform)?;
        let video = context.video().map_err(HostError::Platform)?;

        Ok(Self {
            video,
            machine,
            chip8,
            scale,
            delay,
        })
    }

    pub fn run(&mut self) -> Result<(), HostError> {
        let window = self
            .video
            .window(
                "lime8",
                // Scale the window size since the original resolution is small.
                DISPLAY_WIDTH as u32 * self.scale,
                DISPLAY_HEIGHT as u32 * self.scale,
            )
            .position_centered()
            .build()
            .map_err(|e| HostError::Platform(e.to_string()))?;

        let mut canvas = window
            .into_canvas()
            .build()
            .map_err(|e| HostError::Platform(e.to_string()))?;

        // An event pump is used to handle input events.
        let mut event_pump = self.video.sdl().event_pump().map_err(HostError::Platform)?;

        let mut timestamp = Instant::now();

        'running: loop {
            for event in event_pump.poll_iter() {
                if !self.process_input(event) {
                    break 'running;
                }
            }

            // Spin until the next step is due rather than sleeping a fixed
            // amount of time.
            if timestamp.elapsed() < self.delay {
                continue;
            }
            timestamp = Instant::now();

            // Faults are reported by the engine. The program keeps running,
            // the same way a real interpreter would carry on past them.
            if let Err(fault) = self.chip8.step(&mut self.machine) {
                debug!("continuing after fault: {fault}");
            }

            self.draw(&mut canvas)?;
        }

        info!("window closed");

        Ok(())
    }

    fn draw(&self, canvas: &mut sdl2::render::WindowCanvas) -> Result<(), HostError> {
        let scale = self.scale as i32;

        for (i, &pixel) in self.machine.video().iter().enumerate() {
            let x = (i % DISPLAY_WIDTH) as i32;
            let y = (i / DISPLAY_WIDTH) as i32;

            let colour = if pixel == 0 {
                Color::RGB(0, 0, 0)
            } else {
                Color::RGB(255, 255, 255)
            };

            canvas.set_draw_color(colour);
            canvas
                .fill_rect(Rect::new(x * scale, y * scale, self.scale, self.scale))
                .map_err(HostError::Platform)?;
        }

        canvas.present();

        Ok(())
    }

    /// Returns `false` if the application should exit.
    fn process_input(&mut self, event: Event) -> bool {
        let (keycode, down) = match event {
            Event::Quit { .. }
            | Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => return false,
            Event::KeyDown {
                keycode: Some(keycode),
                ..
            } => (keycode, true),
            Event::KeyUp {
                keycode: Some(keycode),
                ..
            } => (keycode, false),

            // Ignore all other events.
            _ => return true,
        };

        if let Some(key) = keypad(keycode) {
            if let Err(e) = self.machine.set_key(key, down) {
                debug!("dropping key event: {e}");
            }
        }

        true
    }
}

/// Maps a keyboard key to the keypad key in the same position.
fn keypad(keycode: Keycode) -> Option<u8> {
    // Keypad layout:
    // 1 2 3 4 -> 1 2 3 C
    // Q W E R -> 4 5 6 D
    // A S D F -> 7 8 9 E
    // Z X C V -> A 0 B F
    match keycode {
        Keycode::Num1 => Some(0x1),
        Keycode::Num2 => Some(0x2),
        Keycode::Num3 => Some(0x3),
        Keycode::Num4 => Some(0xC),
        Keycode::Q => Some(0x4),
        Keycode::W => Some(0x5),
        Keycode::E => Some(0x6),
        Keycode::R => Some(0xD),
        Keycode::A => Some(0x7),
        Keycode::S => Some(0x8),
        Keycode::D => Some(0x9),
        Keycode::F => Some(0xE),
        Keycode::Z => Some(0xA),
        Keycode::X => Some(0x0),
        Keycode::C => Some(0xB),
        Keycode::V => Some(0xF),
        _ => None,
    }
}
