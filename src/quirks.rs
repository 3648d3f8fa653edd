//! Behaviours that differ between interpreters, and that ROMs disagree on.

/// Which register `8xy6` and `8xye` shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "platform", derive(clap::ValueEnum))]
pub enum ShiftQuirk {
    /// Shift `Vx` in place and ignore `Vy` (Cowgod's reference).
    #[default]
    InPlace,
    /// Copy `Vy` into `Vx`, then shift (the original COSMAC VIP).
    CopyVy,
}

/// What happens to sprite pixels that fall past the right or bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteEdge {
    /// Pixels beyond the framebuffer are dropped.
    #[default]
    Clip,
    /// Pixels beyond the framebuffer wrap around to the opposite edge.
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quirks {
    pub shift: ShiftQuirk,
    pub edge: SpriteEdge,
}

impl Quirks {
    pub fn with_shift(mut self, shift: ShiftQuirk) -> Self {
        self.shift = shift;
        self
    }

    pub fn with_edge(mut self, edge: SpriteEdge) -> Self {
        self.edge = edge;
        self
    }
}
