/// Game configuration constants.
/// 
/// This module defines the board geometry and the life-decay rule of the game.
pub const BOARD_SIZE: usize = 3;

/// Number of global decays a freshly placed mark survives before it vanishes.
pub const INITIAL_LIVES: u8 = 6;
