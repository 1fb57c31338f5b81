//! Core game logic: board cells and the vanishing-mark board.

pub mod types;
pub mod board;
