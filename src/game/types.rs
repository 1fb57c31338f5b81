use serde::{Serialize, Deserialize};

use crate::config::game::INITIAL_LIVES;

/// Content of a board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Mark {
    #[default]
    #[serde(rename = "-")]
    Empty,
    #[serde(rename = "x")]
    X,
    #[serde(rename = "o")]
    O,
}

impl Mark {
    pub fn is_empty(self) -> bool {
        self == Mark::Empty
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mark::Empty => "-",
            Mark::X => "x",
            Mark::O => "o",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

/// A single board cell.
///
/// `lives` only carries meaning while `mark` is not empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(rename = "value")]
    pub mark: Mark,
    pub lives: u8,
    #[serde(rename = "winState")]
    pub win_highlight: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            mark: Mark::Empty,
            lives: INITIAL_LIVES,
            win_highlight: false,
        }
    }
}

impl Cell {
    pub fn occupied(mark: Mark) -> Self {
        Self { mark, lives: INITIAL_LIVES, win_highlight: false }
    }

    fn clear(&mut self) {
        *self = Cell::default();
    }

    /// Remove one life, or clear the cell if it already sits at zero.
    /// Returns true when the cell was cleared.
    pub(crate) fn decay(&mut self) -> bool {
        if self.mark.is_empty() {
            return false;
        }
        if self.lives == 0 {
            self.clear();
            return true;
        }
        self.lives -= 1;
        false
    }
}
