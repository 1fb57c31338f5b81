//! The 3×3 vanishing tic-tac-toe board.
//!
//! Every move places a mark with full lives, then the whole board decays by one life.
//! A mark that already sits at zero lives is cleared by the next decay instead, so it
//! vanishes after six further moves and the board is recycled before it can fill up.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::config::game::BOARD_SIZE;
use crate::game::types::{Cell, Mark, Position};

/// The 8 canonical winning lines: 3 rows, 3 columns, 2 diagonals.
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Rejected move. The board is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("row index {0} is invalid")]
    RowOutOfRange(i64),
    #[error("column index {0} is invalid")]
    ColumnOutOfRange(i64),
    #[error("invalid insertion at row {row}, col {col}: cell is occupied")]
    Occupied { row: usize, col: usize },
    #[error("cannot place an empty mark")]
    EmptyMark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

fn checked_index(i: i64) -> Option<usize> {
    usize::try_from(i).ok().filter(|&i| i < BOARD_SIZE)
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    /// Validate a target cell without mutating the board.
    pub fn check_insertion(&self, row: i64, col: i64) -> Result<Position, MoveError> {
        let r = checked_index(row).ok_or(MoveError::RowOutOfRange(row))?;
        let c = checked_index(col).ok_or(MoveError::ColumnOutOfRange(col))?;
        if !self.cells[r][c].mark.is_empty() {
            return Err(MoveError::Occupied { row: r, col: c });
        }
        Ok(Position { row: r, col: c })
    }

    /// Place `mark` with full lives on an empty, in-range cell.
    pub fn place(&mut self, row: i64, col: i64, mark: Mark) -> Result<Position, MoveError> {
        if mark.is_empty() {
            return Err(MoveError::EmptyMark);
        }
        let pos = self.check_insertion(row, col)?;
        self.cells[pos.row][pos.col] = Cell::occupied(mark);
        Ok(pos)
    }

    /// Remove one life from every occupied cell, clearing the ones that run out.
    /// Returns the number of cells cleared.
    pub fn decay(&mut self) -> usize {
        self.cells
            .iter_mut()
            .flatten()
            .map(|cell| cell.decay())
            .filter(|&cleared| cleared)
            .count()
    }

    /// True if some line holds three identical marks; that line's cells get highlighted.
    pub fn check_win(&mut self) -> bool {
        for line in LINES {
            let [a, b, c] = line.map(|(r, c)| self.cells[r][c].mark);
            if !a.is_empty() && a == b && b == c {
                for (r, c) in line {
                    self.cells[r][c].win_highlight = true;
                }
                return true;
            }
        }
        false
    }

    /// Draw check. Unreachable in real play since decay recycles cells before the
    /// board fills, but kept so the outcome is total.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|cell| !cell.mark.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn set_raw(&mut self, row: usize, col: usize, cell: Cell) {
        self.cells[row][col] = cell;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::game::INITIAL_LIVES;

    #[test]
    fn test_new_board_is_empty_with_full_lives() {
        let board = Board::new();
        assert!(board.cells().iter().flatten().all(|c| c.mark == Mark::Empty && c.lives == INITIAL_LIVES && !c.win_highlight));
        assert!(!board.is_full());
    }

    #[test]
    fn test_place_rejects_out_of_range_and_occupied() {
        let mut board = Board::new();
        assert_eq!(board.place(3, 0, Mark::X), Err(MoveError::RowOutOfRange(3)));
        assert_eq!(board.place(-1, 0, Mark::X), Err(MoveError::RowOutOfRange(-1)));
        assert_eq!(board.place(0, 3, Mark::X), Err(MoveError::ColumnOutOfRange(3)));
        assert_eq!(board, Board::new());

        board.place(1, 1, Mark::X).expect("legal move");
        assert_eq!(board.place(1, 1, Mark::O), Err(MoveError::Occupied { row: 1, col: 1 }));
        assert_eq!(board.cell(1, 1).map(|c| c.mark), Some(Mark::X));
    }

    #[test]
    fn test_place_empty_mark_is_rejected() {
        let mut board = Board::new();
        assert_eq!(board.place(0, 0, Mark::Empty), Err(MoveError::EmptyMark));
    }

    #[test]
    fn test_cell_vanishes_on_sixth_move_after_placement() {
        let mut board = Board::new();
        board.place(2, 0, Mark::O).expect("legal move");
        // Decay of the placing move itself.
        assert_eq!(board.decay(), 0);
        assert_eq!(board.cell(2, 0).map(|c| c.lives), Some(INITIAL_LIVES - 1));

        for step in 1..INITIAL_LIVES {
            assert_eq!(board.decay(), 0);
            let cell = board.cell(2, 0).copied().expect("in range");
            assert_eq!(cell.mark, Mark::O, "still present after {} more moves", step);
            assert_eq!(cell.lives, INITIAL_LIVES - 1 - step);
        }

        assert_eq!(board.decay(), 1);
        let cell = board.cell(2, 0).copied().expect("in range");
        assert_eq!(cell.mark, Mark::Empty);
        assert_eq!(cell.lives, INITIAL_LIVES);
        assert!(!cell.win_highlight);
    }

    #[test]
    fn test_decay_leaves_empty_cells_alone() {
        let mut board = Board::new();
        board.decay();
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_row_win_highlights_cells() {
        let mut board = Board::new();
        for col in 0..3 {
            board.place(0, col, Mark::X).expect("legal move");
        }
        assert!(board.check_win());
        for col in 0..3 {
            assert!(board.cell(0, col as usize).map(|c| c.win_highlight).unwrap_or(false));
        }
        assert!(board.cells()[1..].iter().flatten().all(|c| !c.win_highlight));
    }

    #[test]
    fn test_mixed_diagonal_is_not_a_win() {
        let mut board = Board::new();
        board.place(0, 0, Mark::X).expect("legal move");
        board.place(1, 1, Mark::O).expect("legal move");
        board.place(2, 2, Mark::X).expect("legal move");
        assert!(!board.check_win());
        assert!(board.cells().iter().flatten().all(|c| !c.win_highlight));
    }

    #[test]
    fn test_every_canonical_line_wins() {
        for line in LINES {
            let mut board = Board::new();
            for (r, c) in line {
                board.place(r as i64, c as i64, Mark::O).expect("legal move");
            }
            assert!(board.check_win(), "line {:?} should win", line);
        }
    }

    #[test]
    fn test_non_line_triples_do_not_win() {
        // An L-shape and a broken diagonal.
        let shapes = [
            [(0, 0), (1, 0), (1, 1)],
            [(0, 1), (1, 0), (2, 2)],
            [(0, 2), (1, 1), (2, 1)],
        ];
        for shape in shapes {
            let mut board = Board::new();
            for (r, c) in shape {
                board.place(r, c, Mark::X).expect("legal move");
            }
            assert!(!board.check_win(), "shape {:?} should not win", shape);
        }
    }

    #[test]
    fn test_full_board_is_a_draw_state() {
        let mut board = Board::new();
        let marks = [
            [Mark::X, Mark::O, Mark::X],
            [Mark::X, Mark::O, Mark::O],
            [Mark::O, Mark::X, Mark::X],
        ];
        for (r, row) in marks.iter().enumerate() {
            for (c, mark) in row.iter().enumerate() {
                board.set_raw(r, c, Cell::occupied(*mark));
            }
        }
        assert!(board.is_full());
        assert!(!board.check_win());
    }

    #[test]
    fn test_board_serializes_as_nested_cells() {
        let mut board = Board::new();
        board.place(0, 0, Mark::X).expect("legal move");
        let json = serde_json::to_value(&board).expect("serializable");
        assert_eq!(json[0][0]["value"], "x");
        assert_eq!(json[0][0]["lives"], 6);
        assert_eq!(json[0][0]["winState"], false);
        assert_eq!(json[2][2]["value"], "-");
    }
}
