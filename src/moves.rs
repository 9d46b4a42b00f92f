//! Move encoding and the static action catalogue.
//!
//! A move is a 4-digit coordinate string: source column, source row,
//! destination column, destination row (columns 0-8, rows 0-9). The
//! catalogue enumerates every syntactically possible move once, in a fixed
//! order shared with the evaluator's policy head, plus a flip table that
//! maps each move to its mirror under board rotation so one orientation's
//! statistics serve both sides.

use itertools::iproduct;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of columns on the board.
pub const NUM_COLS: u8 = 9;
/// Number of rows on the board.
pub const NUM_ROWS: u8 = 10;
/// Size of the full action catalogue, fixed at build time.
pub const CATALOGUE_SIZE: usize = 2086;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("move must be 4 digits, got {0:?}")]
    BadLength(String),
    #[error("move {0:?} has a coordinate out of board bounds")]
    OutOfBounds(String),
}

/// A move identifier: `[src_col, src_row, dst_col, dst_row]` digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Action([u8; 4]);

impl Action {
    pub fn new(src_col: u8, src_row: u8, dst_col: u8, dst_row: u8) -> Action {
        debug_assert!(src_col < NUM_COLS && dst_col < NUM_COLS);
        debug_assert!(src_row < NUM_ROWS && dst_row < NUM_ROWS);
        Action([src_col, src_row, dst_col, dst_row])
    }

    #[inline]
    pub fn src(&self) -> (u8, u8) {
        (self.0[0], self.0[1])
    }

    #[inline]
    pub fn dst(&self) -> (u8, u8) {
        (self.0[2], self.0[3])
    }

    /// Mirror this move under a 180 degree board rotation.
    ///
    /// The mapping is an involution: `a.flip().flip() == a`.
    #[inline]
    pub fn flip(self) -> Action {
        let [sc, sr, dc, dr] = self.0;
        Action([8 - sc, 9 - sr, 8 - dc, 9 - dr])
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [sc, sr, dc, dr] = self.0;
        write!(f, "{}{}{}{}", sc, sr, dc, dr)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Action({})", self)
    }
}

impl FromStr for Action {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Action, MoveParseError> {
        let digits: Option<Vec<u8>> = s.chars().map(|c| c.to_digit(10).map(|d| d as u8)).collect();
        let digits = digits.ok_or_else(|| MoveParseError::BadLength(s.to_string()))?;
        if digits.len() != 4 {
            return Err(MoveParseError::BadLength(s.to_string()));
        }
        let [sc, sr, dc, dr] = [digits[0], digits[1], digits[2], digits[3]];
        if sc >= NUM_COLS || dc >= NUM_COLS || sr >= NUM_ROWS || dr >= NUM_ROWS {
            return Err(MoveParseError::OutOfBounds(s.to_string()));
        }
        Ok(Action([sc, sr, dc, dr]))
    }
}

/// The fixed catalogue of all syntactically possible moves, with the
/// move -> policy-index table and the precomputed flip permutation.
pub struct ActionCatalogue {
    actions: Vec<Action>,
    index: HashMap<Action, usize>,
    flip_index: Vec<usize>,
}

impl ActionCatalogue {
    pub fn new() -> ActionCatalogue {
        let actions = generate_actions();
        debug_assert_eq!(actions.len(), CATALOGUE_SIZE);

        let index: HashMap<Action, usize> =
            actions.iter().enumerate().map(|(i, &a)| (a, i)).collect();
        let flip_index = actions.iter().map(|a| index[&a.flip()]).collect();

        ActionCatalogue {
            actions,
            index,
            flip_index,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[inline]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[inline]
    pub fn get(&self, index: usize) -> Action {
        self.actions[index]
    }

    /// Policy index of a move, `None` if the move is not in the catalogue.
    #[inline]
    pub fn index_of(&self, action: Action) -> Option<usize> {
        self.index.get(&action).copied()
    }

    /// Policy index of the mirrored move.
    #[inline]
    pub fn flipped_index_of(&self, action: Action) -> Option<usize> {
        self.index_of(action).map(|i| self.flip_index[i])
    }

    /// Permute a policy vector into the mirrored orientation.
    pub fn flip_policy(&self, policy: &[f32]) -> Vec<f32> {
        debug_assert_eq!(policy.len(), self.actions.len());
        self.flip_index.iter().map(|&i| policy[i]).collect()
    }
}

impl Default for ActionCatalogue {
    fn default() -> Self {
        ActionCatalogue::new()
    }
}

/// Enumerate the catalogue: for every square, all destinations on the same
/// row or column plus the eight knight jumps, then the fixed advisor and
/// elephant move lists for both palaces.
fn generate_actions() -> Vec<Action> {
    let mut actions = Vec::with_capacity(CATALOGUE_SIZE);

    const KNIGHT_JUMPS: [(i8, i8); 8] = [
        (-2, -1),
        (-1, -2),
        (-2, 1),
        (1, -2),
        (2, -1),
        (-1, 2),
        (2, 1),
        (1, 2),
    ];

    for (row, col) in iproduct!(0..NUM_ROWS as i8, 0..NUM_COLS as i8) {
        let mut destinations: Vec<(i8, i8)> = Vec::with_capacity(27);
        destinations.extend((0..NUM_COLS as i8).map(|c| (row, c)));
        destinations.extend((0..NUM_ROWS as i8).map(|r| (r, col)));
        destinations.extend(KNIGHT_JUMPS.iter().map(|&(dr, dc)| (row + dr, col + dc)));

        for (dst_row, dst_col) in destinations {
            if (dst_row, dst_col) == (row, col) {
                continue;
            }
            if !(0..NUM_ROWS as i8).contains(&dst_row) || !(0..NUM_COLS as i8).contains(&dst_col) {
                continue;
            }
            actions.push(Action::new(col as u8, row as u8, dst_col as u8, dst_row as u8));
        }
    }

    // Advisor moves, red then black palace.
    const ADVISOR_MOVES: [&str; 16] = [
        "3041", "5041", "3241", "5241", "4130", "4150", "4132", "4152", "3948", "5948", "3748",
        "5748", "4839", "4859", "4837", "4857",
    ];
    // Elephant moves, red then black side.
    const ELEPHANT_MOVES: [&str; 32] = [
        "2002", "2042", "6042", "6082", "2402", "2442", "6442", "6482", "0220", "4220", "4260",
        "8260", "0224", "4224", "4264", "8264", "2907", "2947", "6947", "6987", "2507", "2547",
        "6547", "6587", "0729", "4729", "4769", "8769", "0725", "4725", "4765", "8765",
    ];

    for s in ADVISOR_MOVES.iter().chain(ELEPHANT_MOVES.iter()) {
        actions.push(s.parse().expect("static move list entry"));
    }

    actions
}
