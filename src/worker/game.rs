//! The game loop shared by self-play and evaluation.
//!
//! Drives one game from the opening position to an end state, feeding the
//! repetition filter, the no-progress counter and the length cap, and
//! converts the outcome into a red-oriented value.

use crate::config::PlayConfig;
use crate::moves::Action;
use crate::records::GameRecord;
use crate::rules::{Rules, State, Verdict};
use crate::search::MctsPlayer;
use std::collections::HashSet;
use tracing::error;

/// How a game ended. Aborted games carry no usable outcome and are never
/// turned into training records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEnd {
    /// The rules declared a decisive or drawn final position.
    Completed,
    /// The mover resigned, or every remaining move was forbidden.
    Resigned,
    /// Drawn by no progress, length cap, bare material or free-move
    /// repetition.
    Drawn,
    /// A player failed mid-game; the game is discarded.
    Aborted,
}

/// One finished game: the move list and its red-oriented outcome.
#[derive(Clone, Debug)]
pub struct PlayedGame {
    pub end: GameEnd,
    pub initial_state: State,
    pub actions: Vec<Action>,
    /// Final outcome from red's perspective: 1.0 red win, -1.0 red loss,
    /// 0.0 draw.
    pub value_red: f32,
}

impl PlayedGame {
    #[inline]
    pub fn plies(&self) -> usize {
        self.actions.len()
    }

    /// Build the training record: each move labeled with the outcome from
    /// its mover's perspective, so the sign alternates ply by ply.
    pub fn record(&self) -> GameRecord {
        let mut record = GameRecord::new(&self.initial_state);
        for (ply, &action) in self.actions.iter().enumerate() {
            let value = if ply % 2 == 0 {
                self.value_red
            } else {
                -self.value_red
            };
            record.push(action, value);
        }
        record
    }
}

/// Who plays which side. Self-play uses one player for both; evaluation
/// seats two.
pub enum Seats {
    Single(MctsPlayer),
    Pair { red: MctsPlayer, black: MctsPlayer },
}

impl Seats {
    fn player_for(&mut self, ply: usize) -> &mut MctsPlayer {
        match self {
            Seats::Single(player) => player,
            Seats::Pair { red, black } => {
                if ply % 2 == 0 {
                    red
                } else {
                    black
                }
            }
        }
    }

    fn close(&mut self) {
        match self {
            Seats::Single(player) => player.close(),
            Seats::Pair { red, black } => {
                red.close();
                black.close();
            }
        }
    }
}

/// Play one game to its end. Player failures abort the game, not the
/// worker; the seats' pipes are released before returning.
pub fn play_game(play: &PlayConfig, rules: &dyn Rules, seats: &mut Seats) -> PlayedGame {
    let initial = rules.initial_state();
    let mut state = initial.clone();
    let mut history = vec![initial.clone()];
    let mut actions: Vec<Action> = Vec::new();
    let mut turns = 0usize;
    let mut no_eat_count = 0usize;

    let (end, final_value) = loop {
        match rules.verdict(&state) {
            Verdict::Finished { value, final_move } => {
                let mut value = value;
                // A forced closing move still changes whose perspective the
                // value is in.
                if let Some(action) = final_move {
                    match rules.apply(&state, action) {
                        Ok(outcome) => {
                            actions.push(action);
                            turns += 1;
                            state = outcome.state;
                            history.push(state.clone());
                            value = -value;
                        }
                        Err(err) => {
                            error!(%state, ply = turns, %err, "closing move failed, game aborted");
                            break (GameEnd::Aborted, 0.0);
                        }
                    }
                }
                break (GameEnd::Completed, value);
            }
            Verdict::Ongoing { check } => {
                if no_eat_count >= play.no_progress_limit
                    || turns / 2 >= play.max_game_length
                    || !rules.has_attacking_pieces(&state)
                {
                    break (GameEnd::Drawn, 0.0);
                }

                // A checked mover must be free to escape even into a
                // repeated chase pattern, so the whole filter is
                // suspended for that ply.
                let forbidden = if check {
                    None
                } else {
                    let (forbidden, free_moves) = repetition_filter(rules, &history, &state);
                    if free_moves >= 2 {
                        break (GameEnd::Drawn, 0.0);
                    }
                    Some(forbidden)
                };

                let picked = seats
                    .player_for(turns)
                    .action(&state, turns, forbidden.as_ref());
                match picked {
                    Err(err) => {
                        error!(%state, ply = turns, %err, "game aborted");
                        break (GameEnd::Aborted, 0.0);
                    }
                    Ok((None, _)) => break (GameEnd::Resigned, -1.0),
                    Ok((Some(action), _)) => match rules.apply(&state, action) {
                        Err(err) => {
                            error!(%state, ply = turns, %action, %err, "game aborted");
                            break (GameEnd::Aborted, 0.0);
                        }
                        Ok(outcome) => {
                            no_eat_count = if outcome.captured { 0 } else { no_eat_count + 1 };
                            actions.push(action);
                            turns += 1;
                            state = outcome.state;
                            history.push(state.clone());
                        }
                    },
                }
            }
        }
    };
    seats.close();

    // `final_value` is from the perspective of the side to move at the
    // final position, which is red exactly when an even number of plies
    // was played.
    let value_red = if turns % 2 == 0 {
        final_value
    } else {
        -final_value
    };
    PlayedGame {
        end,
        initial_state: initial,
        actions,
        value_red,
    }
}

/// Scan the game history for earlier occurrences of the current position.
///
/// A repeated position whose follow-up delivered check or chase forbids
/// that successor; one with a harmless follow-up counts as a free move.
/// Two free-move repeats draw the game.
fn repetition_filter(
    rules: &dyn Rules,
    history: &[State],
    state: &State,
) -> (HashSet<State>, usize) {
    let mut forbidden = HashSet::new();
    let mut free_moves = 0;
    for i in 0..history.len().saturating_sub(1) {
        if &history[i] == state {
            let successor = &history[i + 1];
            if rules.is_chase_or_check(state, successor) {
                forbidden.insert(successor.clone());
            } else {
                free_moves += 1;
            }
        }
    }
    (forbidden, free_moves)
}
