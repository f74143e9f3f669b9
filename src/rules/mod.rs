use serde::{Deserialize, Serialize};

mod connect_four;
mod tictactoe;

/// One of the two sides of a match. Seat `One` always moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn opponent(&self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    pub fn cell(&self) -> u8 {
        match self {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

/// Rectangular grid of cells, row 0 at the top. Serializes as row-major
/// nested arrays of 0 (empty), 1 and 2, which is also the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<u8>>", try_from = "Vec<Vec<u8>>")]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Option<Seat>>,
}

impl Board {
    pub fn new(rows: usize, cols: usize) -> Self {
        Board {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Seat> {
        self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, seat: Seat) {
        self.cells[row * self.cols + col] = Some(seat);
    }
}

impl From<Board> for Vec<Vec<u8>> {
    fn from(board: Board) -> Self {
        (0..board.rows)
            .map(|row| {
                (0..board.cols)
                    .map(|col| board.get(row, col).map_or(0, |seat| seat.cell()))
                    .collect()
            })
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Board {
    type Error = String;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        let row_count = rows.len();
        let col_count = rows.first().map_or(0, |row| row.len());
        if row_count == 0 || col_count == 0 {
            return Err("board must have at least one row and one column".to_string());
        }
        let mut cells = Vec::with_capacity(row_count * col_count);
        for row in &rows {
            if row.len() != col_count {
                return Err("board rows must all have the same length".to_string());
            }
            for &cell in row {
                cells.push(match cell {
                    0 => None,
                    1 => Some(Seat::One),
                    2 => Some(Seat::Two),
                    other => return Err(format!("invalid cell value {}", other)),
                });
            }
        }
        Ok(Board {
            rows: row_count,
            cols: col_count,
            cells,
        })
    }
}

/// Rule set of a supported game, stored as tagged JSON in the game catalog.
/// Every rule decision dispatches on this variant; there is no per-game
/// logic anywhere else in the crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum GameRules {
    TicTacToe { size: usize, win_length: usize },
    ConnectFour { rows: usize, cols: usize, win_length: usize },
}

impl GameRules {
    pub fn tictactoe() -> Self {
        GameRules::TicTacToe {
            size: 3,
            win_length: 3,
        }
    }

    pub fn connect_four() -> Self {
        GameRules::ConnectFour {
            rows: 6,
            cols: 7,
            win_length: 4,
        }
    }

    pub fn empty_board(&self) -> Board {
        match self {
            GameRules::TicTacToe { size, .. } => Board::new(*size, *size),
            GameRules::ConnectFour { rows, cols, .. } => Board::new(*rows, *cols),
        }
    }

    pub fn win_length(&self) -> usize {
        match self {
            GameRules::TicTacToe { win_length, .. } => *win_length,
            GameRules::ConnectFour { win_length, .. } => *win_length,
        }
    }

    /// Validates and applies a move for `seat`, returning the landed cell.
    pub fn apply_move(
        &self,
        board: &mut Board,
        seat: Seat,
        mv: i64,
    ) -> Result<(usize, usize), String> {
        match self {
            GameRules::TicTacToe { .. } => tictactoe::apply_move(board, seat, mv),
            GameRules::ConnectFour { .. } => connect_four::apply_move(board, seat, mv),
        }
    }

    /// Whether the cell at (row, col) completes a line of `win_length`.
    /// Only the just-applied move can produce a win, so this is the only
    /// cell that ever needs checking.
    pub fn is_win_at(&self, board: &Board, row: usize, col: usize) -> bool {
        let Some(seat) = board.get(row, col) else {
            return false;
        };
        let length = self.win_length();
        for (dr, dc) in [(0, 1), (1, 0), (1, 1), (1, -1)] {
            let line = 1
                + run_length(board, row, col, seat, dr, dc)
                + run_length(board, row, col, seat, -dr, -dc);
            if line >= length {
                return true;
            }
        }
        false
    }

    /// A position with no legal move left and no completed line is drawn.
    pub fn is_draw(&self, board: &Board) -> bool {
        self.valid_moves(board).is_empty()
    }

    pub fn valid_moves(&self, board: &Board) -> Vec<i64> {
        match self {
            GameRules::TicTacToe { .. } => tictactoe::valid_moves(board),
            GameRules::ConnectFour { .. } => connect_four::valid_moves(board),
        }
    }
}

fn run_length(board: &Board, row: usize, col: usize, seat: Seat, dr: isize, dc: isize) -> usize {
    let mut count = 0;
    let mut r = row as isize + dr;
    let mut c = col as isize + dc;
    while r >= 0
        && c >= 0
        && (r as usize) < board.rows()
        && (c as usize) < board.cols()
        && board.get(r as usize, c as usize) == Some(seat)
    {
        count += 1;
        r += dr;
        c += dc;
    }
    count
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameState {
    Ongoing,
    Won { winner: Seat },
    Draw,
}

/// A match's rule-level state: rules, board, whose turn it is and whether
/// the game has ended. The orchestrator wraps this with player identities.
#[derive(Clone, Debug)]
pub struct GridGame {
    pub rules: GameRules,
    pub board: Board,
    pub current: Seat,
    pub state: GameState,
}

impl GridGame {
    pub fn new(rules: GameRules) -> Self {
        let board = rules.empty_board();
        GridGame {
            rules,
            board,
            current: Seat::One,
            state: GameState::Ongoing,
        }
    }

    /// Rebuilds an in-progress game from a persisted board and turn.
    pub fn resume(rules: GameRules, board: Board, current: Seat) -> Self {
        GridGame {
            rules,
            board,
            current,
            state: GameState::Ongoing,
        }
    }

    /// Plays a move for the seat whose turn it is. On rejection nothing
    /// changes; on success the outcome is evaluated and the turn passes.
    pub fn play(&mut self, mv: i64) -> Result<(), String> {
        if self.state != GameState::Ongoing {
            return Err("game is already over".to_string());
        }
        let (row, col) = self.rules.apply_move(&mut self.board, self.current, mv)?;
        if self.rules.is_win_at(&self.board, row, col) {
            self.state = GameState::Won {
                winner: self.current,
            };
        } else if self.rules.is_draw(&self.board) {
            self.state = GameState::Draw;
        }
        self.current = self.current.opponent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_all(game: &mut GridGame, moves: &[i64]) {
        for &mv in moves {
            game.play(mv).unwrap();
        }
    }

    #[test]
    fn test_row_win_detected_for_mover_only() {
        let mut game = GridGame::new(GameRules::tictactoe());
        // One: 0, 1, 2 (top row), Two: 3, 4.
        play_all(&mut game, &[0, 3, 1, 4, 2]);
        assert_eq!(game.state, GameState::Won { winner: Seat::One });
        assert!(game.play(5).is_err());
    }

    #[test]
    fn test_column_and_diagonal_wins() {
        let mut game = GridGame::new(GameRules::tictactoe());
        // One: 0, 3, 6 (left column).
        play_all(&mut game, &[0, 1, 3, 2, 6]);
        assert_eq!(game.state, GameState::Won { winner: Seat::One });

        let mut game = GridGame::new(GameRules::tictactoe());
        // Two: 2, 4, 6 (anti-diagonal).
        play_all(&mut game, &[0, 2, 1, 4, 8, 6]);
        assert_eq!(game.state, GameState::Won { winner: Seat::Two });
    }

    #[test]
    fn test_full_board_without_line_is_draw() {
        let mut game = GridGame::new(GameRules::tictactoe());
        play_all(&mut game, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(game.state, GameState::Draw);
    }

    #[test]
    fn test_invalid_move_leaves_state_unchanged() {
        let mut game = GridGame::new(GameRules::tictactoe());
        game.play(4).unwrap();
        let board_before = game.board.clone();
        let current_before = game.current;

        assert!(game.play(4).is_err());
        assert!(game.play(9).is_err());
        assert!(game.play(-1).is_err());
        assert_eq!(game.board, board_before);
        assert_eq!(game.current, current_before);
        assert_eq!(game.state, GameState::Ongoing);
    }

    #[test]
    fn test_turn_alternates() {
        let mut game = GridGame::new(GameRules::tictactoe());
        assert_eq!(game.current, Seat::One);
        game.play(0).unwrap();
        assert_eq!(game.current, Seat::Two);
        game.play(1).unwrap();
        assert_eq!(game.current, Seat::One);
    }

    #[test]
    fn test_connect_four_gravity_and_win() {
        let mut game = GridGame::new(GameRules::connect_four());
        // One stacks column 0, Two stacks column 1.
        play_all(&mut game, &[0, 1, 0, 1, 0, 1]);
        assert_eq!(game.board.get(5, 0), Some(Seat::One));
        assert_eq!(game.board.get(4, 0), Some(Seat::One));
        assert_eq!(game.board.get(3, 0), Some(Seat::One));
        assert_eq!(game.state, GameState::Ongoing);

        game.play(0).unwrap();
        assert_eq!(game.state, GameState::Won { winner: Seat::One });
    }

    #[test]
    fn test_connect_four_diagonal_win() {
        let mut game = GridGame::new(GameRules::connect_four());
        // One builds the rising diagonal (5,0) (4,1) (3,2) (2,3).
        play_all(&mut game, &[0, 1, 1, 2, 2, 3, 2, 3, 3, 6, 3]);
        assert_eq!(game.state, GameState::Won { winner: Seat::One });
    }

    #[test]
    fn test_board_wire_roundtrip() {
        let mut board = Board::new(3, 3);
        board.set(0, 0, Seat::One);
        board.set(1, 1, Seat::Two);
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, "[[1,0,0],[0,2,0],[0,0,0]]");
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_board_rejects_malformed_input() {
        let parsed: Result<Board, _> = serde_json::from_str("[[0,0],[0]]");
        assert!(parsed.is_err());
        let parsed: Result<Board, _> = serde_json::from_str("[[0,3]]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_rules_tagged_serialization() {
        let rules = GameRules::connect_four();
        let json = serde_json::to_string(&rules).unwrap();
        assert!(json.contains("\"variant\":\"connect_four\""));
        let back: GameRules = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rules);
    }

    #[test]
    fn test_valid_moves_shrink_as_board_fills() {
        let rules = GameRules::tictactoe();
        let mut board = rules.empty_board();
        assert_eq!(rules.valid_moves(&board).len(), 9);
        board.set(0, 0, Seat::One);
        let moves = rules.valid_moves(&board);
        assert_eq!(moves.len(), 8);
        assert!(!moves.contains(&0));
    }
}
