use crate::rules::{Board, Seat};

/// Moves are linear cell indices, row-major from the top-left corner.
pub(super) fn validate_move(board: &Board, mv: i64) -> Result<(), String> {
    let cell_count = (board.rows() * board.cols()) as i64;
    if mv < 0 || mv >= cell_count {
        return Err(format!(
            "cell index must be between 0 and {}",
            cell_count - 1
        ));
    }
    let (row, col) = cell_of(board, mv);
    if board.get(row, col).is_some() {
        return Err("cell is already occupied".to_string());
    }
    Ok(())
}

pub(super) fn apply_move(board: &mut Board, seat: Seat, mv: i64) -> Result<(usize, usize), String> {
    validate_move(board, mv)?;
    let (row, col) = cell_of(board, mv);
    board.set(row, col, seat);
    Ok((row, col))
}

pub(super) fn valid_moves(board: &Board) -> Vec<i64> {
    (0..(board.rows() * board.cols()) as i64)
        .filter(|&mv| {
            let (row, col) = cell_of(board, mv);
            board.get(row, col).is_none()
        })
        .collect()
}

fn cell_of(board: &Board, mv: i64) -> (usize, usize) {
    (mv as usize / board.cols(), mv as usize % board.cols())
}
