use crate::rules::{Board, Seat};

/// Moves are column indices; the disc falls to the lowest empty cell.
pub(super) fn validate_move(board: &Board, mv: i64) -> Result<(), String> {
    if mv < 0 || mv >= board.cols() as i64 {
        return Err(format!(
            "column must be between 0 and {}",
            board.cols() - 1
        ));
    }
    if board.get(0, mv as usize).is_some() {
        return Err("column is full".to_string());
    }
    Ok(())
}

pub(super) fn apply_move(board: &mut Board, seat: Seat, mv: i64) -> Result<(usize, usize), String> {
    validate_move(board, mv)?;
    let col = mv as usize;
    for row in (0..board.rows()).rev() {
        if board.get(row, col).is_none() {
            board.set(row, col, seat);
            return Ok((row, col));
        }
    }
    Err("column is full".to_string())
}

pub(super) fn valid_moves(board: &Board) -> Vec<i64> {
    (0..board.cols() as i64)
        .filter(|&col| board.get(0, col as usize).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discs_stack_from_the_bottom() {
        let mut board = Board::new(6, 7);
        assert_eq!(apply_move(&mut board, Seat::One, 3).unwrap(), (5, 3));
        assert_eq!(apply_move(&mut board, Seat::Two, 3).unwrap(), (4, 3));
        assert_eq!(apply_move(&mut board, Seat::One, 3).unwrap(), (3, 3));
    }

    #[test]
    fn test_full_column_rejected() {
        let mut board = Board::new(6, 7);
        for _ in 0..3 {
            apply_move(&mut board, Seat::One, 0).unwrap();
            apply_move(&mut board, Seat::Two, 0).unwrap();
        }
        assert!(validate_move(&board, 0).is_err());
        assert!(apply_move(&mut board, Seat::One, 0).is_err());
        assert!(!valid_moves(&board).contains(&0));
        assert_eq!(valid_moves(&board).len(), 6);
    }

    #[test]
    fn test_rejects_out_of_range_column() {
        let board = Board::new(6, 7);
        assert!(validate_move(&board, -1).is_err());
        assert!(validate_move(&board, 7).is_err());
    }
}
