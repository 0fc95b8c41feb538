//! A move is represented by the board it results in, not by a delta.
//! `Move` is a thin wrapper that derives from-square, to-square, and the
//! captured pieces by comparing a resulting board against its parent --
//! exactly the technique `move_square`/`move_captbits` use in the
//! original engine, since the resulting board never actually stores a
//! separate move record.

use std::rc::Rc;

use crate::bitboard::{square_of, Square};
use crate::board::{Board, Color};

/// A legal move, represented as the `Board` it produces together with a
/// (possibly implicit, via `parent`) link back to the board it was
/// played from.
#[derive(Clone)]
pub struct Move {
    pub result: Rc<Board>,
}

impl Move {
    pub fn new(result: Rc<Board>) -> Move {
        Move { result }
    }

    #[inline]
    pub fn resulting_board(&self) -> &Rc<Board> {
        &self.result
    }

    #[inline]
    pub fn parent(&self) -> &Rc<Board> {
        self.result.parent.as_ref().expect("a move's resulting board always has a parent")
    }

    /// The side that made this move (the side to move in the parent).
    #[inline]
    pub fn mover(&self) -> Color {
        self.parent().side
    }

    /// `true` if this move captured at least one piece.
    pub fn is_capture(&self) -> bool {
        self.captured_bits() != 0
    }

    /// The bitboard of pieces removed from the board by this move.
    /// Ported from `move_captbits`: a capture by White removes black
    /// pieces, and vice versa.
    pub fn captured_bits(&self) -> u64 {
        let parent = self.parent();
        match parent.side {
            Color::White => parent.black & !self.result.black,
            Color::Black => parent.white & !self.result.white,
        }
    }

    /// The square the mover started from. Ported from `move_square`,
    /// including its `from == to` special case for a king capture that
    /// returns to its starting square: in that case `moveinfo` holds the
    /// square directly rather than being derivable from a bit
    /// difference.
    pub fn from_square(&self) -> Square {
        let parent = self.parent();
        let (parent_bits, result_bits) = match parent.side {
            Color::White => (parent.white, self.result.white),
            Color::Black => (parent.black, self.result.black),
        };
        if parent_bits == result_bits {
            return self.result.moveinfo as Square;
        }
        square_of(parent_bits & !result_bits)
    }

    /// The square the mover ended on. See `from_square`.
    pub fn to_square(&self) -> Square {
        let parent = self.parent();
        let (parent_bits, result_bits) = match parent.side {
            Color::White => (parent.white, self.result.white),
            Color::Black => (parent.black, self.result.black),
        };
        if parent_bits == result_bits {
            return self.result.moveinfo as Square;
        }
        square_of(result_bits & !parent_bits)
    }

    /// The "collapsed move" encoding used for transposition-table best
    /// move storage: `white | black` of the resulting board, 54 bits.
    /// See `reconstruct` for the inverse operation.
    #[inline]
    pub fn collapsed(&self) -> u64 {
        self.result.white | self.result.black
    }
}

/// Rebuilds a resulting board from a parent board and a collapsed move
/// (the `white | black` occupancy of the child), per the TT best-move
/// encoding. Returns `None` if `collapsed` cannot correspond to any
/// single legal step from `parent` (e.g. a stale TT entry after a
/// position transposes through a different path).
pub fn reconstruct(parent: &Rc<Board>, collapsed: u64) -> Option<Board> {
    let mover_bits_before = parent.pieces(parent.side);
    let opp_bits_before = parent.pieces(parent.side.opposite());

    // Pieces of the mover that already matched `collapsed` cannot tell
    // us anything; what matters is which one bit of `collapsed` is not
    // an opponent square (the landing square) and which mover bit is not
    // in `collapsed` (the origin square, unless this is the null-travel
    // king recapture case where origin == landing).
    let opp_after = opp_bits_before & collapsed;
    let captured = opp_bits_before & !opp_after;

    let landing_and_origin = collapsed & !opp_after;
    let origin_candidates = mover_bits_before & !collapsed;

    let (origin, landing) = if origin_candidates == 0 {
        // from == to: the single mover bit present in both is both the
        // origin and the landing square.
        let bit = landing_and_origin & mover_bits_before;
        (bit, bit)
    } else {
        let landing = landing_and_origin & !mover_bits_before;
        (origin_candidates, landing)
    };

    if origin == 0 || landing == 0 {
        return None;
    }

    let was_king = parent.kings & origin != 0;
    let promotes = !was_king
        && match parent.side {
            Color::White => landing & crate::bitboard::ROW1 != 0,
            Color::Black => landing & crate::bitboard::ROW10 != 0,
        };

    let mut white = parent.white;
    let mut black = parent.black;
    let mut kings = parent.kings & !captured;

    match parent.side {
        Color::White => {
            white = (white & !origin) | landing;
        }
        Color::Black => {
            black = (black & !origin) | landing;
        }
    }
    match parent.side.opposite() {
        Color::White => white &= !captured,
        Color::Black => black &= !captured,
    }
    if was_king {
        kings = (kings & !origin) | landing;
    } else if promotes {
        kings |= landing;
    }

    let moveinfo = if origin == landing {
        square_of(landing) as u32
    } else if was_king && captured == 0 {
        0
    } else {
        1
    };

    Some(Board {
        white,
        black,
        kings,
        side: parent.side.opposite(),
        moveinfo,
        parent: Some(Rc::clone(parent)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;

    fn capture_move() -> (Rc<Board>, Rc<Board>) {
        let parent = Rc::new(Board::from_fen("W:W28:B23").unwrap());
        let result = Rc::new(Board {
            white: parent.white & !crate::bitboard::square_bit(28) | crate::bitboard::square_bit(19),
            black: 0,
            kings: 0,
            side: Color::Black,
            moveinfo: 19,
            parent: Some(Rc::clone(&parent)),
        });
        (parent, result)
    }

    #[test]
    fn from_and_to_square_match_the_played_jump() {
        let (_parent, result) = capture_move();
        let mv = Move::new(result);
        assert_eq!(mv.from_square(), 28);
        assert_eq!(mv.to_square(), 19);
        assert!(mv.is_capture());
    }

    #[test]
    fn captured_bits_is_the_square_removed_from_the_opponent() {
        let (_parent, result) = capture_move();
        let mv = Move::new(result);
        assert_eq!(mv.captured_bits(), crate::bitboard::square_bit(23));
    }

    #[test]
    fn collapsed_move_reconstructs_to_the_same_resulting_board() {
        let (parent, result) = capture_move();
        let mv = Move::new(Rc::clone(&result));
        let rebuilt = reconstruct(&parent, mv.collapsed()).unwrap();
        assert_eq!(rebuilt.white, result.white);
        assert_eq!(rebuilt.black, result.black);
        assert_eq!(rebuilt.kings, result.kings);
    }
}
