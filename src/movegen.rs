//! Legal move generation.
//!
//! A move is never represented as a delta; the generator builds the
//! resulting `Board` directly, exactly as the original engine does by
//! computing `move.white`/`move.black`/`move.kings` from the parent's
//! bitsets rather than recording an edit list. Captures are mandatory
//! and forced-majority: only the longest capture sequences found are
//! kept, shorter ones are discarded as soon as a longer one is found
//! (`add_capture` below), and duplicate sequences that reach the same
//! position in a different order are suppressed once four or more
//! pieces are captured in one move (the only length at which the same
//! final position is reachable by more than one square order).

use std::rc::Rc;

use crate::bitboard::*;
use crate::board::{Board, Color};
use crate::moves::Move;

/// One of the four diagonal directions, viewed from White's side of the
/// board (White moves "north", towards lower square numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Nw,
    Ne,
    Sw,
    Se,
}

impl Dir {
    #[inline]
    fn shift(self) -> u32 {
        match self {
            Dir::Nw | Dir::Se => 6,
            Dir::Ne | Dir::Sw => 5,
        }
    }

    #[inline]
    fn is_north(self) -> bool {
        matches!(self, Dir::Nw | Dir::Ne)
    }

    #[inline]
    fn raymask(self) -> u64 {
        match self {
            Dir::Nw => RAYMASK_NW,
            Dir::Ne => RAYMASK_NE,
            Dir::Sw => RAYMASK_SW,
            Dir::Se => RAYMASK_SE,
        }
    }

    /// A continuing king capture may turn onto either of the two
    /// diagonals that are neither the current direction nor its
    /// reverse. One of those two is always a "north" direction and the
    /// other a "south" direction.
    #[inline]
    fn turn_north(self) -> Dir {
        match self.shift() {
            6 => Dir::Ne,
            _ => Dir::Nw,
        }
    }

    #[inline]
    fn turn_south(self) -> Dir {
        match self.shift() {
            6 => Dir::Sw,
            _ => Dir::Se,
        }
    }

    #[inline]
    fn step(self, bits: u64) -> u64 {
        if self.is_north() {
            bits >> self.shift()
        } else {
            bits << self.shift()
        }
    }

    #[inline]
    fn back(self, bits: u64) -> u64 {
        if self.is_north() {
            bits << self.shift()
        } else {
            bits >> self.shift()
        }
    }
}

/// The outcome of generating moves from a position: the resulting
/// boards, the number of pieces captured by each of them (`0` if none
/// of them is a capture), and, when requested, the long-notation trace
/// (from-square, each turning point, final square) of every move.
pub struct MoveList {
    pub moves: Vec<Move>,
    pub npcapt: u32,
    pub long_notation: Option<Vec<Vec<Square>>>,
}

impl MoveList {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }
}

/// Generates the legal moves from `bb`. When `genall` is `false`, only
/// captures are generated (used for quiescence search and for testing
/// whether any capture exists). When `genall` is `true`, non-capture
/// moves are generated if and only if no capture was found -- captures
/// in international draughts are mandatory.
pub fn generate_moves(bb: &Rc<Board>, genall: bool) -> MoveList {
    generate_moves_impl(bb, genall, false)
}

/// As `generate_moves`, but also records the long-notation trace of
/// every move (from-square, each turning point, final square).
pub fn generate_moves_with_notation(bb: &Rc<Board>, genall: bool) -> MoveList {
    generate_moves_impl(bb, genall, true)
}

fn generate_moves_impl(bb: &Rc<Board>, genall: bool, want_ln: bool) -> MoveList {
    let mut gen = CaptureGen::new(bb, want_ln);
    gen.run();

    if genall && gen.results.is_empty() {
        let (boards, ln) = generate_non_captures(bb, want_ln);
        return MoveList {
            moves: boards.into_iter().map(|b| Move::new(Rc::new(b))).collect(),
            npcapt: 0,
            long_notation: ln,
        };
    }

    MoveList {
        moves: gen.results.into_iter().map(|b| Move::new(Rc::new(b))).collect(),
        npcapt: gen.npcapt,
        long_notation: if want_ln { Some(gen.long_notation) } else { None },
    }
}

struct CaptureGen<'a> {
    parent: &'a Rc<Board>,
    oppbits: u64,
    empty: u64,
    frombit: u64,
    tp: Vec<u64>,
    results: Vec<Board>,
    npcapt: u32,
    want_ln: bool,
    long_notation: Vec<Vec<Square>>,
}

impl<'a> CaptureGen<'a> {
    fn new(bb: &'a Rc<Board>, want_ln: bool) -> CaptureGen<'a> {
        let oppbits = bb.pieces(bb.side.opposite());
        CaptureGen {
            parent: bb,
            oppbits,
            empty: bb.empty_squares(),
            frombit: 0,
            tp: Vec::new(),
            results: Vec::new(),
            npcapt: 0,
            want_ln,
            long_notation: Vec::new(),
        }
    }

    fn ensure_tp(&mut self, depth: usize) {
        if self.tp.len() <= depth {
            self.tp.resize(depth + 1, 0);
        }
    }

    fn run(&mut self) {
        let empty = self.empty;
        let bb = self.parent;
        let side = bb.side;
        let men = bb.men(side);
        let kings = bb.kings_of(side);

        for dir in [Dir::Nw, Dir::Ne, Dir::Sw, Dir::Se] {
            let single = dir.step(self.oppbits);
            let double = dir.step(dir.step(men));
            let mut tobits = double & single & empty;
            while tobits != 0 {
                let to = pop_ls1b(&mut tobits);
                self.frombit = dir.back(dir.back(to));
                self.empty = empty | self.frombit;
                self.man_capture(to, dir.back(to));
            }
        }
        self.empty = empty;

        let mut kings = kings;
        while kings != 0 {
            let king = pop_ls1b(&mut kings);
            self.frombit = king;
            self.empty = empty | king;
            self.king_capture_main(king);
        }
        self.empty = empty;
    }

    fn man_capture(&mut self, pcbit: u64, captbits: u64) {
        let oppbits = self.oppbits & !captbits;
        let depth = pop_count(captbits);
        self.ensure_tp(depth);
        self.tp[depth] = pcbit;

        for dir in [Dir::Nw, Dir::Ne, Dir::Sw, Dir::Se] {
            let landing = dir.step(dir.step(pcbit));
            let victim = dir.step(pcbit);
            if landing & dir.step(oppbits) & self.empty != 0 {
                self.man_capture(landing, captbits | victim);
            }
        }

        self.add_capture(pcbit, captbits, false);
    }

    fn king_capture_main(&mut self, start: u64) {
        for dir in [Dir::Nw, Dir::Ne, Dir::Sw, Dir::Se] {
            let nearest = nearest_along(dir, start, self.empty);
            if nearest & self.oppbits & dir.back(self.empty) != 0 {
                self.king_capture(dir, dir.step(nearest), nearest);
            }
        }
    }

    fn king_capture(&mut self, dir: Dir, start_pcbit: u64, captbits: u64) {
        let oppbits = self.oppbits & !captbits;
        let depth = pop_count(captbits);
        self.ensure_tp(depth);
        let mut pcbit = start_pcbit;

        loop {
            self.tp[depth] = pcbit;

            let tn = dir.turn_north();
            let nearest_tn = nearest_along(tn, pcbit, self.empty);
            if nearest_tn & oppbits & tn.back(self.empty) != 0 {
                self.king_capture(tn, tn.step(nearest_tn), captbits | nearest_tn);
            }

            let ts = dir.turn_south();
            let nearest_ts = nearest_along(ts, pcbit, self.empty);
            if nearest_ts & oppbits & ts.back(self.empty) != 0 {
                self.king_capture(ts, ts.step(nearest_ts), captbits | nearest_ts);
            }

            self.add_capture(pcbit, captbits, true);

            pcbit = dir.step(pcbit);
            if pcbit & self.empty == 0 {
                break;
            }
        }

        if pcbit & oppbits & dir.back(self.empty) != 0 {
            self.tp[depth] = start_pcbit;
            self.king_capture(dir, dir.step(pcbit), captbits | pcbit);
        }
    }

    fn add_capture(&mut self, pcbit: u64, captbits: u64, is_king: bool) {
        let npcapt = pop_count(captbits) as u32;
        if npcapt < self.npcapt {
            return;
        }
        if npcapt > self.npcapt {
            self.results.clear();
            self.long_notation.clear();
            self.npcapt = npcapt;
        }

        let parent = self.parent;
        let (white, black, kings, side) = match parent.side {
            Color::White => {
                let white = (parent.white & !self.frombit) | pcbit;
                let black = parent.black & !captbits;
                let kings = if is_king {
                    (parent.kings & !captbits & !self.frombit) | pcbit
                } else {
                    (parent.kings & !captbits) | (pcbit & ROW1)
                };
                (white, black, kings, Color::Black)
            }
            Color::Black => {
                let black = (parent.black & !self.frombit) | pcbit;
                let white = parent.white & !captbits;
                let kings = if is_king {
                    (parent.kings & !captbits & !self.frombit) | pcbit
                } else {
                    (parent.kings & !captbits) | (pcbit & ROW10)
                };
                (white, black, kings, Color::White)
            }
        };

        if npcapt >= 4 {
            for existing in &self.results {
                if existing.white == white && existing.black == black {
                    return;
                }
            }
        }

        self.results.push(Board {
            white,
            black,
            kings,
            side,
            moveinfo: square_of(pcbit) as u32,
            parent: Some(Rc::clone(self.parent)),
        });

        if self.want_ln {
            let mut trace = vec![square_of(self.frombit)];
            for i in 1..=npcapt as usize {
                trace.push(square_of(self.tp.get(i).copied().unwrap_or(0)));
            }
            self.long_notation.push(trace);
        }
    }
}

/// The nearest occupied square from `start` looking along `dir`, or `0`
/// if the ray runs off the board without hitting anything.
#[inline]
fn nearest_along(dir: Dir, start: u64, empty: u64) -> u64 {
    if dir.is_north() {
        let ray = (dir.raymask() >> start.leading_zeros()) & !empty;
        ms1b(ray)
    } else {
        let ray = dir.raymask().wrapping_mul(start) & !empty;
        ls1b(ray)
    }
}

fn generate_non_captures(bb: &Rc<Board>, want_ln: bool) -> (Vec<Board>, Option<Vec<Vec<Square>>>) {
    let empty = bb.empty_squares();
    let side = bb.side;
    let men = bb.men(side);
    let kings = bb.kings_of(side);
    let mut boards = Vec::new();

    let (man_dirs, promotion_row): (&[Dir], u64) = match side {
        Color::White => (&[Dir::Nw, Dir::Ne], ROW1),
        Color::Black => (&[Dir::Sw, Dir::Se], ROW10),
    };

    for &dir in man_dirs {
        let mut tobits = dir.step(men) & empty;
        while tobits != 0 {
            let to = pop_ls1b(&mut tobits);
            let from = dir.back(to);
            let (white, black) = match side {
                Color::White => ((bb.white & !from) | to, bb.black),
                Color::Black => (bb.white, (bb.black & !from) | to),
            };
            boards.push(Board {
                white,
                black,
                kings: bb.kings | (to & promotion_row),
                side: side.opposite(),
                moveinfo: 1,
                parent: Some(Rc::clone(bb)),
            });
        }
    }

    if kings != 0 {
        for dir in [Dir::Nw, Dir::Ne, Dir::Sw, Dir::Se] {
            let mut tobits = dir.step(kings) & empty;
            while tobits != 0 {
                let mut to = pop_ls1b(&mut tobits);
                let from = dir.back(to);
                loop {
                    let (white, black) = match side {
                        Color::White => ((bb.white & !from) | to, bb.black),
                        Color::Black => (bb.white, (bb.black & !from) | to),
                    };
                    boards.push(Board {
                        white,
                        black,
                        kings: (bb.kings & !from) | to,
                        side: side.opposite(),
                        moveinfo: 0,
                        parent: Some(Rc::clone(bb)),
                    });
                    to = dir.step(to) & empty;
                    if to == 0 {
                        break;
                    }
                }
            }
        }
    }

    let ln = if want_ln {
        Some(
            boards
                .iter()
                .map(|mv| match side {
                    Color::White => vec![square_of(bb.white & !mv.white), square_of(mv.white & !bb.white)],
                    Color::Black => vec![square_of(bb.black & !mv.black), square_of(mv.black & !bb.black)],
                })
                .collect(),
        )
    } else {
        None
    };

    (boards, ln)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_has_nine_non_capture_moves_and_no_captures() {
        let bb = Board::initial();
        let list = generate_moves(&bb, true);
        assert_eq!(list.npcapt, 0);
        assert_eq!(list.len(), 9);
    }

    #[test]
    fn a_single_mandatory_capture_promotes_only_on_the_back_rank() {
        let bb = Rc::new(Board::from_fen("W:W28:B23").unwrap());
        let list = generate_moves(&bb, true);
        assert_eq!(list.npcapt, 1);
        assert_eq!(list.len(), 1);
        let result = list.moves[0].resulting_board();
        assert_eq!(result.white, square_bit(19));
        assert_eq!(result.kings, 0);
        assert_eq!(result.black, 0);
    }

    #[test]
    fn forced_majority_keeps_only_the_longest_capture_sequences() {
        let bb = Rc::new(Board::from_fen("W:W27,28,38,39:B16,17,18,19").unwrap());
        let list = generate_moves(&bb, true);
        assert_eq!(list.npcapt, 4);
        for mv in &list.moves {
            assert_eq!(pop_count(mv.captured_bits()), 4);
        }
    }

    #[test]
    fn men_never_end_up_on_their_own_back_rank() {
        let bb = Board::initial();
        let list = generate_moves(&bb, true);
        for mv in &list.moves {
            let result = mv.resulting_board();
            assert_eq!(result.white & ROW1, 0);
        }
    }
}
