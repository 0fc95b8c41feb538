//! The board representation: a 54-bit packed position plus the linkage
//! needed to walk back through a played game for draw detection.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::bitboard::*;
use crate::error::EngineError;

/// The side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    #[inline]
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Color::White => "W",
            Color::Black => "B",
        })
    }
}

/// A description of why a position is a draw, for diagnostics (the
/// concrete rule number follows KNDB Handboek Spel- en Wedstrijdreglement
/// (maart 2013) Artikel 9, the rule set the original engine cites).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawReason {
    /// Rule 9b: lone king against 1 or 2 pieces including a king,
    /// persisting for the given number of whole moves.
    LoneKingVsFew(u32),
    /// Rule 9c: lone king against 3 pieces including a king, persisting
    /// for the given number of whole moves.
    LoneKingVsThree(u32),
    /// Rule 9e: the same position recurred with the same side to move,
    /// `first` and `second` moves ago (`second` is `None` for the
    /// in-search single-repetition short-circuit).
    Repetition { first: u32, second: Option<u32> },
    /// Rule 9d: 25 whole moves without a capture or a man move.
    FiftyMoveRule(u32),
}

/// A draughts position.
///
/// `white`/`black`/`kings` are bitsets over the 54-bit packed square
/// space (see `bitboard`). Invariants: `white & black == 0`; `kings` is
/// a subset of `white | black`; no bit of any of the three sets falls on
/// a ghost position.
///
/// `moveinfo` is `0` for a king's non-capture move, and non-zero for a
/// capture, a man's move, or the initial position. For a capture whose
/// source equals its destination (a king capture that returns to its
/// starting square) the destination square number is stored here instead
/// -- this overloading is deliberate and must not be read as "no move
/// happened".
pub struct Board {
    pub white: u64,
    pub black: u64,
    pub kings: u64,
    pub side: Color,
    pub moveinfo: u32,
    pub parent: Option<Rc<Board>>,
}

impl Board {
    /// The standard starting position: white on 31..50, black on 1..20,
    /// white to move.
    pub fn initial() -> Rc<Board> {
        let white = (31..=50u8).fold(0u64, |acc, sq| acc | square_bit(sq));
        let black = (1..=20u8).fold(0u64, |acc, sq| acc | square_bit(sq));
        Rc::new(Board {
            white,
            black,
            kings: 0,
            side: Color::White,
            moveinfo: 1,
            parent: None,
        })
    }

    pub fn empty(side: Color) -> Board {
        Board {
            white: 0,
            black: 0,
            kings: 0,
            side,
            moveinfo: 1,
            parent: None,
        }
    }

    #[inline]
    pub fn occupied(&self) -> u64 {
        self.white | self.black
    }

    #[inline]
    pub fn empty_squares(&self) -> u64 {
        ALL50 & !self.occupied()
    }

    #[inline]
    pub fn men(&self, color: Color) -> u64 {
        self.pieces(color) & !self.kings
    }

    #[inline]
    pub fn kings_of(&self, color: Color) -> u64 {
        self.pieces(color) & self.kings
    }

    #[inline]
    pub fn pieces(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    #[inline]
    pub fn piece_count(&self) -> u32 {
        pop_count(self.occupied()) as u32
    }

    /// Whether a king's move produced this board (`moveinfo == 0`).
    #[inline]
    pub fn is_quiet_king_move(&self) -> bool {
        self.moveinfo == 0
    }

    /// Reverses colors and mirrors every square, so that a position
    /// evaluated (or looked up) "as white to move" can stand in for the
    /// equivalent black-to-move position. Ported from `invert_board`:
    /// a byte-swap plus a 1/2/4-bit-pair reversal, rather than a
    /// per-square loop.
    pub fn invert(&self) -> Board {
        let mut white = self.black;
        let mut black = self.white;
        let mut kings = self.kings;

        let mask1 = 0x5555555555555555u64;
        white = ((white >> 1) & mask1) | ((white & mask1) << 1);
        black = ((black >> 1) & mask1) | ((black & mask1) << 1);
        kings = ((kings >> 1) & mask1) | ((kings & mask1) << 1);

        let mask2 = 0x3333333333333333u64;
        white = ((white >> 2) & mask2) | ((white & mask2) << 2);
        black = ((black >> 2) & mask2) | ((black & mask2) << 2);
        kings = ((kings >> 2) & mask2) | ((kings & mask2) << 2);

        let mask4 = 0x0f0f0f0f0f0f0f0fu64;
        white = ((white >> 4) & mask4) | ((white & mask4) << 4);
        black = ((black >> 4) & mask4) | ((black & mask4) << 4);
        kings = ((kings >> 4) & mask4) | ((kings & mask4) << 4);

        Board {
            white: white.swap_bytes() >> 10,
            black: black.swap_bytes() >> 10,
            kings: kings.swap_bytes() >> 10,
            side: self.side.opposite(),
            moveinfo: self.moveinfo,
            parent: None,
        }
    }

    /// Parses the PDN FEN dialect described in the external interfaces:
    /// `<side>:<color><[K]square>[,<[K]square>...][-...]:<color><...>`.
    pub fn from_fen(fen: &str) -> Result<Board, EngineError> {
        lazy_static::lazy_static! {
            static ref PREFIX: Regex = Regex::new(r"^[WB]:").unwrap();
        }
        let fen = fen.trim();
        if fen.is_empty() {
            return Err(EngineError::IllegalFen("empty FEN".into()));
        }
        if !PREFIX.is_match(fen) {
            return Err(EngineError::IllegalFen("expected side to move followed by ':'".into()));
        }
        let side = match fen.as_bytes()[0] {
            b'W' => Color::White,
            b'B' => Color::Black,
            _ => unreachable!("checked by PREFIX"),
        };
        let mut board = Board::empty(side);
        board.moveinfo = 1;

        // strip the leading "<side>" and split the remainder on ':'
        // into one section per piece-color list.
        let rest = &fen[1..];
        let rest = rest.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
        let mut sections = rest.split(':').peekable();
        if sections.peek().is_none() {
            return Err(EngineError::IllegalFen("missing piece list".into()));
        }
        for section in sections {
            if section.is_empty() {
                continue;
            }
            board.parse_piece_list(section)?;
        }
        Ok(board)
    }

    fn parse_piece_list(&mut self, section: &str) -> Result<(), EngineError> {
        let mut chars = section.chars();
        let color = match chars.next() {
            Some('W') => Color::White,
            Some('B') => Color::Black,
            _ => return Err(EngineError::IllegalFen("expected W or B piece-list color".into())),
        };
        let rest = chars.as_str();
        if rest.is_empty() {
            return Ok(());
        }
        for token in rest.split(',') {
            self.parse_piece_token(token, color)?;
        }
        Ok(())
    }

    fn parse_piece_token(&mut self, token: &str, color: Color) -> Result<(), EngineError> {
        if let Some((lo, hi)) = token.split_once('-') {
            let (lo_king, lo_num) = parse_square_spec(lo)?;
            let (hi_king, hi_num) = parse_square_spec(hi)?;
            if lo_king || hi_king {
                return Err(EngineError::IllegalFen("range end cannot carry a king marker".into()));
            }
            if lo_num > hi_num {
                return Err(EngineError::IllegalFen("reverse range in piece list".into()));
            }
            for sq in lo_num..=hi_num {
                self.place(sq, color, false)?;
            }
        } else {
            let (is_king, sq) = parse_square_spec(token)?;
            self.place(sq, color, is_king)?;
        }
        Ok(())
    }

    fn place(&mut self, square: Square, color: Color, is_king: bool) -> Result<(), EngineError> {
        if !(1..=50).contains(&square) {
            return Err(EngineError::IllegalFen(format!("square {} out of range", square)));
        }
        let back_rank_white = square <= 5;
        let back_rank_black = square >= 46;
        if !is_king && ((color == Color::White && back_rank_white) || (color == Color::Black && back_rank_black)) {
            return Err(EngineError::IllegalFen(format!("unpromoted man placed on its own back rank at {}", square)));
        }
        let bit = square_bit(square);
        if (self.white | self.black) & bit != 0 {
            return Err(EngineError::IllegalFen(format!("duplicate piece at square {}", square)));
        }
        match color {
            Color::White => self.white |= bit,
            Color::Black => self.black |= bit,
        }
        if is_king {
            self.kings |= bit;
        }
        Ok(())
    }

    /// Formats the position back into the PDN FEN dialect.
    pub fn to_fen(&self) -> String {
        let mut out = format!("{}", self.side);
        for color in [Color::White, Color::Black] {
            out.push(':');
            out.push_str(&format!("{}", color));
            let mut squares: Vec<Square> = Vec::new();
            let mut bits = self.pieces(color);
            while bits != 0 {
                squares.push(square_of(pop_ls1b(&mut bits)));
            }
            squares.sort_unstable();
            let rendered: Vec<String> = squares
                .into_iter()
                .map(|sq| {
                    if self.kings & square_bit(sq) != 0 {
                        format!("K{}", sq)
                    } else {
                        format!("{}", sq)
                    }
                })
                .collect();
            out.push_str(&rendered.join(","));
        }
        out
    }

    /// Walks the `parent` chain looking for a draw under the rules cited
    /// in the original engine's `is_draw`: a 25-whole-move rule, positional
    /// repetition, and the two lone-king endgame rules. `ply` is the
    /// current search ply (0 = not in search).
    pub fn is_draw(self: &Rc<Board>, ply: u32) -> Option<DrawReason> {
        if ply == 0 && self.piece_count() <= 4 {
            if let Some(reason) = self.check_lone_king_rules() {
                return Some(reason);
            }
        }

        let mut node = Rc::clone(self);
        let mut whole_moves = 0u32;
        let mut first_repeat: Option<u32> = None;
        loop {
            if node.moveinfo != 0 {
                return None;
            }
            node = match &node.parent {
                Some(p) => Rc::clone(p),
                None => return None,
            };
            if node.moveinfo != 0 {
                return None;
            }
            node = match &node.parent {
                Some(p) => Rc::clone(p),
                None => return None,
            };
            whole_moves += 1;
            if node.white == self.white && node.black == self.black && node.kings == self.kings {
                if ply > 1 {
                    return Some(DrawReason::Repetition { first: whole_moves, second: None });
                }
                match first_repeat {
                    Some(first) => {
                        return Some(DrawReason::Repetition { first, second: Some(whole_moves) });
                    }
                    None => first_repeat = Some(whole_moves),
                }
            }
            if whole_moves >= 25 {
                return Some(DrawReason::FiftyMoveRule(whole_moves));
            }
        }
    }

    fn check_lone_king_rules(self: &Rc<Board>) -> Option<DrawReason> {
        let mut node = Rc::clone(self);
        for i in 0..10 {
            node = node.parent.clone()?;
            if i == 9
                && node.white & node.kings != 0
                && node.black & node.kings != 0
                && ((pop_count(node.white) == 1 && pop_count(node.black) <= 2)
                    || (pop_count(node.black) == 1 && pop_count(node.white) <= 2))
            {
                return Some(DrawReason::LoneKingVsFew(5));
            }
        }
        for i in 10..32 {
            node = node.parent.clone()?;
            if i == 31
                && node.white & node.kings != 0
                && node.black & node.kings != 0
                && ((pop_count(node.white) == 1 && pop_count(node.black) == 3)
                    || (pop_count(node.black) == 1 && pop_count(node.white) == 3))
            {
                return Some(DrawReason::LoneKingVsThree(16));
            }
        }
        None
    }
}

fn parse_square_spec(token: &str) -> Result<(bool, Square), EngineError> {
    let token = token.trim();
    let (is_king, digits) = match token.strip_prefix('K') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    digits
        .parse::<Square>()
        .map(|sq| (is_king, sq))
        .map_err(|_| EngineError::IllegalFen(format!("invalid square token '{}'", token)))
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.white == other.white && self.black == other.black && self.kings == other.kings && self.side == other.side
    }
}
impl Eq for Board {}

/// Lexicographic order over `(white, black, kings, side)`, matching
/// `bb_compare` -- the ordering opening-book records are sorted by.
impl Ord for Board {
    fn cmp(&self, other: &Self) -> Ordering {
        self.white
            .cmp(&other.white)
            .then_with(|| self.black.cmp(&other.black))
            .then_with(|| self.kings.cmp(&other.kings))
            .then_with(|| self.side.cmp(&other.side))
    }
}
impl PartialOrd for Board {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Board").field("fen", &self.to_fen()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_round_trips_through_fen() {
        let b = Board::initial();
        let reparsed = Board::from_fen(&b.to_fen()).unwrap();
        assert_eq!(reparsed.white, b.white);
        assert_eq!(reparsed.black, b.black);
        assert_eq!(reparsed.kings, b.kings);
        assert_eq!(reparsed.side, b.side);
    }

    #[test]
    fn invert_is_its_own_inverse() {
        let b = Board::initial();
        let double = b.invert().invert();
        assert_eq!(double.white, b.white);
        assert_eq!(double.black, b.black);
        assert_eq!(double.kings, b.kings);
        assert_eq!(double.side, b.side);
    }

    #[test]
    fn fen_rejects_man_on_own_back_rank() {
        assert!(Board::from_fen("W:W3:B40").is_err());
    }

    #[test]
    fn fen_rejects_duplicate_square() {
        assert!(Board::from_fen("W:W10,10:B40").is_err());
    }

    #[test]
    fn fen_accepts_ranges_and_kings() {
        let b = Board::from_fen("W:W31-35,K26:B1-5").unwrap();
        assert_eq!(pop_count(b.white), 6);
        assert_eq!(pop_count(b.black), 5);
        assert_eq!(pop_count(b.kings), 1);
    }

    #[test]
    fn bb_compare_orders_lexicographically_by_white_then_black_then_kings_then_side() {
        let a = Board { white: 1, black: 0, kings: 0, side: Color::White, moveinfo: 1, parent: None };
        let b = Board { white: 2, black: 0, kings: 0, side: Color::White, moveinfo: 1, parent: None };
        assert!(a < b);
    }

    /// Scenario 6: a position that recurs with the same side to move,
    /// reached only through quiet king moves, is a draw. At `ply <= 1`
    /// a single recurrence is not enough (`util.c`'s 9e rule needs a
    /// second one); at `ply > 1` the first recurrence already is.
    #[test]
    fn a_position_repeated_twice_through_quiet_king_moves_is_a_draw_at_ply_one() {
        let white = crate::bitboard::square_bit(26);
        let black = crate::bitboard::square_bit(1);
        let kings = white | black;

        let quiet = |side: Color, parent: Option<Rc<Board>>| {
            Rc::new(Board { white, black, kings, side, moveinfo: 0, parent })
        };
        let other_king = crate::bitboard::square_bit(27);
        let quiet_other = |side: Color, parent: Option<Rc<Board>>| {
            Rc::new(Board { white: other_king, black, kings: other_king | black, side, moveinfo: 0, parent })
        };

        let p4 = quiet_other(Color::White, None); // a different position, chain ends here
        let p3 = quiet(Color::Black, Some(p4));
        let p2 = quiet(Color::White, Some(p3)); // matches self, 1st (and only) time
        let p1 = quiet(Color::Black, Some(p2));
        let current = quiet(Color::White, Some(p1));

        assert_eq!(current.is_draw(1), None, "a single recurrence must not yet draw at ply<=1");

        let p8 = quiet(Color::White, None);
        let p7 = quiet(Color::Black, Some(p8));
        let p6 = quiet(Color::White, Some(p7)); // matches self, 2nd time
        let p5 = quiet(Color::Black, Some(p6));
        let p4b = quiet(Color::White, Some(p5));
        let p3b = quiet(Color::Black, Some(p4b));
        let p2b = quiet(Color::White, Some(p3b)); // matches self, 1st time
        let p1b = quiet(Color::Black, Some(p2b));
        let current2 = quiet(Color::White, Some(p1b));

        assert!(matches!(current2.is_draw(1), Some(DrawReason::Repetition { .. })));
        assert!(matches!(current2.is_draw(2), Some(DrawReason::Repetition { .. })));
    }
}
