//! Static position evaluation: material, king placement, a set of
//! positional features weighted by game phase, and a breakthrough term.
//!
//! The score is always reported from the point of view of the side to
//! move, and the implementation is built so that `evaluate(b) ==
//! -evaluate(b.invert())` holds exactly -- every sub-term below is
//! computed from White's perspective first and only negated once, at
//! the very end, when Black is to move.

use crate::bitboard::*;
use crate::board::Board;

/// The value of a man. King value and every positional feature weight
/// is expressed relative to this.
pub const VAL_MAN: i32 = 100;

const PHASES: usize = 4;

/// A king is worth `VAL_MAN` plus this, indexed by game phase: kings
/// are relatively less valuable in a crowded middlegame and relatively
/// more valuable as material thins out and mobility starts to matter.
const KING_VAL: [i32; PHASES] = [4 * VAL_MAN / 3, 7 * VAL_MAN / 3, 7 * VAL_MAN / 3, 7 * VAL_MAN / 3];

/// Per-feature shift counts (the weights are powers of two, applied by
/// left-shifting the raw feature value, not raw multipliers), indexed
/// by game phase.
struct Feature {
    weight: [u32; PHASES],
}

const KINGS: Feature = Feature { weight: [14, 14, 14, 14] };
const DEVEL: Feature = Feature { weight: [12, 11, 8, 2] };
const TEMPO: Feature = Feature { weight: [4, 5, 6, 11] };
const CENTR: Feature = Feature { weight: [10, 11, 12, 12] };
const CLASS: Feature = Feature { weight: [9, 9, 10, 10] };
const GOLDN: Feature = Feature { weight: [13, 13, 4, 9] };
const FLOCK: Feature = Feature { weight: [13, 13, 13, 13] };
const CLOCK: Feature = Feature { weight: [17, 17, 17, 17] };
const LLOCK: Feature = Feature { weight: [16, 16, 16, 16] };
const RLOCK: Feature = Feature { weight: [15, 15, 15, 15] };
const DISTR: Feature = Feature { weight: [11, 11, 12, 4] };
const OUT22: Feature = Feature { weight: [13, 10, 3, 1] };
const OUT24: Feature = Feature { weight: [13, 11, 11, 6] };

#[inline]
fn shl(value: i32, feature: &Feature, phase: usize) -> i32 {
    value << feature.weight[phase]
}

/// The game phase, `0` (opening, >=32 pieces on the board) to `3`
/// (endgame, <=15 pieces).
#[inline]
pub fn game_phase(piece_count: u32) -> usize {
    let phase = 4i32 - piece_count as i32 / 8;
    phase.clamp(0, 3) as usize
}

/// Evaluates `bb` from the point of view of the side to move.
pub fn evaluate(bb: &Board) -> i32 {
    let phase = game_phase(bb.piece_count());
    let mut score = VAL_MAN * (pop_count(bb.white) as i32 - pop_count(bb.black) as i32);

    score += eval_break(bb);

    if bb.kings != 0 {
        let wk = bb.white & bb.kings;
        let bk = bb.black & bb.kings;
        score += KING_VAL[phase] * (pop_count(wk) as i32 - pop_count(bk) as i32);
        if wk != 0 && bk != 0 {
            // both sides have kings; a draw is more likely, discount material
            score /= 2;
        }

        const W_OUTER: u64 = sq(&[1, 5, 7, 11, 12, 17, 18, 22, 29, 33, 34, 39, 40, 44, 45, 46, 50]);
        const W_INNER: u64 = sq(&[1, 4, 5, 6, 10, 14, 15, 19, 23, 28, 32, 36, 37, 41, 46, 47, 50]);
        const B_OUTER: u64 = rsq(&[1, 5, 7, 11, 12, 17, 18, 22, 29, 33, 34, 39, 40, 44, 45, 46, 50]);
        const B_INNER: u64 = rsq(&[1, 4, 5, 6, 10, 14, 15, 19, 23, 28, 32, 36, 37, 41, 46, 47, 50]);

        let mut feat = (pop_count(wk & W_OUTER) + 2 * pop_count(wk & W_INNER)) as i32;
        feat -= (pop_count(bk & B_OUTER) + 2 * pop_count(bk & B_INNER)) as i32;
        score += shl(feat, &KINGS, phase);
    }

    let wm = bb.white & !bb.kings;
    let bm = bb.black & !bb.kings;

    // development of the rear
    {
        let mut feat = pop_count(wm & sq(&[36, 45])) as i32 - pop_count(wm & sq(&[44, 46])) as i32
            - 2 * pop_count(wm & sq(&[41, 50])) as i32;
        feat -= pop_count(bm & rsq(&[36, 45])) as i32 - pop_count(bm & rsq(&[44, 46])) as i32
            - 2 * pop_count(bm & rsq(&[41, 50])) as i32;
        score += shl(feat, &DEVEL, phase);
    }

    // tempo: degree of advancement
    let tempo = {
        let mut feat = pop_count(wm & (ROW9 | ROW7 | ROW5 | ROW3)) as i32
            + 2 * pop_count(wm & (ROW8 | ROW7 | ROW4 | ROW3)) as i32
            + 4 * pop_count(wm & (ROW6 | ROW5 | ROW4 | ROW3)) as i32
            + 8 * pop_count(wm & ROW2) as i32;
        feat -= pop_count(bm & (ROB9 | ROB7 | ROB5 | ROB3)) as i32
            + 2 * pop_count(bm & (ROB8 | ROB7 | ROB4 | ROB3)) as i32
            + 4 * pop_count(bm & (ROB6 | ROB5 | ROB4 | ROB3)) as i32
            + 8 * pop_count(bm & ROB2) as i32;
        score += shl(feat, &TEMPO, phase);
        feat
    };

    // occupation of center
    {
        let mut feat = pop_count(wm & sq(&[27, 28, 34, 37, 38, 39])) as i32 + 2 * pop_count(wm & sq(&[28, 29, 32, 33])) as i32;
        feat -= pop_count(bm & rsq(&[27, 28, 34, 37, 38, 39])) as i32 + 2 * pop_count(bm & rsq(&[28, 29, 32, 33])) as i32;
        score += shl(feat, &CENTR, phase);
    }

    // "classical" configuration
    {
        let mut feat = 0i32;
        if wm & sq(&[29, 32]) == sq(&[32]) {
            feat += 2 * ((wm & sq(&[28]) != 0) as i32) + ((wm & sq(&[27, 28]) == sq(&[27, 28])) as i32)
                + (((wm | bm) & sq(&[28]) == 0) as i32);
            if tempo > 0 {
                feat -= tempo;
            }
        }
        if bm & rsq(&[29, 32]) == rsq(&[32]) {
            feat -= 2 * ((bm & rsq(&[28]) != 0) as i32) + ((bm & rsq(&[27, 28]) == rsq(&[27, 28])) as i32)
                + (((bm | wm) & rsq(&[28]) == 0) as i32);
            if tempo < 0 {
                feat -= tempo;
            }
        }
        score += shl(feat, &CLASS, phase);
    }

    // the golden piece ("kroonschijf")
    {
        let mut feat = (wm & sq(&[48]) != 0) as i32;
        feat -= (bm & rsq(&[48]) != 0) as i32;
        score += shl(feat, &GOLDN, phase);
    }

    // the fork lock ("hekstelling")
    {
        let mut feat = (((wm & sq(&[26, 27, 31, 36])) | (bm & sq(&[16, 18]))) == sq(&[26, 27, 31, 36, 16, 18])
            && pop_count(bm & sq(&[22, 23, 28])) == 1) as i32;
        feat -= (((bm & rsq(&[26, 27, 31, 36])) | (wm & rsq(&[16, 18]))) == rsq(&[26, 27, 31, 36, 16, 18])
            && pop_count(wm & rsq(&[22, 23, 28])) == 1) as i32;
        score += shl(feat, &FLOCK, phase);
    }

    // the chain lock ("kettingstelling")
    {
        let mut feat = -((((wm & sq(&[27, 28, 29])) | (bm & sq(&[22, 23, 27, 29]))) == sq(&[22, 23, 28])) as i32);
        feat += (((bm & rsq(&[27, 28, 29])) | (wm & rsq(&[22, 23, 27, 29]))) == rsq(&[22, 23, 28])) as i32;
        feat -= (((wm & sq(&[28, 29, 30])) | (bm & sq(&[23, 24, 28, 30]))) == sq(&[23, 24, 29])) as i32;
        feat += (((bm & rsq(&[28, 29, 30])) | (wm & rsq(&[23, 24, 28, 30]))) == rsq(&[23, 24, 29])) as i32;
        score += shl(feat, &CLOCK, phase);
    }

    // the left-wing lock ("lange vleugel opsluiting")
    {
        let mut feat = (((wm & sq(&[25])) | (bm & sq(&[20]))) == sq(&[20, 25]) && wm & sq(&[30, 35]) != 0) as i32;
        feat -= (((bm & rsq(&[25])) | (wm & rsq(&[20]))) == rsq(&[20, 25]) && bm & rsq(&[30, 35]) != 0) as i32;
        score += shl(feat, &LLOCK, phase);
    }

    // the right-wing lock ("korte vleugel opsluiting")
    {
        let mut feat = (((wm & sq(&[6, 22, 26, 28])) | (bm & sq(&[6, 11, 17, 22]))) == sq(&[11, 17, 26, 28])) as i32;
        feat -= (((bm & rsq(&[6, 22, 26, 28])) | (wm & rsq(&[6, 11, 17, 22]))) == rsq(&[11, 17, 26, 28])) as i32;
        feat += (((wm & sq(&[26])) | (bm & sq(&[16, 21]))) == sq(&[16, 21, 26]) && wm & sq(&[27, 32]) != 0) as i32;
        feat -= (((bm & rsq(&[26])) | (wm & rsq(&[16, 21]))) == rsq(&[16, 21, 26]) && bm & rsq(&[27, 32]) != 0) as i32;
        score += shl(feat, &RLOCK, phase);
    }

    // wing distribution imbalance
    {
        let mut feat = -(pop_count(wm & (COL1 | COL2 | COL3)) as i32 - pop_count(wm & (COL8 | COL9 | COL10)) as i32).abs();
        feat += (pop_count(bm & (COL1 | COL2 | COL3)) as i32 - pop_count(bm & (COL8 | COL9 | COL10)) as i32).abs();
        score += shl(feat, &DISTR, phase);
    }

    // poorly defended outpost 22 ("kerkhof")
    {
        let mut feat = -((wm & sq(&[22, 17]) != 0
            && (wm & sq(&[27, 32]) != sq(&[27, 32]))
            && (wm & sq(&[28, 36]) != sq(&[28, 36])
                || pop_count(bm & sq(&[1, 2, 3, 7, 8, 12, 13, 18, 26])) > pop_count(wm & sq(&[31, 37, 41, 42, 46, 47, 48]))))
            as i32);
        feat += (bm & rsq(&[22, 17]) != 0
            && (bm & rsq(&[27, 32]) != rsq(&[27, 32]))
            && (bm & rsq(&[28, 36]) != rsq(&[28, 36])
                || pop_count(wm & rsq(&[1, 2, 3, 7, 8, 12, 13, 18, 26])) > pop_count(bm & rsq(&[31, 37, 41, 42, 46, 47, 48]))))
            as i32;
        score += shl(feat, &OUT22, phase);
    }

    // poorly defended outpost 24
    {
        let mut feat = -((wm & sq(&[24]) != 0
            && (pop_count(wm & sq(&[29, 33, 34])) <= 1
                || pop_count(bm & sq(&[3, 4, 5, 9, 10, 13, 14])) > pop_count(wm & sq(&[23, 35, 40, 44, 45, 49, 50]))))
            as i32);
        feat += (bm & rsq(&[24]) != 0
            && (pop_count(bm & rsq(&[29, 33, 34])) <= 1
                || pop_count(wm & rsq(&[3, 4, 5, 9, 10, 13, 14])) > pop_count(bm & rsq(&[23, 35, 40, 44, 45, 49, 50]))))
            as i32;
        score += shl(feat, &OUT24, phase);
    }

    if !matches!(bb.side, crate::board::Color::White) {
        score = -score;
    }
    score
}

/// The breakthrough term: looks for a man that has (or is close to
/// having) a clear run to promotion, tiered by how many rows away the
/// run starts and by how well-defended the path is.
fn eval_break(bb: &Board) -> i32 {
    const MBONUS: i32 = 1 << 17;
    let lbonus = VAL_MAN / 9;
    let hbonus = VAL_MAN * 4 / 9;
    let xbonus = VAL_MAN * 5 / 4;

    let wm = bb.white & !bb.kings;
    let bm = bb.black & !bb.kings;
    let mut score = 0i32;

    // one step from promotion: is the landing square undefended?
    let s = pc(wm & ROW2 & !((bm & ((bm << 1) | sq(&[1]))) << 5));
    score += s * xbonus;
    let s = pc(bm & ROB2 & !((wm & ((wm >> 1) | rsq(&[1]))) >> 5));
    score -= s * xbonus;

    if wm & ROW3 != 0 {
        let mut s = pc(wm & sq(&[11, 12, 13, 14]) & !(bm << 11));
        s += bit((wm & sq(&[15]) | (bm & sq(&[4, 5, 10]))) == sq(&[15]));
        score += s * MBONUS;

        let s = if matches!(bb.side, crate::board::Color::White) {
            pc(wm & ROW3 & !((bm << 6) | (bm << 12) | (((wm | bm) << 1) ^ (bm << 11))))
                + pc(wm & sq(&[11, 12, 13, 14]) & !((bm << 5) | (bm << 10) | (((wm | bm) >> 1) ^ (bm << 11))))
        } else {
            pc(
                wm & sq(&[11, 12, 13, 14])
                    & !((bm << 1) | (bm << 6) | (bm << 11) | (bm << 12))
                    & !((bm << 7) & ((bm >> 1) | (bm << 10))),
            ) + pc(
                wm & sq(&[11, 12, 13, 14])
                    & !((bm >> 1) | (bm << 5) | (bm << 11) | (bm << 10))
                    & !((bm << 4) & ((bm << 1) | (bm << 12))),
            ) + bit((wm & sq(&[15]) | (bm & sq(&[4, 5, 14]))) == sq(&[15]))
        };
        score += s * hbonus;
    }
    if bm & ROB3 != 0 {
        let mut s = pc(bm & rsq(&[11, 12, 13, 14]) & !(wm >> 11));
        s += bit((bm & rsq(&[15]) | (wm & rsq(&[4, 5, 10]))) == rsq(&[15]));
        score -= s * MBONUS;

        let s = if !matches!(bb.side, crate::board::Color::White) {
            pc(bm & ROB3 & !((wm >> 6) | (wm >> 12) | (((bm | wm) >> 1) ^ (wm >> 11))))
                + pc(bm & rsq(&[11, 12, 13, 14]) & !((wm >> 5) | (wm >> 10) | (((bm | wm) << 1) ^ (wm >> 11))))
        } else {
            pc(
                bm & rsq(&[11, 12, 13, 14])
                    & !((wm >> 1) | (wm >> 6) | (wm >> 11) | (wm >> 12))
                    & !((wm >> 7) & ((wm << 1) | (wm >> 10))),
            ) + pc(
                bm & rsq(&[11, 12, 13, 14])
                    & !((wm << 1) | (wm >> 5) | (wm >> 11) | (wm >> 10))
                    & !((wm >> 4) & ((wm >> 1) | (wm >> 12))),
            ) + bit((bm & rsq(&[15]) | (wm & rsq(&[4, 5, 14]))) == rsq(&[15]))
        };
        score -= s * hbonus;
    }

    if wm & ROW4 != 0 {
        let mut s = pc(wm & sq(&[17, 18, 19, 20]) & !((bm << 11) | (bm << 16) | (bm << 17)));
        s += bit((wm & sq(&[16]) | (bm & sq(&[1, 6, 7, 11]))) == sq(&[16]));
        score += s * MBONUS;

        let s: i32 = if matches!(bb.side, crate::board::Color::White) {
            bit((wm & sq(&[16]) | (bm & sq(&[1, 6, 7, 11, 17]))) == sq(&[16]))
                + pc(wm & sq(&[17, 18, 19]) & !((bm << 1) | (bm << 6) | (bm << 11) | (bm << 12) | (bm << 17)))
                + pc(wm & sq(&[17, 18, 19]) & !((bm >> 1) | (bm << 5) | (bm << 11) | (bm << 10) | (bm << 16)))
                + bit((wm & sq(&[20]) | (bm & sq(&[4, 5, 9, 10, 14, 15]))) == sq(&[20]))
        } else {
            bit((wm & sq(&[16]) | (bm & sq(&[1, 2, 6, 7, 11, 12, 17]))) == sq(&[16]))
                + bit((wm & sq(&[17]) | (bm & sq(&[1, 2, 6, 7, 11, 16]))) == sq(&[17]))
                + bit((wm & sq(&[17]) | (bm & sq(&[1, 2, 3, 7, 8, 12, 13, 18]))) == sq(&[17]))
                + bit((wm & sq(&[18]) | (bm & sq(&[1, 2, 3, 7, 8, 11, 12, 17]))) == sq(&[18]))
                + bit((wm & sq(&[18]) | (bm & sq(&[2, 3, 4, 8, 9, 13, 14, 19]))) == sq(&[18]))
                + bit((wm & sq(&[19]) | (bm & sq(&[2, 3, 4, 8, 9, 12, 13, 18]))) == sq(&[19]))
                + bit((wm & sq(&[19]) | (bm & sq(&[3, 4, 5, 9, 10, 14, 15, 20]))) == sq(&[19]))
                + bit((wm & sq(&[20]) | (bm & sq(&[3, 4, 5, 9, 10, 14, 15]))) == sq(&[20]))
        };
        score += s * lbonus;
    }
    if bm & ROB4 != 0 {
        let mut s = pc(bm & rsq(&[17, 18, 19, 20]) & !((wm >> 11) | (wm >> 16) | (wm >> 17)));
        s += bit((bm & rsq(&[16]) | (wm & rsq(&[1, 6, 7, 11]))) == rsq(&[16]));
        score -= s * MBONUS;

        let s: i32 = if !matches!(bb.side, crate::board::Color::White) {
            bit((bm & rsq(&[16]) | (wm & rsq(&[1, 6, 7, 11, 17]))) == rsq(&[16]))
                + pc(bm & rsq(&[17, 18, 19]) & !((wm >> 1) | (wm >> 6) | (wm >> 11) | (wm >> 12) | (wm >> 17)))
                + pc(bm & rsq(&[17, 18, 19]) & !((wm << 1) | (wm >> 5) | (wm >> 11) | (wm >> 10) | (wm >> 16)))
                + bit((bm & rsq(&[20]) | (wm & rsq(&[4, 5, 9, 10, 14, 15]))) == rsq(&[20]))
        } else {
            bit((bm & rsq(&[16]) | (wm & rsq(&[1, 2, 6, 7, 11, 12, 17]))) == rsq(&[16]))
                + bit((bm & rsq(&[17]) | (wm & rsq(&[1, 2, 6, 7, 11, 16]))) == rsq(&[17]))
                + bit((bm & rsq(&[17]) | (wm & rsq(&[1, 2, 3, 7, 8, 12, 13, 18]))) == rsq(&[17]))
                + bit((bm & rsq(&[18]) | (wm & rsq(&[1, 2, 3, 7, 8, 11, 12, 17]))) == rsq(&[18]))
                + bit((bm & rsq(&[18]) | (wm & rsq(&[2, 3, 4, 8, 9, 13, 14, 19]))) == rsq(&[18]))
                + bit((bm & rsq(&[19]) | (wm & rsq(&[2, 3, 4, 8, 9, 12, 13, 18]))) == rsq(&[19]))
                + bit((bm & rsq(&[19]) | (wm & rsq(&[3, 4, 5, 9, 10, 14, 15, 20]))) == rsq(&[19]))
                + bit((bm & rsq(&[20]) | (wm & rsq(&[3, 4, 5, 9, 10, 14, 15]))) == rsq(&[20]))
        };
        score -= s * lbonus;
    }

    score
}

#[inline(always)]
fn pc(bits: u64) -> i32 {
    pop_count(bits) as i32
}

#[inline(always)]
fn bit(cond: bool) -> i32 {
    cond as i32
}

/// Combines a list of 1-based square numbers into a single mask.
const fn sq(squares: &[u8]) -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < squares.len() {
        mask |= square_bit(squares[i]);
        i += 1;
    }
    mask
}

/// As `sq`, but over the reversed numbering (`reverse(S_k) = R_(51-k)`)
/// used for Black's side of every mirrored feature above.
const fn rsq(squares: &[u8]) -> u64 {
    let mut mask = 0u64;
    let mut i = 0;
    while i < squares.len() {
        mask |= square_bit(51 - squares[i]);
        i += 1;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use std::rc::Rc;

    #[test]
    fn initial_position_is_balanced() {
        let bb = Board::initial();
        assert_eq!(evaluate(&bb), 0);
    }

    #[test]
    fn evaluation_is_antisymmetric_under_board_inversion() {
        let bb: Rc<Board> = Rc::new(Board::from_fen("W:W31:B20").unwrap());
        let inverted = bb.invert();
        assert_eq!(evaluate(&bb), -evaluate(&inverted));
    }

    #[test]
    fn a_lone_extra_man_is_worth_roughly_val_man() {
        let bb = Board::from_fen("W:W31,32:B20").unwrap();
        assert!(evaluate(&bb) > 0);
    }
}
