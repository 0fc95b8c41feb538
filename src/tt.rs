//! Transposition table: a fixed-size, 4-way set-associative hash table
//! keyed on board position, storing a score bound and a collapsed best
//! move.
//!
//! Each bucket is 4 entries (one cache line on common hardware); a new
//! entry always lands in slot 0, shifting the others down, so slot 3
//! is the least-recently-stored entry and the one that gets evicted.

use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::ptr;

use rand::Rng;

use crate::board::{Board, Color};
use crate::error::EngineError;
use crate::moves::Move;

/// Immediate-win score. Scores within `MAXEXACT` of this are distance-
/// to-win database scores and need adjusting for ply level when they
/// cross the table boundary, so that a win found N plies from the
/// current root is stored/recalled consistently regardless of which
/// node originally searched it.
pub const INFIN: i32 = 2_000_000_000;
pub const MAXEXACT: i32 = 64;

#[derive(Clone, Copy)]
#[repr(C)]
struct TtEntry {
    ttsig: u32,
    score: i32,
    /// Packs `depth` (8 bits), `alphabound` (1 bit), `betabound` (1 bit)
    /// and `bestmove` (54 bits) the way the donor engine's bitfield
    /// struct does, so four entries fit in one 64-byte cache line.
    packed: u64,
}

const DEPTH_SHIFT: u32 = 56;
const ALPHA_SHIFT: u32 = 55;
const BETA_SHIFT: u32 = 54;
const BESTMOVE_MASK: u64 = (1u64 << 54) - 1;

impl TtEntry {
    const EMPTY: TtEntry = TtEntry { ttsig: 0, score: 0, packed: 0 };

    #[inline]
    fn depth(&self) -> u8 {
        (self.packed >> DEPTH_SHIFT) as u8
    }
    #[inline]
    fn alphabound(&self) -> bool {
        self.packed & (1 << ALPHA_SHIFT) != 0
    }
    #[inline]
    fn betabound(&self) -> bool {
        self.packed & (1 << BETA_SHIFT) != 0
    }
    #[inline]
    fn bestmove(&self) -> u64 {
        self.packed & BESTMOVE_MASK
    }
    #[inline]
    fn pack(depth: u8, alphabound: bool, betabound: bool, bestmove: u64) -> u64 {
        ((depth as u64) << DEPTH_SHIFT) | ((alphabound as u64) << ALPHA_SHIFT) | ((betabound as u64) << BETA_SHIFT) | (bestmove & BESTMOVE_MASK)
    }
}

/// Bound reported by a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// An exact score for the searched depth.
    Exact(i32),
    /// A fail-high: the true score is at least this.
    LowerBound(i32),
    /// A fail-low: the true score is at most this.
    UpperBound(i32),
}

impl ProbeResult {
    pub fn score(&self) -> i32 {
        match *self {
            ProbeResult::Exact(s) | ProbeResult::LowerBound(s) | ProbeResult::UpperBound(s) => s,
        }
    }
}

/// A 4-entry-bucket, power-of-two-sized transposition table.
pub struct TranspositionTable {
    entries: *mut TtEntry,
    mask: u32,
    cap: u32,
    hash_init: u64,
}

unsafe impl Send for TranspositionTable {}

const GOLDEN_RATIO: u64 = 0x9e3779b97f4a7c13;

fn mix64(mut a: u64, mut b: u64, mut c: u64) -> u64 {
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 43;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 9;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 8;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 38;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 23;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 5;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 35;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 49;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 11;
    a = a.wrapping_sub(b);
    a = a.wrapping_sub(c);
    a ^= c >> 12;
    b = b.wrapping_sub(c);
    b = b.wrapping_sub(a);
    b ^= a << 18;
    c = c.wrapping_sub(a);
    c = c.wrapping_sub(b);
    c ^= b >> 22;
    c
}

impl TranspositionTable {
    /// Allocates a table with `2.pow(size_log2)` entries, in buckets of
    /// 4, cache-line aligned.
    pub fn new(size_log2: u32) -> Result<TranspositionTable, EngineError> {
        let entry_count: u32 = 1u32 << size_log2;
        let layout = Layout::array::<TtEntry>(entry_count as usize)
            .map_err(|_| EngineError::TranspositionTableAlloc)?
            .align_to(64)
            .map_err(|_| EngineError::TranspositionTableAlloc)?;
        let ptr = unsafe { alloc_zeroed(layout) } as *mut TtEntry;
        if ptr.is_null() {
            return Err(EngineError::TranspositionTableAlloc);
        }
        let mut tt = TranspositionTable {
            entries: ptr,
            mask: entry_count - 4,
            cap: entry_count,
            hash_init: 0x0ecf_2aae_f2c9_37b6,
        };
        tt.wipe();
        Ok(tt)
    }

    /// Re-randomizes the hash seed, invalidating every stored entry
    /// without rewriting the table, ahead of a new search.
    pub fn flush(&mut self) {
        let mut rng = rand::thread_rng();
        self.hash_init = rng.gen::<u64>();
    }

    /// Zeroes every slot and resets the hash seed to a fixed value, for
    /// reproducible timing runs.
    pub fn wipe(&mut self) {
        unsafe {
            ptr::write_bytes(self.entries, 0, self.cap as usize);
        }
        self.hash_init = 0x0ecf_2aae_f2c9_37b6;
    }

    #[inline]
    fn bucket(&self, bb: &Board) -> (usize, u32) {
        let a = bb.white.wrapping_add(self.hash_init);
        let b = bb.black.wrapping_add(self.hash_init);
        let c = bb.kings.wrapping_add(GOLDEN_RATIO);
        let mixed = mix64(a, b, c);
        let ttsig = (b as u32) ^ (bb.side as u32);
        ((mixed as u32 & self.mask) as usize, ttsig)
    }

    #[inline]
    unsafe fn slot(&self, bucket: usize, i: usize) -> &mut TtEntry {
        &mut *self.entries.add(bucket + i)
    }

    /// Looks up `bb`. Returns the stored bound (ply-adjusted) when the
    /// stored depth is at least `depth`, plus the collapsed best move
    /// regardless of depth sufficiency (for move ordering / PV
    /// reconstruction even on a depth miss).
    pub fn probe(&self, bb: &Board, ply: i32, depth: u8) -> (Option<ProbeResult>, Option<u64>) {
        let (bucket, ttsig) = self.bucket(bb);
        let found = unsafe {
            (0..4).find(|&i| self.slot(bucket, i).ttsig == ttsig)
        };
        let Some(i) = found else {
            return (None, None);
        };
        let e = unsafe { *self.slot(bucket, i) };
        let bestmove = Some(e.bestmove());

        if e.depth() < depth {
            return (None, bestmove);
        }

        let mut score = e.score;
        if score > INFIN - MAXEXACT {
            score -= ply;
        } else if score < MAXEXACT - INFIN {
            score += ply;
        }

        let result = if e.betabound() {
            ProbeResult::LowerBound(score)
        } else if e.alphabound() {
            ProbeResult::UpperBound(score)
        } else {
            ProbeResult::Exact(score)
        };
        (Some(result), bestmove)
    }

    /// Stores a search result for `bb`. `bestmove` is the collapsed
    /// (white | black) encoding of the resulting board; see
    /// `moves::Move::collapsed`.
    pub fn store(&mut self, bb: &Board, ply: i32, depth: u8, alpha: i32, beta: i32, score: i32, bestmove: u64) {
        let (bucket, ttsig) = self.bucket(bb);
        let slots: [usize; 4] = [0, 1, 2, 3];
        let found = unsafe { slots.iter().copied().find(|&i| self.slot(bucket, i).ttsig == ttsig) };

        let old_best = match found {
            Some(0) => unsafe { self.slot(bucket, 0).bestmove() },
            Some(hit) => {
                let old = unsafe { self.slot(bucket, hit).bestmove() };
                unsafe {
                    for i in (1..=hit).rev() {
                        *self.slot(bucket, i) = *self.slot(bucket, i - 1);
                    }
                }
                old
            }
            None => {
                unsafe {
                    for i in (1..4).rev() {
                        *self.slot(bucket, i) = *self.slot(bucket, i - 1);
                    }
                }
                bestmove
            }
        };

        let alphabound = score <= alpha;
        let betabound = score >= beta;
        let kept_best = if alphabound { old_best } else { bestmove };

        let mut stored_score = score;
        if score > INFIN - MAXEXACT {
            stored_score += ply;
        } else if score < MAXEXACT - INFIN {
            stored_score -= ply;
        }

        unsafe {
            let slot = self.slot(bucket, 0);
            slot.ttsig = ttsig;
            slot.score = stored_score;
            slot.packed = TtEntry::pack(depth, alphabound, betabound, kept_best);
        }
    }
}

impl Drop for TranspositionTable {
    fn drop(&mut self) {
        let layout = Layout::array::<TtEntry>(self.cap as usize).unwrap().align_to(64).unwrap();
        unsafe { dealloc(self.entries as *mut u8, layout) };
    }
}

/// Reconstructs the principal variation starting from `root`, following
/// collapsed best moves out of `tt` until a move can no longer be
/// matched among the position's legal moves (the table entry was
/// evicted, or the recorded move transposed in via a different path).
pub fn principal_variation(tt: &TranspositionTable, root: &std::rc::Rc<Board>, max_len: usize) -> Vec<Move> {
    let mut pv = Vec::new();
    let mut current = std::rc::Rc::clone(root);
    for ply in 0..max_len {
        let (_, Some(bestmove)) = tt.probe(&current, ply as i32, 0) else { break };
        if bestmove == 0 {
            break;
        }
        let list = crate::movegen::generate_moves(&current, true);
        let Some(mv) = list.moves.iter().find(|m| m.collapsed() == bestmove) else {
            break;
        };
        pv.push(mv.clone());
        current = std::rc::Rc::clone(&mv.result);
    }
    pv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;

    #[test]
    fn a_stored_exact_score_is_found_again() {
        let mut tt = TranspositionTable::new(10).unwrap();
        let bb = Board::initial();
        tt.store(&bb, 0, 6, -1000, 1000, 37, 0);
        let (probe, _) = tt.probe(&bb, 0, 6);
        assert_eq!(probe, Some(ProbeResult::Exact(37)));
    }

    #[test]
    fn a_shallower_probe_still_sees_the_stored_bestmove() {
        let mut tt = TranspositionTable::new(10).unwrap();
        let bb = Board::initial();
        tt.store(&bb, 0, 6, -1000, 1000, 37, 0x1234);
        let (probe, bestmove) = tt.probe(&bb, 0, 10);
        assert_eq!(probe, None);
        assert_eq!(bestmove, Some(0x1234));
    }

    #[test]
    fn a_fail_low_store_is_reported_as_an_upper_bound() {
        let mut tt = TranspositionTable::new(10).unwrap();
        let bb = Board::initial();
        tt.store(&bb, 0, 6, 100, 1000, 50, 0);
        let (probe, _) = tt.probe(&bb, 0, 6);
        assert_eq!(probe, Some(ProbeResult::UpperBound(50)));
    }

    #[test]
    fn wipe_clears_every_stored_entry() {
        let mut tt = TranspositionTable::new(10).unwrap();
        let bb = Board::initial();
        tt.store(&bb, 0, 6, -1000, 1000, 37, 0);
        tt.wipe();
        let (probe, _) = tt.probe(&bb, 0, 6);
        assert_eq!(probe, None);
    }
}
