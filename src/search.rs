//! The principal variation search: iterative deepening over a
//! recursive negamax `pv_search`, with transposition-table cutoffs,
//! endgame-database probes, killer/history move ordering, late move
//! reductions, enhanced transposition cutoffs and a ProbCut-style
//! bad-move pruning pass.
//!
//! The engine core is single-threaded; there is no internal
//! parallelism. Search abort is driven purely by wall-clock time --
//! the original's cooperative polling of an external protocol event
//! is protocol glue and not reproduced here.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::board::Board;
use crate::book::OpeningBook;
use crate::config::EngineOptions;
use crate::egdb::{EndgameDb, DTWENDPC, MAX5PLY, MAXENDPC, MAXPLY};
use crate::eval::{evaluate, game_phase, VAL_MAN};
use crate::moves::Move;
use crate::movegen::{generate_moves, MoveList};
use crate::tt::{ProbeResult, TranspositionTable, INFIN, MAXEXACT};

/// Maximum number of plies a single capture-equivalence leaf search
/// (`equiv_search`) will collect before giving up and falling back to
/// a full search.
const MAX_EQUIV_LEAVES: usize = 128;

#[derive(Default, Clone, Copy)]
struct KillerSlot {
    k1: u64,
    k2: u64,
}

/// Node-visit and probe statistics for the most recent `think` call,
/// reported through the `log` crate at the end of each search rather
/// than as a bespoke metrics subsystem.
#[derive(Default, Clone, Copy)]
pub struct SearchStats {
    pub node_count: u64,
    pub nonleaf_count: u64,
    pub eval_count: u64,
    pub ttprobe_count: u64,
    pub tthit_count: u64,
    pub ttbest_count: u64,
    pub etctst_count: u64,
    pub etchit_count: u64,
    pub etccut_count: u64,
}

/// The outcome of a `think` call: the root list (reordered best-first
/// by the search itself) and each move's backed-up score, in the same
/// order as the reordered list.
pub struct ThinkResult {
    pub depth_reached: i32,
    pub scores: Vec<i32>,
}

enum TtDecision {
    Cutoff(i32),
    Improved(i32),
    Miss,
}

/// Owns the per-search mutable state (killer moves, move-ordering
/// history, node statistics, time budget) that the original engine
/// keeps as module-level globals. A `Searcher` borrows the
/// transposition table, endgame database and opening book for the
/// duration of one `think` call.
pub struct Searcher<'a> {
    tt: &'a mut TranspositionTable,
    egdb: &'a mut EndgameDb,
    book: &'a OpeningBook,
    wdl_interior_threshold: i32,
    base_move_time: Duration,

    killer_list: Vec<KillerSlot>,
    good_hist: Vec<Vec<u32>>,

    stats: SearchStats,

    start_tick: Instant,
    last_tick: Instant,
    think_time: Duration,
    deadline: Instant,
    abort: bool,

    iter0_score: i32,
    root_pcnt: u32,
    max_ply: i32,
    db_maxpc: u32,
    db_threshold: i32,
    m_explored: i32,
}

impl<'a> Searcher<'a> {
    pub fn new(tt: &'a mut TranspositionTable, egdb: &'a mut EndgameDb, book: &'a OpeningBook, options: &EngineOptions) -> Searcher<'a> {
        let now = Instant::now();
        Searcher {
            tt,
            egdb,
            book,
            wdl_interior_threshold: options.wdl_interior_threshold,
            base_move_time: options.move_time,
            killer_list: vec![KillerSlot::default(); MAXPLY as usize + 1],
            good_hist: vec![vec![0u32; 51]; 51],
            stats: SearchStats::default(),
            start_tick: now,
            last_tick: now,
            think_time: options.move_time,
            deadline: now + options.move_time,
            abort: false,
            iter0_score: 0,
            root_pcnt: 0,
            max_ply: MAXPLY,
            db_maxpc: MAXENDPC,
            db_threshold: INFIN - MAXPLY,
            m_explored: 0,
        }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    fn fade_hist(&mut self) {
        for row in &mut self.good_hist {
            for h in row.iter_mut() {
                *h >>= 3;
            }
        }
    }

    /// Determines the next move's think-time budget from the
    /// situational factors of §4.6.3: a worsening score overrides
    /// everything else; otherwise opening phase, move index, and an
    /// improving score each scale the base budget.
    fn set_budget(&mut self, m: i32, score: i32, start: i32) {
        self.m_explored = m;

        if score < start - VAL_MAN / 10 {
            self.think_time = self.base_move_time * 3;
            self.deadline = self.start_tick + self.think_time;
            return;
        }

        let mut think_time = self.base_move_time;
        if game_phase(self.root_pcnt) == 0 {
            think_time /= 2;
        }

        think_time = match m {
            0 | 1 => think_time * 2,
            -1 | 2 => think_time * 3 / 2,
            _ => think_time,
        };

        if score > start + 7 * VAL_MAN / 5 {
            think_time = think_time * 2 / 3;
        }

        self.think_time = think_time;
        self.deadline = self.start_tick + self.think_time;
    }

    /// Decides what a transposition-table probe means for the current
    /// `(alpha, beta)` window: an immediate cutoff, an improved lower
    /// bound worth keeping as the new `alpha`, or nothing usable.
    fn tt_decide(&self, bb: &Board, ply: i32, depth: u8, alpha: i32, beta: i32) -> (TtDecision, Option<u64>) {
        let (probe, hint) = self.tt.probe(bb, ply, depth);
        let decision = match probe {
            None => TtDecision::Miss,
            Some(ProbeResult::Exact(s)) => TtDecision::Cutoff(s),
            Some(ProbeResult::LowerBound(s)) => {
                if s >= beta {
                    TtDecision::Cutoff(s)
                } else if s > alpha {
                    TtDecision::Improved(s)
                } else {
                    TtDecision::Miss
                }
            }
            Some(ProbeResult::UpperBound(s)) => {
                if s <= alpha {
                    TtDecision::Cutoff(s)
                } else {
                    TtDecision::Miss
                }
            }
        };
        (decision, hint)
    }

    /// Orders `moves` best-first ahead of searching them: the TT best
    /// move to slot 0, killer moves for this ply into the next slots,
    /// and (at non-leaf depths) the remainder insertion-sorted by
    /// history-table score.
    fn sort_moves(&mut self, moves: &mut [Move], d: i32, bestmove: u64, ply: i32) {
        if bestmove == 0 && d <= 2 {
            return;
        }
        let killers = self.killer_list[ply as usize];

        let mut mtt = None;
        let mut mk1 = None;
        let mut mk2 = None;
        for (i, mv) in moves.iter().enumerate() {
            let thismove = mv.collapsed();
            if thismove == bestmove {
                mtt = Some(i);
            } else if thismove == killers.k1 {
                mk1 = Some(i);
            } else if thismove == killers.k2 {
                mk2 = Some(i);
            }
        }

        let mut m = 0usize;
        if mtt == Some(0) {
            m = 1;
        }
        if let Some(i) = mtt {
            if i > 0 {
                moves.swap(i, 0);
                if mk1 == Some(0) {
                    mk1 = Some(i);
                }
                if mk2 == Some(0) {
                    mk2 = Some(i);
                }
                m = 1;
            }
        }
        if mk1 == Some(m) {
            m += 1;
        } else if let Some(i) = mk1 {
            if i > m {
                moves.swap(i, m);
                if mk2 == Some(m) {
                    mk2 = Some(i);
                }
                m += 1;
            }
        }
        if mk2 == Some(m) {
            m += 1;
        } else if let Some(i) = mk2 {
            if i > m {
                moves.swap(i, m);
                m += 1;
            }
        }

        if d > 2 && moves.len() > 1 && m < moves.len() - 1 {
            let mut scores: Vec<u32> = moves[m..]
                .iter()
                .map(|mv| self.good_hist[mv.from_square() as usize][mv.to_square() as usize])
                .collect();
            for i in 1..scores.len() {
                let mut j = i;
                while j > 0 && scores[j] > scores[j - 1] {
                    scores.swap(j, j - 1);
                    moves.swap(m + j, m + j - 1);
                    j -= 1;
                }
            }
        }
    }

    /// The recursive principal variation search. Returns the negamax
    /// score of `bb` from the perspective of the side to move.
    fn pv_search(&mut self, bb: &Rc<Board>, ply: i32, depth: i32, mut alpha: i32, beta: i32) -> i32 {
        self.stats.node_count += 1;
        if self.stats.node_count % 1024 == 0 {
            let now = Instant::now();
            if now >= self.deadline {
                self.abort = true;
                return 0;
            }
            self.last_tick = now;
        }

        if bb.white == 0 || bb.black == 0 {
            return -INFIN + ply;
        }

        if bb.is_draw(ply as u32).is_some() {
            if let Some(best) = self.egdb.value(bb, ply) {
                if best > INFIN - MAXPLY {
                    return best;
                }
            }
            return 0;
        }

        let origalpha = alpha;
        let mut best = alpha;
        let mut bestmove: u64 = 0;

        if depth > 0 {
            self.stats.ttprobe_count += 1;
            let (decision, hint) = self.tt_decide(bb, ply, depth as u8, alpha, beta);
            if let Some(h) = hint {
                bestmove = h;
            }
            match decision {
                TtDecision::Cutoff(s) => {
                    self.stats.tthit_count += 1;
                    return s;
                }
                TtDecision::Improved(s) => best = s,
                TtDecision::Miss => {}
            }
        }
        if bestmove != 0 {
            self.stats.ttbest_count += 1;
        }
        alpha = best;

        let pcnt = (bb.white | bb.black).count_ones();
        if pcnt <= DTWENDPC {
            if let Some(v) = self.egdb.dtw(bb, ply) {
                return v;
            }
        }

        let list = generate_moves(bb, depth > 0);

        if list.is_empty() && depth > 0 {
            return -INFIN + ply;
        }

        if pcnt > DTWENDPC
            && pcnt <= MAXENDPC
            && (list.is_empty() || (list.npcapt == 0 && pcnt <= self.db_maxpc))
        {
            if let Some(v) = self.egdb.wdl(bb) {
                if depth <= 0 || v.abs() > self.wdl_interior_threshold {
                    return v;
                }
            }
        }

        if list.is_empty() || ply >= self.max_ply {
            self.stats.eval_count += 1;
            return evaluate(bb);
        }

        let margin = VAL_MAN * 9 / 10;
        if depth > 2 && alpha + 1 == beta && game_phase(pcnt) != 0 && beta < INFIN - MAXPLY - margin {
            let probe = self.pv_search(bb, ply, depth / 2, beta + margin - 1, beta + margin);
            if self.abort {
                return 0;
            }
            if probe >= beta + margin {
                return beta;
            }
        }

        let mut moves = list.moves;
        let mut d = depth;
        if moves.len() > 1 {
            d -= 1;
            self.sort_moves(&mut moves, d, bestmove, ply);

            if d > 4 && alpha + 1 == beta {
                self.stats.etctst_count += 1;
                for mv in &moves {
                    let (decision, _) = self.tt_decide(&mv.result, ply + 1, d as u8, -beta, -alpha);
                    if let TtDecision::Cutoff(s) = decision {
                        self.stats.etchit_count += 1;
                        let negated = -s;
                        if negated >= beta {
                            self.stats.etccut_count += 1;
                            return negated;
                        }
                    }
                }
            }
        }

        self.stats.nonleaf_count += 1;
        let mut best = -self.pv_search(&moves[0].result, ply + 1, d, -beta, -alpha);
        let mut bestm = 0usize;
        if self.abort {
            return 0;
        }

        for m in 1..moves.len() {
            if best >= beta {
                break;
            }
            if best > alpha {
                alpha = best;
            }

            let mut merit = alpha + 1;
            if m >= 3 && alpha + 1 == beta && d > 2 && pcnt >= 8 {
                let reduction = if m >= 6 { 2 } else { 1 };
                merit = -self.pv_search(&moves[m].result, ply + 1, d - reduction, -alpha - 1, -alpha);
                if self.abort {
                    return 0;
                }
            }
            if merit > alpha {
                merit = -self.pv_search(&moves[m].result, ply + 1, d, -alpha - 1, -alpha);
                if self.abort {
                    return 0;
                }
            }

            if merit > best {
                best = merit;
                bestm = m;
                if best > alpha && best < beta {
                    merit = -self.pv_search(&moves[m].result, ply + 1, d, -beta, -best);
                    if self.abort {
                        return 0;
                    }
                    if merit > best {
                        best = merit;
                    }
                }
            }
        }

        let bestmove = moves[bestm].collapsed();

        if best >= beta && moves.len() > 1 {
            let k = &mut self.killer_list[ply as usize];
            if k.k1 != bestmove {
                k.k2 = k.k1;
                k.k1 = bestmove;
            }
        }

        if depth > 1 && best > origalpha {
            let from = moves[bestm].from_square() as usize;
            let to = moves[bestm].to_square() as usize;
            self.good_hist[from][to] += ((depth - 1) * (depth - 1)) as u32;
        }

        if depth > 0 {
            self.tt.store(bb, ply, depth as u8, origalpha, beta, best, bestmove);
        }

        best
    }

    /// The root-level search: the first move gets the full window,
    /// later moves are tried with a zero-width window and re-searched
    /// with the full window whenever they improve on the current
    /// best, pulling the improved move to the head of the list.
    fn pv_search0(&mut self, depth: i32, moves: &mut Vec<Move>, scores: &mut Vec<i32>) {
        self.stats.node_count += 1;
        if moves.is_empty() {
            scores[0] = -INFIN;
            return;
        }

        let mut d = depth;
        if moves.len() > 1 {
            d -= 1;
        }

        self.set_budget(0, scores[0], self.iter0_score);
        self.stats.nonleaf_count += 1;

        let beta = INFIN;
        let mut alpha = -INFIN;
        let mut best = -self.pv_search(&moves[0].result, 1, d, -beta, -alpha);
        if self.abort {
            return;
        }
        scores[0] = best;

        let mut m = 1;
        while m < moves.len() {
            if best > alpha {
                alpha = best;
            }
            self.set_budget(m as i32, best, self.iter0_score);

            let merit = -self.pv_search(&moves[m].result, 1, d, -alpha - 1, -alpha);
            if self.abort {
                return;
            }
            scores[m] = merit;

            if merit > best {
                best = merit;
                let needs_research = m < moves.len() - 1;

                let mv = moves.remove(m);
                moves.insert(0, mv);
                scores.remove(m);
                scores.insert(0, best);

                if needs_research {
                    self.set_budget(-(m as i32), best, self.iter0_score);
                    let merit = -self.pv_search(&moves[0].result, 1, d, -beta, -best);
                    if self.abort {
                        return;
                    }
                    if merit > best {
                        best = merit;
                    }
                    scores[0] = best;
                }
            }
            m += 1;
        }
    }

    /// Runs iterative deepening from depth 1 up to `max_depth`,
    /// reordering `list.moves` best-first and returning each move's
    /// final score alongside. Short-circuits to an immediate result
    /// when a book move, a forced single move, or equivalent capture
    /// sequences make a search unnecessary.
    pub fn think(&mut self, list: &mut MoveList, max_depth: i32) -> ThinkResult {
        let mut scores = vec![0i32; list.moves.len().max(1)];

        self.start_tick = Instant::now();
        self.last_tick = self.start_tick;
        self.fade_hist();

        if self.book.pick_move(&mut list.moves) {
            log::info!("book move selected");
            return ThinkResult { depth_reached: 0, scores };
        }
        if list.moves.len() == 1 {
            log::info!("only one valid move, no need to search");
            return ThinkResult { depth_reached: 0, scores };
        }
        if equiv_captures(list) {
            log::info!("capture moves are all equivalent, no need to search");
            return ThinkResult { depth_reached: 0, scores };
        }

        self.stats = SearchStats::default();
        for k in self.killer_list.iter_mut() {
            *k = KillerSlot::default();
        }
        self.abort = false;

        let root = Rc::clone(list.moves[0].parent());
        self.root_pcnt = root.piece_count();
        self.iter0_score = self.egdb.value(&root, 0).unwrap_or_else(|| evaluate(&root));
        scores[0] = self.iter0_score;

        self.max_ply = MAXPLY;
        self.db_threshold = INFIN - self.max_ply;
        self.db_maxpc = MAXENDPC;

        let mut d = 1;
        while d <= max_depth {
            self.pv_search0(d, &mut list.moves, &mut scores);

            if self.abort {
                self.abort = false;
                break;
            }

            let best_result = Rc::clone(&list.moves[0].result);
            if (best_result.white | best_result.black).count_ones() <= DTWENDPC
                && self.egdb.dtw(&best_result, 1).is_some()
            {
                log::debug!("best move's position is in dtw database");
                break;
            }
            if scores[0].abs() > INFIN - MAXEXACT {
                log::debug!("found win or loss score from dtw database");
                break;
            }
            let nextbest = scores[1..].iter().copied().max().unwrap_or(-INFIN);
            if nextbest < MAXEXACT - INFIN {
                log::debug!("remaining moves score a loss from dtw database");
                break;
            }

            if scores[0].abs() > self.db_threshold {
                if scores[0].abs() < INFIN - MAX5PLY {
                    self.max_ply = MAX5PLY;
                    self.db_maxpc = 5;
                } else {
                    self.max_ply = MAXEXACT;
                    self.db_maxpc = DTWENDPC;
                }
                self.db_threshold = INFIN - self.max_ply;
                log::debug!(
                    "entering iteration {} with threshold={} maxply={}",
                    d + 1,
                    self.db_threshold,
                    self.max_ply
                );
            }

            d += 1;
        }
        let depth_reached = d.min(max_depth);

        log::info!(
            "reached depth={} move={} nodes total={} nonleaf={} leaf={}",
            depth_reached,
            self.m_explored,
            self.stats.node_count,
            self.stats.nonleaf_count,
            self.stats.node_count - self.stats.nonleaf_count
        );
        log::info!(
            "tt probes={} hits={} bestmoves={} etc tests={} hits={} cuts={}",
            self.stats.ttprobe_count,
            self.stats.tthit_count,
            self.stats.ttbest_count,
            self.stats.etctst_count,
            self.stats.etchit_count,
            self.stats.etccut_count
        );
        log::info!("evals={} score={}", self.stats.eval_count, scores[0]);

        ThinkResult { depth_reached, scores }
    }
}

/// Recursively follows every capture continuation from `bb` and
/// collects the leaf positions reached once no more captures are
/// available. Returns `false` (instead of panicking) if the tree is
/// larger than `MAX_EQUIV_LEAVES`, matching the original's bounded
/// scratch array.
fn equiv_search(bb: &Rc<Board>, out: &mut Vec<Rc<Board>>) -> bool {
    let list = generate_moves(bb, false);
    if list.is_empty() {
        if out.len() >= MAX_EQUIV_LEAVES {
            log::warn!("equiv_search too complex");
            return false;
        }
        out.push(Rc::clone(bb));
        return true;
    }
    for mv in &list.moves {
        if !equiv_search(&mv.result, out) {
            return false;
        }
    }
    true
}

/// `true` when every move in `list` is a multi-piece capture and all
/// of them lead to the same multiset of leaf positions once forced
/// continuations are exhausted -- in that case the choice among them
/// cannot affect the outcome, and searching is unnecessary.
fn equiv_captures(list: &MoveList) -> bool {
    if list.npcapt == 0 || list.moves.len() <= 1 {
        return false;
    }
    let mut reference: Option<Vec<Rc<Board>>> = None;
    for mv in &list.moves {
        let mut leaves = Vec::new();
        if !equiv_search(&mv.result, &mut leaves) {
            return false;
        }
        leaves.sort();
        match &reference {
            None => reference = Some(leaves),
            Some(r) => {
                if r.len() != leaves.len() || r.iter().zip(leaves.iter()).any(|(a, b)| a != b) {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::config::EngineOptions;

    fn searcher_parts() -> (TranspositionTable, EndgameDb, OpeningBook) {
        let tt = TranspositionTable::new(10).unwrap();
        let options = EngineOptions::default();
        let egdb = EndgameDb::new(&options);
        let book = OpeningBook::empty();
        (tt, egdb, book)
    }

    #[test]
    fn a_single_legal_move_is_returned_without_searching() {
        let (mut tt, mut egdb, book) = searcher_parts();
        let options = EngineOptions::default();
        let mut searcher = Searcher::new(&mut tt, &mut egdb, &book, &options);

        let root = Board::initial();
        let mut list = generate_moves(&root, true);
        list.moves.truncate(1);

        let result = searcher.think(&mut list, 6);
        assert_eq!(result.depth_reached, 0);
        assert_eq!(searcher.stats().node_count, 0);
    }

    #[test]
    fn a_side_with_no_pieces_left_loses_immediately() {
        let (mut tt, mut egdb, book) = searcher_parts();
        let options = EngineOptions::default();
        let mut searcher = Searcher::new(&mut tt, &mut egdb, &book, &options);

        let bb = Rc::new(Board::from_fen("W:W28:B").unwrap());
        let score = searcher.pv_search(&bb, 3, 4, -INFIN, INFIN);
        assert_eq!(score, -INFIN + 3);
    }

    #[test]
    fn fade_hist_shrinks_every_counter() {
        let (mut tt, mut egdb, book) = searcher_parts();
        let options = EngineOptions::default();
        let mut searcher = Searcher::new(&mut tt, &mut egdb, &book, &options);
        searcher.good_hist[10][20] = 64;
        searcher.fade_hist();
        assert_eq!(searcher.good_hist[10][20], 8);
    }
}
