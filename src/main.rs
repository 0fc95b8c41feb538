use std::path::Path;
use std::rc::Rc;

use dambrain::book::OpeningBook;
use dambrain::config::EngineOptions;
use dambrain::egdb::EndgameDb;
use dambrain::movegen::generate_moves;
use dambrain::search::Searcher;
use dambrain::tt::TranspositionTable;

/// Thin binary entry point: installs the logger, builds an engine
/// context from the default options, and runs one search from the
/// starting position. Wiring this up to an actual protocol/CLI is out
/// of scope for this crate.
fn main() {
    env_logger::init();

    let options = EngineOptions::default();
    let mut tt = match TranspositionTable::new(options.tt_size_log2) {
        Ok(tt) => tt,
        Err(e) => {
            log::error!("can't allocate transposition table: {}", e);
            std::process::exit(1);
        }
    };
    let mut egdb = EndgameDb::new(&options);
    let (correct, total) = egdb.check_all();
    log::info!("endgame databases: {}/{} verified", correct, total);

    let book = match &options.book_path {
        Some(path) => OpeningBook::load(Path::new(path)),
        None => OpeningBook::empty(),
    };

    let root = dambrain::board::Board::initial();
    let mut list = generate_moves(&root, true);

    let mut searcher = Searcher::new(&mut tt, &mut egdb, &book, &options);
    let result = searcher.think(&mut list, 30);

    if let Some(mv) = list.moves.first() {
        let best = Rc::clone(mv.resulting_board());
        log::info!(
            "best move: {} (score {}, depth {})",
            best.to_fen(),
            result.scores[0],
            result.depth_reached
        );
    } else {
        log::info!("no legal move from the starting position");
    }
}
