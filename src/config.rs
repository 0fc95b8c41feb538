//! Engine-wide configuration.
//!
//! CLI argument parsing is out of scope; this struct is the single place
//! the binary (or an embedder) fills in before constructing an engine
//! context. Kept a plain struct with `Default` rather than pulling in a
//! config-file crate, matching the donor's own construction style.

/// How aggressively the 5/6-piece WDL database is consulted at interior
/// (non-quiescence) search nodes. Larger values restrict interior WDL
/// probes to positions further from a cutoff, per §4.6 step 8.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// log2 of the number of 4-entry buckets in the transposition table.
    pub tt_size_log2: u32,

    /// Directories to search for endgame-database files, in order.
    /// Mirrors `locate_dbfile`'s search-path semantics.
    pub endgame_db_dirs: Vec<String>,

    /// Path to the opening book file, if any.
    pub book_path: Option<String>,

    /// Whether to verify each endgame file's CRC-16/CCITT-FALSE against
    /// the compiled-in manifest the first time it is opened.
    pub verify_endgame_crc: bool,

    /// Interior (non-quiescence) nodes only return a 5/6-piece WDL hit
    /// when the TT-independent score's absolute value exceeds this
    /// threshold; quiescence nodes always return a WDL hit.
    pub wdl_interior_threshold: i32,

    /// Base per-move time budget, before the §4.6.3 situational
    /// factors (opening phase, primary/runner-up moves, re-searches,
    /// a worsening or improving score) scale it up or down.
    pub move_time: std::time::Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            tt_size_log2: 20,
            endgame_db_dirs: vec!["./egdb".to_string()],
            book_path: None,
            verify_endgame_crc: true,
            wdl_interior_threshold: 50,
            move_time: std::time::Duration::from_secs(5),
        }
    }
}
