//! Core of a 10x10 international draughts engine: a bitboard move
//! generator, a static evaluator, a transposition table, a principal
//! variation search, and an endgame-database reader.
//!
//! The DamExchange protocol driver, PDN logging, opening-book
//! construction tooling, CLI/logging/socket/timer glue, and test
//! utilities such as perft or a matchmaker are deliberately not part of
//! this crate; see the top-level design notes for the boundary.

extern crate lazy_static;
extern crate libc;
extern crate rand;
extern crate regex;

pub mod bitboard;
pub mod board;
pub mod book;
pub mod config;
pub mod eval;
pub mod egdb;
pub mod error;
pub mod moves;
pub mod movegen;
pub mod search;
pub mod tt;
