//! Opening book: a flat array of known board positions with move
//! strength annotations, used to skip search on well-trodden openings.
//!
//! The book is sorted by the same `(white, black, kings, side)` order
//! `Board`'s `Ord` impl derives, matching `bb_compare`, so a position
//! can be located with a binary search instead of a linear scan.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::board::{Board, Color};
use crate::moves::Move;

const RECORD_LEN: usize = 32;

/// Move strength annotation stored alongside a book position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Annotation {
    None,
    Good,
    Poor,
    VeryGood,
    VeryPoor,
    Other(u32),
}

impl Annotation {
    fn from_raw(raw: u32) -> Annotation {
        match raw {
            0 => Annotation::None,
            1 => Annotation::Good,
            2 => Annotation::Poor,
            3 => Annotation::VeryGood,
            4 => Annotation::VeryPoor,
            other => Annotation::Other(other),
        }
    }

    /// Weight this annotation contributes to the weighted random
    /// selection among `n` candidate book moves.
    fn weight(self, n: i32) -> i32 {
        match self {
            Annotation::None | Annotation::Other(_) => 1,
            Annotation::Good => n,
            Annotation::Poor | Annotation::VeryPoor => 0,
            Annotation::VeryGood => n, // handled separately, before weighing
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BookRecord {
    white: u64,
    black: u64,
    kings: u64,
    side: u32,
    annotation: u32,
}

impl BookRecord {
    fn parse(buf: &[u8]) -> BookRecord {
        let u64_at = |o: usize| u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        let u32_at = |o: usize| u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        BookRecord {
            white: u64_at(0),
            black: u64_at(8),
            kings: u64_at(16),
            side: u32_at(24),
            annotation: u32_at(28),
        }
    }

    fn board(&self) -> Board {
        Board {
            white: self.white,
            black: self.black,
            kings: self.kings,
            side: if self.side == 0 { Color::White } else { Color::Black },
            moveinfo: 0,
            parent: None,
        }
    }
}

/// A loaded opening book, or an empty one if no book file was
/// configured or it could not be read.
pub struct OpeningBook {
    records: Vec<BookRecord>,
}

impl OpeningBook {
    pub fn empty() -> OpeningBook {
        OpeningBook { records: Vec::new() }
    }

    pub fn load(path: &Path) -> OpeningBook {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("can't open book file {}: {}", path.display(), e);
                return OpeningBook::empty();
            }
        };
        if bytes.len() % RECORD_LEN != 0 {
            log::warn!(
                "book file {} size is not a whole number of records, truncating",
                path.display()
            );
        }
        let count = bytes.len() / RECORD_LEN;
        if count == 0 {
            log::warn!("{} is an empty book file", path.display());
            return OpeningBook::empty();
        }
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            records.push(BookRecord::parse(&bytes[i * RECORD_LEN..(i + 1) * RECORD_LEN]));
        }
        log::info!("book positions = {}", records.len());
        OpeningBook { records }
    }

    fn find(&self, bb: &Board) -> Option<BookRecord> {
        self.records
            .binary_search_by(|r| r.board().cmp(bb))
            .ok()
            .map(|i| self.records[i])
    }

    /// Looks up the current position (the common parent of every move
    /// in `moves`) in the book; if any candidate move is itself a
    /// known position, picks one by annotation weight (always
    /// preferring a `VeryGood` move when present) and swaps it to the
    /// front of `moves`. Returns `true` if a book move was selected.
    pub fn pick_move(&self, moves: &mut [Move]) -> bool {
        if self.records.is_empty() || moves.is_empty() {
            return false;
        }
        if self.find(moves[0].parent()).is_none() {
            return false; // current position not in book
        }

        let hits: Vec<(usize, Annotation)> = moves
            .iter()
            .enumerate()
            .filter_map(|(i, mv)| self.find(mv.resulting_board()).map(|r| (i, Annotation::from_raw(r.annotation))))
            .collect();
        if hits.is_empty() {
            return false;
        }
        let n = hits.len() as i32;

        if let Some(&(i, _)) = hits.iter().find(|(_, a)| *a == Annotation::VeryGood) {
            moves.swap(0, i);
            return true;
        }

        let total: i32 = hits.iter().map(|(_, a)| a.weight(n)).sum();
        if total <= 0 {
            log::warn!("book move selection: sanity check failed");
            return false;
        }
        let mut x = rand::thread_rng().gen_range(0, total);
        for &(i, a) in &hits {
            x -= a.weight(n);
            if x < 0 {
                moves.swap(0, i);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitboard::square_bit;
    use crate::board::Board;
    use std::rc::Rc;

    fn record_bytes(bb: &Board, annotation: u32) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..8].copy_from_slice(&bb.white.to_le_bytes());
        buf[8..16].copy_from_slice(&bb.black.to_le_bytes());
        buf[16..24].copy_from_slice(&bb.kings.to_le_bytes());
        buf[24..28].copy_from_slice(&(bb.side as u32).to_le_bytes());
        buf[28..32].copy_from_slice(&annotation.to_le_bytes());
        buf
    }

    #[test]
    fn empty_book_never_picks_a_move() {
        let book = OpeningBook::empty();
        let parent = Rc::new(Board::from_fen("W:W28:B23").unwrap());
        let result = Rc::new(Board {
            white: (parent.white & !square_bit(28)) | square_bit(19),
            black: 0,
            kings: 0,
            side: Color::Black,
            moveinfo: 19,
            parent: Some(Rc::clone(&parent)),
        });
        let mut moves = vec![Move::new(result)];
        assert!(!book.pick_move(&mut moves));
    }

    #[test]
    fn a_very_good_move_is_always_preferred_over_other_annotations() {
        let parent = Rc::new(Board::from_fen("W:W28,32:B23").unwrap());
        let losing = Rc::new(Board {
            white: (parent.white & !square_bit(32)) | square_bit(27),
            black: parent.black,
            kings: 0,
            side: Color::Black,
            moveinfo: 27,
            parent: Some(Rc::clone(&parent)),
        });
        let preferred = Rc::new(Board {
            white: (parent.white & !square_bit(28)) | square_bit(19),
            black: parent.black,
            kings: 0,
            side: Color::Black,
            moveinfo: 19,
            parent: Some(Rc::clone(&parent)),
        });

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&record_bytes(&parent, 0));
        bytes.extend_from_slice(&record_bytes(&losing, 2));
        bytes.extend_from_slice(&record_bytes(&preferred, 3));

        let mut records: Vec<BookRecord> = bytes
            .chunks(RECORD_LEN)
            .map(BookRecord::parse)
            .collect();
        records.sort_by(|a, b| a.board().cmp(&b.board()));
        let book = OpeningBook { records };

        let mut moves = vec![Move::new(losing), Move::new(preferred)];
        assert!(book.pick_move(&mut moves));
        assert_eq!(moves[0].to_square(), 19);
    }
}
