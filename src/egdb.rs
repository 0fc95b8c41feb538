//! Endgame-database reader.
//!
//! Positions with few pieces left on the board are looked up in a set
//! of pre-computed files instead of being searched: 2- and 3-piece
//! files give an exact distance-to-win, 4-piece files add run-length
//! compression, and 5-/6-piece files only give a win/draw/loss verdict,
//! packed five positions to a byte in base 3. Every lookup first
//! normalizes the position to "white to move" by inverting the board
//! when black is on the move.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use memmap2::Mmap;

use crate::bitboard::{pop_ls1b, square_of, ROW1};
use crate::board::{Board, Color};
use crate::config::EngineOptions;
use crate::movegen::generate_moves;

/// Max. piece count covered by the exact distance-to-win databases.
pub const DTWENDPC: u32 = 4;
/// Max. piece count covered by the win/draw/loss databases.
pub const MAXENDPC: u32 = 6;

const INFIN: i32 = crate::tt::INFIN;
const MAXEXACT: i32 = crate::tt::MAXEXACT;
pub const MAX5PLY: i32 = 148;
pub const MAXPLY: i32 = 256;

/// Per-piece-class square counts used to index `end_ref`: `EF^3*mw +
/// EF^2*kw + EF*mb + kb` with `EF = 6` (0..=5 of each piece class).
const EF: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    /// Uncompressed, one byte per position, base-50 positional index.
    Small,
    /// Run-length compressed, looked up via a shared `end4.idx` offset
    /// table (`idx` is this file's slot in that table).
    Rle4 { idx_slot: u32 },
    /// Base-3 packed, 5 positions per byte, with an inline per-file
    /// block-offset header (`header_bytes` wide: 3 for 5-piece files,
    /// 4 for 6-piece).
    Wdl { header_bytes: u32 },
}

struct ManifestEntry {
    name: String,
    piece_count: u32,
    kind: FileKind,
    /// Material/advancement offset reported for a drawn position in
    /// this file's piece class, `mw + 2*kw - mb - 2*kb`.
    matofs: i32,
    mw: u32,
    kw: u32,
    mb: u32,
    kb: u32,
    /// Expected file length in bytes, per the shipped manifest.
    size: u64,
    /// Expected CRC-16/CCITT-FALSE of the file's full contents.
    crc: u16,
}

enum FileState {
    Unopened,
    Open(Mmap),
    Error,
}

struct EndgameFile {
    entry: ManifestEntry,
    state: FileState,
}

/// Tracks access counts per piece count, plus bucket 0 for errors --
/// mirrors `end_acc`.
#[derive(Default, Clone)]
pub struct AccessStats {
    pub by_piece_count: [u64; 7],
}

pub struct EndgameDb {
    dirs: Vec<PathBuf>,
    files: Vec<EndgameFile>,
    /// Indexed by `EF^3*mw + EF^2*kw + EF*mb + kb`; `None` if no file
    /// covers that composition.
    by_composition: Vec<Option<usize>>,
    combi: [[u32; 8]; 51],
    verify_crc: bool,
    pub stats: AccessStats,
}

/// Shipped file manifest: name, byte length, and expected
/// CRC-16/CCITT-FALSE, one entry per database file plus the shared
/// `end4.idx` offset table. Ported verbatim from `end_set[]`.
#[rustfmt::skip]
const END_SET: &[(&str, u64, u16)] = &[
    ("OvO.bin", 2500, 0xd2d8),
    ("XvO.bin", 2500, 0x6915),
    ("OvX.bin", 2500, 0xb1a5),
    ("XvX.bin", 2500, 0x7585),
    ("OOvO.bin", 125000, 0x9965),
    ("OOvX.bin", 125000, 0x3184),
    ("OvOO.bin", 125000, 0x13ea),
    ("OvXO.bin", 125000, 0xec9f),
    ("OvXX.bin", 125000, 0x74bd),
    ("XOvO.bin", 125000, 0xf732),
    ("XOvX.bin", 125000, 0x6cab),
    ("XvOO.bin", 125000, 0x9752),
    ("XvXO.bin", 125000, 0xa0f7),
    ("XvXX.bin", 125000, 0xf548),
    ("XXvO.bin", 125000, 0xc2ae),
    ("XXvX.bin", 125000, 0x703d),
    ("OOOvO.cpr", 347326, 0x9444),
    ("OOOvX.cpr", 185557, 0x8659),
    ("OOvOO.cpr", 431432, 0xf6fb),
    ("OOvXO.cpr", 960067, 0x6fe2),
    ("OOvXX.cpr", 648003, 0x369a),
    ("OvOOO.cpr", 280344, 0xc0ee),
    ("OvXOO.cpr", 1027656, 0x45d1),
    ("OvXXO.cpr", 1324595, 0x5b3d),
    ("OvXXX.cpr", 508845, 0x5897),
    ("XOOvO.cpr", 1369691, 0x85d6),
    ("XOOvX.cpr", 960613, 0xec0b),
    ("XOvOO.cpr", 1484517, 0x4648),
    ("XOvXO.cpr", 1530033, 0xe1e6),
    ("XOvXX.cpr", 357807, 0x11e1),
    ("XvOOO.cpr", 298268, 0xdc0d),
    ("XvXOO.cpr", 517263, 0xe205),
    ("XvXXO.cpr", 375668, 0xd23b),
    ("XvXXX.cpr", 128906, 0x5695),
    ("XXOvO.cpr", 1579352, 0xdf97),
    ("XXOvX.cpr", 1339555, 0x1584),
    ("XXvOO.cpr", 862757, 0x05d3),
    ("XXvXO.cpr", 1180204, 0x8282),
    ("XXvXX.cpr", 262388, 0xc7a1),
    ("XXXvO.cpr", 559505, 0x4d97),
    ("XXXvX.cpr", 548310, 0xb61a),
    ("end4.idx", 1831050, 0x91d7),
    ("OOOOvO.cpr", 102478, 0x886a),
    ("OOOOvX.cpr", 926123, 0x671e),
    ("OOOvOO.cpr", 1111011, 0xd4fc),
    ("OOOvXO.cpr", 1838556, 0xa2ac),
    ("OOOvXX.cpr", 1005367, 0x5ccd),
    ("OOvOOO.cpr", 943757, 0x4010),
    ("OOvXOO.cpr", 2300897, 0x68ad),
    ("OOvXXO.cpr", 2102270, 0xe398),
    ("OOvXXX.cpr", 715710, 0x54ee),
    ("OvOOOO.cpr", 384439, 0x49ce),
    ("OvXOOO.cpr", 291240, 0xdbc6),
    ("OvXXOO.cpr", 271182, 0x3d7f),
    ("OvXXXO.cpr", 140775, 0x1822),
    ("OvXXXX.cpr", 31508, 0x0353),
    ("XOOOvO.cpr", 96010, 0x2ee1),
    ("XOOOvX.cpr", 1598227, 0xbc6b),
    ("XOOvOO.cpr", 1623319, 0x4587),
    ("XOOvXO.cpr", 4438023, 0x347c),
    ("XOOvXX.cpr", 1218583, 0x1c4d),
    ("XOvOOO.cpr", 1305895, 0x956f),
    ("XOvXOO.cpr", 2087565, 0x8b9a),
    ("XOvXXO.cpr", 2173717, 0x47f1),
    ("XOvXXX.cpr", 1120920, 0x6d93),
    ("XvOOOO.cpr", 560961, 0xd125),
    ("XvXOOO.cpr", 2353517, 0xa154),
    ("XvXXOO.cpr", 1474560, 0x07a0),
    ("XvXXXO.cpr", 321272, 0xb9ed),
    ("XvXXXX.cpr", 34366, 0x626a),
    ("XXOOvO.cpr", 142178, 0x6634),
    ("XXOOvX.cpr", 1159143, 0x32fc),
    ("XXOvOO.cpr", 1252369, 0x13c6),
    ("XXOvXO.cpr", 6779380, 0x77f4),
    ("XXOvXX.cpr", 1629654, 0xaaa1),
    ("XXvOOO.cpr", 655089, 0xbdf2),
    ("XXvXOO.cpr", 1983928, 0x4ec6),
    ("XXvXXO.cpr", 964488, 0xf331),
    ("XXvXXX.cpr", 141643, 0x3365),
    ("XXXOvO.cpr", 102616, 0xe25a),
    ("XXXOvX.cpr", 420087, 0x74e3),
    ("XXXvOO.cpr", 273072, 0x3387),
    ("XXXvXO.cpr", 2707992, 0x4dee),
    ("XXXvXX.cpr", 701054, 0xe919),
    ("XXXXvO.cpr", 27937, 0xa500),
    ("XXXXvX.cpr", 64147, 0xe207),
    ("OOOOvOO.cpr", 7234339, 0xd971),
    ("OOOOvXO.cpr", 23494768, 0x3037),
    ("OOOOvXX.cpr", 10320134, 0xf6ee),
    ("OOvOOOO.cpr", 8772900, 0x7bab),
    ("OOvXOOO.cpr", 20664945, 0xeb18),
    ("OOvXXOO.cpr", 22817985, 0x6216),
    ("OOvXXXO.cpr", 14314276, 0x9a5c),
    ("OOvXXXX.cpr", 3598072, 0x6bc5),
    ("XOOOvOO.cpr", 9548262, 0x7591),
    ("XOOOvXO.cpr", 104771602, 0x6f77),
    ("XOOOvXX.cpr", 21718073, 0x221a),
    ("XOvOOOO.cpr", 14395823, 0xd92b),
    ("XOvXOOO.cpr", 84891019, 0x6aed),
    ("XOvXXOO.cpr", 160451697, 0xd0c2),
    ("XOvXXXO.cpr", 112731973, 0xdc72),
    ("XOvXXXX.cpr", 32416296, 0x8b1c),
    ("XXOOvOO.cpr", 6480534, 0xa0f5),
    ("XXOOvXO.cpr", 93929899, 0x67ac),
    ("XXOOvXX.cpr", 48279904, 0x3da7),
    ("XXvOOOO.cpr", 6855364, 0xca62),
    ("XXvXOOO.cpr", 19138755, 0x0023),
    ("XXvXXOO.cpr", 21129962, 0x4389),
    ("XXvXXXO.cpr", 16008194, 0x49da),
    ("XXvXXXX.cpr", 6468983, 0x8496),
    ("XXXOvOO.cpr", 3506241, 0xbcac),
    ("XXXOvXO.cpr", 40084503, 0x6f5b),
    ("XXXOvXX.cpr", 43690342, 0x08ed),
    ("XXXXvOO.cpr", 821062, 0x744e),
    ("XXXXvXO.cpr", 6904967, 0x0146),
    ("XXXXvXX.cpr", 12926925, 0xc5f8),
    ("OOOOOvO.cpr", 244649, 0x2f4c),
    ("OOOOOvX.cpr", 3350730, 0x9e0d),
    ("OvOOOOO.cpr", 915053, 0x6eaa),
    ("OvXOOOO.cpr", 1632688, 0x2380),
    ("OvXXOOO.cpr", 2879263, 0xbdee),
    ("OvXXXOO.cpr", 2954338, 0x09e4),
    ("OvXXXXO.cpr", 1575066, 0xc01a),
    ("OvXXXXX.cpr", 339753, 0x1a58),
    ("XOOOOvO.cpr", 1179521, 0x05a2),
    ("XOOOOvX.cpr", 4744837, 0xe5cc),
    ("XvOOOOO.cpr", 2527260, 0x6763),
    ("XvXOOOO.cpr", 5063251, 0x5f7e),
    ("XvXXOOO.cpr", 5681974, 0x926b),
    ("XvXXXOO.cpr", 4056861, 0xee75),
    ("XvXXXXO.cpr", 1847962, 0x715f),
    ("XvXXXXX.cpr", 384185, 0x9ce9),
    ("XXOOOvO.cpr", 2581906, 0x23f8),
    ("XXOOOvX.cpr", 6024692, 0x6e01),
    ("XXXOOvO.cpr", 2821796, 0xa82c),
    ("XXXOOvX.cpr", 4956211, 0x897c),
    ("XXXXOvO.cpr", 1539164, 0x94fd),
    ("XXXXOvX.cpr", 2315509, 0x1a5b),
    ("XXXXXvO.cpr", 335200, 0xc7f1),
    ("XXXXXvX.cpr", 460790, 0x7695),
    ("OOOvOOO.cpr", 12675853, 0xd510),
    ("OOOvXOO.cpr", 34899952, 0x29a0),
    ("OOOvXXO.cpr", 35060337, 0xc88b),
    ("OOOvXXX.cpr", 11722444, 0x7902),
    ("XOOvOOO.cpr", 26592055, 0xd77a),
    ("XOOvXOO.cpr", 70357335, 0x1cf5),
    ("XOOvXXO.cpr", 47770514, 0x3638),
    ("XOOvXXX.cpr", 14779414, 0x4457),
    ("XXOvOOO.cpr", 21792974, 0x1c50),
    ("XXOvXOO.cpr", 106575569, 0x0174),
    ("XXOvXXO.cpr", 57675073, 0x318e),
    ("XXOvXXX.cpr", 8600231, 0x8c4a),
    ("XXXvOOO.cpr", 4489583, 0x5384),
    ("XXXvXOO.cpr", 39089396, 0x1816),
    ("XXXvXXO.cpr", 22468300, 0x8cb4),
    ("XXXvXXX.cpr", 3300124, 0x97f5),
];

fn manifest_size_crc(name: &str) -> (u64, u16) {
    END_SET
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, size, crc)| (*size, *crc))
        .unwrap_or_else(|| panic!("{name} is not a composition the shipped manifest covers"))
}

fn build_manifest() -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    let mut rle4_slot = 0u32;
    for total in 2..=MAXENDPC {
        for mw in 0..=total {
            for kw in 0..=(total - mw) {
                for mb in 0..=(total - mw - kw) {
                    let kb = total - mw - kw - mb;
                    if mw + kw == 0 || mb + kb == 0 {
                        continue;
                    }
                    let mut name = String::new();
                    name.push_str(&"O".repeat(mw as usize));
                    name.push_str(&"X".repeat(kw as usize));
                    name.push('v');
                    name.push_str(&"O".repeat(mb as usize));
                    name.push_str(&"X".repeat(kb as usize));
                    let (kind, ext) = match total {
                        2 | 3 => (FileKind::Small, ".bin"),
                        4 => {
                            let slot = rle4_slot;
                            rle4_slot += 1;
                            (FileKind::Rle4 { idx_slot: slot }, ".cpr")
                        }
                        5 => (FileKind::Wdl { header_bytes: 3 }, ".cpr"),
                        _ => (FileKind::Wdl { header_bytes: 4 }, ".cpr"),
                    };
                    name.push_str(ext);
                    let (size, crc) = manifest_size_crc(&name);
                    entries.push(ManifestEntry {
                        name,
                        piece_count: total,
                        kind,
                        matofs: mw as i32 + 2 * kw as i32 - mb as i32 - 2 * kb as i32,
                        mw,
                        kw,
                        mb,
                        kb,
                        size,
                        crc,
                    });
                }
            }
        }
    }
    entries
}

impl EndgameDb {
    pub fn new(options: &EngineOptions) -> EndgameDb {
        let mut combi = [[0u32; 8]; 51];
        combi[0][0] = 1;
        for i in 1..=50usize {
            combi[i][0] = 1;
            for j in 1..8usize {
                combi[i][j] = combi[i - 1][j - 1] + combi[i - 1][j];
            }
        }

        let manifest = build_manifest();
        let mut by_composition = vec![None; EF * EF * EF * EF];
        let files: Vec<EndgameFile> = manifest
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let key = EF * EF * EF * entry.mw as usize + EF * EF * entry.kw as usize + EF * entry.mb as usize + entry.kb as usize;
                by_composition[key] = Some(i);
                EndgameFile { entry, state: FileState::Unopened }
            })
            .collect();

        EndgameDb {
            dirs: options.endgame_db_dirs.iter().map(PathBuf::from).collect(),
            files,
            by_composition,
            combi,
            verify_crc: options.verify_endgame_crc,
            stats: AccessStats::default(),
        }
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.dirs.iter().map(|dir| dir.join(name)).find(|p| p.exists())
    }

    fn open(&self, name: &str) -> io::Result<Mmap> {
        let path = self
            .locate(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        let file = File::open(path)?;
        unsafe { Mmap::map(&file) }
    }

    fn ensure_open(&mut self, slot: usize) -> bool {
        if matches!(self.files[slot].state, FileState::Unopened) {
            self.files[slot].state = match self.open(&self.files[slot].entry.name) {
                Ok(mmap) if mmap.len() as u64 == self.files[slot].entry.size => FileState::Open(mmap),
                Ok(_) | Err(_) => FileState::Error,
            };
        }
        matches!(self.files[slot].state, FileState::Open(_))
    }

    fn data(&self, slot: usize) -> Option<&[u8]> {
        match &self.files[slot].state {
            FileState::Open(mmap) => Some(&mmap[..]),
            _ => None,
        }
    }

    /// Converts the packed, ghost-bit board representation into a
    /// dense 0..50 bitset, always from the point of view of the side
    /// to move (inverting the board first if Black is on move).
    fn prep(&self, bb: &Board) -> [u64; 4] {
        let normal;
        let (white, black, kings) = if bb.side == Color::White {
            (bb.white, bb.black, bb.kings)
        } else {
            normal = bb.invert();
            (normal.white, normal.black, normal.kings)
        };
        [
            compact(white & !kings),
            compact(white & kings),
            compact(black & !kings),
            compact(black & kings),
        ]
    }

    fn find_file(&self, bitlist: &[u64; 4]) -> Option<usize> {
        let key = EF * EF * EF * bitlist[0].count_ones() as usize
            + EF * EF * bitlist[1].count_ones() as usize
            + EF * bitlist[2].count_ones() as usize
            + bitlist[3].count_ones() as usize;
        self.by_composition.get(key).copied().flatten()
    }

    fn index_singletype(&self, mut squares: u32, mut bits: u64) -> u32 {
        let mut result = 0u32;
        while bits != 0 {
            let n = bits.count_ones();
            let leading = bits.trailing_zeros();
            result += self.combi[squares as usize][n as usize] - self.combi[(squares - leading) as usize][n as usize];
            squares -= leading + 1;
            bits >>= leading + 1;
        }
        result
    }

    /// Exact distance-to-win lookup for 2..4 piece positions.
    pub fn dtw(&mut self, bb: &Board, ply: i32) -> Option<i32> {
        let total = (bb.white | bb.black).count_ones();
        if total < 2 || total > DTWENDPC {
            return None;
        }
        let bitlist = self.prep(bb);
        let slot = self.find_file(&bitlist)?;
        if !self.ensure_open(slot) {
            self.stats.by_piece_count[0] += 1;
            return None;
        }

        let value = match self.files[slot].entry.kind {
            FileKind::Small => {
                let mut ipos: u64 = 0;
                for class in &bitlist {
                    let mut bits = *class;
                    while bits != 0 {
                        let pos = pop_ls1b(&mut bits);
                        ipos = 50 * ipos + pos.trailing_zeros() as u64;
                    }
                }
                let data = self.data(slot)?;
                if ipos as usize >= data.len() {
                    self.stats.by_piece_count[0] += 1;
                    return None;
                }
                data[ipos as usize] as i8
            }
            FileKind::Rle4 { idx_slot } => {
                let mut ipos: u64 = 0;
                for class in &bitlist {
                    let mut bits = *class;
                    while bits != 0 {
                        let pos = pop_ls1b(&mut bits);
                        ipos = 50 * ipos + pos.trailing_zeros() as u64;
                    }
                }
                let block = ipos / 256;
                let mut ofs = (ipos % 256) as i64;

                let start = if block > 0 {
                    let idx_path = self.idx4_path();
                    let idx_data = match self.open(&idx_path) {
                        Ok(mmap) => mmap,
                        Err(_) => {
                            self.stats.by_piece_count[0] += 1;
                            return None;
                        }
                    };
                    let at = (idx_slot as usize) * 73242 + (block as usize) * 3 - 3;
                    if at + 3 > idx_data.len() {
                        self.stats.by_piece_count[0] += 1;
                        return None;
                    }
                    idx_data[at] as u64 + idx_data[at + 1] as u64 * 256 + idx_data[at + 2] as u64 * 65536
                } else {
                    0
                };

                let data = self.data(slot)?;
                let mut p = start as usize;
                let mut c: u8;
                loop {
                    if p >= data.len() {
                        self.stats.by_piece_count[0] += 1;
                        return None;
                    }
                    c = data[p];
                    p += 1;
                    if c >= 255 {
                        if p + 1 >= data.len() {
                            self.stats.by_piece_count[0] += 1;
                            return None;
                        }
                        ofs -= data[p] as i64 + 1;
                        p += 1;
                        c = END_VAL[data[p] as usize] as u8;
                        p += 1;
                    } else if c == 191 {
                        if p >= data.len() {
                            self.stats.by_piece_count[0] += 1;
                            return None;
                        }
                        ofs -= data[p] as i64 + 1;
                        p += 1;
                        c = 100;
                    } else {
                        ofs -= END_AMT[c as usize] as i64;
                        c = END_VAL[c as usize] as u8;
                    }
                    if ofs < 0 {
                        break;
                    }
                }
                c as i8
            }
            FileKind::Wdl { .. } => return None,
        };

        self.stats.by_piece_count[self.files[slot].entry.piece_count as usize] += 1;
        let i = value as i32;
        Some(if i == 100 {
            self.files[slot].entry.matofs
        } else if i > 0 {
            INFIN - i - ply
        } else {
            -INFIN - i + ply
        })
    }

    fn idx4_path(&self) -> String {
        "end4.idx".to_string()
    }

    /// Win/draw/loss lookup for 5..6 piece, non-capture positions.
    pub fn wdl(&mut self, bb: &Board) -> Option<i32> {
        let bitlist = self.prep(bb);
        let slot = self.find_file(&bitlist)?;
        if !self.ensure_open(slot) {
            self.stats.by_piece_count[0] += 1;
            return None;
        }
        let header_bytes = match self.files[slot].entry.kind {
            FileKind::Wdl { header_bytes } => header_bytes,
            _ => return None,
        };

        let mb_bits = bitlist[2];
        let mw_bits = remove_holes(bitlist[2] & !ROW1, bitlist[0]) >> (5 + (bitlist[2] & !ROW1).count_ones());
        let mb_mw = bitlist[2] | bitlist[0];
        let kb_bits = remove_holes(mb_mw, bitlist[3]) >> mb_mw.count_ones();
        let mb_mw_kb = mb_mw | bitlist[3];
        let kw_bits = remove_holes(mb_mw_kb, bitlist[1]) >> mb_mw_kb.count_ones();

        let mb_n = mb_bits.count_ones();
        let mw_n = mw_bits.count_ones();
        let kb_n = kb_bits.count_ones();
        let kw_n = kw_bits.count_ones();

        let p3 = self.combi[(50 - mb_n as usize - mw_n as usize - kb_n as usize)][kw_n as usize];
        let p2 = p3 * self.combi[50 - mb_n as usize - mw_n as usize][kb_n as usize];
        let p1 = p2 * self.combi[45][mw_n as usize];
        let ipos = self.index_singletype(45, mb_bits) * p1
            + self.index_singletype(45, mw_bits) * p2
            + self.index_singletype(50 - mb_n - mw_n, kb_bits) * p3
            + self.index_singletype(50 - mb_n - mw_n - kb_n, kw_bits);

        let data = self.data(slot)?;
        let block_header_at = (header_bytes as u64 * (ipos as u64 / 1024)) as usize;
        if block_header_at + header_bytes as usize > data.len() {
            self.stats.by_piece_count[0] += 1;
            return None;
        }
        let mut start = data[block_header_at] as usize
            + data[block_header_at + 1] as usize * 256
            + data[block_header_at + 2] as usize * 65536;
        if header_bytes > 3 {
            start += data[block_header_at + 3] as usize * 16777216;
        }

        let mut i: i64 = (ipos % 1024) as i64;
        let mut p = start;
        let mut cval: u8;
        loop {
            if p >= data.len() {
                self.stats.by_piece_count[0] += 1;
                return None;
            }
            cval = data[p];
            p += 1;
            if cval <= 242 {
                i -= 5;
            } else if cval <= 246 {
                if cval == 246 {
                    if p >= data.len() {
                        self.stats.by_piece_count[0] += 1;
                        return None;
                    }
                    i -= data[p] as i64 * 5;
                    p += 1;
                } else {
                    i -= (cval as i64 - 241) * 5;
                }
                cval = 0;
            } else if cval <= 250 {
                if cval == 250 {
                    if p >= data.len() {
                        self.stats.by_piece_count[0] += 1;
                        return None;
                    }
                    i -= data[p] as i64 * 5;
                    p += 1;
                } else {
                    i -= (cval as i64 - 245) * 5;
                }
                cval = 121;
            } else if cval <= 254 {
                if cval == 254 {
                    if p >= data.len() {
                        self.stats.by_piece_count[0] += 1;
                        return None;
                    }
                    i -= data[p] as i64 * 5;
                    p += 1;
                } else {
                    i -= (cval as i64 - 249) * 5;
                }
                cval = 242;
            } else {
                if p + 1 >= data.len() {
                    self.stats.by_piece_count[0] += 1;
                    return None;
                }
                i -= data[p] as i64 * 5;
                p += 1;
                cval = data[p];
                p += 1;
            }
            if i < 0 {
                break;
            }
        }
        const POW3: [i64; 5] = [1, 3, 9, 27, 81];
        let digit = (cval as i64 / POW3[(4 + (i + 1) % 5) as usize]) % 3;

        let pccount = self.files[slot].entry.piece_count;
        self.stats.by_piece_count[pccount as usize] += 1;
        let matofs = self.files[slot].entry.matofs;
        Some(if digit == 1 {
            matofs
        } else {
            let mut value = if pccount == 6 {
                INFIN - (MAX5PLY + MAXPLY) / 2
            } else {
                INFIN - (MAXEXACT + MAX5PLY) / 2
            };
            if digit == 2 {
                value = -value;
            }
            value += 10 * kw_n as i32 - 10 * kb_n as i32;
            let mut bits = mw_bits;
            while bits != 0 {
                let pos = pop_ls1b(&mut bits);
                value += (49 - pos.trailing_zeros() as i32) / 5;
            }
            let mut bits = mb_bits;
            while bits != 0 {
                let pos = pop_ls1b(&mut bits);
                value -= pos.trailing_zeros() as i32 / 5;
            }
            value
        })
    }

    /// Combines DTW, WDL, and a capture-following mini-search: when the
    /// side to move has a forced capture and the resulting position
    /// isn't itself covered by DTW/WDL, recurse into every capture and
    /// take the negamax.
    pub fn value(&mut self, bb: &std::rc::Rc<Board>, ply: i32) -> Option<i32> {
        let total = (bb.white | bb.black).count_ones();
        if total <= DTWENDPC {
            if let Some(v) = self.dtw(bb, ply) {
                return Some(v);
            }
        }

        let list = generate_moves(bb, true);
        if list.is_empty() {
            return Some(-INFIN + ply);
        }

        if total > DTWENDPC && total <= MAXENDPC {
            if list.npcapt == 0 {
                if let Some(v) = self.wdl(bb) {
                    return Some(v);
                }
            } else {
                let mut best = -INFIN;
                for mv in &list.moves {
                    let score = -self.value(&mv.result, ply + 1)?;
                    if score > best {
                        best = score;
                    }
                }
                return Some(best);
            }
        }
        None
    }

    /// Opens every locatable database file and checks its CRC-16/
    /// CCITT-FALSE against the shipped manifest. Skipped entirely when
    /// `verify_crc` is false. Mirrors `end.c`'s `check_enddb`: a
    /// mismatch is logged and not counted as correct.
    pub fn check_all(&mut self) -> (u32, u32) {
        if !self.verify_crc {
            return (0, 0);
        }
        let mut total = 0;
        let mut correct = 0;
        for slot in 0..self.files.len() {
            if !self.ensure_open(slot) {
                continue;
            }
            total += 1;
            if let Some(data) = self.data(slot) {
                let computed = crc16_ccitt_false(data);
                let expected = self.files[slot].entry.crc;
                if computed == expected {
                    correct += 1;
                } else {
                    log::warn!(
                        "{}: wrong crc (expected {:04x}, got {:04x})",
                        self.files[slot].entry.name,
                        expected,
                        computed
                    );
                }
            }
        }
        (correct, total)
    }
}

/// CRC-16/CCITT-FALSE: width=16 poly=0x1021 init=0xffff refin=false
/// refout=false xorout=0x0000.
fn crc16_ccitt_false(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        let x = ((crc >> 8) ^ byte as u16) ^ (((crc >> 8) ^ byte as u16) >> 4);
        crc = (crc << 8) ^ (x << 12) ^ (x << 5) ^ x;
    }
    crc
}

/// Maps a packed board bitset (ghost bits at 10/21/32/43) to a dense
/// bitset over squares 0..50, in the same relative order.
fn compact(mut bits: u64) -> u64 {
    let mut result = 0u64;
    while bits != 0 {
        let lsb = pop_ls1b(&mut bits);
        let sq = square_of(lsb);
        result |= 1u64 << (sq - 1);
    }
    result
}

/// Removes, from `bits`, the index positions already consumed by
/// `holes` (a dense bitset of previously placed piece squares),
/// shifting every bit above each hole down by one -- the "remove index
/// holes" step used to build a combinatorial index across piece
/// classes placed in a fixed order.
fn remove_holes(mut holes: u64, bits: u64) -> u64 {
    let mut result = bits;
    while holes != 0 {
        let pos = pop_ls1b(&mut holes);
        result += result & (pos - 1);
    }
    result
}

/// Decodes a 4-piece RLE byte to its result value; one row per repeat
/// tier (1x/2x/3x/4x), each row holding the same `0,1,-2,3,-4,...,-60`
/// ramp with the last two slots reserved for repeat/draw opcodes.
#[rustfmt::skip]
const END_VAL: [i8; 256] = [
    0,  1,  -2,  3,  -4,  5,  -6,  7,  -8,  9, -10, 11, -12,  13, -14,  15,
  -16, 17, -18, 19, -20, 21, -22, 23, -24, 25, -26, 27, -28,  29, -30,  31,
  -32, 33, -34, 35, -36, 37, -38, 39, -40, 41, -42, 43, -44,  45, -46,  47,
  -48, 49, -50, 51, -52, 53, -54, 55, -56, 57, -58, 59, -60, 100, 100, 100,
    0,  1,  -2,  3,  -4,  5,  -6,  7,  -8,  9, -10, 11, -12,  13, -14,  15,
  -16, 17, -18, 19, -20, 21, -22, 23, -24, 25, -26, 27, -28,  29, -30,  31,
  -32, 33, -34, 35, -36, 37, -38, 39, -40, 41, -42, 43, -44,  45, -46,  47,
  -48, 49, -50, 51, -52, 53, -54, 55, -56, 57, -58, 59, -60, 100, 100, 100,
    0,  1,  -2,  3,  -4,  5,  -6,  7,  -8,  9, -10, 11, -12,  13, -14,  15,
  -16, 17, -18, 19, -20, 21, -22, 23, -24, 25, -26, 27, -28,  29, -30,  31,
  -32, 33, -34, 35, -36, 37, -38, 39, -40, 41, -42, 43, -44,  45, -46,  47,
  -48, 49, -50, 51, -52, 53, -54, 55, -56, 57, -58, 59, -60, 100, 100,   0,
    0,  1,  -2,  3,  -4,  5,  -6,  7,  -8,  9, -10, 11, -12,  13, -14,  15,
  -16, 17, -18, 19, -20, 21, -22, 23, -24, 25, -26, 27, -28,  29, -30,  31,
  -32, 33, -34, 35, -36, 37, -38, 39, -40, 41, -42, 43, -44,  45, -46,  47,
  -48, 49, -50, 51, -52, 53, -54, 55, -56, 57, -58, 59, -60, 100, 100,   0,
];

/// Repeat count paired with each `END_VAL` entry (tiers of 1/2/3/4,
/// with the last two slots of each row carrying the extended-repeat
/// opcodes).
#[rustfmt::skip]
const END_AMT: [u8; 256] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 5, 9,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 6, 10,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 7, 0,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 8, 0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_only_lists_compositions_with_pieces_on_both_sides() {
        let manifest = build_manifest();
        assert!(manifest.iter().all(|e| e.mw + e.kw > 0 && e.mb + e.kb > 0));
        assert!(manifest.iter().any(|e| e.name == "OvO.bin"));
        assert!(manifest.iter().any(|e| e.name == "OOOOOvOO.cpr"));
    }

    #[test]
    fn compact_drops_ghost_gaps_and_preserves_order() {
        let packed = crate::bitboard::square_bit(1) | crate::bitboard::square_bit(50);
        assert_eq!(compact(packed), 1 | (1u64 << 49));
    }

    #[test]
    fn a_missing_database_directory_reports_no_value_not_a_panic() {
        let options = EngineOptions { endgame_db_dirs: vec!["/nonexistent-dir".to_string()], ..Default::default() };
        let mut db = EndgameDb::new(&options);
        let bb = Board::from_fen("W:WK26:BK1").unwrap();
        assert_eq!(db.dtw(&bb, 0), None);
    }
}
