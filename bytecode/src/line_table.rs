//! Delta-encoded VLQ line table: maps bytecode offsets to source lines.
//!
//! Each entry is 2 VLQ values:
//! - `delta_pc` (unsigned VLQ)
//! - `delta_line` (signed, zigzag + VLQ)
//!
//! Entries are recorded at line markers, so the offset stored for a line is
//! the offset of its first marker.

/// Accumulates line entries during code generation.
#[derive(Debug, Default)]
pub struct LineTableBuilder {
    entries: Vec<(u32, u32)>, // (pc, line)
}

impl LineTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the marker for `line` sits at `pc`. Offsets must be
    /// added in increasing order.
    pub fn add(&mut self, pc: u32, line: u32) {
        debug_assert!(self.entries.last().is_none_or(|&(p, _)| p <= pc));
        self.entries.push((pc, line));
    }

    pub fn finish(self) -> LineTable {
        let mut buf = Vec::new();
        let mut prev_pc: u32 = 0;
        let mut prev_line: i64 = 0;

        for &(pc, line) in &self.entries {
            encode_unsigned_vlq(pc - prev_pc, &mut buf);
            encode_unsigned_vlq(zigzag_encode(line as i64 - prev_line), &mut buf);
            prev_pc = pc;
            prev_line = line as i64;
        }

        LineTable {
            encoded: buf.into_boxed_slice(),
        }
    }
}

/// Immutable, compact `pc -> line` mapping of one compiled unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    encoded: Box<[u8]>,
}

impl LineTable {
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    pub fn entries(&self) -> LineEntries<'_> {
        LineEntries {
            encoded: &self.encoded,
            pos: 0,
            pc: 0,
            line: 0,
        }
    }

    /// Source line of the last marker at or before `pc`.
    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        let mut best = None;
        for (at, line) in self.entries() {
            if at > pc {
                break;
            }
            best = Some(line);
        }
        best
    }

    /// Offset of the first marker for `line`.
    pub fn offset_for_line(&self, line: u32) -> Option<usize> {
        self.entries().find(|&(_, l)| l == line).map(|(pc, _)| pc)
    }

    /// Every line carrying a marker, ascending and without repeats.
    pub fn lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.entries().map(|(_, l)| l).collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }
}

/// Iterator over decoded `(pc, line)` entries.
pub struct LineEntries<'a> {
    encoded: &'a [u8],
    pos: usize,
    pc: u32,
    line: i64,
}

impl Iterator for LineEntries<'_> {
    type Item = (usize, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.encoded.len() {
            return None;
        }
        let delta_pc = decode_unsigned_vlq(self.encoded, &mut self.pos)?;
        let delta_line =
            zigzag_decode(decode_unsigned_vlq(self.encoded, &mut self.pos)?);
        self.pc += delta_pc;
        self.line += delta_line;
        Some((self.pc as usize, self.line as u32))
    }
}

// ── VLQ helpers ─────────────────────────────────────────────────────

fn encode_unsigned_vlq(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_unsigned_vlq(encoded: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *encoded.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 35 {
            return None; // overflow
        }
    }
}

fn zigzag_encode(value: i64) -> u32 {
    ((value << 1) ^ (value >> 63)) as u32
}

fn zigzag_decode(value: u32) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table() {
        let table = LineTableBuilder::new().finish();
        assert!(table.is_empty());
        assert_eq!(table.line_for_pc(0), None);
        assert_eq!(table.offset_for_line(1), None);
        assert!(table.lines().is_empty());
    }

    #[test]
    fn lookups_by_pc_and_line() {
        let mut builder = LineTableBuilder::new();
        builder.add(0, 1);
        builder.add(12, 2);
        builder.add(30, 4);
        builder.add(41, 2);
        let table = builder.finish();

        assert_eq!(table.line_for_pc(0), Some(1));
        assert_eq!(table.line_for_pc(11), Some(1));
        assert_eq!(table.line_for_pc(12), Some(2));
        assert_eq!(table.line_for_pc(35), Some(4));
        assert_eq!(table.line_for_pc(1000), Some(2));

        assert_eq!(table.offset_for_line(2), Some(12));
        assert_eq!(table.offset_for_line(4), Some(30));
        assert_eq!(table.offset_for_line(3), None);
        assert_eq!(table.lines(), vec![1, 2, 4]);
    }

    #[test]
    fn backward_line_deltas_survive_encoding() {
        let mut builder = LineTableBuilder::new();
        builder.add(0, 500);
        builder.add(5, 3);
        builder.add(9, 70_000);
        let table = builder.finish();
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries, vec![(0, 500), (5, 3), (9, 70_000)]);
    }

    #[test]
    fn typical_size() {
        let mut builder = LineTableBuilder::new();
        for i in 0..100u32 {
            builder.add(i * 7, i + 1);
        }
        assert!(builder.finish().encoded_len() < 250);
    }
}
