//! Branch targets and deferred offset patching.
//!
//! Code generation emits a branch before it knows where the branch goes.
//! The branch operand is written as a placeholder and the operand's byte
//! offset (the *fixup site*) is recorded against a [`Label`]. Once every
//! label has been fixed to a program counter, [`LabelTable::resolve_all`]
//! writes the real relative offsets into the instruction stream.
//!
//! A patched offset is `target_pc - (site - 1)`, i.e. it is relative to the
//! one-byte branch opcode that precedes the operand.
use thiserror::Error;

/// Opaque handle to a branch target, valid for one [`LabelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Generator bugs detected while fixing or resolving labels. None of these
/// is recoverable: compilation of the enclosing unit must stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("label {label} fixed twice (at {first} and {second})")]
    AlreadyFixed {
        label: Label,
        first: usize,
        second: usize,
    },
    #[error("label {label} referenced at {site} was never fixed")]
    Unresolved { label: Label, site: usize },
    #[error("branch at {site} to {target} exceeds the 16-bit offset range")]
    OffsetOverflow { site: usize, target: usize },
    #[error("fixup site {site} lies outside the {len}-byte stream")]
    SiteOutOfBounds { site: usize, len: usize },
    #[error("unknown label {0}")]
    Unknown(Label),
}

/// Dense table of labels for one unit under construction.
#[derive(Debug, Default)]
pub struct LabelTable {
    /// Resolved program counter per label, `None` until fixed.
    pcs: Vec<Option<usize>>,
    /// Pending `(label, site)` pairs.
    fixups: Vec<(Label, usize)>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, unresolved label.
    pub fn acquire(&mut self) -> Label {
        let label = Label(self.pcs.len() as u32);
        self.pcs.push(None);
        label
    }

    /// Resolve `label` to `pc`. Each label may be fixed exactly once.
    pub fn fix(&mut self, label: Label, pc: usize) -> Result<(), LabelError> {
        let slot = self
            .pcs
            .get_mut(label.index())
            .ok_or(LabelError::Unknown(label))?;
        if let Some(first) = *slot {
            return Err(LabelError::AlreadyFixed {
                label,
                first,
                second: pc,
            });
        }
        *slot = Some(pc);
        Ok(())
    }

    /// The program counter `label` was fixed to, if any.
    pub fn pc(&self, label: Label) -> Option<usize> {
        self.pcs.get(label.index()).copied().flatten()
    }

    /// Record that the `i16` operand at `site` must receive the offset of
    /// `label`.
    pub fn add_fixup(&mut self, label: Label, site: usize) {
        self.fixups.push((label, site));
    }

    pub fn pending_fixups(&self) -> usize {
        self.fixups.len()
    }

    pub fn len(&self) -> usize {
        self.pcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }

    /// Patch every pending fixup into `code`. The stream length is never
    /// changed; only the two operand bytes at each site are rewritten.
    pub fn resolve_all(&mut self, code: &mut [u8]) -> Result<(), LabelError> {
        for &(label, site) in &self.fixups {
            let target = self
                .pcs
                .get(label.index())
                .ok_or(LabelError::Unknown(label))?
                .ok_or(LabelError::Unresolved { label, site })?;
            if site == 0 || site + 2 > code.len() {
                return Err(LabelError::SiteOutOfBounds {
                    site,
                    len: code.len(),
                });
            }
            let delta = target as isize - (site as isize - 1);
            let offset = i16::try_from(delta)
                .map_err(|_| LabelError::OffsetOverflow { site, target })?;
            code[site..site + 2].copy_from_slice(&offset.to_le_bytes());
        }
        log::trace!(
            "resolved {} fixups over {} labels",
            self.fixups.len(),
            self.pcs.len()
        );
        self.fixups.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_i16(code: &[u8], site: usize) -> i16 {
        i16::from_le_bytes([code[site], code[site + 1]])
    }

    #[test]
    fn forward_and_backward_fixups() {
        let mut table = LabelTable::new();
        let mut code = vec![0u8; 32];
        let back = table.acquire();
        let fwd = table.acquire();
        table.fix(back, 2).unwrap();
        table.add_fixup(back, 11);
        table.add_fixup(fwd, 5);
        table.fix(fwd, 20).unwrap();
        table.resolve_all(&mut code).unwrap();

        assert_eq!(read_i16(&code, 5), 20 - 4);
        assert_eq!(read_i16(&code, 11), 2 - 10);
        assert_eq!(code.len(), 32);
        assert_eq!(table.pending_fixups(), 0);
    }

    #[test]
    fn many_fixups_share_one_label() {
        let mut table = LabelTable::new();
        let mut code = vec![0u8; 64];
        let exit = table.acquire();
        for site in [1, 9, 17, 25] {
            table.add_fixup(exit, site);
        }
        table.fix(exit, 40).unwrap();
        table.resolve_all(&mut code).unwrap();
        for site in [1, 9, 17, 25] {
            assert_eq!(read_i16(&code, site) as isize, 40 - (site as isize - 1));
        }
    }

    #[test]
    fn pseudo_random_sequences_patch_exactly() {
        // Small LCG so the sequence is reproducible.
        let mut seed = 0x2545_f491_u64;
        let mut next = move |bound: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as usize) % bound
        };

        for _ in 0..50 {
            let len = 200 + next(800);
            let mut code: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let before = code.clone();
            let mut table = LabelTable::new();
            let labels: Vec<Label> =
                (0..1 + next(10)).map(|_| table.acquire()).collect();
            let targets: Vec<usize> =
                labels.iter().map(|_| next(len)).collect();

            let mut sites = Vec::new();
            for _ in 0..next(20) {
                let label = labels[next(labels.len())];
                // Sites never overlap: one every four bytes.
                let site = 1 + 4 * next((len - 3) / 4);
                if sites.iter().any(|&(_, s)| s == site) {
                    continue;
                }
                table.add_fixup(label, site);
                sites.push((label, site));
            }
            for (label, target) in labels.iter().zip(&targets) {
                table.fix(*label, *target).unwrap();
            }
            table.resolve_all(&mut code).unwrap();

            assert_eq!(code.len(), before.len());
            for (label, site) in &sites {
                let target = targets[label.index()] as isize;
                assert_eq!(
                    read_i16(&code, *site) as isize,
                    target - (*site as isize - 1)
                );
            }
            for (i, (a, b)) in code.iter().zip(&before).enumerate() {
                let patched =
                    sites.iter().any(|&(_, s)| i == s || i == s + 1);
                if !patched {
                    assert_eq!(a, b, "byte {i} changed without a fixup");
                }
            }
        }
    }

    #[test]
    fn fixing_twice_is_fatal() {
        let mut table = LabelTable::new();
        let l = table.acquire();
        table.fix(l, 3).unwrap();
        assert_eq!(
            table.fix(l, 7),
            Err(LabelError::AlreadyFixed {
                label: l,
                first: 3,
                second: 7
            })
        );
    }

    #[test]
    fn unresolved_label_is_fatal() {
        let mut table = LabelTable::new();
        let l = table.acquire();
        table.add_fixup(l, 1);
        let mut code = vec![0u8; 4];
        assert_eq!(
            table.resolve_all(&mut code),
            Err(LabelError::Unresolved { label: l, site: 1 })
        );
    }

    #[test]
    fn out_of_range_offset_is_fatal() {
        let mut table = LabelTable::new();
        let l = table.acquire();
        table.add_fixup(l, 1);
        table.fix(l, 40_000).unwrap();
        let mut code = vec![0u8; 4];
        assert!(matches!(
            table.resolve_all(&mut code),
            Err(LabelError::OffsetOverflow { .. })
        ));
    }
}
