//! Crossbar for the KLEE symbolic-execution backend.
//!
//! KLEE sees the simulated design as raw bytes, so every item decomposes
//! into addressable 1/2/4/8-byte atoms. Wide items (over 64 bits, or array
//! elements of 8 bytes and more) split into 4-byte words with `_0 .. _k-1`
//! name suffixes; reading them back means concatenating the words LSB-first.

use rtlcross_smt::{Term, TypedTerm};

use crate::crossbar::verilator::VerilatorNaming;
use crate::crossbar::VerilatorCppCrossbar;
use crate::error::IrError;
use crate::item::ModuleItem;
use crate::view::{HierarchicalPath, ModelTreeView};

/// One addressable chunk of an item in KLEE's byte layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomVariable {
    /// The symbolic object's name.
    pub name: String,
    /// Byte offset inside the state block.
    pub offset: usize,
    /// Chunk size in bytes.
    pub bytes: usize,
}

/// An accessor reassembling one logical item from its atom functions.
#[derive(Debug, Clone)]
pub struct KleeAccessor {
    /// Accessor function names with widths, LSB first.
    words: Vec<(String, u32)>,
}

impl KleeAccessor {
    /// Applies the accessor to a state term. Multiple words concatenate
    /// MSB-down, restoring the original bit order.
    #[must_use]
    pub fn at_state(&self, state: &Term) -> TypedTerm {
        let width = self.words.iter().map(|(_, w)| w).sum();
        let applied: Vec<Term> = self
            .words
            .iter()
            .rev()
            .map(|(name, _)| Term::app(name.clone(), vec![state.clone()]))
            .collect();
        TypedTerm::new(Term::concat(applied), width)
    }
}

/// Accessor function name for one atom.
#[must_use]
pub fn accessor_name(prefix: &str, atom: &str) -> String {
    format!("{prefix}__{atom}")
}

/// Maps item paths onto KLEE's atom-variable layout.
#[derive(Debug, Clone)]
pub struct KleeSmtCrossbar {
    paths: Vec<HierarchicalPath>,
}

impl KleeSmtCrossbar {
    /// A crossbar over the given model paths.
    #[must_use]
    pub fn from_model(paths: Vec<HierarchicalPath>) -> Self {
        Self { paths }
    }

    /// Parses a KLEE atom name back into the matching model paths. Atom
    /// names are Verilator-mangled, with word/element suffixes (`_k`)
    /// collapsing onto their logical item.
    #[must_use]
    pub fn from_data(name: &str, model: &ModelTreeView) -> Self {
        let paths = VerilatorCppCrossbar::from_data(name, model)
            .to_model()
            .to_vec();
        if !paths.is_empty() {
            return Self { paths };
        }
        match name.rfind('_') {
            Some(pos)
                if pos + 1 < name.len()
                    && name[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                Self {
                    paths: VerilatorCppCrossbar::from_data(&name[..pos], model)
                        .to_model()
                        .to_vec(),
                }
            }
            _ => Self { paths },
        }
    }

    /// The underlying paths.
    #[must_use]
    pub fn to_model(&self) -> &[HierarchicalPath] {
        &self.paths
    }

    fn atoms_of(var_name: &str, item: &ModuleItem) -> Result<Vec<AtomVariable>, IrError> {
        let layout = item.layout().ok_or_else(|| IrError::MissingLayout {
            item: item.name().to_owned(),
        })?;

        let mut atoms = Vec::new();
        match item {
            ModuleItem::Compound(array) => {
                let element_bytes = layout.bytes / array.capacity().max(1);
                for element_index in 0..array.capacity() {
                    let element_offset = layout.offset + element_index * element_bytes;
                    if element_bytes < 8 {
                        atoms.push(AtomVariable {
                            name: format!("{var_name}_{element_index}"),
                            offset: element_offset,
                            bytes: element_bytes,
                        });
                    } else {
                        // Wide elements split into 4-byte words, numbered
                        // consecutively across the whole array.
                        let words = element_bytes / 4;
                        for word in 0..words {
                            atoms.push(AtomVariable {
                                name: format!("{var_name}_{}", element_index * words + word),
                                offset: element_offset + word * 4,
                                bytes: 4,
                            });
                        }
                    }
                }
            }
            ModuleItem::Primitive(p) if p.is_wide() => {
                for word in 0..layout.bytes / 4 {
                    atoms.push(AtomVariable {
                        name: format!("{var_name}_{word}"),
                        offset: layout.offset + word * 4,
                        bytes: 4,
                    });
                }
            }
            ModuleItem::Primitive(_) => {
                atoms.push(AtomVariable {
                    name: var_name.to_owned(),
                    offset: layout.offset,
                    bytes: layout.bytes,
                });
            }
        }
        Ok(atoms)
    }

    /// The atom variables of every path, in path order.
    pub fn to_data_split(&self, model: &ModelTreeView) -> Result<Vec<AtomVariable>, IrError> {
        let mut result = Vec::new();
        for path in &self.paths {
            let (var_name, item) = VerilatorNaming::find(path, model)?;
            result.extend(Self::atoms_of(&var_name, item)?);
        }
        Ok(result)
    }

    /// Accessors reassembling the logical items, one accessor per item (array
    /// elements count as separate items).
    pub fn to_data(
        &self,
        model: &ModelTreeView,
        prefix: &str,
    ) -> Result<Vec<KleeAccessor>, IrError> {
        let mut result = Vec::new();
        for path in &self.paths {
            let (var_name, item) = VerilatorNaming::find(path, model)?;
            let atoms = Self::atoms_of(&var_name, item)?;
            let functions: Vec<(String, u32)> = atoms
                .iter()
                .map(|atom| (accessor_name(prefix, &atom.name), (atom.bytes as u32) << 3))
                .collect();

            let per_item = match item {
                ModuleItem::Compound(array) if functions.len() > array.capacity() => {
                    // Wide-element array: group the consecutive words of
                    // each element back into one accessor.
                    functions.len() / array.capacity().max(1)
                }
                ModuleItem::Primitive(_) if functions.len() > 1 => functions.len(),
                _ => 1,
            };

            for group in functions.chunks(per_item) {
                result.push(KleeAccessor {
                    words: group.to_vec(),
                });
            }
        }
        Ok(result)
    }
}
