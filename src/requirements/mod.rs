//! Structural code requirements: which symbols each file actually depends
//! on, and from where.
//!
//! A parser-side companion to the timing data. For every analyzed file the
//! exporter records, per requirement kind, the named symbols the file needs
//! (macro expansions, free function calls, inherited types, member fields,
//! and so on) with their use sites packed as (line, column) pairs. The
//! format is versioned independently of the score family and follows the
//! same decode-once, query-many shape: one dictionary keyed by file name,
//! graph-shaped lookups on top.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use log::info;

use crate::score::cursor::ByteCursor;
use crate::score::decode::read_shared;

/// Newest requirements format version this crate understands.
pub const VERSION: u32 = 2;

/// Oldest requirements format version this crate still accepts.
pub const VERSION_MIN: u32 = 1;

/// Requirement records carry the symbol's definition location starting with
/// this format version.
pub const VERSION_DEFINITION: u32 = 2;

/// The kinds of structural dependency the parser extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum RequirementType {
    MacroExpansion = 0,
    FreeFunctionCall,
    FreeVariable,
    EnumAccess,
    ForwardDeclaration,
    TypeDefinition,
    TypeInheritance,
    MemberField,
    MemberFunctionCall,
    StaticFunctionCall,
    StaticVariable,
}

impl RequirementType {
    /// Number of requirement kinds.
    pub const COUNT: usize = 11;

    const ALL: [RequirementType; Self::COUNT] = [
        RequirementType::MacroExpansion,
        RequirementType::FreeFunctionCall,
        RequirementType::FreeVariable,
        RequirementType::EnumAccess,
        RequirementType::ForwardDeclaration,
        RequirementType::TypeDefinition,
        RequirementType::TypeInheritance,
        RequirementType::MemberField,
        RequirementType::MemberFunctionCall,
        RequirementType::StaticFunctionCall,
        RequirementType::StaticVariable,
    ];

    /// All kinds in stored order.
    pub fn all() -> impl Iterator<Item = RequirementType> {
        Self::ALL.into_iter()
    }

    /// The kind's position in stored order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            RequirementType::MacroExpansion => "MacroExpansion",
            RequirementType::FreeFunctionCall => "FreeFunctionCall",
            RequirementType::FreeVariable => "FreeVariable",
            RequirementType::EnumAccess => "EnumAccess",
            RequirementType::ForwardDeclaration => "ForwardDeclaration",
            RequirementType::TypeDefinition => "TypeDefinition",
            RequirementType::TypeInheritance => "TypeInheritance",
            RequirementType::MemberField => "MemberField",
            RequirementType::MemberFunctionCall => "MemberFunctionCall",
            RequirementType::StaticFunctionCall => "StaticFunctionCall",
            RequirementType::StaticVariable => "StaticVariable",
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A source location packed as (line, column) in one 64-bit value, exactly
/// as stored on disk. Line 0 is the file-level pseudo-location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeLocation(u64);

impl CodeLocation {
    /// Packs a (line, column) pair.
    pub fn new(line: u32, column: u32) -> Self {
        CodeLocation((u64::from(line) << 32) | u64::from(column))
    }

    /// The raw packed value.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// 1-based line number.
    pub fn line(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// 1-based column number.
    pub fn column(self) -> u32 {
        self.0 as u32
    }
}

/// One required symbol within a file, with everywhere it is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementValue {
    /// Symbol name as the parser saw it.
    pub name: String,
    /// Where the symbol is defined; recorded from format version 2 on, and
    /// absent when the parser could not resolve it.
    pub definition: Option<CodeLocation>,
    /// Use sites within the requiring file.
    pub uses: Vec<CodeLocation>,
}

/// Everything one file requires, partitioned by requirement kind.
#[derive(Debug, Clone)]
pub struct FileRequirements {
    /// Analyzed file name, pre-lowercased by the exporter.
    pub name: String,
    rows: Vec<Vec<RequirementValue>>,
}

impl FileRequirements {
    /// The requirements of one kind.
    pub fn of(&self, kind: RequirementType) -> &[RequirementValue] {
        &self.rows[kind.index()]
    }

    /// Every requirement with its kind.
    pub fn all(&self) -> impl Iterator<Item = (RequirementType, &RequirementValue)> {
        RequirementType::all()
            .flat_map(move |kind| self.of(kind).iter().map(move |value| (kind, value)))
    }

    /// Total number of required symbols across all kinds.
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Whether the file requires nothing at all.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

/// The decoded requirements dictionary for one exported analysis.
#[derive(Debug, Clone, Default)]
pub struct RequirementsData {
    files: IndexMap<String, FileRequirements>,
}

impl RequirementsData {
    /// Number of analyzed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files were analyzed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Lookup by file name; first-decoded wins on duplicates.
    pub fn file(&self, name: &str) -> Option<&FileRequirements> {
        self.files.get(name)
    }

    /// All files in stored order.
    pub fn files(&self) -> impl Iterator<Item = &FileRequirements> {
        self.files.values()
    }

    /// Which files require `symbol`, and as what.
    ///
    /// This is the inverse, graph-shaped view of the dictionary: the
    /// requirements link files to symbols, this walks the links backwards.
    pub fn find(&self, symbol: &str) -> Vec<(&str, RequirementType, &RequirementValue)> {
        let mut hits = Vec::new();
        for file in self.files.values() {
            for (kind, value) in file.all() {
                if value.name == symbol {
                    hits.push((file.name.as_str(), kind, value));
                }
            }
        }
        hits
    }
}

/// Decodes the `.creq` file at `path`. `Ok(None)` when it does not exist.
pub fn load(path: &Path) -> io::Result<Option<RequirementsData>> {
    let bytes = match read_shared(path, 4, Duration::from_millis(100))? {
        Some(bytes) => bytes,
        None => {
            info!("no requirements data at {}", path.display());
            return Ok(None);
        }
    };
    decode(&bytes).map(Some)
}

fn decode(bytes: &[u8]) -> io::Result<RequirementsData> {
    let mut cursor = ByteCursor::new(bytes);
    let version = cursor.read_u32()?;
    if !(VERSION_MIN..=VERSION).contains(&version) {
        log::error!(
            "unsupported requirements version {} (supported {}..={})",
            version,
            VERSION_MIN,
            VERSION
        );
        return invalid_data_error!(
            "unsupported requirements version {} (supported {}..={})",
            version,
            VERSION_MIN,
            VERSION
        );
    }

    let file_count = cursor.read_u32()? as usize;
    let mut files = IndexMap::with_capacity(file_count);
    for _ in 0..file_count {
        let name = cursor.read_string()?;
        let mut rows = Vec::with_capacity(RequirementType::COUNT);
        for _ in 0..RequirementType::COUNT {
            let count = cursor.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(decode_value(&mut cursor, version)?);
            }
            rows.push(values);
        }
        // first insert wins, same as the score-side name indices
        files
            .entry(name.clone())
            .or_insert(FileRequirements { name, rows });
    }
    Ok(RequirementsData { files })
}

fn decode_value(cursor: &mut ByteCursor<'_>, version: u32) -> io::Result<RequirementValue> {
    let name = cursor.read_string()?;
    let definition = if version >= VERSION_DEFINITION {
        match cursor.read_u64()? {
            0 => None,
            raw => Some(CodeLocation(raw)),
        }
    } else {
        None
    };
    let use_count = cursor.read_u32()? as usize;
    let mut uses = Vec::with_capacity(use_count);
    for _ in 0..use_count {
        uses.push(CodeLocation(cursor.read_u64()?));
    }
    Ok(RequirementValue {
        name,
        definition,
        uses,
    })
}
