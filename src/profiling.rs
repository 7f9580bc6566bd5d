//! Read-only view of the lower tiers' profiling data
//!
//! The counters behind these answers are updated concurrently by other
//! tiers. The phase never reads them directly: callers take a
//! [`ProfileSnapshot`] under whatever locking the runtime uses and hand the
//! phase an immutable oracle for the whole run.

use crate::ir::{ArrayMode, CodeOrigin, IndexingShape};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Identifier of a heap structure (hidden class)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(pub u32);

/// Identifier of a heap cell the compiler holds weakly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u32);

/// Reasons a previous compilation exited to the baseline tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitKind {
    OutOfBounds,
    NotStringObject,
}

/// Native implementation a builtin function is known to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    None,
    StringPrototypeValueOf,
}

/// What a property lookup on a prototype structure finds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrototypeMethod {
    Missing,
    /// Present, but the structure does not pin a specific value
    Unspecified,
    NotAFunction,
    Function(Intrinsic),
}

impl PrototypeMethod {
    /// The unmodified `String.prototype.valueOf`/`toString` builtin
    pub fn is_string_value_of(self) -> bool {
        self == PrototypeMethod::Function(Intrinsic::StringPrototypeValueOf)
    }
}

/// State of `String.prototype` as seen by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringPrototypeSnapshot {
    pub transition_watchpoint_valid: bool,
    pub is_dictionary: bool,
    pub value_of: PrototypeMethod,
    pub to_string: PrototypeMethod,
}

impl Default for StringPrototypeSnapshot {
    fn default() -> Self {
        Self {
            transition_watchpoint_valid: true,
            is_dictionary: false,
            value_of: PrototypeMethod::Function(Intrinsic::StringPrototypeValueOf),
            to_string: PrototypeMethod::Function(Intrinsic::StringPrototypeValueOf),
        }
    }
}

impl StringPrototypeSnapshot {
    /// A prototype whose methods were replaced by user code
    pub fn modified() -> Self {
        Self {
            to_string: PrototypeMethod::Function(Intrinsic::None),
            ..Self::default()
        }
    }
}

/// Queries the fixup phase makes about profiling and the global object
pub trait ProfilingOracle {
    /// Whether an earlier compilation exited at `origin` for `kind`
    fn has_exit_site(&self, origin: CodeOrigin, kind: ExitKind) -> bool;

    fn string_prototype(&self, origin: CodeOrigin) -> StringPrototypeSnapshot;

    /// Holes in original arrays read through an unmodified prototype chain
    fn array_prototype_chain_is_sane(&self, origin: CodeOrigin) -> bool;

    fn is_strict_mode(&self, origin: CodeOrigin) -> bool;

    /// Array mode observed by the array profile at `origin`
    fn array_profile(&self, origin: CodeOrigin) -> Option<ArrayMode>;

    /// The global object's original array structure with the given shape
    fn original_array_structure(
        &self,
        origin: CodeOrigin,
        shape: IndexingShape,
    ) -> Option<StructureId>;

    /// The global `this` object for code at `origin`
    fn global_this_object(&self, origin: CodeOrigin) -> CellId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ExitSite {
    origin: CodeOrigin,
    kind: ExitKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayProfileEntry {
    origin: CodeOrigin,
    mode: ArrayMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StructureEntry {
    shape: IndexingShape,
    structure: StructureId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SnapshotRepr {
    exit_sites: Vec<ExitSite>,
    string_prototype: StringPrototypeSnapshot,
    array_prototype_chain_sane: Option<bool>,
    strict_mode: bool,
    array_profiles: Vec<ArrayProfileEntry>,
    original_array_structures: Vec<StructureEntry>,
    global_this: CellId,
}

/// Immutable profiling snapshot taken before the phase runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct ProfileSnapshot {
    exit_sites: FxHashSet<(CodeOrigin, ExitKind)>,
    string_prototype: StringPrototypeSnapshot,
    array_prototype_chain_sane: bool,
    strict_mode: bool,
    array_profiles: FxHashMap<CodeOrigin, ArrayMode>,
    original_array_structures: FxHashMap<IndexingShape, StructureId>,
    global_this: CellId,
}

impl Default for ProfileSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileSnapshot {
    pub fn new() -> Self {
        Self {
            exit_sites: FxHashSet::default(),
            string_prototype: StringPrototypeSnapshot::default(),
            array_prototype_chain_sane: true,
            strict_mode: false,
            array_profiles: FxHashMap::default(),
            original_array_structures: FxHashMap::default(),
            global_this: CellId::default(),
        }
    }

    pub fn with_exit_site(mut self, origin: CodeOrigin, kind: ExitKind) -> Self {
        self.exit_sites.insert((origin, kind));
        self
    }

    pub fn with_string_prototype(mut self, snapshot: StringPrototypeSnapshot) -> Self {
        self.string_prototype = snapshot;
        self
    }

    pub fn with_array_prototype_chain_sane(mut self, sane: bool) -> Self {
        self.array_prototype_chain_sane = sane;
        self
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_array_profile(mut self, origin: CodeOrigin, mode: ArrayMode) -> Self {
        self.array_profiles.insert(origin, mode);
        self
    }

    pub fn with_original_array_structure(
        mut self,
        shape: IndexingShape,
        structure: StructureId,
    ) -> Self {
        self.original_array_structures.insert(shape, structure);
        self
    }

    pub fn with_global_this(mut self, cell: CellId) -> Self {
        self.global_this = cell;
        self
    }
}

impl ProfilingOracle for ProfileSnapshot {
    fn has_exit_site(&self, origin: CodeOrigin, kind: ExitKind) -> bool {
        self.exit_sites.contains(&(origin, kind))
    }

    fn string_prototype(&self, _origin: CodeOrigin) -> StringPrototypeSnapshot {
        self.string_prototype
    }

    fn array_prototype_chain_is_sane(&self, _origin: CodeOrigin) -> bool {
        self.array_prototype_chain_sane
    }

    fn is_strict_mode(&self, _origin: CodeOrigin) -> bool {
        self.strict_mode
    }

    fn array_profile(&self, origin: CodeOrigin) -> Option<ArrayMode> {
        self.array_profiles.get(&origin).copied()
    }

    fn original_array_structure(
        &self,
        _origin: CodeOrigin,
        shape: IndexingShape,
    ) -> Option<StructureId> {
        self.original_array_structures.get(&shape).copied()
    }

    fn global_this_object(&self, _origin: CodeOrigin) -> CellId {
        self.global_this
    }
}

impl From<SnapshotRepr> for ProfileSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        Self {
            exit_sites: repr
                .exit_sites
                .into_iter()
                .map(|site| (site.origin, site.kind))
                .collect(),
            string_prototype: repr.string_prototype,
            array_prototype_chain_sane: repr.array_prototype_chain_sane.unwrap_or(true),
            strict_mode: repr.strict_mode,
            array_profiles: repr
                .array_profiles
                .into_iter()
                .map(|entry| (entry.origin, entry.mode))
                .collect(),
            original_array_structures: repr
                .original_array_structures
                .into_iter()
                .map(|entry| (entry.shape, entry.structure))
                .collect(),
            global_this: repr.global_this,
        }
    }
}

impl From<ProfileSnapshot> for SnapshotRepr {
    fn from(snapshot: ProfileSnapshot) -> Self {
        let mut exit_sites: Vec<ExitSite> = snapshot
            .exit_sites
            .into_iter()
            .map(|(origin, kind)| ExitSite { origin, kind })
            .collect();
        exit_sites.sort_by_key(|site| (site.origin.inline_depth, site.origin.bytecode_index));

        let mut array_profiles: Vec<ArrayProfileEntry> = snapshot
            .array_profiles
            .into_iter()
            .map(|(origin, mode)| ArrayProfileEntry { origin, mode })
            .collect();
        array_profiles
            .sort_by_key(|entry| (entry.origin.inline_depth, entry.origin.bytecode_index));

        let mut original_array_structures: Vec<StructureEntry> = snapshot
            .original_array_structures
            .into_iter()
            .map(|(shape, structure)| StructureEntry { shape, structure })
            .collect();
        original_array_structures.sort_by_key(|entry| entry.structure.0);

        Self {
            exit_sites,
            string_prototype: snapshot.string_prototype,
            array_prototype_chain_sane: Some(snapshot.array_prototype_chain_sane),
            strict_mode: snapshot.strict_mode,
            array_profiles,
            original_array_structures,
            global_this: snapshot.global_this,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ArrayType;

    #[test]
    fn test_default_snapshot_is_sane() {
        let snapshot = ProfileSnapshot::new();
        let origin = CodeOrigin::new(0);
        let proto = snapshot.string_prototype(origin);
        assert!(proto.transition_watchpoint_valid);
        assert!(proto.value_of.is_string_value_of());
        assert!(snapshot.array_prototype_chain_is_sane(origin));
        assert!(!snapshot.has_exit_site(origin, ExitKind::OutOfBounds));
    }

    #[test]
    fn test_json_round_trip_keeps_tables() {
        let origin = CodeOrigin::new(7);
        let snapshot = ProfileSnapshot::new()
            .with_exit_site(origin, ExitKind::NotStringObject)
            .with_array_profile(origin, ArrayMode::new(ArrayType::Double))
            .with_original_array_structure(IndexingShape::Int32, StructureId(12));

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: ProfileSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(decoded.has_exit_site(origin, ExitKind::NotStringObject));
        assert_eq!(
            decoded.original_array_structure(origin, IndexingShape::Int32),
            Some(StructureId(12))
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let decoded: ProfileSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(decoded, ProfileSnapshot::new());
    }
}
