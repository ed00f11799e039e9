// SPDX-License-Identifier: Apache-2.0

//! Branch/store dependency facts produced offline by the static analysis,
//! plus the small program model the searcher needs to reason about where
//! stores live.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::depsched_error::DepschedError;
use crate::state::{BlockId, BranchId, FunctionId, InstLocation, StoreId};

/// Comparison a branch predicate performs against its constant.
///
/// Signed and unsigned spellings share one variant: observed store values
/// are recorded as signed 32-bit integers and compared as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Unknown(String),
}

impl CmpOp {
    /// Returns `None` for an unrecognized operator.
    pub fn eval(&self, lhs: i32, rhs: i32) -> Option<bool> {
        match self {
            CmpOp::Eq => Some(lhs == rhs),
            CmpOp::Ne => Some(lhs != rhs),
            CmpOp::Gt => Some(lhs > rhs),
            CmpOp::Lt => Some(lhs < rhs),
            CmpOp::Ge => Some(lhs >= rhs),
            CmpOp::Le => Some(lhs <= rhs),
            CmpOp::Unknown(_) => None,
        }
    }
}

impl From<String> for CmpOp {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => CmpOp::Eq,
            "ne" => CmpOp::Ne,
            "gt" | "sgt" | "ugt" => CmpOp::Gt,
            "lt" | "slt" | "ult" => CmpOp::Lt,
            "ge" | "sge" | "uge" => CmpOp::Ge,
            "le" | "sle" | "ule" => CmpOp::Le,
            _ => CmpOp::Unknown(s),
        }
    }
}

impl From<CmpOp> for String {
    fn from(op: CmpOp) -> Self {
        op.to_string()
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => write!(f, "eq"),
            CmpOp::Ne => write!(f, "ne"),
            CmpOp::Gt => write!(f, "gt"),
            CmpOp::Lt => write!(f, "lt"),
            CmpOp::Ge => write!(f, "ge"),
            CmpOp::Le => write!(f, "le"),
            CmpOp::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Bitwise adjustment applied to an observed value before comparing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitAdjust {
    And(i32),
    Or(i32),
}

impl BitAdjust {
    pub fn apply(&self, value: i32) -> i32 {
        match *self {
            BitAdjust::And(mask) => value & mask,
            BitAdjust::Or(mask) => value | mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Equality/range style `value <op> constant`.
    Binary {
        op: CmpOp,
        constant: i32,
        #[serde(default)]
        adjust: Option<BitAdjust>,
    },
    /// Switch-like predicate; `uncovered` holds the case values no explored
    /// state has taken yet.
    MultiWay { uncovered: BTreeSet<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDependency {
    pub stores: BTreeSet<StoreId>,
    pub predicate: Predicate,
}

/// Where the value an interest variable depends on comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Global,
    Local,
    StructChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestVar {
    pub kind: VarKind,
    pub stores: Vec<StoreId>,
}

/// Per-branch annotation attached to the program by the static analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchAnnotation {
    pub bid: BranchId,
    pub vars: Vec<InterestVar>,
}

/// Dependency facts keyed by branch id, with the derived per-store index of
/// branches each store can still affect.
#[derive(Debug, Clone, Default)]
pub struct DependencyTable {
    branches: BTreeMap<BranchId, BranchDependency>,
    store_to_branches: BTreeMap<StoreId, BTreeSet<BranchId>>,
}

impl DependencyTable {
    pub fn new(branches: BTreeMap<BranchId, BranchDependency>) -> Self {
        let mut table = DependencyTable {
            branches,
            store_to_branches: BTreeMap::new(),
        };
        table.reindex();
        table
    }

    /// Builds a table from annotations alone. Branches named here without
    /// predicate facts get an unknown operator, so no value past the first
    /// one observed is ever classified as helpful for them.
    pub fn from_annotations(
        annotations: &[BranchAnnotation],
        mut predicates: BTreeMap<BranchId, Predicate>,
    ) -> Self {
        let mut branches = BTreeMap::new();
        for a in annotations {
            let stores: BTreeSet<StoreId> = a
                .vars
                .iter()
                .flat_map(|v| v.stores.iter().copied())
                .collect();
            let predicate = predicates.remove(&a.bid).unwrap_or(Predicate::Binary {
                op: CmpOp::Unknown("unannotated".to_string()),
                constant: 0,
                adjust: None,
            });
            branches.insert(a.bid, BranchDependency { stores, predicate });
        }
        Self::new(branches)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DepschedError> {
        let branches: BTreeMap<BranchId, BranchDependency> = serde_json::from_str(text)?;
        Ok(Self::new(branches))
    }

    fn reindex(&mut self) {
        self.store_to_branches.clear();
        for (bid, dep) in self.branches.iter() {
            for sid in dep.stores.iter() {
                self.store_to_branches.entry(*sid).or_default().insert(*bid);
            }
        }
    }

    pub fn get(&self, bid: BranchId) -> Option<&BranchDependency> {
        self.branches.get(&bid)
    }

    pub fn insert(&mut self, bid: BranchId, dep: BranchDependency) {
        for sid in dep.stores.iter() {
            self.store_to_branches.entry(*sid).or_default().insert(bid);
        }
        self.branches.insert(bid, dep);
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branches `sid` can still affect; empty once all of them are fully
    /// covered.
    pub fn branches_affected_by(&self, sid: StoreId) -> impl Iterator<Item = BranchId> + '_ {
        self.store_to_branches
            .get(&sid)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn store_is_relevant(&self, sid: StoreId) -> bool {
        self.store_to_branches
            .get(&sid)
            .is_some_and(|s| !s.is_empty())
    }

    /// Forgets that `sid` can affect `bid`. Returns `true` when `sid` no
    /// longer affects any open branch.
    pub fn retire_branch_for_store(&mut self, sid: StoreId, bid: BranchId) -> bool {
        match self.store_to_branches.get_mut(&sid) {
            Some(branches) => {
                branches.remove(&bid);
                branches.is_empty()
            }
            None => true,
        }
    }
}

/// Locations of the tracked instructions and, per function, the stores that
/// are still worth reaching.
#[derive(Debug, Clone, Default)]
pub struct ProgramModel {
    store_locations: BTreeMap<StoreId, InstLocation>,
    func_stores: BTreeMap<FunctionId, BTreeSet<StoreId>>,
}

impl ProgramModel {
    pub fn new(store_locations: BTreeMap<StoreId, InstLocation>) -> Self {
        let mut func_stores: BTreeMap<FunctionId, BTreeSet<StoreId>> = BTreeMap::new();
        for (sid, loc) in store_locations.iter() {
            func_stores.entry(loc.function).or_default().insert(*sid);
        }
        ProgramModel {
            store_locations,
            func_stores,
        }
    }

    pub fn store_location(&self, sid: StoreId) -> Option<InstLocation> {
        self.store_locations.get(&sid).copied()
    }

    pub fn candidate_stores(&self, function: FunctionId) -> impl Iterator<Item = StoreId> + '_ {
        self.func_stores
            .get(&function)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Drops `sid` from its function's candidate set.
    pub fn remove_candidate_store(&mut self, sid: StoreId) -> bool {
        let Some(loc) = self.store_location(sid) else {
            return false;
        };
        self.func_stores
            .get_mut(&loc.function)
            .is_some_and(|s| s.remove(&sid))
    }

    /// Whether `block` of `function` holds a candidate store that still
    /// affects some open branch.
    pub fn block_has_relevant_store(
        &self,
        function: FunctionId,
        block: BlockId,
        table: &DependencyTable,
    ) -> bool {
        self.candidate_stores(function).any(|sid| {
            table.store_is_relevant(sid)
                && self
                    .store_location(sid)
                    .is_some_and(|loc| loc.block == block)
        })
    }
}

/// On-disk form of the dependency facts consumed by the driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactFile {
    #[serde(default)]
    pub branches: BTreeMap<BranchId, BranchDependency>,
    #[serde(default)]
    pub annotations: Vec<BranchAnnotation>,
    #[serde(default)]
    pub stores: BTreeMap<StoreId, InstLocation>,
}

impl FactFile {
    pub fn from_json_str(text: &str) -> Result<Self, DepschedError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Splits the file into the searcher-facing table and program model.
    ///
    /// Annotations contribute branches that have no explicit entry in
    /// `branches`; explicit entries win.
    pub fn into_parts(self) -> Result<(DependencyTable, ProgramModel), DepschedError> {
        for (bid, dep) in self.branches.iter() {
            for sid in dep.stores.iter() {
                if !self.stores.is_empty() && !self.stores.contains_key(sid) {
                    return Err(DepschedError(format!(
                        "branch {} depends on store {} which has no location",
                        bid, sid
                    )));
                }
            }
        }
        let annotated: Vec<BranchAnnotation> = self
            .annotations
            .into_iter()
            .filter(|a| !self.branches.contains_key(&a.bid))
            .collect();
        let mut table = DependencyTable::from_annotations(&annotated, BTreeMap::new());
        for (bid, dep) in self.branches.into_iter() {
            table.insert(bid, dep);
        }
        let program = ProgramModel::new(self.stores);
        Ok((table, program))
    }
}
