//! Batch data model shared by the parser, the store and the runner

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One (target, signed amount) instruction.
///
/// Serialized as a two-element array `["1617955", -250]`, the shape saved
/// batches have always used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, i64)", into = "(String, i64)")]
pub struct BatchEntry {
    pub target_id: String,
    pub amount: i64,
}

impl BatchEntry {
    pub fn new(target_id: impl Into<String>, amount: i64) -> Self {
        Self {
            target_id: target_id.into(),
            amount,
        }
    }
}

impl From<(String, i64)> for BatchEntry {
    fn from((target_id, amount): (String, i64)) -> Self {
        Self { target_id, amount }
    }
}

impl From<BatchEntry> for (String, i64) {
    fn from(entry: BatchEntry) -> Self {
        (entry.target_id, entry.amount)
    }
}

/// Semantic of the adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Credit (or debit) the member's faction balance
    #[default]
    Add,
    /// Transfer directly to the member
    Give,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Add => "add",
            ActionType::Give => "give",
        }
    }

    /// Human-readable summary label
    pub fn summary(&self) -> &'static str {
        match self {
            ActionType::Add => "Add to balance",
            ActionType::Give => "Give",
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            ActionType::Add => "Add",
            ActionType::Give => "Give",
        }
    }

    pub fn waiting_verb(&self) -> &'static str {
        match self {
            ActionType::Add => "Adding",
            ActionType::Give => "Giving",
        }
    }

    /// Value of the `option` field in the adjustment request body
    pub fn request_option(&self) -> &'static str {
        match self {
            ActionType::Add => "addToBalance",
            ActionType::Give => "giveMoney",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ActionType::Add),
            "give" => Ok(ActionType::Give),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Money,
    Points,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Money => "money",
            AssetType::Points => "points",
        }
    }

    /// Page `sid` that accepts adjustments of this asset
    pub fn page_sid(&self) -> &'static str {
        match self {
            AssetType::Money => "factionsGiveMoney",
            AssetType::Points => "factionsGivePoints",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "money" => Ok(AssetType::Money),
            "points" => Ok(AssetType::Points),
            other => Err(other.to_string()),
        }
    }
}

/// The immutable part of a batch: what to do, in which order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSpec {
    #[serde(alias = "uidAmounts")]
    pub entries: Vec<BatchEntry>,
    pub action_type: ActionType,
    pub asset_type: AssetType,
}

impl BatchSpec {
    pub fn new(entries: Vec<BatchEntry>, action_type: ActionType, asset_type: AssetType) -> Self {
        Self {
            entries,
            action_type,
            asset_type,
        }
    }
}

/// A batch plus its progress marker. This is the value kept in the persisted slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    #[serde(flatten)]
    spec: BatchSpec,
    #[serde(alias = "next")]
    cursor: usize,
}

impl BatchState {
    /// A fresh batch with nothing executed yet
    pub fn new(spec: BatchSpec) -> Self {
        Self { spec, cursor: 0 }
    }

    /// Rebuild a state at a given cursor. Returns `None` when the cursor is past the end.
    pub fn with_cursor(spec: BatchSpec, cursor: usize) -> Option<Self> {
        (cursor <= spec.entries.len()).then_some(Self { spec, cursor })
    }

    pub fn spec(&self) -> &BatchSpec {
        &self.spec
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.spec.entries
    }

    pub fn action_type(&self) -> ActionType {
        self.spec.action_type
    }

    pub fn asset_type(&self) -> AssetType {
        self.spec.asset_type
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.spec.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spec.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.spec.entries.len()
    }

    /// Whether the entry at `index` has already been applied
    pub fn is_done(&self, index: usize) -> bool {
        index < self.cursor
    }

    /// The next entry to execute
    pub fn current(&self) -> Option<&BatchEntry> {
        self.spec.entries.get(self.cursor)
    }

    pub fn total_amount(&self) -> i64 {
        self.spec.entries.iter().map(|e| e.amount).sum()
    }

    /// Whether two states describe the same batch, ignoring progress
    pub fn same_batch(&self, other: &BatchState) -> bool {
        self.spec == other.spec
    }

    pub(crate) fn advance(&mut self) {
        if self.cursor < self.spec.entries.len() {
            self.cursor += 1;
        }
    }

    /// Cursor within bounds. Values read from storage are checked with this.
    pub(crate) fn is_consistent(&self) -> bool {
        self.cursor <= self.spec.entries.len()
    }
}
