//! Trigger parameter parsing
//!
//! A batch is requested through the location fragment of the faction controls tab:
//!
//! ```text
//! #/tab=controls&batbal_uids=15,1617955,4&batbal_amounts=120,-250,1500
//! ```
//!
//! `batbal_action` (`add` | `give`) and `batbal_asset` (`money` | `points`) are
//! optional and default to `add` and `money`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::errors::ParseError;
use crate::types::{ActionType, AssetType, BatchEntry, BatchSpec, BatchState};

pub const PARAM_IDS: &str = "batbal_uids";
pub const PARAM_AMOUNTS: &str = "batbal_amounts";
pub const PARAM_ACTION: &str = "batbal_action";
pub const PARAM_ASSET: &str = "batbal_asset";

const TAB_PARAM: &str = "/tab";
const CONTROLS_TAB: &str = "controls";

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid id pattern"));
static AMOUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,11}$").expect("valid amount pattern"));

/// Raw, unvalidated trigger parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchParams {
    pub ids: Option<String>,
    pub amounts: Option<String>,
    pub action: Option<String>,
    pub asset: Option<String>,
}

impl BatchParams {
    pub fn new(ids: impl Into<String>, amounts: impl Into<String>) -> Self {
        Self {
            ids: Some(ids.into()),
            amounts: Some(amounts.into()),
            action: None,
            asset: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Read the parameters from a location fragment such as
    /// `#/tab=controls&batbal_uids=1,2&batbal_amounts=5,6`.
    ///
    /// Fragments that do not point at the controls tab carry no batch.
    pub fn from_fragment(fragment: &str) -> Self {
        let raw = fragment.strip_prefix('#').unwrap_or(fragment);
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        // First occurrence wins, as with URLSearchParams.get
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        if get(TAB_PARAM).as_deref() != Some(CONTROLS_TAB) {
            debug!("Fragment does not target the controls tab; no batch requested");
            return Self::default();
        }

        Self {
            ids: get(PARAM_IDS),
            amounts: get(PARAM_AMOUNTS),
            action: get(PARAM_ACTION),
            asset: get(PARAM_ASSET),
        }
    }

    /// Whether both required lists are present
    pub fn is_requested(&self) -> bool {
        self.ids.is_some() && self.amounts.is_some()
    }

    pub fn parse(&self) -> Result<Option<BatchState>, ParseError> {
        parse_batch(self)
    }
}

/// Validate and normalize trigger parameters.
///
/// `Ok(None)` means no batch was requested. Zero amounts are dropped, the
/// remaining entries keep their relative order and the cursor starts at 0.
pub fn parse_batch(params: &BatchParams) -> Result<Option<BatchState>, ParseError> {
    let (Some(raw_ids), Some(raw_amounts)) = (params.ids.as_deref(), params.amounts.as_deref())
    else {
        return Ok(None);
    };

    let ids: Vec<&str> = raw_ids.split(',').collect();
    let amounts: Vec<&str> = raw_amounts.split(',').collect();
    if ids.len() != amounts.len() {
        return Err(ParseError::LengthMismatch {
            ids: ids.len(),
            amounts: amounts.len(),
        });
    }

    if let Some(bad) = ids.iter().find(|id| !ID_PATTERN.is_match(id)) {
        return Err(ParseError::InvalidIds(bad.to_string()));
    }

    let mut parsed_amounts = Vec::with_capacity(amounts.len());
    for raw in &amounts {
        if !AMOUNT_PATTERN.is_match(raw) {
            return Err(ParseError::InvalidAmounts(raw.to_string()));
        }
        let amount = raw
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidAmounts(raw.to_string()))?;
        parsed_amounts.push(amount);
    }

    let action_type = match params.action.as_deref() {
        None => ActionType::default(),
        Some(raw) => raw.parse().map_err(ParseError::InvalidAction)?,
    };
    let asset_type = match params.asset.as_deref() {
        None => AssetType::default(),
        Some(raw) => raw.parse().map_err(ParseError::InvalidAsset)?,
    };

    let entries: Vec<BatchEntry> = ids
        .into_iter()
        .zip(parsed_amounts)
        .filter(|(_, amount)| *amount != 0)
        .map(|(id, amount)| BatchEntry::new(id, amount))
        .collect();

    debug!(
        entries = entries.len(),
        action = %action_type,
        asset = %asset_type,
        "Parsed batch parameters"
    );

    Ok(Some(BatchState::new(BatchSpec::new(
        entries,
        action_type,
        asset_type,
    ))))
}
