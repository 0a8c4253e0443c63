//! Read-only view of a batch for presentation

use serde::Serialize;

use crate::identity::IdentityMap;
use crate::types::{ActionType, AssetType, BatchState};

/// Signed amount with thousands separators: `1370` → `+1,370`, `-250` → `-250`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    grouped.push(if amount >= 0 { '+' } else { '-' });
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRow {
    pub target_id: String,
    /// Empty when the target is not in the member list
    pub display_name: String,
    pub amount: i64,
    pub done: bool,
    pub is_eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub action_type: ActionType,
    pub asset_type: AssetType,
    pub entry_count: usize,
    pub ineligible_count: usize,
    pub total_amount: i64,
    pub cursor: usize,
    pub rows: Vec<EntryRow>,
}

impl BatchSummary {
    pub fn new(state: &BatchState, identities: &IdentityMap) -> Self {
        let rows: Vec<EntryRow> = state
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| EntryRow {
                target_id: entry.target_id.clone(),
                display_name: identities
                    .display_name(&entry.target_id)
                    .unwrap_or_default()
                    .to_string(),
                amount: entry.amount,
                done: state.is_done(i),
                is_eligible: identities.is_eligible(&entry.target_id),
            })
            .collect();

        Self {
            action_type: state.action_type(),
            asset_type: state.asset_type(),
            entry_count: rows.len(),
            ineligible_count: rows.iter().filter(|r| !r.is_eligible).count(),
            total_amount: state.total_amount(),
            cursor: state.cursor(),
            rows,
        }
    }

    pub fn action_label(&self) -> &'static str {
        self.action_type.summary()
    }

    pub fn formatted_total(&self) -> String {
        format_amount(self.total_amount)
    }

    pub fn progress_line(&self) -> String {
        format!("Progress: {} / {} done", self.cursor, self.entry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::types::{BatchEntry, BatchSpec};

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "+0");
        assert_eq!(format_amount(120), "+120");
        assert_eq!(format_amount(1370), "+1,370");
        assert_eq!(format_amount(-250), "-250");
        assert_eq!(format_amount(-1500), "-1,500");
        assert_eq!(format_amount(1_234_567), "+1,234,567");
        assert_eq!(format_amount(-99_999_999_999), "-99,999,999,999");
    }

    #[test]
    fn test_summary_rows() {
        let mut state = BatchState::new(BatchSpec::new(
            vec![
                BatchEntry::new("1523812", 120),
                BatchEntry::new("1617955", -250),
                BatchEntry::new("4", 1500),
            ],
            ActionType::Add,
            AssetType::Money,
        ));
        state.advance();
        let identities: IdentityMap = [
            ("1617955", Identity::new("tobytorn", true)),
            ("4", Identity::new("Duke", false)),
        ]
        .into_iter()
        .collect();

        let summary = BatchSummary::new(&state, &identities);
        assert_eq!(summary.action_label(), "Add to balance");
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.ineligible_count, 2);
        assert_eq!(summary.total_amount, 1370);
        assert_eq!(summary.formatted_total(), "+1,370");
        assert_eq!(summary.progress_line(), "Progress: 1 / 3 done");
        assert!(summary.rows[0].done);
        assert!(!summary.rows[1].done);
        assert_eq!(summary.rows[0].display_name, "");
        assert_eq!(summary.rows[1].display_name, "tobytorn");
    }
}
