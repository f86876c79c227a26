//! Append-only ledger of business insights and the memo rendered from it.

use std::sync::{PoisonError, RwLock};

pub const EMPTY_MEMO: &str = "No business insights have been discovered yet.";

const MEMO_HEADER: &str = "📊 Business Intelligence Memo 📊";
const SECTION_TITLE: &str = "Key Insights Discovered:";

/// Insights recorded during an analysis session, in insertion order.
///
/// Entries are only ever appended. The ledger lives as long as the
/// [`MongoDatabase`](crate::MongoDatabase) that owns it.
#[derive(Debug, Default)]
pub struct InsightLedger {
    entries: RwLock<Vec<String>>,
}

impl InsightLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an insight verbatim.
    pub fn append(&self, text: impl Into<String>) {
        // A panic can't leave the Vec half-pushed, so a poisoned lock is still usable.
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.into());
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the memo from the current entries.
    pub fn render(&self) -> String {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        render_memo(&entries)
    }
}

fn render_memo(entries: &[String]) -> String {
    if entries.is_empty() {
        return EMPTY_MEMO.to_string();
    }

    let bullets = entries
        .iter()
        .map(|entry| format!("- {entry}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut memo = format!("{MEMO_HEADER}\n\n{SECTION_TITLE}\n\n{bullets}");

    if entries.len() > 1 {
        memo.push_str("\n\nSummary:\n");
        memo.push_str(&format!(
            "Analysis has revealed {} key business insights that suggest opportunities for strategic optimization and growth.",
            entries.len()
        ));
    }

    memo
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn empty_ledger_renders_sentinel() {
        let ledger = InsightLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.render(), EMPTY_MEMO);
    }

    #[test]
    fn single_entry_has_no_summary() {
        let ledger = InsightLedger::new();
        ledger.append("Revenue grew 12%");

        let memo = ledger.render();
        assert_eq!(
            memo,
            "📊 Business Intelligence Memo 📊\n\nKey Insights Discovered:\n\n- Revenue grew 12%"
        );
        assert!(!memo.contains("Summary:"));
    }

    #[test]
    fn multiple_entries_keep_order_and_summarize() {
        let ledger = InsightLedger::new();
        for entry in ["A", "B", "C"] {
            ledger.append(entry);
        }

        let memo = ledger.render();
        let a = memo.find("- A").unwrap();
        let b = memo.find("- B").unwrap();
        let c = memo.find("- C").unwrap();
        assert!(a < b && b < c);
        assert!(memo.contains("- C\n\nSummary:\n"));
        assert!(memo.ends_with(
            "Analysis has revealed 3 key business insights that suggest opportunities for strategic optimization and growth."
        ));
    }

    #[test]
    fn entries_are_kept_verbatim() {
        let ledger = InsightLedger::new();
        ledger.append("  padded  ");
        ledger.append("  padded  ");
        ledger.append("");

        assert_eq!(ledger.len(), 3);
        let memo = ledger.render();
        assert_eq!(memo.matches("-   padded  \n").count(), 2);
        assert!(memo.contains("\n- \n\nSummary:"));
    }

    #[test]
    fn render_is_repeatable() {
        let ledger = InsightLedger::new();
        ledger.append("Churn is concentrated in the first month");
        ledger.append("Weekend orders are twice as large");

        assert_eq!(ledger.render(), ledger.render());
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let ledger = Arc::new(InsightLedger::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..50 {
                        ledger.append(format!("worker {worker} insight {i}"));
                        let _ = ledger.render();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 400);
        assert!(ledger.render().contains("Analysis has revealed 400 key business insights"));
    }
}
