use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::order::{Order, OrderId};

/// Local-only flags a cook toggles on an order. Never sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KitchenFlags {
    pub in_progress: bool,
    pub done: bool,
}

/// Read-side projection: a server order joined with its local flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KitchenOrder {
    pub order: Order,
    pub in_progress: bool,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted { index: usize },
    Updated { index: usize },
    Unchanged { index: usize },
}

impl MergeOutcome {
    pub fn index(&self) -> usize {
        match self {
            MergeOutcome::Inserted { index }
            | MergeOutcome::Updated { index }
            | MergeOutcome::Unchanged { index } => *index,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged { .. })
    }
}

/// Orders currently in the kitchen, in first-arrival order.
///
/// Server-derived data and the local overlay live in separate structures so
/// a merge can never clobber a cook's toggles.
#[derive(Debug, Default)]
pub struct KitchenBoard {
    orders: Vec<Order>,
    flags: HashMap<OrderId, KitchenFlags>,
}

impl KitchenBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new order or refresh an existing one in place.
    pub fn merge(&mut self, order: Order) -> MergeOutcome {
        match self.position(&order.id) {
            Some(index) if self.orders[index] == order => MergeOutcome::Unchanged { index },
            Some(index) => {
                self.orders[index] = order;
                MergeOutcome::Updated { index }
            }
            None => {
                self.flags.insert(order.id.clone(), KitchenFlags::default());
                self.orders.push(order);
                MergeOutcome::Inserted {
                    index: self.orders.len() - 1,
                }
            }
        }
    }

    /// Returns `false` when no order has this id.
    pub fn set_in_progress(&mut self, id: &OrderId, value: bool) -> bool {
        self.update_flags(id, |flags| flags.in_progress = value)
    }

    /// Returns `false` when no order has this id.
    pub fn set_done(&mut self, id: &OrderId, value: bool) -> bool {
        self.update_flags(id, |flags| flags.done = value)
    }

    fn update_flags(&mut self, id: &OrderId, apply: impl FnOnce(&mut KitchenFlags)) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        apply(self.flags.entry(id.clone()).or_default());
        true
    }

    pub fn get(&self, id: &OrderId) -> Option<KitchenOrder> {
        self.position(id).map(|index| self.project(&self.orders[index]))
    }

    pub fn snapshot(&self) -> Vec<KitchenOrder> {
        self.orders.iter().map(|order| self.project(order)).collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders the cooks still have to finish.
    pub fn pending_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|order| !self.flags_for(&order.id).done)
            .count()
    }

    fn position(&self, id: &OrderId) -> Option<usize> {
        self.orders.iter().position(|order| &order.id == id)
    }

    fn flags_for(&self, id: &OrderId) -> KitchenFlags {
        self.flags.get(id).copied().unwrap_or_default()
    }

    fn project(&self, order: &Order) -> KitchenOrder {
        let flags = self.flags_for(&order.id);
        KitchenOrder {
            order: order.clone(),
            in_progress: flags.in_progress,
            done: flags.done,
        }
    }
}

/// Time since the order was placed: `MM:SS` under an hour, `HH:MM` after.
///
/// Computed at read time; `None` when the order carries no timestamp.
/// Timestamps in the future render as zero.
pub fn elapsed_label(created_at: Option<NaiveDateTime>, now: NaiveDateTime) -> Option<String> {
    let created_at = created_at?;
    let secs = (now - created_at).num_seconds().max(0);
    let label = if secs < 3600 {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
    };
    Some(label)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::kitchen::order::tests::sample_order;
    use crate::kitchen::order::LineItem;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn first_arrival_is_appended_with_clear_flags() {
        let mut board = KitchenBoard::new();
        let outcome = board.merge(sample_order(1, 2));

        assert_eq!(outcome, MergeOutcome::Inserted { index: 0 });
        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].order.line_items[0].quantity, 2);
        assert!(!snapshot[0].in_progress);
        assert!(!snapshot[0].done);
    }

    #[test]
    fn update_keeps_position_and_local_flags() {
        let mut board = KitchenBoard::new();
        board.merge(sample_order(1, 2));
        board.merge(sample_order(2, 1));
        assert!(board.set_in_progress(&OrderId::Number(1), true));

        let outcome = board.merge(sample_order(1, 3));
        assert_eq!(outcome, MergeOutcome::Updated { index: 0 });

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].order.id, OrderId::Number(1));
        assert_eq!(snapshot[0].order.line_items[0].quantity, 3);
        assert!(snapshot[0].in_progress);
        assert!(!snapshot[0].done);
        assert_eq!(snapshot[1].order.id, OrderId::Number(2));
    }

    #[test]
    fn remerging_same_payload_is_a_no_op() {
        let mut board = KitchenBoard::new();
        board.merge(sample_order(1, 2));
        board.set_done(&OrderId::Number(1), true);
        let before = board.snapshot();

        let outcome = board.merge(sample_order(1, 2));
        assert_eq!(outcome, MergeOutcome::Unchanged { index: 0 });
        assert!(!outcome.changed());
        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn update_replaces_all_server_fields() {
        let mut board = KitchenBoard::new();
        board.merge(sample_order(1, 2));

        let mut edited = sample_order(1, 2);
        edited.table = "9".to_string();
        edited.line_items.push(LineItem::new("Arroz con pato", 1).with_note("sin ají"));
        board.merge(edited.clone());

        assert_eq!(board.get(&OrderId::Number(1)).unwrap().order, edited);
    }

    #[test]
    fn toggles_on_unknown_id_are_rejected() {
        let mut board = KitchenBoard::new();
        assert!(!board.set_in_progress(&OrderId::Number(7), true));
        assert!(!board.set_done(&OrderId::Number(7), true));
        assert!(board.is_empty());
    }

    #[test]
    fn toggles_are_independent_and_reversible() {
        let mut board = KitchenBoard::new();
        board.merge(sample_order(1, 1));
        board.merge(sample_order(2, 1));

        board.set_done(&OrderId::Number(2), true);
        assert_eq!(board.pending_count(), 1);
        board.set_done(&OrderId::Number(2), false);
        assert_eq!(board.pending_count(), 2);

        board.set_in_progress(&OrderId::Number(1), true);
        let first = board.get(&OrderId::Number(1)).unwrap();
        assert!(first.in_progress);
        assert!(!first.done);
    }

    #[test]
    fn elapsed_label_formats() {
        let created = at(12, 0, 0);
        assert_eq!(elapsed_label(Some(created), at(12, 0, 5)).as_deref(), Some("00:05"));
        assert_eq!(elapsed_label(Some(created), at(12, 59, 59)).as_deref(), Some("59:59"));
        assert_eq!(elapsed_label(Some(created), at(13, 0, 0)).as_deref(), Some("01:00"));
        assert_eq!(
            elapsed_label(Some(created), created + Duration::minutes(155)).as_deref(),
            Some("02:35")
        );
        assert_eq!(elapsed_label(Some(at(12, 1, 0)), created).as_deref(), Some("00:00"));
        assert_eq!(elapsed_label(None, created), None);
    }
}
