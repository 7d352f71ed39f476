//! First-in-first-out lot matching.
//!
//! The pure core of the matching engine: it walks closed orders in global
//! time order, builds inventory lots from filled buys, and consumes those
//! lots oldest-first to price each filled sell. Everything here operates on
//! in-memory data so the algorithm can be exercised without a database;
//! `engine` wraps a run in a single transaction.
//!
//! The global ordering matters: orders are visited across all commodities by
//! issue time, never per-type, so a sell can only ever match lots that
//! existed (by wall clock) when it happened.

use rustc_hash::FxHashMap;

use crate::fees::{self, FeeRates};
use crate::storage::{InventoryLot, ProfitRecord, StoredLot};
use crate::types::TradeOrder;

/// Totals reported by one matching run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub buy_orders_processed: u64,
    pub sell_orders_processed: u64,
    /// Units added to inventory from filled buys.
    pub items_added_to_inventory: i64,
    /// Units sold against tracked inventory lots.
    pub items_sold: i64,
    /// Units sold with no lot available to match.
    pub items_sold_without_purchase: i64,
}

/// Everything a matching run wants persisted, in one atomic batch.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Lots created this run that still hold quantity, in creation order.
    pub new_lots: Vec<InventoryLot>,
    /// Pre-existing lots partially consumed:
    /// (lot id, remaining quantity, remaining acquisition fee).
    pub updated_lots: Vec<(i64, i64, f64)>,
    /// Pre-existing lots fully consumed.
    pub consumed_lot_ids: Vec<i64>,
    pub profits: Vec<ProfitRecord>,
    /// Every order visited this run, to be flagged exhausted.
    pub exhausted_order_ids: Vec<i64>,
    pub summary: MatchSummary,
}

struct Slot {
    /// Monotonic creation sequence: pre-existing lots keep their load order,
    /// lots created mid-run append after them. Breaks FIFO ties between lots
    /// sharing a purchase date.
    seq: u64,
    /// Database id for pre-existing lots, `None` for lots created this run.
    id: Option<i64>,
    /// Whether a sell took quantity out of this lot during the run.
    touched: bool,
    lot: InventoryLot,
}

/// Open inventory for one trader, kept in FIFO consumption order per type.
struct LotBook {
    by_type: FxHashMap<i64, Vec<Slot>>,
    next_seq: u64,
}

impl LotBook {
    fn from_stored(stored: Vec<StoredLot>) -> Self {
        let mut book = Self {
            by_type: FxHashMap::default(),
            next_seq: 0,
        };
        // Callers load these ordered by (purchase_date, id) already; insert
        // preserves that as the seq order.
        for entry in stored {
            book.insert(Some(entry.id), entry.lot);
        }
        book
    }

    /// Insert keeping (purchase_date, seq) order. A late-ingested buy that
    /// predates existing lots lands in front of them, not at the back.
    fn insert(&mut self, id: Option<i64>, lot: InventoryLot) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slots = self.by_type.entry(lot.type_id).or_default();
        let at = slots
            .partition_point(|s| (s.lot.purchase_date, s.seq) <= (lot.purchase_date, seq));
        slots.insert(
            at,
            Slot {
                seq,
                id,
                touched: false,
                lot,
            },
        );
    }

    fn front_mut(&mut self, type_id: i64) -> Option<&mut Slot> {
        self.by_type.get_mut(&type_id)?.first_mut()
    }

    fn pop_front(&mut self, type_id: i64) -> Option<Slot> {
        let slots = self.by_type.get_mut(&type_id)?;
        if slots.is_empty() {
            None
        } else {
            Some(slots.remove(0))
        }
    }

    /// Fold the surviving lots into the outcome: updates for pre-existing
    /// lots that shrank, inserts for lots created this run, in creation
    /// order so their database ids reproduce the FIFO tie-break.
    fn drain_into(self, outcome: &mut MatchOutcome) {
        let mut slots: Vec<Slot> = self.by_type.into_values().flatten().collect();
        slots.sort_by_key(|s| s.seq);
        for slot in slots {
            match slot.id {
                Some(id) if slot.touched => {
                    outcome
                        .updated_lots
                        .push((id, slot.lot.quantity, slot.lot.acquisition_fee));
                }
                Some(_) => {}
                None => outcome.new_lots.push(slot.lot),
            }
        }
    }
}

/// Run FIFO matching over `orders` against a trader's open inventory.
///
/// `orders` must be the trader's unexhausted rows sorted by
/// (issued_at, order_id) ascending; `lots` must be in FIFO load order.
/// Returns the complete set of writes for the caller to apply atomically.
pub fn execute(orders: &[TradeOrder], lots: Vec<StoredLot>, rates: FeeRates) -> MatchOutcome {
    let mut book = LotBook::from_stored(lots);
    let mut outcome = MatchOutcome::default();

    for order in orders {
        if order.is_buy_order {
            process_buy(order, &mut book, rates, &mut outcome.summary);
        } else {
            process_sell(order, &mut book, rates, &mut outcome);
        }
        // Visited exactly once, whatever the branch did.
        outcome.exhausted_order_ids.push(order.order_id);
    }

    book.drain_into(&mut outcome);
    outcome
}

fn process_buy(order: &TradeOrder, book: &mut LotBook, rates: FeeRates, summary: &mut MatchSummary) {
    summary.buy_orders_processed += 1;

    let filled = order.volume_effective;
    if filled <= 0 {
        // Never-filled order: no inventory effect, exhausted by the caller.
        return;
    }

    book.insert(
        None,
        InventoryLot {
            type_id: order.type_id,
            quantity: filled,
            purchase_price: order.price,
            purchase_order_id: order.order_id,
            purchase_date: order.issued_at,
            acquisition_fee: fees::acquisition_fee(order.price, filled, rates.acquisition_fee_rate),
        },
    );
    summary.items_added_to_inventory += filled;
}

fn process_sell(order: &TradeOrder, book: &mut LotBook, rates: FeeRates, outcome: &mut MatchOutcome) {
    outcome.summary.sell_orders_processed += 1;

    let mut remaining = order.volume_effective;
    if remaining <= 0 {
        return;
    }

    while remaining > 0 {
        let Some(slot) = book.front_mut(order.type_id) else {
            break;
        };

        let qty = remaining.min(slot.lot.quantity);
        // Fee share apportioned against the lot's CURRENT remaining
        // quantity; the lot's fee shrinks by the same share so the total
        // handed out over the lot's life equals the original fee.
        let fee_share = slot.lot.acquisition_fee * (qty as f64 / slot.lot.quantity as f64);
        let cost_base = slot.lot.purchase_price * qty as f64;
        let revenue = order.price * qty as f64;
        let disposal = fees::disposal_fee(order.price, qty, rates.disposal_fee_rate);
        let tax = fees::sales_tax(order.price, qty, rates.tax_rate);
        let gross = revenue - cost_base;

        outcome.profits.push(ProfitRecord {
            type_id: order.type_id,
            sell_order_id: order.order_id,
            sell_date: order.issued_at,
            quantity: qty,
            purchase_price: slot.lot.purchase_price,
            sell_price: order.price,
            acquisition_fee_share: fee_share,
            disposal_fee: disposal,
            tax,
            gross_profit: gross,
            net_profit: (revenue - disposal - tax) - (cost_base + fee_share),
            source_lot_order_id: Some(slot.lot.purchase_order_id),
        });

        slot.lot.quantity -= qty;
        slot.lot.acquisition_fee -= fee_share;
        slot.touched = true;
        let depleted = slot.lot.quantity == 0;

        outcome.summary.items_sold += qty;
        remaining -= qty;

        if depleted {
            if let Some(consumed) = book.pop_front(order.type_id) {
                if let Some(id) = consumed.id {
                    outcome.consumed_lot_ids.push(id);
                }
            }
        }
    }

    if remaining > 0 {
        // Inventory ran out: the leftover was stock acquired before tracking
        // began. Price it at zero cost so the revenue-side charges still
        // land in the books.
        let disposal = fees::disposal_fee(order.price, remaining, rates.disposal_fee_rate);
        let tax = fees::sales_tax(order.price, remaining, rates.tax_rate);

        outcome.profits.push(ProfitRecord {
            type_id: order.type_id,
            sell_order_id: order.order_id,
            sell_date: order.issued_at,
            quantity: remaining,
            purchase_price: 0.0,
            sell_price: order.price,
            acquisition_fee_share: 0.0,
            disposal_fee: disposal,
            tax,
            gross_profit: 0.0,
            net_profit: -(disposal + tax),
            source_lot_order_id: None,
        });
        outcome.summary.items_sold_without_purchase += remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    const TRADER: i64 = 7;
    const TRIT: i64 = 34;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + offset_secs, 0).expect("valid test timestamp")
    }

    fn order(
        order_id: i64,
        type_id: i64,
        is_buy: bool,
        issued_offset: i64,
        price: f64,
        effective: i64,
    ) -> TradeOrder {
        TradeOrder {
            order_id,
            trader_id: TRADER,
            type_id,
            is_buy_order: is_buy,
            issued_at: ts(issued_offset),
            price,
            volume_total: effective,
            volume_remain: 0,
            volume_effective: effective,
            location_id: 60003760,
            region_id: 10000002,
            state: "expired".to_string(),
            exhausted: false,
        }
    }

    fn stored(id: i64, type_id: i64, qty: i64, price: f64, date_offset: i64, fee: f64) -> StoredLot {
        StoredLot {
            id,
            lot: InventoryLot {
                type_id,
                quantity: qty,
                purchase_price: price,
                purchase_order_id: id * 100,
                purchase_date: ts(date_offset),
                acquisition_fee: fee,
            },
        }
    }

    /// Test: buy 10@100, buy 10@110, sell 15@200 at zero rates consumes the
    /// first lot fully and five units of the second: gross 1450.
    #[test]
    fn fifo_consumes_oldest_lot_first() {
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 10),
            order(2, TRIT, true, 60, 110.0, 10),
            order(3, TRIT, false, 120, 200.0, 15),
        ];

        let outcome = execute(&orders, Vec::new(), FeeRates::zero());

        assert_eq!(outcome.profits.len(), 2);
        assert_eq!(outcome.profits[0].quantity, 10);
        assert_eq!(outcome.profits[0].purchase_price, 100.0);
        assert_eq!(outcome.profits[0].gross_profit, 1000.0);
        assert_eq!(outcome.profits[1].quantity, 5);
        assert_eq!(outcome.profits[1].purchase_price, 110.0);
        assert_eq!(outcome.profits[1].gross_profit, 450.0);

        let gross: f64 = outcome.profits.iter().map(|p| p.gross_profit).sum();
        assert_eq!(gross, 1450.0);

        // First lot gone, second survives with 5 units.
        assert_eq!(outcome.new_lots.len(), 1);
        assert_eq!(outcome.new_lots[0].quantity, 5);
        assert_eq!(outcome.new_lots[0].purchase_order_id, 2);

        assert_eq!(outcome.summary.items_added_to_inventory, 20);
        assert_eq!(outcome.summary.items_sold, 15);
        assert_eq!(outcome.summary.items_sold_without_purchase, 0);
    }

    /// Test: a sell into an empty book emits exactly one zero-cost record
    /// whose net is minus the revenue-side charges.
    #[test]
    fn sell_without_inventory_prices_at_zero_cost() {
        let rates = FeeRates {
            acquisition_fee_rate: 3.0,
            disposal_fee_rate: 3.0,
            tax_rate: 7.5,
        };
        let orders = vec![order(1, TRIT, false, 0, 50.0, 5)];

        let outcome = execute(&orders, Vec::new(), rates);

        assert_eq!(outcome.profits.len(), 1);
        let record = &outcome.profits[0];
        assert_eq!(record.purchase_price, 0.0);
        assert_eq!(record.gross_profit, 0.0);
        assert_eq!(record.source_lot_order_id, None);
        // Revenue 250: disposal 7.50, tax 18.75
        assert_eq!(record.disposal_fee, 7.5);
        assert_eq!(record.tax, 18.75);
        assert_eq!(record.net_profit, -26.25);
        assert_eq!(outcome.summary.items_sold_without_purchase, 5);
    }

    /// Test: the acquisition fee is handed out against the lot's current
    /// remaining quantity, and the shares over a lot's life sum to the
    /// original fee.
    #[test]
    fn acquisition_fee_apportioned_by_remaining_quantity() {
        let rates = FeeRates {
            acquisition_fee_rate: 10.0,
            disposal_fee_rate: 0.0,
            tax_rate: 0.0,
        };
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 10), // fee = 100
            order(2, TRIT, false, 60, 150.0, 4),
            order(3, TRIT, false, 120, 150.0, 6),
        ];

        let outcome = execute(&orders, Vec::new(), rates);

        assert_eq!(outcome.profits.len(), 2);
        // 4/10 of the 100 fee, then 6/6 of the remaining 60.
        assert_eq!(outcome.profits[0].acquisition_fee_share, 40.0);
        assert_eq!(outcome.profits[1].acquisition_fee_share, 60.0);
        let total: f64 = outcome.profits.iter().map(|p| p.acquisition_fee_share).sum();
        assert_eq!(total, 100.0);

        assert!(outcome.new_lots.is_empty());
        assert!(outcome.updated_lots.is_empty());
    }

    /// Test: lots sharing a purchase date are consumed in creation order.
    #[test]
    fn same_date_lots_break_ties_by_creation_order() {
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 5),
            order(2, TRIT, true, 0, 110.0, 5),
            order(3, TRIT, false, 60, 200.0, 5),
        ];

        let outcome = execute(&orders, Vec::new(), FeeRates::zero());

        assert_eq!(outcome.profits.len(), 1);
        assert_eq!(outcome.profits[0].source_lot_order_id, Some(1));
        assert_eq!(outcome.new_lots.len(), 1);
        assert_eq!(outcome.new_lots[0].purchase_order_id, 2);
    }

    /// Test: a backfilled buy older than stored inventory is consumed first.
    #[test]
    fn older_backfilled_buy_jumps_the_queue() {
        let lots = vec![stored(50, TRIT, 10, 120.0, 1000, 0.0)];
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 10), // predates the stored lot
            order(2, TRIT, false, 2000, 200.0, 10),
        ];

        let outcome = execute(&orders, lots, FeeRates::zero());

        assert_eq!(outcome.profits.len(), 1);
        assert_eq!(outcome.profits[0].purchase_price, 100.0);
        assert_eq!(outcome.profits[0].source_lot_order_id, Some(1));
        // The stored lot was never touched, so it produces no update.
        assert!(outcome.updated_lots.is_empty());
        assert!(outcome.consumed_lot_ids.is_empty());
        assert!(outcome.new_lots.is_empty());
    }

    /// Test: a partially consumed stored lot comes back as an update with
    /// the proportional fee remainder.
    #[test]
    fn partially_consumed_stored_lot_reports_update() {
        let lots = vec![stored(50, TRIT, 10, 100.0, 0, 30.0)];
        let orders = vec![order(1, TRIT, false, 60, 150.0, 4)];

        let outcome = execute(&orders, lots, FeeRates::zero());

        assert_eq!(outcome.updated_lots, vec![(50, 6, 18.0)]);
        assert_eq!(outcome.profits[0].acquisition_fee_share, 12.0);
        assert!(outcome.consumed_lot_ids.is_empty());
    }

    /// Test: a fully consumed stored lot is reported for deletion, never as
    /// a zero-quantity update.
    #[test]
    fn depleted_stored_lot_reports_deletion() {
        let lots = vec![stored(50, TRIT, 10, 100.0, 0, 0.0)];
        let orders = vec![order(1, TRIT, false, 60, 150.0, 10)];

        let outcome = execute(&orders, lots, FeeRates::zero());

        assert_eq!(outcome.consumed_lot_ids, vec![50]);
        assert!(outcome.updated_lots.is_empty());
    }

    /// Test: never-filled orders have no inventory or profit effect but are
    /// still exhausted.
    #[test]
    fn zero_effective_volume_orders_are_only_exhausted() {
        let mut unfilled_buy = order(1, TRIT, true, 0, 100.0, 0);
        unfilled_buy.volume_total = 10;
        unfilled_buy.volume_remain = 10;
        let mut unfilled_sell = order(2, TRIT, false, 60, 100.0, 0);
        unfilled_sell.volume_total = 10;
        unfilled_sell.volume_remain = 10;

        let outcome = execute(&[unfilled_buy, unfilled_sell], Vec::new(), FeeRates::zero());

        assert!(outcome.profits.is_empty());
        assert!(outcome.new_lots.is_empty());
        assert_eq!(outcome.exhausted_order_ids, vec![1, 2]);
        assert_eq!(outcome.summary.items_added_to_inventory, 0);
        assert_eq!(outcome.summary.items_sold, 0);
    }

    /// Test: matched quantity never exceeds the quantity ever added to lots,
    /// even when sells oversell the book.
    #[test]
    fn matched_quantity_is_bounded_by_lot_supply() {
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 10),
            order(2, TRIT, true, 10, 105.0, 10),
            order(3, TRIT, false, 20, 200.0, 30),
            order(4, TRIT, false, 30, 210.0, 8),
        ];

        let outcome = execute(&orders, Vec::new(), FeeRates::zero());

        let matched: i64 = outcome
            .profits
            .iter()
            .filter(|p| p.source_lot_order_id.is_some())
            .map(|p| p.quantity)
            .sum();
        assert_eq!(matched, 20);
        assert_eq!(outcome.summary.items_sold, 20);
        assert_eq!(outcome.summary.items_sold_without_purchase, 18);
    }

    /// Test: net profit follows the documented identity on a mixed run.
    #[test]
    fn net_profit_identity_holds() {
        let rates = FeeRates {
            acquisition_fee_rate: 3.0,
            disposal_fee_rate: 3.0,
            tax_rate: 7.5,
        };
        let orders = vec![
            order(1, TRIT, true, 0, 100.0, 10),
            order(2, TRIT, false, 60, 200.0, 10),
        ];

        let outcome = execute(&orders, Vec::new(), rates);

        let record = &outcome.profits[0];
        let expected_net = record.gross_profit
            - record.acquisition_fee_share
            - record.disposal_fee
            - record.tax;
        assert!((record.net_profit - expected_net).abs() < 1e-9);
    }
}
