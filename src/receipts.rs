use crate::error::MarketError;
use crate::id::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Proof of a settled purchase, returned to the buyer and kept by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// The listing the purchase settled against
    pub listing_id: u64,

    /// Who received the units
    pub buyer: Address,

    /// How many units moved from escrow to the buyer
    pub units: u64,

    /// Exact payment tendered, equal to units * unit price
    pub paid: u64,

    /// Share of `paid` routed to the edition's creator
    pub royalty_paid: u64,

    /// When the settlement was applied
    pub settled_at: DateTime<Utc>,
}

/// Iterator for traversing settlement receipts
pub trait ReceiptIterator: Iterator<Item = Result<SettlementReceipt, MarketError>> {}

/// Storage interface for settlement receipts
pub trait ReceiptStore {
    /// Record a receipt
    ///
    /// # Parameters
    /// * `receipt` - The settlement receipt to store
    ///
    /// # Returns
    /// Ok(()) if successful, Err otherwise
    fn record(&self, receipt: &SettlementReceipt) -> Result<(), MarketError>;

    /// Get all receipts for a specific listing
    ///
    /// # Parameters
    /// * `listing_id` - The listing to get receipts for
    ///
    /// # Returns
    /// An iterator that yields receipts in settlement order
    fn receipts_for_listing(&self, listing_id: u64) -> Box<dyn ReceiptIterator + '_>;

    /// Get all receipts for a specific buyer
    ///
    /// # Parameters
    /// * `buyer` - The buyer to get receipts for
    ///
    /// # Returns
    /// An iterator that yields receipts in settlement order
    fn receipts_for_buyer(&self, buyer: &Address) -> Box<dyn ReceiptIterator + '_>;
}

/// Iterator over an owned batch of receipts
pub struct ReceiptVecIterator {
    receipts: Vec<SettlementReceipt>,
    current_index: usize,
}

impl ReceiptVecIterator {
    fn new(receipts: Vec<SettlementReceipt>) -> Self {
        Self {
            receipts,
            current_index: 0,
        }
    }
}

impl Iterator for ReceiptVecIterator {
    type Item = Result<SettlementReceipt, MarketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index < self.receipts.len() {
            let receipt = self.receipts[self.current_index].clone();
            self.current_index += 1;
            Some(Ok(receipt))
        } else {
            None
        }
    }
}

impl ReceiptIterator for ReceiptVecIterator {}

/// In-memory receipt store, ordered by settlement time
#[derive(Debug, Default)]
pub struct InMemoryReceiptStore {
    receipts: Mutex<Vec<SettlementReceipt>>,
}

impl InMemoryReceiptStore {
    /// Create a new in-memory receipt store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded receipts
    pub fn len(&self) -> usize {
        self.receipts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReceiptStore for InMemoryReceiptStore {
    fn record(&self, receipt: &SettlementReceipt) -> Result<(), MarketError> {
        let mut receipts = self.receipts.lock().unwrap();
        receipts.push(receipt.clone());
        Ok(())
    }

    fn receipts_for_listing(&self, listing_id: u64) -> Box<dyn ReceiptIterator + '_> {
        let receipts = self.receipts.lock().unwrap();
        let matching: Vec<SettlementReceipt> = receipts
            .iter()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect();
        Box::new(ReceiptVecIterator::new(matching))
    }

    fn receipts_for_buyer(&self, buyer: &Address) -> Box<dyn ReceiptIterator + '_> {
        let receipts = self.receipts.lock().unwrap();
        let matching: Vec<SettlementReceipt> = receipts
            .iter()
            .filter(|r| r.buyer == *buyer)
            .cloned()
            .collect();
        Box::new(ReceiptVecIterator::new(matching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::unique_address;

    fn receipt(listing_id: u64, buyer: Address, units: u64) -> SettlementReceipt {
        SettlementReceipt {
            listing_id,
            buyer,
            units,
            paid: units * 10,
            royalty_paid: 0,
            settled_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_query_by_listing() {
        let store = InMemoryReceiptStore::new();
        let alice = unique_address("alice");
        let bob = unique_address("bob");

        store.record(&receipt(0, alice, 1)).unwrap();
        store.record(&receipt(1, bob, 2)).unwrap();
        store.record(&receipt(0, bob, 3)).unwrap();

        let for_listing: Vec<_> = store
            .receipts_for_listing(0)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(for_listing.len(), 2);
        // Settlement order is preserved
        assert_eq!(for_listing[0].buyer, alice);
        assert_eq!(for_listing[1].buyer, bob);
    }

    #[test]
    fn test_query_by_buyer() {
        let store = InMemoryReceiptStore::new();
        let alice = unique_address("alice");
        let bob = unique_address("bob");

        store.record(&receipt(0, alice, 1)).unwrap();
        store.record(&receipt(1, bob, 2)).unwrap();

        let for_bob: Vec<_> = store
            .receipts_for_buyer(&bob)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(for_bob.len(), 1);
        assert_eq!(for_bob[0].units, 2);

        let for_nobody: Vec<_> = store
            .receipts_for_buyer(&unique_address("nobody"))
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(for_nobody.is_empty());
    }
}
