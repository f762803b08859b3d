use crate::error::MarketError;
use crate::id::Address;
use crate::ledger::Listing;
use crate::registry::MAX_ROYALTY_BPS;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A single value transfer the settlement substrate must perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

/// Routes payment shares to addresses.
///
/// The implementation stands in for the substrate's native value-transfer
/// mechanism: `route` is all-or-nothing across the whole batch, and a
/// refusal must leave no leg applied. The ledger computes amounts and
/// ordering; it never touches balances of the native currency itself.
pub trait PaymentRouter {
    /// Apply every leg atomically, or none of them
    ///
    /// # Parameters
    /// * `legs` - The transfers to perform, in order
    ///
    /// # Returns
    /// Ok(()) if all legs were applied, Err if the batch was refused
    fn route(&self, legs: &[TransferLeg]) -> Result<(), MarketError>;
}

/// The fully validated outcome of a purchase, ready to apply.
///
/// Royalty uses floor division on non-negative integers; the remainder
/// implicitly favors the issuer. Any reimplementation must round the same
/// way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub units: u64,
    pub total: u64,
    pub royalty: u64,
    pub proceeds: u64,
    pub legs: Vec<TransferLeg>,
}

/// Validate a purchase against a listing and compute its payment split.
///
/// Checks, in order: positive units, available inventory, representable
/// total, exact payment. No state is touched; the caller applies the plan
/// only after routing succeeds. Also usable standalone to quote a purchase
/// before committing to it.
pub fn plan_settlement(
    listing: &Listing,
    units: u64,
    tendered: u64,
    buyer: Address,
) -> Result<SettlementPlan, MarketError> {
    if units == 0 {
        return Err(MarketError::InvalidAmount(
            "purchase units must be positive".to_string(),
        ));
    }
    if units > listing.amount_remaining {
        return Err(MarketError::InsufficientInventory {
            remaining: listing.amount_remaining,
            requested: units,
        });
    }

    let total = units
        .checked_mul(listing.unit_price)
        .ok_or(MarketError::ArithmeticOverflow)?;
    if tendered != total {
        return Err(MarketError::PaymentMismatch {
            tendered,
            required: total,
        });
    }

    // Floor division; royalty can never exceed total since bps <= 10000
    let royalty = ((total as u128 * listing.royalty_bps as u128) / MAX_ROYALTY_BPS as u128) as u64;
    let proceeds = total - royalty;

    let mut legs = Vec::with_capacity(2);
    if royalty > 0 {
        legs.push(TransferLeg {
            from: buyer,
            to: listing.creator,
            amount: royalty,
        });
    }
    if proceeds > 0 {
        legs.push(TransferLeg {
            from: buyer,
            to: listing.issuer,
            amount: proceeds,
        });
    }

    Ok(SettlementPlan {
        units,
        total,
        royalty,
        proceeds,
        legs,
    })
}

/// Router that records every routed leg and never refuses.
///
/// Stands in for the settlement substrate in tests and examples, the same
/// way a mock runtime stands in for a real one.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    routed: Mutex<Vec<TransferLeg>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All legs routed so far, in routing order
    pub fn routed(&self) -> Vec<TransferLeg> {
        self.routed.lock().unwrap().clone()
    }

    /// Net amount received by `address` across all routed legs
    pub fn received(&self, address: &Address) -> u64 {
        self.routed
            .lock()
            .unwrap()
            .iter()
            .filter(|leg| leg.to == *address)
            .map(|leg| leg.amount)
            .sum()
    }
}

impl PaymentRouter for RecordingRouter {
    fn route(&self, legs: &[TransferLeg]) -> Result<(), MarketError> {
        self.routed.lock().unwrap().extend_from_slice(legs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::unique_address;

    fn listing_fixture(amount_remaining: u64, unit_price: u64, royalty_bps: u16) -> Listing {
        Listing {
            id: 0,
            issuer: unique_address("issuer"),
            token_id: 1,
            amount_remaining,
            unit_price,
            royalty_bps,
            creator: unique_address("creator"),
        }
    }

    #[test]
    fn test_royalty_floor_rounds_to_zero() {
        // 3 units at price 7 with 2.5% royalty: floor(21 * 250 / 10000) == 0
        let listing = listing_fixture(10, 7, 250);
        let buyer = unique_address("buyer");

        let plan = plan_settlement(&listing, 3, 21, buyer).unwrap();
        assert_eq!(plan.total, 21);
        assert_eq!(plan.royalty, 0);
        assert_eq!(plan.proceeds, 21);

        // No zero-amount legs: everything goes to the issuer
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].to, listing.issuer);
        assert_eq!(plan.legs[0].amount, 21);
    }

    #[test]
    fn test_split_routes_royalty_then_proceeds() {
        let listing = listing_fixture(10, 1_000, 1_000); // 10% royalty
        let buyer = unique_address("buyer");

        let plan = plan_settlement(&listing, 2, 2_000, buyer).unwrap();
        assert_eq!(plan.royalty, 200);
        assert_eq!(plan.proceeds, 1_800);
        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].to, listing.creator);
        assert_eq!(plan.legs[0].amount, 200);
        assert_eq!(plan.legs[1].to, listing.issuer);
        assert_eq!(plan.legs[1].amount, 1_800);
    }

    #[test]
    fn test_underpay_and_overpay_rejected() {
        let listing = listing_fixture(10, 7, 250);
        let buyer = unique_address("buyer");

        let under = plan_settlement(&listing, 3, 20, buyer);
        assert!(matches!(
            under,
            Err(MarketError::PaymentMismatch {
                tendered: 20,
                required: 21
            })
        ));

        let over = plan_settlement(&listing, 3, 22, buyer);
        assert!(matches!(over, Err(MarketError::PaymentMismatch { .. })));
    }

    #[test]
    fn test_zero_units_rejected() {
        let listing = listing_fixture(10, 7, 250);
        let result = plan_settlement(&listing, 0, 0, unique_address("buyer"));
        assert!(matches!(result, Err(MarketError::InvalidAmount(_))));
    }

    #[test]
    fn test_oversized_purchase_rejected() {
        let listing = listing_fixture(2, 7, 250);
        let result = plan_settlement(&listing, 3, 21, unique_address("buyer"));
        assert!(matches!(
            result,
            Err(MarketError::InsufficientInventory {
                remaining: 2,
                requested: 3
            })
        ));
    }

    #[test]
    fn test_total_overflow_rejected() {
        let listing = listing_fixture(u64::MAX, u64::MAX, 0);
        let result = plan_settlement(&listing, 2, 0, unique_address("buyer"));
        assert!(matches!(result, Err(MarketError::ArithmeticOverflow)));
    }

    #[test]
    fn test_full_royalty_leaves_no_proceeds() {
        let listing = listing_fixture(1, 100, MAX_ROYALTY_BPS);
        let buyer = unique_address("buyer");

        let plan = plan_settlement(&listing, 1, 100, buyer).unwrap();
        assert_eq!(plan.royalty, 100);
        assert_eq!(plan.proceeds, 0);
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].to, listing.creator);
    }

    #[test]
    fn test_recording_router_tracks_receipts() {
        let router = RecordingRouter::new();
        let a = unique_address("a");
        let b = unique_address("b");

        router
            .route(&[
                TransferLeg {
                    from: a,
                    to: b,
                    amount: 5,
                },
                TransferLeg {
                    from: a,
                    to: b,
                    amount: 7,
                },
            ])
            .unwrap();

        assert_eq!(router.received(&b), 12);
        assert_eq!(router.routed().len(), 2);
    }
}
