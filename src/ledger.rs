use crate::error::MarketError;
use crate::id::{Address, TokenId};
use crate::receipts::{InMemoryReceiptStore, ReceiptStore, SettlementReceipt};
use crate::registry::{Edition, RegistryState, MAX_ROYALTY_BPS};
use crate::roles::{Role, RoleTable};
use crate::settlement::{plan_settlement, PaymentRouter};
use crate::wal::{LedgerOp, OperationLog};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// An open offer to sell escrowed units at a fixed per-unit price.
///
/// `amount_remaining` starts at the escrowed amount and only decreases;
/// once it reaches zero the listing is closed forever and its id is never
/// reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: u64,
    pub issuer: Address,
    pub token_id: TokenId,
    pub amount_remaining: u64,
    pub unit_price: u64,
    pub royalty_bps: u16,
    pub creator: Address,
}

impl Listing {
    /// A listing with no remaining inventory is closed and permanently
    /// excluded from the active set
    pub fn is_open(&self) -> bool {
        self.amount_remaining > 0
    }
}

/// Everything the ledger owns, mutated only inside one critical section
#[derive(Debug, Default)]
struct MarketState {
    registry: RegistryState,
    roles: RoleTable,
    listings: BTreeMap<u64, Listing>,
    next_listing_id: u64,
}

/// The swap ledger and settlement engine for one marketplace instance.
///
/// All tables (editions, balances, approvals, listings, roles) live behind a
/// single mutex, so every mutating operation executes with serializable
/// isolation: two concurrent purchases against the same listing can never
/// both pass the inventory check. Reads clone point-in-time copies under the
/// same lock.
///
/// Instances are self-contained; two markets share no state.
pub struct Market {
    state: Mutex<MarketState>,
    operator: Address,
    receipts: InMemoryReceiptStore,
    log: Option<Box<dyn OperationLog + Send + Sync>>,
}

impl Market {
    /// Create a market with `admin` seeded into the admin role
    pub fn new(admin: Address) -> Self {
        Self::build(admin, None)
    }

    /// Create a market that records every committed operation to `log`
    pub fn with_operation_log(admin: Address, log: Box<dyn OperationLog + Send + Sync>) -> Self {
        Self::build(admin, Some(log))
    }

    fn build(admin: Address, log: Option<Box<dyn OperationLog + Send + Sync>>) -> Self {
        // The escrow identity is off-curve: no key can ever sign for it
        let (operator, _) = Address::find_derived(&[b"swap-ledger", b"operator"]);
        Self {
            state: Mutex::new(MarketState {
                roles: RoleTable::with_admin(admin),
                ..MarketState::default()
            }),
            operator,
            receipts: InMemoryReceiptStore::new(),
            log,
        }
    }

    /// The ledger's operator identity. Owners must approve this address
    /// before their units can be escrowed.
    pub fn operator(&self) -> Address {
        self.operator
    }

    /// Receipts of every settlement against this market
    pub fn receipts(&self) -> &InMemoryReceiptStore {
        &self.receipts
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, MarketState>, MarketError> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger state lock poisoned").into())
    }

    fn record_op(&self, op: LedgerOp) -> Result<(), MarketError> {
        if let Some(log) = &self.log {
            log.record(&op)?;
        }
        Ok(())
    }

    // ---- access control -------------------------------------------------

    pub fn has_role(&self, role: Role, address: &Address) -> Result<bool, MarketError> {
        Ok(self.lock_state()?.roles.has_role(role, address))
    }

    pub fn grant_role(
        &self,
        role: Role,
        address: Address,
        caller: &Address,
    ) -> Result<(), MarketError> {
        self.lock_state()?.roles.grant_role(role, address, caller)
    }

    pub fn revoke_role(
        &self,
        role: Role,
        address: &Address,
        caller: &Address,
    ) -> Result<(), MarketError> {
        self.lock_state()?.roles.revoke_role(role, address, caller)
    }

    // ---- edition registry -----------------------------------------------

    /// Mint `amount` units of `token_id` to the caller, creating the edition
    /// on first mint. Requires the minter capability.
    pub fn mint(
        &self,
        caller: Address,
        token_id: TokenId,
        amount: u64,
        metadata_uri: &str,
        royalty_bps: u16,
    ) -> Result<Edition, MarketError> {
        let mut guard = self.lock_state()?;
        let MarketState {
            registry, roles, ..
        } = &mut *guard;
        let edition = registry.mint(caller, token_id, amount, metadata_uri, royalty_bps, roles)?;
        self.record_op(LedgerOp::Mint {
            token_id,
            amount,
            caller,
        })?;
        info!(
            "minted {} units of token {} for {}",
            amount, token_id, caller
        );
        Ok(edition)
    }

    /// Toggle an operator approval for `owner`. Idempotent.
    pub fn set_approval(
        &self,
        owner: Address,
        operator: Address,
        allowed: bool,
    ) -> Result<(), MarketError> {
        let mut guard = self.lock_state()?;
        guard.registry.set_approval(owner, operator, allowed);
        self.record_op(LedgerOp::SetApproval {
            owner,
            operator,
            allowed,
        })?;
        debug!("approval {} -> {} set to {}", owner, operator, allowed);
        Ok(())
    }

    pub fn balance_of(&self, owner: &Address, token_id: TokenId) -> Result<u64, MarketError> {
        Ok(self.lock_state()?.registry.balance_of(owner, token_id))
    }

    pub fn is_approved(&self, owner: &Address, operator: &Address) -> Result<bool, MarketError> {
        Ok(self.lock_state()?.registry.is_approved(owner, operator))
    }

    pub fn edition(&self, token_id: TokenId) -> Result<Option<Edition>, MarketError> {
        Ok(self.lock_state()?.registry.edition(token_id).cloned())
    }

    /// Total units ever minted for a token, zero if the edition is unknown
    pub fn total_supply(&self, token_id: TokenId) -> Result<u64, MarketError> {
        Ok(self.lock_state()?.registry.total_supply(token_id))
    }

    // ---- swap ledger ----------------------------------------------------

    /// Escrow `amount` units of `token_id` from `issuer` into a new listing.
    ///
    /// The issuer must have approved the ledger's operator identity and hold
    /// at least `amount` units; the debit and the listing insertion happen in
    /// one critical section.
    ///
    /// # Returns
    /// The freshly assigned, monotonically increasing listing id
    pub fn create_listing(
        &self,
        issuer: Address,
        token_id: TokenId,
        amount: u64,
        unit_price: u64,
        royalty_bps: u16,
        creator: Address,
    ) -> Result<u64, MarketError> {
        if amount == 0 {
            return Err(MarketError::InvalidAmount(
                "listing amount must be positive".to_string(),
            ));
        }
        if royalty_bps > MAX_ROYALTY_BPS {
            return Err(MarketError::InvalidRoyalty(royalty_bps));
        }

        let mut guard = self.lock_state()?;
        if !guard.registry.is_approved(&issuer, &self.operator) {
            return Err(MarketError::ApprovalRequired(self.operator));
        }
        guard.registry.debit(token_id, &issuer, amount)?;

        let id = guard.next_listing_id;
        guard.next_listing_id += 1;
        guard.listings.insert(
            id,
            Listing {
                id,
                issuer,
                token_id,
                amount_remaining: amount,
                unit_price,
                royalty_bps,
                creator,
            },
        );

        self.record_op(LedgerOp::ListingCreated {
            id,
            issuer,
            token_id,
            amount,
            unit_price,
            royalty_bps,
            creator,
        })?;
        info!(
            "listing {} created: {} units of token {} at {} each",
            id, amount, token_id, unit_price
        );
        Ok(id)
    }

    /// Cancel a listing, returning the full remaining escrow to the issuer
    pub fn cancel_listing(&self, listing_id: u64, caller: &Address) -> Result<(), MarketError> {
        let mut guard = self.lock_state()?;
        let listing = guard
            .listings
            .get_mut(&listing_id)
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        if listing.issuer != *caller {
            return Err(MarketError::Unauthorized(format!(
                "{} is not the issuer of listing {}",
                caller, listing_id
            )));
        }
        if !listing.is_open() {
            return Err(MarketError::AlreadyClosed(listing_id));
        }

        let returned = listing.amount_remaining;
        let token_id = listing.token_id;
        let issuer = listing.issuer;
        listing.amount_remaining = 0;
        guard.registry.credit(token_id, &issuer, returned);

        self.record_op(LedgerOp::ListingCancelled {
            id: listing_id,
            returned,
        })?;
        info!(
            "listing {} cancelled, {} units returned to {}",
            listing_id, returned, issuer
        );
        Ok(())
    }

    // ---- settlement -----------------------------------------------------

    /// Purchase `units` from a listing for exactly `units * unit_price`.
    ///
    /// Validates inventory and payment, routes the royalty/proceeds split
    /// through `router`, then moves the units from escrow to the buyer's
    /// balance. The whole purchase is a single atomic unit of work: any
    /// failure (wrong payment, missing inventory, a refused transfer)
    /// leaves the ledger untouched.
    ///
    /// # Returns
    /// A receipt stating exactly what was paid and to whom
    pub fn buy(
        &self,
        listing_id: u64,
        units: u64,
        tendered: u64,
        buyer: Address,
        router: &dyn PaymentRouter,
    ) -> Result<SettlementReceipt, MarketError> {
        let mut guard = self.lock_state()?;
        let listing = guard
            .listings
            .get(&listing_id)
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        let token_id = listing.token_id;

        let plan = plan_settlement(listing, units, tendered, buyer)?;
        guard.registry.ensure_can_credit(token_id, &buyer, units)?;

        // Last fallible step; the ledger mutates only after the substrate
        // has applied every leg
        router.route(&plan.legs)?;

        let state = &mut *guard;
        let listing = state
            .listings
            .get_mut(&listing_id)
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        listing.amount_remaining -= units;
        state.registry.credit(token_id, &buyer, units);

        let receipt = SettlementReceipt {
            listing_id,
            buyer,
            units,
            paid: plan.total,
            royalty_paid: plan.royalty,
            settled_at: Utc::now(),
        };
        self.receipts.record(&receipt)?;
        self.record_op(LedgerOp::Settled {
            id: listing_id,
            buyer,
            units,
            paid: plan.total,
            royalty_paid: plan.royalty,
        })?;
        info!(
            "listing {} settled: {} units to {} for {} ({} royalty)",
            listing_id, units, buyer, plan.total, plan.royalty
        );
        Ok(receipt)
    }

    // ---- reads ----------------------------------------------------------

    /// Point-in-time copy of one listing, open or closed
    pub fn listing(&self, listing_id: u64) -> Result<Option<Listing>, MarketError> {
        Ok(self.lock_state()?.listings.get(&listing_id).cloned())
    }

    /// Point-in-time copies of all open listings, in id order.
    ///
    /// Walks every listing ever created; an indexed view for scale is an
    /// external collaborator's job.
    pub fn open_listings(&self) -> Result<Vec<Listing>, MarketError> {
        Ok(self
            .lock_state()?
            .listings
            .values()
            .filter(|l| l.is_open())
            .cloned()
            .collect())
    }

    /// Audit check: held balances plus open escrow must equal minted supply
    pub fn conservation_holds(&self) -> Result<bool, MarketError> {
        let guard = self.lock_state()?;
        let escrowed: u128 = guard
            .listings
            .values()
            .map(|l| l.amount_remaining as u128)
            .sum();
        Ok(guard.registry.held_units() + escrowed == guard.registry.minted_units())
    }
}
