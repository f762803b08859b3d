use crate::error::MarketError;
use crate::id::{Address, TokenId};
use crate::roles::{Role, RoleTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Royalties are expressed in basis points; 10000 bps == 100%.
pub const MAX_ROYALTY_BPS: u16 = 10_000;

/// A fungible edition class: one token id, many interchangeable units.
///
/// Immutable after creation except `total_supply`, which only grows through
/// further mint calls for the same token id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub token_id: TokenId,
    pub total_supply: u64,
    pub creator: Address,
    pub royalty_bps: u16,
    pub metadata_uri: String,
}

/// Edition table, per-owner balances and operator approvals.
///
/// Owned by the market ledger; all mutation happens inside the ledger's
/// critical section.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryState {
    editions: BTreeMap<TokenId, Edition>,
    balances: HashMap<(TokenId, Address), u64>,
    approvals: HashSet<(Address, Address)>,
}

impl RegistryState {
    /// Create an edition or grow an existing one.
    ///
    /// A new token id stores the URI and royalty and sets the caller as
    /// creator; an existing one keeps its fields (they are immutable) and
    /// only grows `total_supply`. Either way the caller is credited `amount`
    /// units.
    pub(crate) fn mint(
        &mut self,
        caller: Address,
        token_id: TokenId,
        amount: u64,
        metadata_uri: &str,
        royalty_bps: u16,
        roles: &RoleTable,
    ) -> Result<Edition, MarketError> {
        if !roles.has_role(Role::Minter, &caller) {
            return Err(MarketError::Unauthorized(format!(
                "{} does not hold the minter role",
                caller
            )));
        }
        if royalty_bps > MAX_ROYALTY_BPS {
            return Err(MarketError::InvalidRoyalty(royalty_bps));
        }
        if amount == 0 {
            return Err(MarketError::InvalidAmount(
                "mint amount must be positive".to_string(),
            ));
        }

        // All fallible steps before any state change
        self.ensure_can_credit(token_id, &caller, amount)?;

        let edition = match self.editions.get_mut(&token_id) {
            Some(edition) => {
                edition.total_supply = edition
                    .total_supply
                    .checked_add(amount)
                    .ok_or(MarketError::ArithmeticOverflow)?;
                edition.clone()
            }
            None => {
                let edition = Edition {
                    token_id,
                    total_supply: amount,
                    creator: caller,
                    royalty_bps,
                    metadata_uri: metadata_uri.to_string(),
                };
                self.editions.insert(token_id, edition.clone());
                edition
            }
        };

        self.credit(token_id, &caller, amount);
        Ok(edition)
    }

    /// Idempotent approval toggle; no side effects beyond the approval table
    pub(crate) fn set_approval(&mut self, owner: Address, operator: Address, allowed: bool) {
        if allowed {
            self.approvals.insert((owner, operator));
        } else {
            self.approvals.remove(&(owner, operator));
        }
    }

    pub(crate) fn balance_of(&self, owner: &Address, token_id: TokenId) -> u64 {
        self.balances
            .get(&(token_id, *owner))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn is_approved(&self, owner: &Address, operator: &Address) -> bool {
        self.approvals.contains(&(*owner, *operator))
    }

    pub(crate) fn edition(&self, token_id: TokenId) -> Option<&Edition> {
        self.editions.get(&token_id)
    }

    pub(crate) fn total_supply(&self, token_id: TokenId) -> u64 {
        self.editions
            .get(&token_id)
            .map(|e| e.total_supply)
            .unwrap_or(0)
    }

    /// Check that crediting would not overflow the target balance
    pub(crate) fn ensure_can_credit(
        &self,
        token_id: TokenId,
        owner: &Address,
        amount: u64,
    ) -> Result<(), MarketError> {
        self.balance_of(owner, token_id)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(MarketError::ArithmeticOverflow)
    }

    /// Credit `amount` units to `owner`. Headroom must already have been
    /// checked with `ensure_can_credit`.
    pub(crate) fn credit(&mut self, token_id: TokenId, owner: &Address, amount: u64) {
        let entry = self.balances.entry((token_id, *owner)).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Debit `amount` units from `owner`, failing if the balance is too small
    pub(crate) fn debit(
        &mut self,
        token_id: TokenId,
        owner: &Address,
        amount: u64,
    ) -> Result<(), MarketError> {
        let available = self.balance_of(owner, token_id);
        if available < amount {
            return Err(MarketError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        if available == amount {
            self.balances.remove(&(token_id, *owner));
        } else {
            self.balances.insert((token_id, *owner), available - amount);
        }
        Ok(())
    }

    /// Sum of all owner balances, widened so it cannot overflow
    pub(crate) fn held_units(&self) -> u128 {
        self.balances.values().map(|v| *v as u128).sum()
    }

    /// Sum of all edition supplies, widened so it cannot overflow
    pub(crate) fn minted_units(&self) -> u128 {
        self.editions.values().map(|e| e.total_supply as u128).sum()
    }
}
