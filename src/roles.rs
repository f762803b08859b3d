use crate::error::MarketError;
use crate::id::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Roles understood by the access gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Administers role membership, including other admins
    Admin,
    /// May create editions and grow their supply
    Minter,
}

/// Role membership table consulted before privileged mutations.
///
/// `Admin` administers membership of every role; the gate itself carries no
/// other policy. Grants and revocations are idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    members: HashMap<Role, HashSet<Address>>,
}

impl RoleTable {
    /// Create a table with `admin` seeded into the `Admin` role
    pub fn with_admin(admin: Address) -> Self {
        let mut table = RoleTable::default();
        table
            .members
            .entry(Role::Admin)
            .or_default()
            .insert(admin);
        table
    }

    /// Check whether `address` holds `role`
    pub fn has_role(&self, role: Role, address: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(address))
            .unwrap_or(false)
    }

    /// Grant `role` to `address`.
    ///
    /// # Parameters
    /// * `role` - The role to grant
    /// * `address` - The address receiving the role
    /// * `caller` - Must hold `Admin`
    ///
    /// # Returns
    /// Ok(()) if granted (or already held), `Unauthorized` otherwise
    pub fn grant_role(
        &mut self,
        role: Role,
        address: Address,
        caller: &Address,
    ) -> Result<(), MarketError> {
        self.require_admin(caller)?;
        self.members.entry(role).or_default().insert(address);
        Ok(())
    }

    /// Revoke `role` from `address`. Idempotent; admin-gated like `grant_role`.
    pub fn revoke_role(
        &mut self,
        role: Role,
        address: &Address,
        caller: &Address,
    ) -> Result<(), MarketError> {
        self.require_admin(caller)?;
        if let Some(set) = self.members.get_mut(&role) {
            set.remove(address);
        }
        Ok(())
    }

    fn require_admin(&self, caller: &Address) -> Result<(), MarketError> {
        if self.has_role(Role::Admin, caller) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(format!(
                "{} does not hold the admin role",
                caller
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::unique_address;

    #[test]
    fn test_admin_seeded_at_construction() {
        let admin = unique_address("admin");
        let table = RoleTable::with_admin(admin);
        assert!(table.has_role(Role::Admin, &admin));
        assert!(!table.has_role(Role::Minter, &admin));
    }

    #[test]
    fn test_admin_grants_minter() {
        let admin = unique_address("admin");
        let artist = unique_address("artist");
        let mut table = RoleTable::with_admin(admin);

        table
            .grant_role(Role::Minter, artist, &admin)
            .expect("admin grant should succeed");
        assert!(table.has_role(Role::Minter, &artist));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let admin = unique_address("admin");
        let artist = unique_address("artist");
        let mut table = RoleTable::with_admin(admin);

        let result = table.grant_role(Role::Minter, artist, &artist);
        assert!(matches!(result, Err(MarketError::Unauthorized(_))));
        assert!(!table.has_role(Role::Minter, &artist));
    }

    #[test]
    fn test_grant_is_idempotent() {
        let admin = unique_address("admin");
        let artist = unique_address("artist");
        let mut table = RoleTable::with_admin(admin);

        table.grant_role(Role::Minter, artist, &admin).unwrap();
        table.grant_role(Role::Minter, artist, &admin).unwrap();
        assert!(table.has_role(Role::Minter, &artist));
    }

    #[test]
    fn test_revoke_role() {
        let admin = unique_address("admin");
        let artist = unique_address("artist");
        let mut table = RoleTable::with_admin(admin);

        table.grant_role(Role::Minter, artist, &admin).unwrap();
        table.revoke_role(Role::Minter, &artist, &admin).unwrap();
        assert!(!table.has_role(Role::Minter, &artist));

        // Revoking again is a no-op
        table.revoke_role(Role::Minter, &artist, &admin).unwrap();
    }
}
