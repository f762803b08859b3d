use crate::error::MarketError;
use crate::id::{Address, TokenId};
use crate::ledger::Market;
use crate::metadata::{MetadataResolver, ResolveState};
use serde::Serialize;

/// A listing joined with whatever metadata resolved, ready for display
#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub listing_id: u64,
    pub issuer: Address,
    pub token_id: TokenId,
    pub amount_remaining: u64,
    pub unit_price: u64,
    pub royalty_bps: u16,
    pub creator: Address,
    pub metadata_uri: String,

    /// Display name from the descriptor, absent when unresolved
    pub display_name: Option<String>,

    /// Content address of the artwork, absent when unresolved
    pub image: Option<String>,

    pub metadata_state: ResolveState,
}

/// Projects ledger state and resolved metadata into display snapshots.
///
/// Each `snapshot` call is a fresh full pass over the open listings; there
/// is no incremental diffing.
pub struct SnapshotBuilder<'a> {
    market: &'a Market,
    resolver: &'a MetadataResolver,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(market: &'a Market, resolver: &'a MetadataResolver) -> Self {
        Self { market, resolver }
    }

    /// Materialize views for every open listing, in listing-id order.
    ///
    /// Metadata is resolved concurrently with per-item bounds; a listing
    /// whose metadata is unavailable still appears, with its display fields
    /// absent.
    pub async fn snapshot(&self) -> Result<Vec<ListingView>, MarketError> {
        let listings = self.market.open_listings()?;

        let items = listings
            .iter()
            .map(|listing| {
                let uri = self
                    .market
                    .edition(listing.token_id)?
                    .map(|edition| edition.metadata_uri)
                    .unwrap_or_default();
                Ok((listing.token_id, uri))
            })
            .collect::<Result<Vec<(TokenId, String)>, MarketError>>()?;

        let resolved = self.resolver.resolve_many(&items).await;

        Ok(listings
            .into_iter()
            .zip(resolved)
            .map(|(listing, metadata)| {
                let document = metadata.document.as_ref();
                ListingView {
                    listing_id: listing.id,
                    issuer: listing.issuer,
                    token_id: listing.token_id,
                    amount_remaining: listing.amount_remaining,
                    unit_price: listing.unit_price,
                    royalty_bps: listing.royalty_bps,
                    creator: listing.creator,
                    metadata_uri: metadata.uri,
                    display_name: document.and_then(|d| d.name.clone()),
                    image: document.and_then(|d| d.artifact_uri.clone()),
                    metadata_state: metadata.state,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::unique_address;
    use crate::metadata::tests::FixtureFetcher;
    use crate::roles::Role;
    use std::sync::Arc;

    const DOC_ONE: &str = r#"{"name":"First","artifactUri":"ipfs://QmArtOne"}"#;
    const DOC_TWO: &str = r#"{"name":"Second","artifactUri":"ipfs://QmArtTwo"}"#;

    fn market_with_listings() -> (Market, Address) {
        let admin = unique_address("admin");
        let artist = unique_address("artist");
        let market = Market::new(admin);
        market.grant_role(Role::Minter, artist, &admin).unwrap();
        market
            .mint(artist, 1, 10, "ipfs://QmMetaOne", 250)
            .unwrap();
        market
            .mint(artist, 2, 4, "ipfs://QmMetaTwo", 0)
            .unwrap();
        market
            .set_approval(artist, market.operator(), true)
            .unwrap();
        market.create_listing(artist, 1, 10, 7, 250, artist).unwrap();
        market.create_listing(artist, 2, 4, 3, 0, artist).unwrap();
        (market, artist)
    }

    #[tokio::test]
    async fn test_snapshot_joins_listings_with_metadata() {
        let (market, _) = market_with_listings();
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_document("ipfs://QmMetaOne", DOC_ONE)
                .with_document("ipfs://QmMetaTwo", DOC_TWO),
        );
        let resolver = MetadataResolver::new(fetcher);

        let views = SnapshotBuilder::new(&market, &resolver)
            .snapshot()
            .await
            .unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].listing_id, 0);
        assert_eq!(views[0].display_name.as_deref(), Some("First"));
        assert_eq!(views[0].image.as_deref(), Some("ipfs://QmArtOne"));
        assert_eq!(views[0].metadata_state, ResolveState::Resolved);
        assert_eq!(views[0].amount_remaining, 10);
        assert_eq!(views[0].unit_price, 7);

        assert_eq!(views[1].listing_id, 1);
        assert_eq!(views[1].display_name.as_deref(), Some("Second"));
    }

    #[tokio::test]
    async fn test_failed_metadata_degrades_only_its_listing() {
        let (market, _) = market_with_listings();
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_document("ipfs://QmMetaOne", DOC_ONE)
                .with_failure("ipfs://QmMetaTwo"),
        );
        let resolver = MetadataResolver::new(fetcher);

        let views = SnapshotBuilder::new(&market, &resolver)
            .snapshot()
            .await
            .unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].metadata_state, ResolveState::Resolved);
        assert_eq!(views[0].display_name.as_deref(), Some("First"));

        // The failing token still lists, with display fields absent
        assert_eq!(views[1].metadata_state, ResolveState::Failed);
        assert_eq!(views[1].display_name, None);
        assert_eq!(views[1].image, None);
    }

    #[tokio::test]
    async fn test_snapshot_excludes_closed_listings() {
        let (market, artist) = market_with_listings();
        market.cancel_listing(0, &artist).unwrap();

        let fetcher = Arc::new(FixtureFetcher::new().with_document("ipfs://QmMetaTwo", DOC_TWO));
        let resolver = MetadataResolver::new(fetcher);

        let views = SnapshotBuilder::new(&market, &resolver)
            .snapshot()
            .await
            .unwrap();

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].listing_id, 1);
    }

    #[tokio::test]
    async fn test_empty_market_snapshots_empty() {
        let market = Market::new(unique_address("admin"));
        let resolver = MetadataResolver::new(Arc::new(FixtureFetcher::new()));

        let views = SnapshotBuilder::new(&market, &resolver)
            .snapshot()
            .await
            .unwrap();
        assert!(views.is_empty());
    }
}
