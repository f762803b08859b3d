pub mod error;
pub mod id;
pub mod ledger;
pub mod metadata;
pub mod receipts;
pub mod registry;
pub mod roles;
pub mod settlement;
pub mod view;
pub mod wal;

// Re-export the main types for convenience
pub use error::MarketError;
pub use id::{Address, TokenId};
pub use ledger::{Listing, Market};
pub use metadata::{
    ContentFetcher, MetadataDocument, MetadataResolver, ResolveState, ResolvedMetadata,
    CONTENT_SCHEME, DEFAULT_FETCH_TIMEOUT,
};
pub use receipts::{
    InMemoryReceiptStore, ReceiptIterator, ReceiptStore, ReceiptVecIterator, SettlementReceipt,
};
pub use registry::{Edition, MAX_ROYALTY_BPS};
pub use roles::{Role, RoleTable};
pub use settlement::{PaymentRouter, RecordingRouter, SettlementPlan, TransferLeg};
pub use view::{ListingView, SnapshotBuilder};
pub use wal::{FileOperationLog, LedgerOp, OperationLog, OperationLogEntry};
