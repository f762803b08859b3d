use crate::error::MarketError;
use crate::id::{Address, TokenId};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A committed ledger mutation, as recorded in the operation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// Supply was created or grown and credited to the caller
    Mint {
        token_id: TokenId,
        amount: u64,
        caller: Address,
    },

    /// An operator approval was toggled
    SetApproval {
        owner: Address,
        operator: Address,
        allowed: bool,
    },

    /// Units were escrowed into a new listing
    ListingCreated {
        id: u64,
        issuer: Address,
        token_id: TokenId,
        amount: u64,
        unit_price: u64,
        royalty_bps: u16,
        creator: Address,
    },

    /// Remaining escrow was returned to the issuer
    ListingCancelled { id: u64, returned: u64 },

    /// A purchase settled against a listing
    Settled {
        id: u64,
        buyer: Address,
        units: u64,
        paid: u64,
        royalty_paid: u64,
    },
}

/// An operation log entry: the operation plus when it was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    /// The committed operation
    pub op: LedgerOp,

    /// Timestamp of when this operation was recorded, in milliseconds
    pub timestamp: u64,
}

/// Durable, append-only record of every committed ledger operation
pub trait OperationLog {
    /// Initialize the operation log
    ///
    /// # Parameters
    /// * `path` - The file path for the operation log
    ///
    /// # Returns
    /// Ok(()) if successful, Err otherwise
    fn init(&self, path: &Path) -> Result<(), MarketError>;

    /// Record a committed operation
    ///
    /// # Parameters
    /// * `op` - The operation to record
    ///
    /// # Returns
    /// Ok(()) if successful, Err otherwise
    fn record(&self, op: &LedgerOp) -> Result<(), MarketError>;

    /// Get an iterator over all recorded entries, oldest first
    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<OperationLogEntry, MarketError>> + '_>;
}

/// A basic file-based operation log implementation
pub struct FileOperationLog {
    /// Path to the log file
    path: Arc<Mutex<PathBuf>>,

    /// File handle for writing
    file: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl FileOperationLog {
    /// Create a new file-based operation log
    pub fn new() -> Self {
        Self {
            path: Arc::new(Mutex::new(PathBuf::new())),
            file: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the current timestamp in milliseconds
    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Default for FileOperationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLog for FileOperationLog {
    fn init(&self, path: &Path) -> Result<(), MarketError> {
        let mut file_guard = self
            .file
            .lock()
            .map_err(|e| MarketError::Wal(format!("Failed to acquire lock: {}", e)))?;

        // Create or open the log file
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|e| MarketError::Wal(format!("Failed to open log file: {}", e)))?;

        let writer = BufWriter::new(file);

        // Store the file writer
        *file_guard = Some(writer);

        // Store the path
        let mut path_guard = self
            .path
            .lock()
            .map_err(|e| MarketError::Wal(format!("Failed to acquire path lock: {}", e)))?;
        *path_guard = path.to_path_buf();

        Ok(())
    }

    fn record(&self, op: &LedgerOp) -> Result<(), MarketError> {
        let mut file_guard = self
            .file
            .lock()
            .map_err(|e| MarketError::Wal(format!("Failed to acquire lock: {}", e)))?;

        let file = file_guard
            .as_mut()
            .ok_or_else(|| MarketError::Wal("Operation log has not been initialized".to_string()))?;

        let entry = OperationLogEntry {
            op: op.clone(),
            timestamp: Self::current_timestamp(),
        };

        // Serialize the entry
        let serialized = bincode::serialize(&entry)?;

        // Write the entry length and data
        let entry_len = serialized.len() as u64;
        file.write_all(&entry_len.to_le_bytes())?;
        file.write_all(&serialized)?;
        file.flush()?;

        Ok(())
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<OperationLogEntry, MarketError>> + '_> {
        // Get the path
        let path_guard = match self.path.lock() {
            Ok(guard) => guard,
            Err(_) => return Box::new(std::iter::empty()),
        };
        let path = path_guard.clone();
        drop(path_guard);

        // Create a new file reader
        match File::open(&path) {
            Ok(file) => Box::new(LogEntryIterator {
                reader: BufReader::new(file),
            }),
            Err(_) => {
                // Return an empty iterator if we can't open the file
                Box::new(std::iter::empty::<Result<OperationLogEntry, MarketError>>())
            }
        }
    }
}

/// Iterator over operation log entries
struct LogEntryIterator {
    reader: BufReader<File>,
}

impl Iterator for LogEntryIterator {
    type Item = Result<OperationLogEntry, MarketError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Read the entry length
        let mut len_buf = [0u8; 8];
        match self.reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // End of file
                return None;
            }
            Err(e) => {
                return Some(Err(MarketError::from(e)));
            }
        }

        let entry_len = u64::from_le_bytes(len_buf);

        // Read the entry data
        let mut entry_data = vec![0u8; entry_len as usize];
        if let Err(e) = self.reader.read_exact(&mut entry_data) {
            return Some(Err(MarketError::from(e)));
        }

        // Deserialize the entry
        match bincode::deserialize(&entry_data) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => Some(Err(MarketError::from(e))),
        }
    }
}
