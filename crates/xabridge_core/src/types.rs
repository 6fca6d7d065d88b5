//! Core type definitions for the XA bridge.

use crate::error::{XaError, XaResult};
use std::fmt;
use std::ops::BitOr;
use uuid::Uuid;

/// Maximum size of a global transaction id, in bytes.
pub const MAX_GTRID_SIZE: usize = 64;

/// Maximum size of a branch qualifier, in bytes.
pub const MAX_BQUAL_SIZE: usize = 64;

/// Identifier of one branch of a global transaction.
///
/// Xids are minted by the transaction manager. The bridge only stores and
/// compares them; equality is by value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Creates an xid, validating the XA size limits.
    pub fn new(
        format_id: i32,
        global_transaction_id: impl Into<Vec<u8>>,
        branch_qualifier: impl Into<Vec<u8>>,
    ) -> XaResult<Self> {
        let global_transaction_id = global_transaction_id.into();
        let branch_qualifier = branch_qualifier.into();

        if global_transaction_id.len() > MAX_GTRID_SIZE {
            return Err(XaError::invalid_arguments(format!(
                "global transaction id is {} bytes, limit is {MAX_GTRID_SIZE}",
                global_transaction_id.len()
            )));
        }
        if branch_qualifier.len() > MAX_BQUAL_SIZE {
            return Err(XaError::invalid_arguments(format!(
                "branch qualifier is {} bytes, limit is {MAX_BQUAL_SIZE}",
                branch_qualifier.len()
            )));
        }

        Ok(Self {
            format_id,
            global_transaction_id,
            branch_qualifier,
        })
    }

    /// Returns the format identifier.
    #[must_use]
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Returns the global transaction id bytes.
    #[must_use]
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// Returns the branch qualifier bytes.
    #[must_use]
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }

    /// Returns true if both xids belong to the same global transaction.
    #[must_use]
    pub fn same_global_transaction(&self, other: &Xid) -> bool {
        self.format_id == other.format_id
            && self.global_transaction_id == other.global_transaction_id
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        write_hex(f, &self.global_transaction_id)?;
        f.write_str(":")?;
        write_hex(f, &self.branch_qualifier)
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid({self})")
    }
}

/// XA flag bit set passed to `start`, `end` and `recover`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XaFlags(u32);

impl XaFlags {
    /// No flags.
    pub const NO_FLAGS: Self = Self(0);
    /// Caller is joining an existing branch.
    pub const JOIN: Self = Self(0x0020_0000);
    /// Caller is resuming a suspended branch.
    pub const RESUME: Self = Self(0x0800_0000);
    /// Work on the branch ended successfully.
    pub const SUCCESS: Self = Self(0x0400_0000);
    /// Work on the branch failed; the branch is rollback-only.
    pub const FAIL: Self = Self(0x2000_0000);
    /// Caller is suspending the branch.
    pub const SUSPEND: Self = Self(0x0200_0000);
    /// Start a recovery scan.
    pub const START_RSCAN: Self = Self(0x0100_0000);
    /// End a recovery scan.
    pub const END_RSCAN: Self = Self(0x0080_0000);
    /// Commit in a single phase.
    pub const ONE_PHASE: Self = Self(0x4000_0000);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the flags are exactly `JOIN` or exactly `RESUME`.
    #[must_use]
    pub const fn is_join_or_resume(self) -> bool {
        self.0 == Self::JOIN.0 || self.0 == Self::RESUME.0
    }
}

impl BitOr for XaFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Status of a transaction as reported by the transaction manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Transaction is running.
    Active,
    /// Transaction is running but can only roll back.
    MarkedRollback,
    /// All participants voted; outcome not yet decided.
    Prepared,
    /// Transaction committed.
    Committed,
    /// Transaction rolled back.
    RolledBack,
    /// Status cannot be determined.
    Unknown,
    /// No transaction is associated with the caller.
    NoTransaction,
    /// Prepare phase is in progress.
    Preparing,
    /// Commit phase is in progress.
    Committing,
    /// Rollback is in progress.
    RollingBack,
}

impl TransactionStatus {
    /// Returns true if resources can still be meaningfully enlisted.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(
            self,
            TransactionStatus::Active
                | TransactionStatus::MarkedRollback
                | TransactionStatus::Preparing
                | TransactionStatus::Prepared
                | TransactionStatus::Committing
                | TransactionStatus::RollingBack
        )
    }

    /// Returns true for the two terminal outcomes.
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::RolledBack
        )
    }
}

/// Vote returned by `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareVote {
    /// Branch is ready to commit; phase two must follow.
    Ok,
    /// Branch did no work; phase two must be skipped for it.
    ReadOnly,
}

/// Typed outcome of a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The resource committed.
    Committed,
    /// The resource rolled back instead of committing.
    RolledBack,
    /// The resource failed; the outcome is not known.
    RmError(String),
}

impl CommitOutcome {
    /// Classifies the result of an XA commit call.
    #[must_use]
    pub fn from_result(result: &XaResult<()>) -> Self {
        match result {
            Ok(()) => CommitOutcome::Committed,
            Err(e) if e.is_rollback() => CommitOutcome::RolledBack,
            Err(e) => CommitOutcome::RmError(e.to_string()),
        }
    }
}

/// Per-integration key into the transaction-scoped resource registry.
///
/// One key is minted per association manager for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssociationKey(Uuid);

impl AssociationKey {
    /// Creates a new random key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AssociationKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assoc:{}", self.0)
    }
}
