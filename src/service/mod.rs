//! Quorum coordination services
//!
//! One service per protocol step: proposing a transaction, adding an owner
//! confirmation, executing once the threshold is met, and the read-only queries.
//! All of them share one relay client and receive the signing capability explicitly.

pub mod confirmation;
pub mod execution;
pub mod proposal;
pub mod query;

// Re-export for convenience
pub use confirmation::{ConfirmOutcome, ConfirmationService};
pub use execution::{AlreadyDoneReason, ExecutionOutcome, ExecutionResult, ExecutionService, ExecutionSettings};
pub use proposal::{ProposalOutcome, ProposalService};
pub use query::{PageRequest, PendingList, PendingSummary, QueryService};

use ethereum_types::{Address, H256};

use crate::error::{Result, SafeError};
use crate::relay_client::MultisigTransaction;
use crate::transaction::{compute_hash, TransactionRecord};

/// Checks the relay returned the bundle it was asked for, for the Safe being acted on.
///
/// The hash comparison in [`verified_record`] would also catch a foreign Safe (the
/// domain separator differs); this names the mismatch instead of reporting a hash.
pub(crate) fn ensure_filed_under(bundle: &MultisigTransaction, safe: &Address, expected: &H256) -> Result<()> {
    let filed_safe = bundle.safe_address()?;
    if filed_safe != *safe {
        return Err(SafeError::malformed(
            "transaction bundle",
            format!("bundle belongs to Safe {:#x}, requested {:#x}", filed_safe, safe),
        ));
    }
    let claimed = bundle.claimed_hash()?;
    if claimed != *expected {
        return Err(SafeError::malformed(
            "transaction bundle",
            format!("bundle carries safeTxHash {:#x}, requested {:#x}", claimed, expected),
        ));
    }
    Ok(())
}

/// Rebuilds the record from a relay bundle and checks it hashes to `expected`.
///
/// The relay is untrusted: this is the only way a bundle becomes something the
/// services act on.
///
/// # Returns
///
/// * `Ok(TransactionRecord)` - Record whose local hash equals `expected`
/// * `Err(SafeError::Integrity)` - Bundle contents do not hash to `expected`
pub(crate) fn verified_record(
    bundle: &MultisigTransaction,
    safe: &Address,
    chain_id: u64,
    expected: &H256,
) -> Result<TransactionRecord> {
    let record = bundle.to_record()?;
    let computed = compute_hash(&record, safe, chain_id);
    if computed != *expected {
        return Err(SafeError::Integrity {
            expected: *expected,
            computed,
        });
    }
    Ok(record)
}
