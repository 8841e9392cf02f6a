//! Account selection policy
//!
//! Pure function over the account set: filter to eligible accounts, then pick
//! the least recently used one. Never-used accounts come first, ties go to the
//! lowest lifetime usage and then the lowest id, so K equally limited accounts
//! are each handed out once before any repeats.

use crate::account::{Account, AccountId};

/// Pick the next account to hand out, or `None` if nothing is eligible.
///
/// `day` is the quota day of `now`; daily usage recorded under an older day
/// counts as zero here. The counter itself is rolled by the pool when it
/// records the selection.
pub fn select<'a, I>(accounts: I, now: u64, day: i64) -> Option<AccountId>
where
    I: IntoIterator<Item = &'a Account>,
{
    accounts
        .into_iter()
        .filter(|account| account.is_eligible(now, day))
        // Option orders None before Some, so never-used accounts win
        .min_by_key(|account| (account.last_used_at, account.total_usage_count, account.id))
        .map(|account| account.id)
}
