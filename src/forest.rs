use crate::parse::{LedgerDraft, TemplateDraft};
use crate::{Account, Error, Ledger, Source};

/// Number of characters compared when matching a parent GUID.
const GUID_LEN: usize = 32;

fn same_guid(a: &str, b: &str) -> bool {
    let a = &a.as_bytes()[..a.len().min(GUID_LEN)];
    let b = &b.as_bytes()[..b.len().min(GUID_LEN)];
    a == b
}

/// Moves every account of `pool` whose parent is `parent` into
/// `parent.children`, in pool order, after attaching its own children.
fn collect_children(parent: &mut Account, pool: &mut [Option<Account>]) {
    for index in 0..pool.len() {
        let is_child = match &pool[index] {
            Some(account) => account
                .parent
                .as_deref()
                .map_or(false, |guid| same_guid(guid, &parent.guid)),
            None => false,
        };
        if !is_child {
            continue;
        }
        if let Some(mut child) = pool[index].take() {
            collect_children(&mut child, pool);
            parent.children.push(child);
        }
    }
}

/// Builds the account tree from a flat list of accounts in file order.
///
/// The first `ROOT` account becomes the root. Accounts that cannot be reached
/// from it through parent links are dropped.
pub fn build_forest(accounts: Vec<Account>) -> Option<Account> {
    let mut pool: Vec<Option<Account>> = accounts.into_iter().map(Some).collect();
    let index = pool
        .iter()
        .position(|slot| slot.as_ref().map_or(false, Account::is_root))?;
    let mut root = pool[index].take()?;
    collect_children(&mut root, &mut pool);
    let orphans = pool.iter().flatten().count();
    if orphans > 0 {
        log::trace!("dropped {} accounts unreachable from {}", orphans, root.guid);
    }
    Some(root)
}

impl LedgerDraft {
    /// Checks that the book has an ID and a root account, and links the
    /// accounts into trees.
    pub fn into_ledger(self, errors: &mut Vec<Error>) -> Result<Ledger, Error> {
        let src = Source::at(self.file.clone(), Default::default());
        let book_id = self
            .book_id
            .ok_or_else(|| Error::format("No <book:id> found.".to_string(), src.clone()))?;
        let root = build_forest(self.accounts)
            .ok_or_else(|| Error::format("No ROOT account found.".to_string(), src.clone()))?;
        let mut ledger = Ledger::new(&book_id, root);
        ledger.transactions = self.txns;
        if let Some(TemplateDraft { accounts, txns }) = self.template {
            ledger.template_root = build_forest(accounts);
            if ledger.template_root.is_none() && !txns.is_empty() {
                let warning = Error::integrity(
                    "Template transactions without a ROOT template account.".to_string(),
                    src,
                );
                log::warn!("{}", warning);
                errors.push(warning);
            }
            ledger.template_transactions = txns;
        }
        ledger.scheduled_transactions = self.sxs;
        log::debug!(
            "read {} accounts, {} transactions, {} scheduled transactions",
            ledger.account_count(),
            ledger.transactions.len(),
            ledger.scheduled_transactions.len()
        );
        Ok(ledger)
    }
}
