//! # gnucash-xml
//!
//! gnucash-xml reads and writes GnuCash XML ledger files: accounts, transactions
//! with their splits, typed slots, and scheduled transactions with their
//! templates. Files written back after parsing are byte-identical to the input
//! when the same time zone is configured.
//!
//! ```no_run
//! use chrono::Local;
//! use gnucash_xml::{Ledger, Options};
//!
//! let options = Options::new(Local);
//! let (mut ledger, warnings) = Ledger::open("books.gnucash", &options).unwrap();
//! for warning in warnings {
//!     eprintln!("{}", warning);
//! }
//! ledger.remove_transaction("b83f85a497dfb3f1d8db4c26489f57d9");
//! ledger.save("books.gnucash", &options).unwrap();
//! ```

mod forest;
mod ledger;
mod options;
pub mod parse;
pub mod utils;
mod write;

pub use forest::build_forest;
pub use ledger::*;
pub use options::*;
pub use write::Writer;
