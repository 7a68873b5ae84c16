use crate::options::Options;
use crate::parse::Parser;
use crate::write::Writer;
pub use chrono::NaiveDate as GDate;
use chrono::{DateTime, FixedOffset, TimeZone};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use getset::{CopyGetters, Getters, MutGetters, Setters};
use rust_decimal::Decimal;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Representing a location, line number and column number, in a source stream.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl From<(usize, usize)> for Location {
    fn from(tuple: (usize, usize)) -> Self {
        Location {
            line: tuple.0,
            col: tuple.1,
        }
    }
}

/// A string wrapped in [`Arc`](std::sync::Arc)
/// representing the source file path, or `<stream>` for anonymous readers.
pub type SrcFile = Arc<String>;

/// Represents a range in a source stream, used for locating errors.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub file: SrcFile,
    pub start: Location,
    pub end: Location,
}

impl Source {
    pub(crate) fn at(file: SrcFile, location: Location) -> Self {
        Source {
            file,
            start: location,
            end: location,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.line, self.start.col)
    }
}

/// Kinds of errors encountered while reading or writing a [`Ledger`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The underlying stream failed.
    Io,
    /// Malformed tag or attribute syntax, a missing closing tag, or a field
    /// whose content cannot be decoded.
    Format,
    /// The file cannot be opened, or it does not start with the expected XML
    /// declaration.
    NotFound,
    /// A closing tag did not match the element being read. Reading continues.
    Integrity,
}

/// The level of an error. Only [`ErrorLevel::Error`] aborts reading.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    Warning,
    Error,
}

/// Contains the full information of an error.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Error {
    pub msg: String,
    pub src: Source,
    pub r#type: ErrorType,
    pub level: ErrorLevel,
}

impl Error {
    pub(crate) fn io(err: io::Error, file: SrcFile) -> Self {
        Error {
            msg: format!("I/O error: {}", err),
            src: Source::at(file, Location::default()),
            r#type: ErrorType::Io,
            level: ErrorLevel::Error,
        }
    }

    pub(crate) fn format(msg: String, src: Source) -> Self {
        Error {
            msg,
            src,
            r#type: ErrorType::Format,
            level: ErrorLevel::Error,
        }
    }

    pub(crate) fn integrity(msg: String, src: Source) -> Self {
        Error {
            msg,
            src,
            r#type: ErrorType::Integrity,
            level: ErrorLevel::Warning,
        }
    }

    pub(crate) fn not_found(msg: String, file: SrcFile) -> Self {
        Error {
            msg,
            src: Source::at(file, Location::default()),
            r#type: ErrorType::NotFound,
            level: ErrorLevel::Error,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {}\n  {}:{}:{}",
            self.level, self.msg, self.src.file, self.src.start.line, self.src.start.col
        )
    }
}

impl std::error::Error for Error {}

/// A rational number `num/denom`, used for split values, quantities and
/// numeric slots.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Numeric {
    pub num: i32,
    pub denom: u32,
}

impl Numeric {
    pub fn new(num: i32, denom: u32) -> Self {
        Numeric { num, denom }
    }

    /// Converts the rational into a [`Decimal`]. Returns `None` if the
    /// denominator is zero.
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from(self.num).checked_div(Decimal::from(self.denom))
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

impl FromStr for Numeric {
    type Err = String;

    /// `"N/D"` keeps both parts verbatim; a bare integer gets denominator `1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("Invalid numeric value: {:?}.", s);
        match s.split_once('/') {
            Some((num, denom)) => Ok(Numeric {
                num: num.trim().parse().map_err(|_| invalid())?,
                denom: denom.trim().parse().map_err(|_| invalid())?,
            }),
            None => Ok(Numeric {
                num: s.parse().map_err(|_| invalid())?,
                denom: 1,
            }),
        }
    }
}

/// A zoned timestamp. The offset is the one written in the file; the writer
/// re-renders it through the configured zone.
pub type Timestamp = DateTime<FixedOffset>;

/// A commodity reference: namespace plus code, e.g. `ISO4217` / `USD`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Commodity {
    pub space: String,
    pub id: String,
}

impl Commodity {
    pub fn new(space: &str, id: &str) -> Self {
        Commodity {
            space: space.to_string(),
            id: id.to_string(),
        }
    }

    pub fn usd() -> Self {
        Commodity::new("ISO4217", "USD")
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.id)
    }
}

/// The typed value of a [`Slot`], selected by the `type` attribute of
/// `<slot:value>`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    String(String),
    Guid(String),
    GDate(GDate),
    Numeric(Numeric),
    /// A nested, ordered list of slots. An empty frame is always written
    /// as `<slot:value type="frame"/>`, whichever form it was read from.
    Frame(Vec<Slot>),
}

impl SlotValue {
    /// The value of the `type` attribute for this kind of value.
    pub fn type_name(&self) -> &'static str {
        match self {
            SlotValue::String(_) => "string",
            SlotValue::Guid(_) => "guid",
            SlotValue::GDate(_) => "gdate",
            SlotValue::Numeric(_) => "numeric",
            SlotValue::Frame(_) => "frame",
        }
    }
}

/// A key plus a typed value, attached to accounts, transactions and splits.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: String,
    pub value: SlotValue,
}

impl Slot {
    pub fn new(key: &str, value: SlotValue) -> Self {
        Slot {
            key: key.to_string(),
            value,
        }
    }

    /// Returns the nested slots if this slot holds a frame.
    pub fn frame(&self) -> Option<&[Slot]> {
        match &self.value {
            SlotValue::Frame(slots) => Some(slots),
            _ => None,
        }
    }
}

pub(crate) fn find_slot<'a>(slots: &'a [Slot], key: &str) -> Option<&'a Slot> {
    slots.iter().find(|slot| slot.key == key)
}

/// One leg of a transaction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub guid: String,
    /// `n` (new), `c` (cleared) or `y` (reconciled).
    pub reconciled_state: char,
    pub value: Numeric,
    pub quantity: Numeric,
    /// GUID of the account this split debits or credits.
    pub account: String,
    pub slots: Vec<Slot>,
}

/// Represents a transaction made of balanced splits.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, MutGetters, Setters)]
pub struct Transaction {
    /// Returns the GUID of this transaction.
    #[getset(get = "pub")]
    pub(crate) guid: String,

    /// Returns the currency the split values are expressed in.
    #[getset(get = "pub", set = "pub")]
    pub(crate) currency: Commodity,

    /// Returns the description.
    #[getset(get = "pub", set = "pub")]
    pub(crate) description: String,

    /// Returns the date the transaction was posted.
    #[getset(get = "pub", set = "pub")]
    pub(crate) posted: Timestamp,

    /// Returns the date the transaction was entered.
    #[getset(get = "pub", set = "pub")]
    pub(crate) entered: Timestamp,

    /// Returns the splits, in file order.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) splits: Vec<Split>,

    /// Returns the slots, in file order.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) slots: Vec<Slot>,
}

impl Transaction {
    pub fn new(guid: &str, description: &str, posted: Timestamp, entered: Timestamp) -> Self {
        Transaction {
            guid: guid.to_string(),
            currency: Commodity::usd(),
            description: description.to_string(),
            posted,
            entered,
            splits: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Returns the value of the first split that refers to `account`, or `None`
    /// if no split does.
    pub fn value_for_account(&self, account: &str) -> Option<Numeric> {
        self.splits
            .iter()
            .find(|split| split.account == account)
            .map(|split| split.value)
    }

    pub fn slot(&self, key: &str) -> Option<&Slot> {
        find_slot(&self.slots, key)
    }
}

/// An account and, after the forest has been built, all of its sub-accounts.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, MutGetters, Setters)]
pub struct Account {
    /// Returns the GUID of this account.
    #[getset(get = "pub")]
    pub(crate) guid: String,

    /// Returns the account type, e.g. `ROOT`, `BANK` or `EXPENSE`.
    #[getset(get = "pub")]
    pub(crate) kind: String,

    /// Returns the account name.
    #[getset(get = "pub", set = "pub")]
    pub(crate) name: String,

    #[getset(get = "pub", set = "pub")]
    pub(crate) description: Option<String>,

    /// Returns the commodity the account is denominated in.
    #[getset(get = "pub", set = "pub")]
    pub(crate) commodity: Option<Commodity>,

    /// Returns the smallest fraction of the commodity this account tracks.
    /// Written only when present, independently of `commodity`.
    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) commodity_scu: Option<i32>,

    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) slots: Vec<Slot>,

    /// Returns the GUID of the parent account. `None` for root accounts.
    #[getset(get = "pub", set = "pub")]
    pub(crate) parent: Option<String>,

    /// Returns the sub-accounts, in file order.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) children: Vec<Account>,
}

impl Account {
    pub fn new(guid: &str, kind: &str, name: &str) -> Self {
        Account {
            guid: guid.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            description: None,
            commodity: None,
            commodity_scu: None,
            slots: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == "ROOT"
    }

    /// Returns the direct sub-account called `name`.
    pub fn child_by_name(&self, name: &str) -> Option<&Account> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Counts all accounts below this one, at any depth.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// Depth-first search for the account with `guid`, this one included.
    pub fn find(&self, guid: &str) -> Option<&Account> {
        if self.guid == guid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(guid))
    }

    pub fn slot(&self, key: &str) -> Option<&Slot> {
        find_slot(&self.slots, key)
    }
}

/// A single recurrence rule of a [`Schedule`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub mult: i32,
    /// e.g. `month`, `week` or `end of month`.
    pub period_type: String,
    pub start: GDate,
    pub weekend_adj: Option<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    pub recurrences: Vec<Recurrence>,
}

/// A template for automatically recurring transactions.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default, Getters, CopyGetters, Setters)]
pub struct ScheduledTransaction {
    #[getset(get = "pub")]
    pub(crate) guid: String,

    #[getset(get = "pub", set = "pub")]
    pub(crate) name: String,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) enabled: bool,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) auto_create: bool,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) auto_create_notify: bool,

    /// Returns how many days in advance instances are created.
    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) advance_create_days: i32,

    /// Returns how many days in advance the user is reminded.
    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) advance_remind_days: i32,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) instance_count: i32,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) start: Option<GDate>,

    #[getset(get_copy = "pub", set = "pub")]
    pub(crate) last: Option<GDate>,

    /// Returns the GUID of the template account holding the transaction body.
    #[getset(get = "pub", set = "pub")]
    pub(crate) template_account: String,

    #[getset(get = "pub", set = "pub")]
    pub(crate) schedule: Schedule,
}

impl ScheduledTransaction {
    pub fn new(guid: &str, name: &str, template_account: &str) -> Self {
        ScheduledTransaction {
            guid: guid.to_string(),
            name: name.to_string(),
            template_account: template_account.to_string(),
            ..Default::default()
        }
    }
}

/// Represents a whole ledger file: the account tree, the transactions, and the
/// scheduled transactions with their templates.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, MutGetters, Setters)]
pub struct Ledger {
    /// Returns the GUID of the book.
    #[getset(get = "pub", set = "pub")]
    pub(crate) book_id: String,

    /// Returns the `ROOT` account with the whole account tree below it.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) root: Account,

    /// Returns the transactions, in file order.
    #[getset(get = "pub")]
    pub(crate) transactions: Vec<Transaction>,

    /// Returns the root of the template accounts used by scheduled transactions.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) template_root: Option<Account>,

    /// Returns the template transactions, in file order.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) template_transactions: Vec<Transaction>,

    /// Returns the scheduled transactions, in file order.
    #[getset(get = "pub", get_mut = "pub")]
    pub(crate) scheduled_transactions: Vec<ScheduledTransaction>,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl Ledger {
    pub fn new(book_id: &str, root: Account) -> Self {
        Ledger {
            book_id: book_id.to_string(),
            root,
            transactions: Vec::new(),
            template_root: None,
            template_transactions: Vec::new(),
            scheduled_transactions: Vec::new(),
        }
    }

    /// Reads a ledger from a plain-text stream. Returns the ledger together with
    /// the integrity warnings met on the way, or the first fatal error.
    pub fn from_reader<R: Read, Tz: TimeZone>(
        reader: R,
        options: &Options<Tz>,
    ) -> Result<(Self, Vec<Error>), Error> {
        Self::read_named(reader, Arc::new("<stream>".to_string()), options)
    }

    fn read_named<R: Read, Tz: TimeZone>(
        reader: R,
        file: SrcFile,
        options: &Options<Tz>,
    ) -> Result<(Self, Vec<Error>), Error> {
        let mut errors = Vec::new();
        let draft = Parser::parse(BufReader::new(reader), file, options, &mut errors)?;
        let ledger = draft.into_ledger(&mut errors)?;
        Ok((ledger, errors))
    }

    /// Opens a ledger file, gzip-compressed or not.
    pub fn open<P: AsRef<Path>, Tz: TimeZone>(
        path: P,
        options: &Options<Tz>,
    ) -> Result<(Self, Vec<Error>), Error> {
        let path = path.as_ref();
        let file_name: SrcFile = Arc::new(path.display().to_string());
        let file = File::open(path).map_err(|e| {
            Error::not_found(
                format!("Couldn't open {}: {}", path.display(), e),
                file_name.clone(),
            )
        })?;
        log::debug!("opening {}", path.display());
        let mut reader = BufReader::new(file);
        let compressed = reader
            .fill_buf()
            .map_err(|e| Error::io(e, file_name.clone()))?
            .starts_with(&GZIP_MAGIC);
        if compressed {
            Self::read_named(GzDecoder::new(reader), file_name, options)
        } else {
            Self::read_named(reader, file_name, options)
        }
    }

    /// Writes the ledger as plain text.
    pub fn write_to<W: Write, Tz: TimeZone>(
        &self,
        writer: W,
        options: &Options<Tz>,
    ) -> Result<(), Error> {
        Writer::new(writer, options)
            .write_ledger(self)
            .map_err(|e| Error::io(e, Arc::new("<stream>".to_string())))
    }

    /// Writes the ledger into a gzip-compressed file.
    pub fn save<P: AsRef<Path>, Tz: TimeZone>(
        &self,
        path: P,
        options: &Options<Tz>,
    ) -> Result<(), Error> {
        let path = path.as_ref();
        let file_name: SrcFile = Arc::new(path.display().to_string());
        log::debug!("saving {}", path.display());
        let result = File::create(path).and_then(|file| {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            Writer::new(&mut encoder, options).write_ledger(self)?;
            encoder.finish()?.flush()
        });
        result.map_err(|e| Error::io(e, file_name))
    }

    pub fn transaction(&self, guid: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|txn| txn.guid == guid)
    }

    pub fn add_transaction(&mut self, txn: Transaction) {
        self.transactions.push(txn);
    }

    /// Removes the transaction with `guid`, keeping the order of the others.
    pub fn remove_transaction(&mut self, guid: &str) -> Option<Transaction> {
        let index = self.transactions.iter().position(|txn| txn.guid == guid)?;
        Some(self.transactions.remove(index))
    }

    /// Counts the root account and all accounts below it.
    pub fn account_count(&self) -> usize {
        1 + self.root.descendant_count()
    }

    pub fn find_account(&self, guid: &str) -> Option<&Account> {
        self.root.find(guid)
    }
}
