use super::lexer::{Lexer, Tag};
use crate::options::Options;
use crate::utils::{parse_bool, parse_gdate, parse_int, parse_numeric, parse_timestamp};
use crate::{
    Account, Commodity, Error, GDate, Numeric, Recurrence, Schedule, ScheduledTransaction, Slot,
    SlotValue, Source, Split, SrcFile, Timestamp, Transaction,
};
use chrono::TimeZone;
use std::io::BufRead;

/// The declaration every ledger file starts with.
pub const XML_DECLARATION: &[u8; 40] = b"<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n";

/// Accounts and transactions found inside `<gnc:template-transactions>`.
#[derive(Debug, Default)]
pub struct TemplateDraft {
    pub accounts: Vec<Account>,
    pub txns: Vec<Transaction>,
}

/// Everything read from a ledger file, before the account forest is built.
#[derive(Debug, Default)]
pub struct LedgerDraft {
    pub file: SrcFile,
    pub book_id: Option<String>,
    /// Accounts in file order, each still carrying only its parent GUID.
    pub accounts: Vec<Account>,
    pub txns: Vec<Transaction>,
    pub template: Option<TemplateDraft>,
    pub sxs: Vec<ScheduledTransaction>,
}

pub struct Parser<'o, R, Tz: TimeZone> {
    lexer: Lexer<R>,
    options: &'o Options<Tz>,
    warnings: Vec<Error>,
}

impl<'o, R: BufRead, Tz: TimeZone> Parser<'o, R, Tz> {
    fn src(&self) -> Source {
        self.lexer.src()
    }

    fn src_of(&self, tag: &Tag) -> Source {
        Source {
            file: self.lexer.file().clone(),
            start: tag.start,
            end: self.lexer.location(),
        }
    }

    fn mismatch(&self, expected: &str, found: &Tag) -> Error {
        Error::format(
            format!(
                "Couldn't find matching <{}>, found <{}>.",
                expected, found.name
            ),
            self.src_of(found),
        )
    }

    fn warn_mismatch(&mut self, expected: &str, found: &Tag) {
        let warning = Error::integrity(
            format!(
                "Couldn't find matching <{}>, found <{}>.",
                expected, found.name
            ),
            self.src_of(found),
        );
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Reads the next tag inside an element that must still be closed by
    /// `closer`.
    fn expect_tag(&mut self, closer: &str) -> Result<Tag, Error> {
        match self.lexer.next_tag()? {
            Some(tag) => Ok(tag),
            None => Err(Error::format(
                format!("Unexpected end of stream while looking for <{}>.", closer),
                self.src(),
            )),
        }
    }

    /// Handles a child tag nobody asked for: unknown elements are skipped with
    /// their whole subtree, a stray closing tag is recorded as a warning.
    fn skip(&mut self, tag: &Tag, closer: &str) -> Result<(), Error> {
        if tag.is_close() {
            self.warn_mismatch(closer, tag);
            Ok(())
        } else {
            self.lexer.skip_element(tag, &mut self.warnings)
        }
    }

    /// Reads the text of a leaf element and its closing tag.
    fn parse_text(&mut self, tag: &Tag) -> Result<String, Error> {
        if tag.self_closing {
            return Ok(String::new());
        }
        let text = self.lexer.read_text()?;
        let closer = tag.closer();
        let end = self.expect_tag(&closer)?;
        if end.name != closer {
            return Err(self.mismatch(&closer, &end));
        }
        Ok(text)
    }

    fn parse_int_field(&mut self, tag: &Tag) -> Result<i32, Error> {
        let src = self.src_of(tag);
        let text = self.parse_text(tag)?;
        parse_int(&text, &src)
    }

    /// Reads a container such as `<sx:start>` holding a single `<gdate>`.
    fn parse_gdate_in(&mut self, container: &Tag) -> Result<GDate, Error> {
        let closer = container.closer();
        let mut date = None;
        if !container.self_closing {
            loop {
                let tag = self.expect_tag(&closer)?;
                match tag.name.as_str() {
                    "gdate" => {
                        let src = self.src_of(&tag);
                        let text = self.parse_text(&tag)?;
                        date = Some(parse_gdate(&text, &src)?);
                    }
                    name if name == closer => break,
                    _ => self.skip(&tag, &closer)?,
                }
            }
        }
        date.ok_or_else(|| {
            Error::format(
                format!("No <gdate> found in <{}>.", container.name),
                self.src_of(container),
            )
        })
    }

    fn parse_timestamp_in(&mut self, container: &Tag) -> Result<Timestamp, Error> {
        let closer = container.closer();
        let mut timestamp = None;
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "ts:date" => {
                    let src = self.src_of(&tag);
                    let text = self.parse_text(&tag)?;
                    timestamp = Some(parse_timestamp(&text, self.options, &src)?);
                }
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        timestamp.ok_or_else(|| {
            Error::format(
                format!("No <ts:date> found in <{}>.", container.name),
                self.src_of(container),
            )
        })
    }

    fn parse_commodity(&mut self, open: &Tag) -> Result<Commodity, Error> {
        let closer = open.closer();
        let mut commodity = Commodity::default();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "cmdty:space" => commodity.space = self.parse_text(&tag)?,
                "cmdty:id" => commodity.id = self.parse_text(&tag)?,
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        Ok(commodity)
    }

    fn parse_slot_value(&mut self, open: &Tag) -> Result<SlotValue, Error> {
        let kind = open.attribute("type").ok_or_else(|| {
            Error::format(
                "<slot:value> without a type attribute.".to_string(),
                self.src_of(open),
            )
        })?;
        let value = match kind {
            "string" => SlotValue::String(self.parse_text(open)?),
            "guid" => SlotValue::Guid(self.parse_text(open)?),
            "numeric" => {
                let src = self.src_of(open);
                let text = self.parse_text(open)?;
                SlotValue::Numeric(parse_numeric(&text, &src)?)
            }
            "gdate" => SlotValue::GDate(self.parse_gdate_in(open)?),
            "frame" => SlotValue::Frame(self.parse_frame(open)?),
            other => {
                return Err(Error::format(
                    format!("Unknown slot value type {:?}.", other),
                    self.src_of(open),
                ))
            }
        };
        Ok(value)
    }

    fn parse_frame(&mut self, open: &Tag) -> Result<Vec<Slot>, Error> {
        let mut slots = Vec::new();
        if open.self_closing {
            return Ok(slots);
        }
        let closer = open.closer();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "slot" => slots.push(self.parse_slot(&tag)?),
                name if name == closer => break,
                _ if tag.is_close() => return Err(self.mismatch(&closer, &tag)),
                _ => self.lexer.skip_element(&tag, &mut self.warnings)?,
            }
        }
        Ok(slots)
    }

    fn parse_slot(&mut self, open: &Tag) -> Result<Slot, Error> {
        let closer = open.closer();
        let mut key = None;
        let mut value = None;
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "slot:key" => key = Some(self.parse_text(&tag)?),
                "slot:value" => value = Some(self.parse_slot_value(&tag)?),
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        match (key, value) {
            (Some(key), Some(value)) => Ok(Slot { key, value }),
            _ => Err(Error::format(
                "A <slot> needs both <slot:key> and <slot:value>.".to_string(),
                self.src_of(open),
            )),
        }
    }

    /// Reads a slot block: `<act:slots>`, `<trn:slots>` or `<split:slots>`.
    fn parse_slots(&mut self, open: &Tag) -> Result<Vec<Slot>, Error> {
        let mut slots = Vec::new();
        if open.self_closing {
            return Ok(slots);
        }
        let closer = open.closer();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "slot" => slots.push(self.parse_slot(&tag)?),
                name if name == closer => break,
                _ if tag.is_close() => {
                    self.warn_mismatch(&closer, &tag);
                    break;
                }
                _ => self.lexer.skip_element(&tag, &mut self.warnings)?,
            }
        }
        Ok(slots)
    }

    fn parse_account(&mut self, open: &Tag) -> Result<Account, Error> {
        let closer = open.closer();
        let mut account = Account::new("", "", "");
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "act:name" => account.name = self.parse_text(&tag)?,
                "act:type" => account.kind = self.parse_text(&tag)?,
                "act:id" => account.guid = self.parse_text(&tag)?,
                "act:description" => account.description = Some(self.parse_text(&tag)?),
                "act:parent" => account.parent = Some(self.parse_text(&tag)?),
                "act:slots" => account.slots = self.parse_slots(&tag)?,
                "act:commodity" => account.commodity = Some(self.parse_commodity(&tag)?),
                "act:commodity-scu" => {
                    account.commodity_scu = Some(self.parse_int_field(&tag)?)
                }
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        Ok(account)
    }

    fn parse_split(&mut self, open: &Tag) -> Result<Split, Error> {
        let closer = open.closer();
        let mut split = Split {
            guid: String::new(),
            reconciled_state: 'n',
            value: Numeric::new(0, 1),
            quantity: Numeric::new(0, 1),
            account: String::new(),
            slots: Vec::new(),
        };
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "split:id" => split.guid = self.parse_text(&tag)?,
                "split:reconciled-state" => {
                    let state = self.parse_text(&tag)?;
                    split.reconciled_state = state.chars().next().unwrap_or('n');
                }
                "split:account" => split.account = self.parse_text(&tag)?,
                "split:value" | "split:quantity" => {
                    let src = self.src_of(&tag);
                    let text = self.parse_text(&tag)?;
                    let number = parse_numeric(&text, &src)?;
                    if tag.name == "split:value" {
                        split.value = number;
                    } else {
                        split.quantity = number;
                    }
                }
                "split:slots" => split.slots = self.parse_slots(&tag)?,
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        Ok(split)
    }

    fn parse_splits(&mut self, open: &Tag) -> Result<Vec<Split>, Error> {
        let mut splits = Vec::new();
        if open.self_closing {
            return Ok(splits);
        }
        let closer = open.closer();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "trn:split" => splits.push(self.parse_split(&tag)?),
                name if name == closer => break,
                _ if tag.is_close() => {
                    self.warn_mismatch(&closer, &tag);
                    break;
                }
                _ => self.lexer.skip_element(&tag, &mut self.warnings)?,
            }
        }
        Ok(splits)
    }

    fn parse_transaction(&mut self, open: &Tag) -> Result<Transaction, Error> {
        let closer = open.closer();
        let mut guid = String::new();
        let mut currency = None;
        let mut description = String::new();
        let mut posted = None;
        let mut entered = None;
        let mut splits = Vec::new();
        let mut slots = Vec::new();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "trn:id" => guid = self.parse_text(&tag)?,
                "trn:currency" => currency = Some(self.parse_commodity(&tag)?),
                "trn:description" => description = self.parse_text(&tag)?,
                "trn:splits" => splits = self.parse_splits(&tag)?,
                "trn:slots" => slots = self.parse_slots(&tag)?,
                "trn:date-posted" => posted = Some(self.parse_timestamp_in(&tag)?),
                "trn:date-entered" => entered = Some(self.parse_timestamp_in(&tag)?),
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        let (posted, entered) = match (posted, entered) {
            (Some(posted), Some(entered)) => (posted, entered),
            _ => {
                return Err(Error::format(
                    format!("Transaction {} lacks a posted or entered date.", guid),
                    self.src_of(open),
                ))
            }
        };
        let mut txn = Transaction::new(&guid, &description, posted, entered);
        if let Some(currency) = currency {
            txn.currency = currency;
        }
        txn.splits = splits;
        txn.slots = slots;
        Ok(txn)
    }

    fn parse_recurrence(&mut self, open: &Tag) -> Result<Recurrence, Error> {
        let closer = open.closer();
        let mut mult = 0;
        let mut period_type = String::new();
        let mut start = None;
        let mut weekend_adj = None;
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "recurrence:mult" => mult = self.parse_int_field(&tag)?,
                "recurrence:period_type" => period_type = self.parse_text(&tag)?,
                "recurrence:start" => start = Some(self.parse_gdate_in(&tag)?),
                "recurrence:weekend_adj" => weekend_adj = Some(self.parse_text(&tag)?),
                name if name == closer => break,
                _ if tag.is_close() => self.warn_mismatch(&closer, &tag),
                _ => self.lexer.skip_element(&tag, &mut self.warnings)?,
            }
        }
        let start = start.ok_or_else(|| {
            Error::format(
                "<gnc:recurrence> without <recurrence:start>.".to_string(),
                self.src_of(open),
            )
        })?;
        Ok(Recurrence {
            mult,
            period_type,
            start,
            weekend_adj,
        })
    }

    fn parse_schedule(&mut self, open: &Tag) -> Result<Schedule, Error> {
        let mut schedule = Schedule::default();
        if open.self_closing {
            return Ok(schedule);
        }
        let closer = open.closer();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "gnc:recurrence" => schedule.recurrences.push(self.parse_recurrence(&tag)?),
                name if name == closer => break,
                _ if tag.is_close() => {
                    self.warn_mismatch(&closer, &tag);
                    break;
                }
                _ => self.lexer.skip_element(&tag, &mut self.warnings)?,
            }
        }
        Ok(schedule)
    }

    fn parse_schedxaction(&mut self, open: &Tag) -> Result<ScheduledTransaction, Error> {
        let closer = open.closer();
        let mut sx = ScheduledTransaction::default();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "sx:id" => sx.guid = self.parse_text(&tag)?,
                "sx:name" => sx.name = self.parse_text(&tag)?,
                "sx:enabled" => sx.enabled = parse_bool(&self.parse_text(&tag)?),
                "sx:autoCreate" => sx.auto_create = parse_bool(&self.parse_text(&tag)?),
                "sx:autoCreateNotify" => {
                    sx.auto_create_notify = parse_bool(&self.parse_text(&tag)?)
                }
                "sx:advanceCreateDays" => sx.advance_create_days = self.parse_int_field(&tag)?,
                "sx:advanceRemindDays" => sx.advance_remind_days = self.parse_int_field(&tag)?,
                "sx:instanceCount" => sx.instance_count = self.parse_int_field(&tag)?,
                "sx:start" => sx.start = Some(self.parse_gdate_in(&tag)?),
                "sx:last" => sx.last = Some(self.parse_gdate_in(&tag)?),
                "sx:templ-acct" => sx.template_account = self.parse_text(&tag)?,
                "sx:schedule" => sx.schedule = self.parse_schedule(&tag)?,
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        Ok(sx)
    }

    fn parse_template(&mut self, open: &Tag, draft: &mut TemplateDraft) -> Result<(), Error> {
        let closer = open.closer();
        loop {
            let tag = self.expect_tag(&closer)?;
            match tag.name.as_str() {
                "gnc:account" => draft.accounts.push(self.parse_account(&tag)?),
                "gnc:transaction" => draft.txns.push(self.parse_transaction(&tag)?),
                name if name == closer => break,
                _ => self.skip(&tag, &closer)?,
            }
        }
        Ok(())
    }

    /// The top level is scanned flat: containers such as `<gnc-v2>` and
    /// `<gnc:book>` are stepped into, and only the elements a ledger is made of
    /// are read.
    /// The stream must not end before `</gnc:book>`.
    fn parse_book(&mut self, draft: &mut LedgerDraft) -> Result<(), Error> {
        let mut closed = false;
        loop {
            self.lexer.skip_text()?;
            let tag = match self.lexer.next_tag()? {
                Some(tag) => tag,
                None => break,
            };
            match tag.name.as_str() {
                "/gnc:book" => closed = true,
                "book:id" => draft.book_id = Some(self.parse_text(&tag)?),
                "gnc:account" => draft.accounts.push(self.parse_account(&tag)?),
                "gnc:transaction" => draft.txns.push(self.parse_transaction(&tag)?),
                "gnc:template-transactions" => {
                    let mut template = draft.template.take().unwrap_or_default();
                    self.parse_template(&tag, &mut template)?;
                    draft.template = Some(template);
                }
                "gnc:schedxaction" => draft.sxs.push(self.parse_schedxaction(&tag)?),
                _ => log::trace!("passing through <{}>", tag.name),
            }
        }
        if !closed {
            return Err(Error::format(
                "Unexpected end of stream while looking for </gnc:book>.".to_string(),
                self.src(),
            ));
        }
        Ok(())
    }

    /// Checks the XML declaration and reads the whole stream. Integrity
    /// warnings are appended to `errors`; the first fatal error is returned.
    pub fn parse(
        reader: R,
        file: SrcFile,
        options: &'o Options<Tz>,
        errors: &mut Vec<Error>,
    ) -> Result<LedgerDraft, Error> {
        let mut parser = Parser {
            lexer: Lexer::new(reader, file.clone()),
            options,
            warnings: Vec::new(),
        };
        let declaration = parser.lexer.read_bytes(XML_DECLARATION.len())?;
        if declaration[..] != XML_DECLARATION[..] {
            return Err(Error::not_found(
                format!("{} is not a valid ledger file.", file),
                file,
            ));
        }
        let mut draft = LedgerDraft {
            file,
            ..Default::default()
        };
        parser.parse_book(&mut draft)?;
        errors.extend(parser.warnings);
        Ok(draft)
    }
}
