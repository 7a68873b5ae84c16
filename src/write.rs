use crate::options::Options;
use crate::parse::XML_DECLARATION;
use crate::utils::{format_bool, format_gdate, format_timestamp};
use crate::{
    Account, Commodity, Ledger, Recurrence, ScheduledTransaction, Slot, SlotValue, Timestamp,
    Transaction,
};
use chrono::TimeZone;
use std::io::{self, Write};

const NAMESPACES: [&str; 29] = [
    "gnc",
    "act",
    "book",
    "cd",
    "cmdty",
    "price",
    "slot",
    "split",
    "sx",
    "trn",
    "ts",
    "fs",
    "bgt",
    "recurrence",
    "lot",
    "addr",
    "owner",
    "billterm",
    "bt-days",
    "bt-prox",
    "cust",
    "employee",
    "entry",
    "invoice",
    "job",
    "order",
    "taxtable",
    "tte",
    "vendor",
];

/// The two commodity declarations every book carries.
const COMMODITIES: &str = "<gnc:commodity version=\"2.0.0\">
  <cmdty:space>ISO4217</cmdty:space>
  <cmdty:id>USD</cmdty:id>
  <cmdty:get_quotes/>
  <cmdty:quote_source>currency</cmdty:quote_source>
  <cmdty:quote_tz/>
</gnc:commodity>
<gnc:commodity version=\"2.0.0\">
  <cmdty:space>template</cmdty:space>
  <cmdty:id>template</cmdty:id>
  <cmdty:name>template</cmdty:name>
  <cmdty:xcode>template</cmdty:xcode>
  <cmdty:fraction>1</cmdty:fraction>
</gnc:commodity>
";

const TRAILER: &str = "</gnc:book>
</gnc-v2>

<!-- Local variables: -->
<!-- mode: xml        -->
<!-- End:             -->
";

/// Serializes a [`Ledger`] in a fixed element order and indentation.
pub struct Writer<'o, W, Tz: TimeZone> {
    out: W,
    options: &'o Options<Tz>,
}

impl<'o, W: Write, Tz: TimeZone> Writer<'o, W, Tz> {
    pub fn new(out: W, options: &'o Options<Tz>) -> Self {
        Writer { out, options }
    }

    fn write_preamble(&mut self) -> io::Result<()> {
        self.out.write_all(XML_DECLARATION)?;
        writeln!(self.out, "<gnc-v2")?;
        for (index, prefix) in NAMESPACES.iter().enumerate() {
            let end = if index + 1 == NAMESPACES.len() { ">" } else { "" };
            writeln!(
                self.out,
                "     xmlns:{0}=\"http://www.gnucash.org/XML/{0}\"{1}",
                prefix, end
            )?;
        }
        Ok(())
    }

    fn write_counts(&mut self, ledger: &Ledger) -> io::Result<()> {
        writeln!(self.out, "<gnc:count-data cd:type=\"book\">1</gnc:count-data>")?;
        writeln!(self.out, "<gnc:book version=\"2.0.0\">")?;
        writeln!(self.out, "<book:id type=\"guid\">{}</book:id>", ledger.book_id)?;
        writeln!(
            self.out,
            "<gnc:count-data cd:type=\"commodity\">1</gnc:count-data>"
        )?;
        writeln!(
            self.out,
            "<gnc:count-data cd:type=\"account\">{}</gnc:count-data>",
            ledger.account_count()
        )?;
        writeln!(
            self.out,
            "<gnc:count-data cd:type=\"transaction\">{}</gnc:count-data>",
            ledger.transactions.len()
        )?;
        if has_template_block(ledger) {
            writeln!(
                self.out,
                "<gnc:count-data cd:type=\"schedxaction\">{}</gnc:count-data>",
                ledger.scheduled_transactions.len()
            )?;
        }
        Ok(())
    }

    fn write_commodity(&mut self, tag: &str, indent: &str, cmdty: &Commodity) -> io::Result<()> {
        writeln!(self.out, "{}<{}>", indent, tag)?;
        writeln!(self.out, "{}  <cmdty:space>{}</cmdty:space>", indent, cmdty.space)?;
        writeln!(self.out, "{}  <cmdty:id>{}</cmdty:id>", indent, cmdty.id)?;
        writeln!(self.out, "{}</{}>", indent, tag)
    }

    fn write_slot(&mut self, indent: &str, slot: &Slot) -> io::Result<()> {
        writeln!(self.out, "{}<slot>", indent)?;
        writeln!(self.out, "{}  <slot:key>{}</slot:key>", indent, slot.key)?;
        let kind = slot.value.type_name();
        match &slot.value {
            SlotValue::String(text) | SlotValue::Guid(text) => writeln!(
                self.out,
                "{}  <slot:value type=\"{}\">{}</slot:value>",
                indent, kind, text
            )?,
            SlotValue::Numeric(number) => writeln!(
                self.out,
                "{}  <slot:value type=\"{}\">{}</slot:value>",
                indent, kind, number
            )?,
            SlotValue::GDate(date) => {
                writeln!(self.out, "{}  <slot:value type=\"{}\">", indent, kind)?;
                writeln!(self.out, "{}    <gdate>{}</gdate>", indent, format_gdate(date))?;
                writeln!(self.out, "{}  </slot:value>", indent)?;
            }
            SlotValue::Frame(slots) if slots.is_empty() => {
                writeln!(self.out, "{}  <slot:value type=\"{}\"/>", indent, kind)?
            }
            SlotValue::Frame(slots) => {
                writeln!(self.out, "{}  <slot:value type=\"{}\">", indent, kind)?;
                let inner = format!("{}    ", indent);
                for slot in slots {
                    self.write_slot(&inner, slot)?;
                }
                writeln!(self.out, "{}  </slot:value>", indent)?;
            }
        }
        writeln!(self.out, "{}</slot>", indent)
    }

    /// Writes a slot block such as `<trn:slots>`. Nothing is written when
    /// `slots` is empty.
    fn write_slots(&mut self, tag: &str, indent: &str, slots: &[Slot]) -> io::Result<()> {
        if slots.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "{}<{}>", indent, tag)?;
        let inner = format!("{}  ", indent);
        for slot in slots {
            self.write_slot(&inner, slot)?;
        }
        writeln!(self.out, "{}</{}>", indent, tag)
    }

    fn write_account(&mut self, account: &Account) -> io::Result<()> {
        writeln!(self.out, "<gnc:account version=\"2.0.0\">")?;
        writeln!(self.out, "  <act:name>{}</act:name>", account.name)?;
        writeln!(self.out, "  <act:id type=\"guid\">{}</act:id>", account.guid)?;
        writeln!(self.out, "  <act:type>{}</act:type>", account.kind)?;
        if let Some(commodity) = &account.commodity {
            self.write_commodity("act:commodity", "  ", commodity)?;
        }
        if let Some(scu) = account.commodity_scu {
            writeln!(self.out, "  <act:commodity-scu>{}</act:commodity-scu>", scu)?;
        }
        if let Some(description) = &account.description {
            writeln!(
                self.out,
                "  <act:description>{}</act:description>",
                description
            )?;
        }
        self.write_slots("act:slots", "  ", &account.slots)?;
        if let Some(parent) = &account.parent {
            writeln!(self.out, "  <act:parent type=\"guid\">{}</act:parent>", parent)?;
        }
        writeln!(self.out, "</gnc:account>")
    }

    /// Writes `account` and then, depth first, every account below it.
    fn write_accounts(&mut self, account: &Account) -> io::Result<()> {
        self.write_account(account)?;
        for child in account.children.iter() {
            self.write_accounts(child)?;
        }
        Ok(())
    }

    fn write_date(&mut self, tag: &str, timestamp: &Timestamp) -> io::Result<()> {
        writeln!(self.out, "  <{}>", tag)?;
        writeln!(
            self.out,
            "    <ts:date>{}</ts:date>",
            format_timestamp(timestamp, self.options)
        )?;
        writeln!(self.out, "  </{}>", tag)
    }

    fn write_transaction(&mut self, txn: &Transaction) -> io::Result<()> {
        writeln!(self.out, "<gnc:transaction version=\"2.0.0\">")?;
        writeln!(self.out, "  <trn:id type=\"guid\">{}</trn:id>", txn.guid)?;
        self.write_commodity("trn:currency", "  ", &txn.currency)?;
        self.write_date("trn:date-posted", &txn.posted)?;
        self.write_date("trn:date-entered", &txn.entered)?;
        writeln!(
            self.out,
            "  <trn:description>{}</trn:description>",
            txn.description
        )?;
        self.write_slots("trn:slots", "  ", &txn.slots)?;
        if !txn.splits.is_empty() {
            writeln!(self.out, "  <trn:splits>")?;
            for split in txn.splits.iter() {
                writeln!(self.out, "    <trn:split>")?;
                writeln!(self.out, "      <split:id type=\"guid\">{}</split:id>", split.guid)?;
                writeln!(
                    self.out,
                    "      <split:reconciled-state>{}</split:reconciled-state>",
                    split.reconciled_state
                )?;
                writeln!(self.out, "      <split:value>{}</split:value>", split.value)?;
                writeln!(
                    self.out,
                    "      <split:quantity>{}</split:quantity>",
                    split.quantity
                )?;
                writeln!(
                    self.out,
                    "      <split:account type=\"guid\">{}</split:account>",
                    split.account
                )?;
                self.write_slots("split:slots", "      ", &split.slots)?;
                writeln!(self.out, "    </trn:split>")?;
            }
            writeln!(self.out, "  </trn:splits>")?;
        }
        writeln!(self.out, "</gnc:transaction>")
    }

    fn write_recurrence(&mut self, recurrence: &Recurrence) -> io::Result<()> {
        writeln!(self.out, "    <gnc:recurrence version=\"1.0.0\">")?;
        writeln!(
            self.out,
            "      <recurrence:mult>{}</recurrence:mult>",
            recurrence.mult
        )?;
        writeln!(
            self.out,
            "      <recurrence:period_type>{}</recurrence:period_type>",
            recurrence.period_type
        )?;
        writeln!(self.out, "      <recurrence:start>")?;
        writeln!(
            self.out,
            "        <gdate>{}</gdate>",
            format_gdate(&recurrence.start)
        )?;
        writeln!(self.out, "      </recurrence:start>")?;
        if let Some(adjust) = &recurrence.weekend_adj {
            writeln!(
                self.out,
                "      <recurrence:weekend_adj>{}</recurrence:weekend_adj>",
                adjust
            )?;
        }
        writeln!(self.out, "    </gnc:recurrence>")
    }

    fn write_schedxaction(&mut self, sx: &ScheduledTransaction) -> io::Result<()> {
        writeln!(self.out, "<gnc:schedxaction version=\"2.0.0\">")?;
        writeln!(self.out, "  <sx:id type=\"guid\">{}</sx:id>", sx.guid)?;
        writeln!(self.out, "  <sx:name>{}</sx:name>", sx.name)?;
        writeln!(
            self.out,
            "  <sx:enabled>{}</sx:enabled>",
            format_bool(sx.enabled)
        )?;
        writeln!(
            self.out,
            "  <sx:autoCreate>{}</sx:autoCreate>",
            format_bool(sx.auto_create)
        )?;
        writeln!(
            self.out,
            "  <sx:autoCreateNotify>{}</sx:autoCreateNotify>",
            format_bool(sx.auto_create_notify)
        )?;
        writeln!(
            self.out,
            "  <sx:advanceCreateDays>{}</sx:advanceCreateDays>",
            sx.advance_create_days
        )?;
        writeln!(
            self.out,
            "  <sx:advanceRemindDays>{}</sx:advanceRemindDays>",
            sx.advance_remind_days
        )?;
        writeln!(
            self.out,
            "  <sx:instanceCount>{}</sx:instanceCount>",
            sx.instance_count
        )?;
        for (tag, date) in [("sx:start", sx.start), ("sx:last", sx.last)] {
            if let Some(date) = date {
                writeln!(self.out, "  <{}>", tag)?;
                writeln!(self.out, "    <gdate>{}</gdate>", format_gdate(&date))?;
                writeln!(self.out, "  </{}>", tag)?;
            }
        }
        writeln!(
            self.out,
            "  <sx:templ-acct type=\"guid\">{}</sx:templ-acct>",
            sx.template_account
        )?;
        writeln!(self.out, "  <sx:schedule>")?;
        for recurrence in sx.schedule.recurrences.iter() {
            self.write_recurrence(recurrence)?;
        }
        writeln!(self.out, "  </sx:schedule>")?;
        writeln!(self.out, "</gnc:schedxaction>")
    }

    /// Writes the whole ledger and flushes the output.
    pub fn write_ledger(&mut self, ledger: &Ledger) -> io::Result<()> {
        self.write_preamble()?;
        self.write_counts(ledger)?;
        self.out.write_all(COMMODITIES.as_bytes())?;
        self.write_accounts(&ledger.root)?;
        for txn in ledger.transactions.iter() {
            self.write_transaction(txn)?;
        }
        if has_template_block(ledger) {
            writeln!(self.out, "<gnc:template-transactions>")?;
            if let Some(root) = &ledger.template_root {
                self.write_accounts(root)?;
            }
            for txn in ledger.template_transactions.iter() {
                self.write_transaction(txn)?;
            }
            writeln!(self.out, "</gnc:template-transactions>")?;
            for sx in ledger.scheduled_transactions.iter() {
                self.write_schedxaction(sx)?;
            }
        }
        self.out.write_all(TRAILER.as_bytes())?;
        self.out.flush()
    }
}

/// The template block, and the scheduled transactions inside it, are only
/// written when there is at least one template transaction.
fn has_template_block(ledger: &Ledger) -> bool {
    !ledger.template_transactions.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GDate, Numeric, Split};
    use chrono::{DateTime, FixedOffset};

    fn options() -> Options<FixedOffset> {
        Options::new(FixedOffset::west_opt(5 * 3600).unwrap())
    }

    fn render(f: impl FnOnce(&mut Writer<&mut Vec<u8>, FixedOffset>) -> io::Result<()>) -> String {
        let options = options();
        let mut out = Vec::new();
        f(&mut Writer::new(&mut out, &options)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn nested_frame() {
        let slot = Slot::new(
            "sched-xaction",
            SlotValue::Frame(vec![
                Slot::new("account", SlotValue::Guid("abc".to_string())),
                Slot::new("credit-formula", SlotValue::String(String::new())),
                Slot::new("debit-numeric", SlotValue::Numeric(Numeric::new(50, 1))),
                Slot::new("empty", SlotValue::Frame(vec![])),
            ]),
        );
        let text = render(|w| w.write_slot("    ", &slot));
        let expected = r#"    <slot>
      <slot:key>sched-xaction</slot:key>
      <slot:value type="frame">
        <slot>
          <slot:key>account</slot:key>
          <slot:value type="guid">abc</slot:value>
        </slot>
        <slot>
          <slot:key>credit-formula</slot:key>
          <slot:value type="string"></slot:value>
        </slot>
        <slot>
          <slot:key>debit-numeric</slot:key>
          <slot:value type="numeric">50/1</slot:value>
        </slot>
        <slot>
          <slot:key>empty</slot:key>
          <slot:value type="frame"/>
        </slot>
      </slot:value>
    </slot>
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn transaction() {
        let when = DateTime::parse_from_rfc3339("2012-12-03T11:40:59-05:00").unwrap();
        let mut txn = Transaction::new("t1", "Opening Balance", when, when);
        txn.slots.push(Slot::new(
            "date-posted",
            SlotValue::GDate(GDate::from_ymd_opt(2012, 12, 3).unwrap()),
        ));
        txn.splits.push(Split {
            guid: "s1".to_string(),
            reconciled_state: 'n',
            value: Numeric::new(20000, 100),
            quantity: Numeric::new(20000, 100),
            account: "a1".to_string(),
            slots: vec![],
        });
        let text = render(|w| w.write_transaction(&txn));
        let expected = r#"<gnc:transaction version="2.0.0">
  <trn:id type="guid">t1</trn:id>
  <trn:currency>
    <cmdty:space>ISO4217</cmdty:space>
    <cmdty:id>USD</cmdty:id>
  </trn:currency>
  <trn:date-posted>
    <ts:date>2012-12-03 11:40:59 -0500</ts:date>
  </trn:date-posted>
  <trn:date-entered>
    <ts:date>2012-12-03 11:40:59 -0500</ts:date>
  </trn:date-entered>
  <trn:description>Opening Balance</trn:description>
  <trn:slots>
    <slot>
      <slot:key>date-posted</slot:key>
      <slot:value type="gdate">
        <gdate>2012-12-03</gdate>
      </slot:value>
    </slot>
  </trn:slots>
  <trn:splits>
    <trn:split>
      <split:id type="guid">s1</split:id>
      <split:reconciled-state>n</split:reconciled-state>
      <split:value>20000/100</split:value>
      <split:quantity>20000/100</split:quantity>
      <split:account type="guid">a1</split:account>
    </trn:split>
  </trn:splits>
</gnc:transaction>
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn accounts_depth_first() {
        let mut root = Account::new("r", "ROOT", "Root Account");
        let mut assets = Account::new("a", "ASSET", "Assets");
        assets.commodity = Some(Commodity::usd());
        assets.commodity_scu = Some(100);
        assets.parent = Some("r".to_string());
        let mut checking = Account::new("c", "BANK", "Checking");
        checking.parent = Some("a".to_string());
        checking.description = Some("Main".to_string());
        assets.children.push(checking);
        root.children.push(assets);
        let text = render(|w| w.write_accounts(&root));
        let expected = r#"<gnc:account version="2.0.0">
  <act:name>Root Account</act:name>
  <act:id type="guid">r</act:id>
  <act:type>ROOT</act:type>
</gnc:account>
<gnc:account version="2.0.0">
  <act:name>Assets</act:name>
  <act:id type="guid">a</act:id>
  <act:type>ASSET</act:type>
  <act:commodity>
    <cmdty:space>ISO4217</cmdty:space>
    <cmdty:id>USD</cmdty:id>
  </act:commodity>
  <act:commodity-scu>100</act:commodity-scu>
  <act:parent type="guid">r</act:parent>
</gnc:account>
<gnc:account version="2.0.0">
  <act:name>Checking</act:name>
  <act:id type="guid">c</act:id>
  <act:type>BANK</act:type>
  <act:description>Main</act:description>
  <act:parent type="guid">a</act:parent>
</gnc:account>
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn commodity_and_scu_are_independent() {
        let mut scu_only = Account::new("s", "ASSET", "Scu");
        scu_only.commodity_scu = Some(100);
        let text = render(|w| w.write_account(&scu_only));
        assert!(text.contains("  <act:type>ASSET</act:type>\n  <act:commodity-scu>100</act:commodity-scu>\n"));
        assert!(!text.contains("<act:commodity>"));

        let mut commodity_only = Account::new("c", "ASSET", "Commodity");
        commodity_only.commodity = Some(Commodity::usd());
        let text = render(|w| w.write_account(&commodity_only));
        assert!(text.contains("  </act:commodity>\n</gnc:account>\n"));
        assert!(!text.contains("commodity-scu"));
    }

    #[test]
    fn template_block_needs_template_transactions() {
        let mut ledger = Ledger::new("book", Account::new("r", "ROOT", "Root Account"));
        ledger
            .scheduled_transactions
            .push(ScheduledTransaction::new("sx", "Rent", "t"));
        let text = render(|w| w.write_ledger(&ledger));
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n<gnc-v2\n"));
        assert!(text.contains("     xmlns:vendor=\"http://www.gnucash.org/XML/vendor\">\n"));
        assert!(text.contains("<gnc:count-data cd:type=\"account\">1</gnc:count-data>\n"));
        assert!(!text.contains("schedxaction"));
        assert!(text.ends_with("</gnc-v2>\n\n<!-- Local variables: -->\n<!-- mode: xml        -->\n<!-- End:             -->\n"));

        let when = DateTime::parse_from_rfc3339("2013-01-01T00:00:00-05:00").unwrap();
        ledger
            .template_transactions
            .push(Transaction::new("tt", "Rent", when, when));
        let text = render(|w| w.write_ledger(&ledger));
        assert!(text.contains("<gnc:count-data cd:type=\"schedxaction\">1</gnc:count-data>\n"));
        assert!(text.contains("</gnc:template-transactions>\n<gnc:schedxaction version=\"2.0.0\">\n"));
    }

    #[test]
    fn schedxaction() {
        let mut sx = ScheduledTransaction::new("sx1", "Rent", "tmpl");
        sx.enabled = true;
        sx.instance_count = 2;
        sx.last = GDate::from_ymd_opt(2013, 2, 1);
        sx.schedule.recurrences.push(Recurrence {
            mult: 1,
            period_type: "month".to_string(),
            start: GDate::from_ymd_opt(2013, 1, 1).unwrap(),
            weekend_adj: None,
        });
        let text = render(|w| w.write_schedxaction(&sx));
        let expected = r#"<gnc:schedxaction version="2.0.0">
  <sx:id type="guid">sx1</sx:id>
  <sx:name>Rent</sx:name>
  <sx:enabled>y</sx:enabled>
  <sx:autoCreate>n</sx:autoCreate>
  <sx:autoCreateNotify>n</sx:autoCreateNotify>
  <sx:advanceCreateDays>0</sx:advanceCreateDays>
  <sx:advanceRemindDays>0</sx:advanceRemindDays>
  <sx:instanceCount>2</sx:instanceCount>
  <sx:last>
    <gdate>2013-02-01</gdate>
  </sx:last>
  <sx:templ-acct type="guid">tmpl</sx:templ-acct>
  <sx:schedule>
    <gnc:recurrence version="1.0.0">
      <recurrence:mult>1</recurrence:mult>
      <recurrence:period_type>month</recurrence:period_type>
      <recurrence:start>
        <gdate>2013-01-01</gdate>
      </recurrence:start>
    </gnc:recurrence>
  </sx:schedule>
</gnc:schedxaction>
"#;
        assert_eq!(text, expected);
    }
}
