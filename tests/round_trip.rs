use chrono::FixedOffset;
use gnucash_xml::{ErrorLevel, ErrorType, Ledger, Numeric, Options, SlotValue};
use std::fs;
use std::io::Write;

const SAMPLE: &str = "tests/data/sample.gnucash";

const CHECKING: &str = "7994665c3c1644bc8675048cf8becc14";

fn eastern() -> Options<FixedOffset> {
    Options::new(FixedOffset::west_opt(5 * 3600).unwrap())
}

fn open_sample() -> Ledger {
    let (ledger, warnings) = Ledger::open(SAMPLE, &eastern()).unwrap();
    assert!(warnings.is_empty(), "{:?}", warnings);
    ledger
}

fn to_text(ledger: &Ledger) -> String {
    let mut out = Vec::new();
    ledger.write_to(&mut out, &eastern()).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn round_trip_is_byte_identical() {
    let original = fs::read_to_string(SAMPLE).unwrap();
    let ledger = open_sample();
    assert_eq!(to_text(&ledger), original);
}

#[test]
fn serializing_is_idempotent() {
    let once = to_text(&open_sample());
    let (reparsed, _) = Ledger::from_reader(once.as_bytes(), &eastern()).unwrap();
    assert_eq!(to_text(&reparsed), once);
}

#[test]
fn book_and_root() {
    let ledger = open_sample();
    assert_eq!(ledger.book_id(), "12cec244a8dd6053ebb1d461bec78f37");
    assert_eq!(ledger.root().guid(), "7e36774d188b3aca9a8ec99441466d51");
    assert_eq!(ledger.account_count(), 14);
}

#[test]
fn account_tree() {
    let ledger = open_sample();
    let root = ledger.root();
    assert_eq!(root.children().len(), 5);
    for name in ["Assets", "Equity", "Expenses", "Income", "Liabilities"].iter() {
        assert!(root.child_by_name(name).is_some(), "missing {}", name);
    }
    let current = root
        .child_by_name("Assets")
        .and_then(|assets| assets.child_by_name("Current Assets"))
        .unwrap();
    assert_eq!(
        current.description().as_deref(),
        Some("Cash and bank accounts")
    );
    let checking = current.child_by_name("Checking Account").unwrap();
    assert_eq!(checking.guid(), CHECKING);
    assert_eq!(checking.commodity_scu(), Some(100));
    assert_eq!(
        root.child_by_name("Assets").unwrap().slot("placeholder").map(|s| &s.value),
        Some(&SlotValue::String("true".to_string()))
    );
    assert_eq!(ledger.find_account(CHECKING).unwrap().name(), "Checking Account");
}

#[test]
fn transactions() {
    let ledger = open_sample();
    let expected = [
        ("b83f85a497dfb3f1d8db4c26489f57d9", "Opening Balance", 1354552859, 1354552859, 20000),
        ("75fe0a336df6675568885a8cd7c582a8", "Groceries", 1354579200, 1354553000, -3214),
        ("26d5b26ad0b23fd822f2c63a6e1084e0", "Gas", 1354665600, 1354553025, -4823),
        ("b1bac36e34d568e6363a81f2f61af197", "Paycheck", 1354752000, 1354553048, 500279),
        ("2205e761a5c5abbc66f34be4e212e457", "Save some money", 1354838400, 1354553221, -312766),
    ];
    assert_eq!(ledger.transactions().len(), expected.len());
    for (guid, description, posted, entered, value) in expected.iter() {
        let txn = ledger.transaction(guid).unwrap();
        assert_eq!(txn.description(), description);
        assert_eq!(txn.posted().timestamp(), *posted);
        assert_eq!(txn.entered().timestamp(), *entered);
        assert_eq!(
            txn.value_for_account(CHECKING),
            Some(Numeric::new(*value, 100))
        );
    }
}

#[test]
fn transaction_slots() {
    let ledger = open_sample();
    let opening = ledger.transaction("b83f85a497dfb3f1d8db4c26489f57d9").unwrap();
    assert!(opening.slots().is_empty());
    let dated = [
        ("75fe0a336df6675568885a8cd7c582a8", 4),
        ("26d5b26ad0b23fd822f2c63a6e1084e0", 5),
        ("b1bac36e34d568e6363a81f2f61af197", 6),
        ("2205e761a5c5abbc66f34be4e212e457", 7),
    ];
    for (guid, day) in dated.iter() {
        let txn = ledger.transaction(guid).unwrap();
        assert_eq!(txn.slots().len(), 1);
        let date = chrono::NaiveDate::from_ymd_opt(2012, 12, *day).unwrap();
        assert_eq!(
            txn.slot("date-posted").map(|s| &s.value),
            Some(&SlotValue::GDate(date))
        );
    }
}

#[test]
fn scheduled_transactions() {
    let ledger = open_sample();
    let template = ledger.template_root().as_ref().unwrap();
    assert_eq!(template.children().len(), 1);
    assert_eq!(ledger.template_transactions().len(), 1);
    let splits = ledger.template_transactions()[0].splits();
    assert_eq!(splits.len(), 2);
    let frame = splits[0].slots[0].frame().unwrap();
    assert_eq!(frame.len(), 5);
    assert_eq!(frame[1].value, SlotValue::String(String::new()));
    assert_eq!(frame[4].value, SlotValue::Numeric(Numeric::new(50, 1)));

    let sxs = ledger.scheduled_transactions();
    assert_eq!(sxs.len(), 1);
    assert_eq!(sxs[0].name(), "Monthly savings");
    assert!(sxs[0].enabled());
    assert_eq!(sxs[0].template_account(), template.children()[0].guid());
    assert_eq!(sxs[0].schedule().recurrences[0].period_type, "month");
}

#[test]
fn remove_transaction_then_write() {
    let mut ledger = open_sample();
    let removed = ledger
        .remove_transaction("26d5b26ad0b23fd822f2c63a6e1084e0")
        .unwrap();
    assert_eq!(removed.description(), "Gas");
    assert_eq!(ledger.transactions().len(), 4);
    let text = to_text(&ledger);
    assert!(text.contains("<gnc:count-data cd:type=\"transaction\">4</gnc:count-data>\n"));
    assert!(!text.contains("26d5b26ad0b23fd822f2c63a6e1084e0"));
    let (reparsed, _) = Ledger::from_reader(text.as_bytes(), &eastern()).unwrap();
    assert_eq!(reparsed.transactions().len(), 4);
    assert!(reparsed.transaction("26d5b26ad0b23fd822f2c63a6e1084e0").is_none());
}

#[test]
fn gzip_save_and_open() {
    let original = open_sample();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("books.gnucash");
    original.save(&path, &eastern()).unwrap();
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    let (reopened, warnings) = Ledger::open(&path, &eastern()).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(reopened, original);
}

#[test]
fn missing_file() {
    let err = Ledger::open("blahblahblahdoesntexist.gnucash", &eastern()).unwrap_err();
    assert_eq!(err.r#type, ErrorType::NotFound);
}

#[test]
fn missing_declaration() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"This is not an XML declaration... but it is more than forty characters...\n")
        .unwrap();
    let err = Ledger::open(file.path(), &eastern()).unwrap_err();
    assert_eq!(err.r#type, ErrorType::NotFound);
}

const SMALL: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<gnc-v2>
<gnc:book version="2.0.0">
<book:id type="guid">b</book:id>
<gnc:account version="2.0.0">
  <act:name>Root Account</act:name>
  <act:id type="guid">r</act:id>
  <act:type>ROOT</act:type>
  <act:slots>
    <slot>
      <slot:key>notes</slot:key>
      <slot:value type="string">x</slot:value>
    </slot>
  </act:slot>
</gnc:account>
<gnc:budget version="2.0.0">
  <bgt:id type="guid">z</bgt:id>
</gnc:budget>
</gnc:book>
</gnc-v2>
"#;

#[test]
fn closer_mismatch_is_a_warning() {
    let (ledger, warnings) = Ledger::from_reader(SMALL.as_bytes(), &eastern()).unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].r#type, ErrorType::Integrity);
    assert_eq!(warnings[0].level, ErrorLevel::Warning);
    assert_eq!(ledger.root().slots().len(), 1);
    assert_eq!(ledger.account_count(), 1);
}

#[test]
fn truncated_stream_is_fatal() {
    let truncated = &SMALL[..SMALL.find("</gnc:account>").unwrap()];
    let err = Ledger::from_reader(truncated.as_bytes(), &eastern()).unwrap_err();
    assert_eq!(err.r#type, ErrorType::Format);
    assert_eq!(err.level, ErrorLevel::Error);
}

#[test]
fn book_cut_between_entities_is_fatal() {
    let original = fs::read_to_string(SAMPLE).unwrap();
    let cut = &original[..original.find("<gnc:transaction").unwrap()];
    let err = Ledger::from_reader(cut.as_bytes(), &eastern()).unwrap_err();
    assert_eq!(err.r#type, ErrorType::Format);
    assert!(err.msg.contains("</gnc:book>"), "{}", err.msg);
}

#[test]
fn empty_frame_is_written_self_closing() {
    let text = SMALL.replace(
        r#"<slot:value type="string">x</slot:value>"#,
        "<slot:value type=\"frame\">\n      </slot:value>",
    );
    let (ledger, _) = Ledger::from_reader(text.as_bytes(), &eastern()).unwrap();
    assert_eq!(ledger.root().slots()[0].value, SlotValue::Frame(vec![]));
    let written = to_text(&ledger);
    assert!(written.contains("<slot:key>notes</slot:key>\n      <slot:value type=\"frame\"/>\n"));
}

#[test]
fn book_without_root_is_rejected() {
    let text = SMALL.replace("<act:type>ROOT</act:type>", "<act:type>ASSET</act:type>");
    let err = Ledger::from_reader(text.as_bytes(), &eastern()).unwrap_err();
    assert_eq!(err.r#type, ErrorType::Format);
}
