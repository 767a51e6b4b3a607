// tests/fanout_tests.rs
mod common;

use chrono::{Local, TimeZone};
use std::sync::Mutex;

use avito_relay::error::RelayError;
use avito_relay::fanout::{render_notification, Fanout};
use common::{canonical, FakeChannel};

fn recipients(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// Records every log line so tests can assert on what was reported.
static CAPTURED: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

fn capture_logs() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

/// Error lines mentioning `needle`. Tests share the logger, so filter by
/// recipient ids unique to the test.
fn errors_mentioning(needle: &str) -> usize {
    CAPTURED
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, line)| *level == log::Level::Error && line.contains(needle))
        .count()
}

#[test]
fn test_partial_failure_still_delivers() {
    let channel = FakeChannel::new().failing_for("111");
    let attempts = channel.attempts();
    let fanout = Fanout::new(channel, recipients(&["111", "222"]));

    let report = fanout.deliver_report(&canonical("m1", "hello"));
    assert!(report.delivered());
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        RelayError::Delivery { recipient, .. } => assert_eq!(recipient, "111"),
        other => panic!("expected Delivery error, got {other:?}"),
    }

    let tried: Vec<String> = attempts.borrow().iter().map(|(r, _)| r.clone()).collect();
    assert_eq!(tried, vec!["111", "222"]);
}

#[test]
fn test_deliver_true_when_any_succeeds() {
    let fanout = Fanout::new(
        FakeChannel::new().failing_for("111"),
        recipients(&["111", "222"]),
    );
    assert!(fanout.deliver(&canonical("m1", "hello")));
}

#[test]
fn test_deliver_false_when_all_fail() {
    let fanout = Fanout::new(
        FakeChannel::new().failing_for("111").failing_for("222"),
        recipients(&["111", "222"]),
    );
    let report = fanout.deliver_report(&canonical("m1", "hello"));
    assert!(!report.delivered());
    assert_eq!(report.failures.len(), 2);
    assert!(!fanout.deliver(&canonical("m1", "hello")));
}

#[test]
fn test_deliver_false_for_empty_recipient_list() {
    let channel = FakeChannel::new();
    let attempts = channel.attempts();
    let fanout = Fanout::new(channel, Vec::new());

    let report = fanout.deliver_report(&canonical("m1", "hello"));
    assert_eq!(report.total, 0);
    assert!(!report.delivered());
    assert!(attempts.borrow().is_empty());
}

#[test]
fn test_failure_in_middle_does_not_stop_later_recipients() {
    let channel = FakeChannel::new().failing_for("2");
    let attempts = channel.attempts();
    let fanout = Fanout::new(channel, recipients(&["1", "2", "3"]));

    let report = fanout.deliver_report(&canonical("m1", "hello"));
    assert_eq!(report.succeeded, 2);
    assert_eq!(attempts.borrow().len(), 3);
}

#[test]
fn test_same_text_sent_to_every_recipient() {
    let channel = FakeChannel::new();
    let attempts = channel.attempts();
    let fanout = Fanout::new(channel, recipients(&["1", "2"]));

    fanout.deliver(&canonical("m1", "hello"));
    let attempts = attempts.borrow();
    assert_eq!(attempts[0].1, attempts[1].1);
    assert!(attempts[0].1.contains("hello"));
}

#[test]
fn test_render_notification_fields() {
    let now = Local.with_ymd_and_hms(2026, 3, 9, 14, 30, 5).unwrap();
    let text = render_notification(&canonical("m1", "Is it available?"), now);

    assert!(text.starts_with("🔔 <b>New Avito message</b>"));
    assert!(text.contains("<b>Time:</b> 2026-03-09 14:30:05"));
    assert!(text.contains("<b>From:</b> buyer-7"));
    assert!(text.contains("<b>Listing:</b> Mountain bike"));
    assert!(text.contains("<a href=\"https://www.avito.ru/items/1\">"));
    assert!(text.contains("Is it available?"));
    assert!(text.ends_with("<i>Sent automatically</i>"));
}

#[test]
fn test_render_notification_fallbacks() {
    let now = Local.with_ymd_and_hms(2026, 3, 9, 14, 30, 5).unwrap();
    let mut msg = canonical("m1", "");
    msg.sender = String::new();
    msg.thread_title = String::new();
    msg.thread_url = String::new();

    let text = render_notification(&msg, now);
    assert!(text.contains("<b>From:</b> Unknown"));
    assert!(text.contains("<b>Listing:</b> Unknown"));
    assert!(text.contains("(empty message)"));
    assert!(!text.contains("<a href"));
}

#[test]
fn test_render_notification_escapes_user_text() {
    let now = Local.with_ymd_and_hms(2026, 3, 9, 14, 30, 5).unwrap();
    let text = render_notification(&canonical("m1", "<script>alert(1)</script> & more"), now);
    assert!(text.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
    assert!(!text.contains("<script>"));
}

#[test]
fn test_partial_failure_logs_exactly_one_error() {
    capture_logs();
    let fanout = Fanout::new(
        FakeChannel::new().failing_for("-9001"),
        recipients(&["-9001", "-9002"]),
    );

    assert!(fanout.deliver(&canonical("m1", "hello")));
    assert_eq!(errors_mentioning("-9001"), 1);
    assert_eq!(errors_mentioning("-9002"), 0);
}
