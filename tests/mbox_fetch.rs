//! Fetch runs over a real MBOX file, configured the way the CLI does it.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;

use mailatt::config::{self, Cfg};
use mailatt::fetch::watermark::{StateFile, WatermarkStore};
use mailatt::fetch::{FetchEngine, FetchOptions, FetchSummary};
use mailatt::store;

/// One MBOX message from `sender` on January `day`, carrying `file`.
fn message(sender: &str, day: u32, subject: &str, file: &str) -> String {
    format!(
        "From {sender} Tue Jan {day:>2} 09:00:00 2024\n\
From: {sender}\n\
To: team@example.com\n\
Subject: {subject}\n\
Date: Tue, {day:02} Jan 2024 08:59:00 +0000\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\n\
\n\
--XYZ\n\
Content-Type: text/plain\n\
\n\
Body of {subject}\n\
--XYZ\n\
Content-Type: application/octet-stream; name=\"{file}\"\n\
Content-Disposition: attachment; filename=\"{file}\"\n\
Content-Transfer-Encoding: base64\n\
\n\
aGVsbG8gd29ybGQK\n\
--XYZ--\n\
\n"
    )
}

fn mailbox(dir: &TempDir) {
    let mut mbox = String::new();
    mbox.push_str(&message("alice@example.com", 2, "January invoice", "invoice-01.pdf"));
    mbox.push_str(&message("bob@example.com", 9, "Photos", "beach.jpg"));
    mbox.push_str(&message("alice@example.com", 16, "Second invoice", "invoice-02.pdf"));
    dir.child("mail").child("INBOX").write_str(&mbox).unwrap();
}

fn cfg(dir: &TempDir, extra: &[(&str, &str)]) -> Cfg {
    let mut cfg = Cfg::from_pairs([
        ("mail.store.protocol", "mbox".to_string()),
        ("mail.host", dir.child("mail").path().display().to_string()),
        ("download.directory", dir.child("out").path().display().to_string()),
        ("state.directory", dir.child("state").path().display().to_string()),
    ]);
    for (key, value) in extra {
        cfg.set(*key, *value);
    }
    cfg
}

fn fetch(cfg: &Cfg, state: &mut StateFile) -> FetchSummary {
    let options = FetchOptions::from_config(cfg).unwrap();
    let mut mailbox = store::connect(cfg).unwrap();
    FetchEngine::new(options)
        .run(mailbox.as_mut(), state, Utc::now(), &mut |_| {})
        .unwrap()
}

#[test]
fn test_grouped_download_and_resume() {
    let dir = TempDir::new().unwrap();
    mailbox(&dir);
    let cfg = cfg(&dir, &[("download.groupby", "address"), ("download.groupby.2nd", "month")]);
    let mut state = StateFile::new(config::state_file_path(&cfg, "invoices"));

    let summary = fetch(&cfg, &mut state);
    assert_eq!(summary.visited, 3);
    assert_eq!(summary.downloaded, 3);

    let out = dir.child("out");
    out.child("alice@example.com/2024-01/invoice-01.pdf")
        .assert(predicate::path::is_file());
    out.child("alice@example.com/2024-01/invoice-02.pdf")
        .assert(predicate::str::contains("hello world"));
    out.child("bob@example.com/2024-01/beach.jpg")
        .assert(predicate::path::exists());

    dir.child("state/invoices.state")
        .assert(predicate::str::contains("download.last.date"));
    let newest = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
    assert_eq!(state.load().unwrap(), Some(newest));

    // Second run resumes at the newest message and finds it on disk.
    let again = fetch(&cfg, &mut state);
    assert_eq!(again.visited, 1);
    assert_eq!(again.downloaded, 0);
    assert_eq!(again.skipped, 1);
}

#[test]
fn test_filters_from_config() {
    let dir = TempDir::new().unwrap();
    mailbox(&dir);
    let cfg = cfg(
        &dir,
        &[
            ("match.subject.contains", "INVOICE"),
            ("match.file.name.contains", "-02"),
        ],
    );
    let mut state = StateFile::new(dir.child("state/filters.state").path());

    let summary = fetch(&cfg, &mut state);

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.filtered, 1);
    dir.child("out/invoice-02.pdf").assert(predicate::path::is_file());
    dir.child("out/invoice-01.pdf").assert(predicate::path::missing());
    dir.child("out/beach.jpg").assert(predicate::path::missing());
}

#[test]
fn test_date_window_filters_client_side() {
    let dir = TempDir::new().unwrap();
    mailbox(&dir);
    let cfg = cfg(
        &dir,
        &[
            ("process.from.date", "01/05/2024"),
            ("process.to.date", "2024-01-09"),
        ],
    );
    let mut state = StateFile::new(dir.child("state/window.state").path());

    let summary = fetch(&cfg, &mut state);

    assert_eq!(summary.listed, 1);
    dir.child("out/beach.jpg").assert(predicate::path::is_file());
    dir.child("out/invoice-01.pdf").assert(predicate::path::missing());
}

#[test]
fn test_dry_run_keeps_state_and_tree_untouched() {
    let dir = TempDir::new().unwrap();
    mailbox(&dir);
    let cfg = cfg(&dir, &[]);
    let mut state = StateFile::new(dir.child("state/dry.state").path());

    let mut options = FetchOptions::from_config(&cfg).unwrap();
    options.dry_run = true;
    let mut mailbox = store::connect(&cfg).unwrap();
    let summary = FetchEngine::new(options)
        .run(mailbox.as_mut(), &mut state, Utc::now(), &mut |_| {})
        .unwrap();

    assert_eq!(summary.downloaded, 3);
    dir.child("out").assert(predicate::path::missing());
    dir.child("state/dry.state").assert(predicate::path::missing());
}

#[test]
fn test_toml_config_file_drives_a_run() {
    let dir = TempDir::new().unwrap();
    mailbox(&dir);
    let conf = dir.child("nightly.toml");
    conf.write_str(&format!(
        r#"
[mail]
"store.protocol" = "mbox"
host = '{}'

[download]
directory = '{}'
groupby = "year"

[process]
"mail.limit" = 2
"#,
        dir.child("mail").path().display(),
        dir.child("out").path().display(),
    ))
    .unwrap();

    let cfg = Cfg::load(conf.path()).unwrap();
    assert_eq!(config::config_name(conf.path()), "nightly");

    let mut state = StateFile::new(dir.child("state/nightly.state").path());
    let summary = fetch(&cfg, &mut state);

    assert_eq!(summary.visited, 2);
    dir.child("out/2024/beach.jpg").assert(predicate::path::is_file());
    dir.child("out/2024/invoice-01.pdf").assert(predicate::path::missing());
}

#[test]
fn test_missing_mailbox_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    dir.child("mail").create_dir_all().unwrap();
    let cfg = cfg(&dir, &[("mail.folder", "Archive")]);
    let mut state = StateFile::new(dir.child("state/x.state").path());

    let options = FetchOptions::from_config(&cfg).unwrap();
    let mut mailbox = store::connect(&cfg).unwrap();
    let err = FetchEngine::new(options)
        .run(mailbox.as_mut(), &mut state, Utc::now(), &mut |_| {})
        .unwrap_err();

    assert!(err.is_fatal());
    dir.child("state/x.state").assert(predicate::path::missing());
}
