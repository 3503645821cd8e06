//! End-to-end session tests, run against both storage backends.

use std::collections::HashMap;
use std::sync::Arc;
use tessella_core::model::{Cell, FlushFlag, Row, RowKey, UserContext, Visibility};
use tessella_core::{Error, MemoryStore, Session, SledConfig, SledStore, TableStore};

fn each_backend(test: impl Fn(Arc<dyn TableStore>)) {
    test(Arc::new(MemoryStore::new()));
    test(Arc::new(SledStore::open(SledConfig::temporary()).unwrap()));
}

fn props(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn open_session(store: Arc<dyn TableStore>, autoflush: bool) -> Session {
    let session = Session::new(store);
    session
        .init(&props(&[(
            "autoflush",
            if autoflush { "true" } else { "false" },
        )]))
        .unwrap();
    session
}

fn key(s: &str) -> RowKey {
    RowKey::new(s).unwrap()
}

fn vis(s: &str) -> Visibility {
    Visibility::new(s).unwrap()
}

fn labeled_row(keystr: &str, value: &str, visibility: &str, ts: u64) -> Row {
    let mut row = Row::new(key(keystr));
    row.put_cell(
        "f",
        "q",
        Cell::with_timestamp(value.as_bytes().to_vec(), vis(visibility), ts),
    )
    .unwrap();
    row
}

fn scan_keys(scan: tessella_core::RowScan) -> Vec<String> {
    scan.map(|r| r.unwrap().key().as_str().to_string()).collect()
}

#[test]
fn visibility_filtering_scopes_every_read_path() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let mut row = Row::new(key("r"));
        row.put_cell("f", "open", Cell::with_timestamp(b"o".to_vec(), vis(""), 1))
            .unwrap();
        row.put_cell(
            "f",
            "closed",
            Cell::with_timestamp(b"c".to_vec(), vis("secret"), 1),
        )
        .unwrap();
        session.save_default("t", &row).unwrap();

        let cleared = session.create_user_context(["secret"]).unwrap();
        let uncleared = session.create_user_context(["other"]).unwrap();

        // The same physical row yields different visible content per
        // caller, on point lookups and scans alike.
        let full = session.find_by_row_key("t", &key("r"), &cleared).unwrap().unwrap();
        assert!(full.latest("f", "closed").is_some());

        let partial = session
            .find_by_row_key("t", &key("r"), &uncleared)
            .unwrap()
            .unwrap();
        assert!(partial.latest("f", "open").is_some());
        assert!(partial.latest("f", "closed").is_none());

        // Changing the caller's authorizations changes only the result
        // set, never the stored row.
        let full_again = session.find_by_row_key("t", &key("r"), &cleared).unwrap().unwrap();
        assert_eq!(full_again.latest("f", "closed").unwrap().value, b"c");
    });
}

#[test]
fn fully_filtered_rows_are_suppressed_everywhere() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        session
            .save_default("t", &labeled_row("hidden", "v", "secret", 1))
            .unwrap();
        session
            .save_default("t", &labeled_row("shown", "v", "", 1))
            .unwrap();

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        assert!(session.find_by_row_key("t", &key("hidden"), &ctx).unwrap().is_none());
        assert_eq!(scan_keys(session.find_all("t", &ctx).unwrap()), vec!["shown"]);
        assert_eq!(session.row_count("t", &ctx).unwrap(), 1);
    });
}

#[test]
fn version_ordering_returns_greatest_and_never_duplicates() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        session.save_default("t", &labeled_row("r", "first", "", 100)).unwrap();
        session.save_default("t", &labeled_row("r", "second", "", 300)).unwrap();
        session.save_default("t", &labeled_row("r", "middle", "", 200)).unwrap();
        // Same (row, family, qualifier, version) twice: replaced, not
        // duplicated.
        session.save_default("t", &labeled_row("r", "second-again", "", 300)).unwrap();

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        let row = session.find_by_row_key("t", &key("r"), &ctx).unwrap().unwrap();
        assert_eq!(row.latest("f", "q").unwrap().value, b"second-again");

        let timestamps: Vec<u64> = row
            .column("f", "q")
            .unwrap()
            .versions()
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(timestamps, vec![300, 200, 100]);
    });
}

#[test]
fn prefix_matching_returns_exactly_the_prefixed_keys() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        for k in ["user:1", "user:2", "admin:1"] {
            session.save_default("t", &labeled_row(k, "v", "", 1)).unwrap();
        }

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        let scan = session
            .find_by_row_starts_with("t", &key("user:"), &ctx)
            .unwrap();
        assert_eq!(scan_keys(scan), vec!["user:1", "user:2"]);
    });
}

#[test]
fn range_bounds_are_end_exclusive() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        for k in ["a", "b", "c", "d"] {
            session.save_default("t", &labeled_row(k, "v", "", 1)).unwrap();
        }

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        let scan = session
            .find_by_row_key_range("t", &key("a"), &key("c"), &ctx)
            .unwrap();
        assert_eq!(scan_keys(scan), vec!["a", "b"]);
    });
}

#[test]
fn regex_matching_is_anchored_and_deterministic() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        for k in ["item-1", "item-22", "xitem-1"] {
            session.save_default("t", &labeled_row(k, "v", "", 1)).unwrap();
        }

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        let first = scan_keys(
            session
                .find_by_row_key_regex("t", "item-[0-9]+", &ctx)
                .unwrap(),
        );
        assert_eq!(first, vec!["item-1", "item-22"]);

        // Same backend state, same result.
        let second = scan_keys(
            session
                .find_by_row_key_regex("t", "item-[0-9]+", &ctx)
                .unwrap(),
        );
        assert_eq!(first, second);
    });
}

#[test]
fn autoflush_makes_saves_visible_to_a_second_session() {
    each_backend(|store| {
        let writer = open_session(store.clone(), true);
        let admin = writer.create_user_context(["admin"]).unwrap();
        writer.initialize_table("t", &admin).unwrap();
        writer.save_default("t", &labeled_row("r", "v", "", 1)).unwrap();

        // No explicit flush: a reader on the same store sees the row.
        let reader = open_session(store, true);
        let ctx = reader.create_user_context(Vec::<String>::new()).unwrap();
        assert!(reader.find_by_row_key("t", &key("r"), &ctx).unwrap().is_some());
    });
}

#[test]
fn save_many_persists_every_row_under_autoflush() {
    each_backend(|store| {
        let session = open_session(store.clone(), true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let rows: Vec<Row> = (0..5)
            .map(|i| labeled_row(&format!("r{i}"), "v", "", 1))
            .collect();
        session.save_many("t", rows).unwrap();

        // Durable before the call returns: visible through the backend
        // with no explicit flush.
        let ctx = UserContext::anonymous();
        for i in 0..5 {
            let keystr = format!("r{i}");
            assert!(store.get("t", &key(&keystr), &ctx).unwrap().is_some());
        }
    });
}

#[test]
fn save_many_defers_until_flush_when_buffering() {
    each_backend(|store| {
        let session = open_session(store.clone(), false);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let rows: Vec<Row> = (0..5)
            .map(|i| labeled_row(&format!("r{i}"), "v", "", 1))
            .collect();
        session.save_many("t", rows).unwrap();

        let ctx = UserContext::anonymous();
        assert!(store.get("t", &key("r0"), &ctx).unwrap().is_none());

        session.flush().unwrap();
        for i in 0..5 {
            let keystr = format!("r{i}");
            assert!(store.get("t", &key(&keystr), &ctx).unwrap().is_some());
        }
    });
}

#[test]
fn concurrent_saves_and_flushes_stay_consistent() {
    each_backend(|store| {
        let session = Arc::new(open_session(store, false));
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let mut workers = Vec::new();
        for w in 0..4 {
            let session = Arc::clone(&session);
            workers.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let keystr = format!("w{w}:{i:03}");
                    session
                        .save("t", &labeled_row(&keystr, "v", "", 1), FlushFlag::Default)
                        .unwrap();
                    // Interleave flushes with the saves on other
                    // threads; every mutation must land in exactly one
                    // flush.
                    if i % 10 == 0 {
                        session.flush().unwrap();
                    }
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        session.flush().unwrap();

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        assert_eq!(session.row_count("t", &ctx).unwrap(), 200);
    });
}

#[test]
fn deferred_writes_survive_close_but_not_abandonment() {
    each_backend(|store| {
        let ctx = UserContext::anonymous();

        // Abandoned without close: the buffered row is never persisted.
        {
            let session = open_session(store.clone(), false);
            let admin = session.create_user_context(["admin"]).unwrap();
            session.initialize_table("t", &admin).unwrap();
            session
                .save("t", &labeled_row("lost", "v", "", 1), FlushFlag::Default)
                .unwrap();
        }
        assert!(store.get("t", &key("lost"), &ctx).unwrap().is_none());

        // Closed properly: close flushes before releasing resources.
        {
            let session = open_session(store.clone(), false);
            session
                .save("t", &labeled_row("kept", "v", "", 1), FlushFlag::Default)
                .unwrap();
            session.close().unwrap();
        }
        assert!(store.get("t", &key("kept"), &ctx).unwrap().is_some());
    });
}

#[test]
fn relabel_touches_only_matching_cells() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let mut row = Row::new(key("r"));
        row.put_cell("f", "a", Cell::with_timestamp(b"s".to_vec(), vis("secret"), 10))
            .unwrap();
        row.put_cell("f", "b", Cell::with_timestamp(b"i".to_vec(), vis("internal"), 20))
            .unwrap();
        session.save_default("t", &row).unwrap();

        session
            .alter_columns_visibility("t", &row, &vis("secret"), &vis("public"), FlushFlag::Flush)
            .unwrap();

        let everything = session
            .create_user_context(["public", "secret", "internal"])
            .unwrap();
        let stored = session
            .find_by_row_key("t", &key("r"), &everything)
            .unwrap()
            .unwrap();

        // The secret cell is now public, value and version intact.
        let relabeled = stored.latest("f", "a").unwrap();
        assert_eq!(relabeled.visibility, vis("public"));
        assert_eq!(relabeled.value, b"s");
        assert_eq!(relabeled.timestamp, 10);

        // The internal cell is untouched.
        assert_eq!(stored.latest("f", "b").unwrap().visibility, vis("internal"));

        // Nothing is left under the old label.
        let old_label_only = session.create_user_context(["secret"]).unwrap();
        assert!(session
            .find_by_row_key("t", &key("r"), &old_label_only)
            .unwrap()
            .is_none());
    });
}

#[test]
fn delete_column_is_scoped_by_visibility() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        let mut row = Row::new(key("r"));
        row.put_cell("f", "q", Cell::with_timestamp(b"s".to_vec(), vis("secret"), 1))
            .unwrap();
        row.put_cell("f", "q", Cell::with_timestamp(b"i".to_vec(), vis("internal"), 1))
            .unwrap();
        session.save_default("t", &row).unwrap();

        session
            .delete_column(&row, "t", "f", "q", &vis("secret"))
            .unwrap();

        let everything = session.create_user_context(["secret", "internal"]).unwrap();
        let stored = session
            .find_by_row_key("t", &key("r"), &everything)
            .unwrap()
            .unwrap();
        let remaining: Vec<_> = stored.column("f", "q").unwrap().versions().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].visibility, vis("internal"));
    });
}

#[test]
fn delete_row_removes_it_from_every_read_path() {
    each_backend(|store| {
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();

        session.save_default("t", &labeled_row("r", "v", "", 1)).unwrap();
        session.save_default("t", &labeled_row("other", "v", "", 1)).unwrap();
        session.delete_row("t", &key("r")).unwrap();

        let ctx = session.create_user_context(Vec::<String>::new()).unwrap();
        assert!(session.find_by_row_key("t", &key("r"), &ctx).unwrap().is_none());
        assert_eq!(scan_keys(session.find_all("t", &ctx).unwrap()), vec!["other"]);
        assert_eq!(session.row_count("t", &ctx).unwrap(), 1);
    });
}

#[test]
fn table_lifecycle_is_admin_scoped() {
    each_backend(|store| {
        let session = open_session(store, true);
        let reader = session.create_user_context(["reader"]).unwrap();

        assert!(matches!(
            session.initialize_table("t", &reader),
            Err(Error::AccessDenied(_))
        ));

        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();
        assert_eq!(session.table_list(&admin).unwrap(), vec!["t"]);

        session.delete_table("t", &admin).unwrap();
        assert!(session.table_list(&admin).unwrap().is_empty());
    });
}

#[test]
fn sled_backend_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = SledConfig::new(dir.path());

    {
        let store = Arc::new(SledStore::open(config.clone()).unwrap());
        let session = open_session(store, true);
        let admin = session.create_user_context(["admin"]).unwrap();
        session.initialize_table("t", &admin).unwrap();
        session.save_default("t", &labeled_row("r", "v", "secret", 7)).unwrap();
        session.close().unwrap();
    }

    let store = Arc::new(SledStore::open(config).unwrap());
    let session = open_session(store, true);
    let cleared = session.create_user_context(["secret"]).unwrap();
    let row = session
        .find_by_row_key("t", &key("r"), &cleared)
        .unwrap()
        .unwrap();
    assert_eq!(row.latest("f", "q").unwrap().value, b"v");
    assert_eq!(row.latest("f", "q").unwrap().timestamp, 7);
}
