use shelfkit::config::Backend;
use shelfkit::models::{
    AssetKind, InventoryDraft, InventoryItem, Investment, InvestmentDraft, StockFilter, Task, TaskDraft,
    TaskFilter, TaskPatch,
};
use shelfkit::shelf::{import_from_file, Shelf, INVENTORY_KEY, INVESTMENTS_KEY, TASKS_KEY};
use shelfkit::store::{KeyValueStore, SqliteStore};
use shelfkit::{CollectionController, PersistentStore, ShelfConfig, SortDirection, ViewQuery};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn sqlite_store(dir: &Path) -> (Arc<SqliteStore>, PersistentStore) {
    let backend = Arc::new(SqliteStore::open(&dir.join("shelf.sqlite"), None).expect("open sqlite"));
    (backend.clone(), PersistentStore::new(backend))
}

fn config(dir: &Path) -> ShelfConfig {
    ShelfConfig {
        data_dir: dir.to_path_buf(),
        backend: Backend::Sqlite,
        assistant_latency_ms: 0,
        assistant_jitter_ms: 0,
        prefers_dark: Some(true),
        ..ShelfConfig::default()
    }
}

#[test]
fn buy_milk_toggle_round_trip_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, store) = sqlite_store(dir.path());
    let mut tasks: CollectionController<Task> = CollectionController::open(store.clone(), TASKS_KEY);
    assert!(tasks.is_empty());

    let added = tasks.add(TaskDraft::new("Buy milk")).expect("add");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks.records()[0].text, "Buy milk");
    assert!(!added.id.is_empty());

    let done = tasks.toggle_flag(&added.id, "completed").expect("toggle on");
    assert!(done.completed);
    assert!(done.completed_at.is_some());

    let undone = tasks.toggle_flag(&added.id, "completed").expect("toggle off");
    assert!(!undone.completed);
    assert!(undone.completed_at.is_none());

    let reopened: CollectionController<Task> = CollectionController::open(store, TASKS_KEY);
    assert_eq!(reopened.records(), tasks.records());
}

#[test]
fn investments_round_trip_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, store) = sqlite_store(dir.path());
    let mut positions: CollectionController<Investment> = CollectionController::open(store.clone(), INVESTMENTS_KEY);

    for (symbol, shares, price) in [("ACME", 9953.789980209001, 12.345678901234567), ("BND", 0.1 + 0.2, 99.99)] {
        positions
            .add(InvestmentDraft {
                symbol: symbol.to_string(),
                name: format!("{} holdings", symbol),
                kind: AssetKind::Stock,
                shares,
                purchase_price: price,
                current_price: Some(price * 1.1),
                purchase_date: chrono::NaiveDate::from_ymd_opt(2025, 12, 31).expect("date"),
                notes: Some("long term".to_string()),
            })
            .expect("add position");
    }
    assert!(positions.persist_error().is_none());

    let reopened: CollectionController<Investment> = CollectionController::open(store, INVESTMENTS_KEY);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.records(), positions.records());
}

#[test]
fn inventory_round_trips_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, store) = sqlite_store(dir.path());
    let mut items: CollectionController<InventoryItem> = CollectionController::open(store.clone(), INVENTORY_KEY);

    items
        .add(InventoryDraft {
            name: "Wood glue".to_string(),
            sku: "glue-1".to_string(),
            quantity: 4,
            unit_price: 3.3000000000000003,
            category: Some("Adhesives".to_string()),
            reorder_level: 5,
            discontinued: true,
        })
        .expect("add glue");
    items
        .add(InventoryDraft {
            name: "Screws".to_string(),
            sku: "scr-10".to_string(),
            quantity: 250,
            unit_price: 0.07,
            category: None,
            reorder_level: 50,
            discontinued: false,
        })
        .expect("add screws");
    assert!(items.persist_error().is_none());

    let reopened: CollectionController<InventoryItem> = CollectionController::open(store, INVENTORY_KEY);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.records(), items.records());
}

#[test]
fn unknown_ids_leave_persisted_collection_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (backend, store) = sqlite_store(dir.path());
    let mut tasks: CollectionController<Task> = CollectionController::open(store, TASKS_KEY);
    tasks.add(TaskDraft::new("Keep me")).expect("add");
    let before = backend.get(TASKS_KEY).expect("get");

    let patch = TaskPatch {
        text: Some("changed".to_string()),
        ..TaskPatch::default()
    };
    assert_eq!(tasks.update("task_missing", &patch).expect("update"), false);
    assert!(tasks.toggle_flag("task_missing", "completed").is_none());
    assert!(!tasks.remove("task_missing"));

    assert_eq!(backend.get(TASKS_KEY).expect("get"), before);
    assert_eq!(tasks.len(), 1);
}

#[test]
fn corrupt_persisted_value_resets_to_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (backend, store) = sqlite_store(dir.path());
    backend.set(TASKS_KEY, "{\"not\": \"an array\"}").expect("seed corrupt value");

    let loaded = store.load_collection::<Task, _>(TASKS_KEY, Vec::new);
    assert!(loaded.fallback_reason().is_some());

    let tasks: CollectionController<Task> = CollectionController::open(store, TASKS_KEY);
    assert!(tasks.is_empty());
}

#[test]
fn csv_fixture_imports_valid_rows_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, store) = sqlite_store(dir.path());
    let mut tasks: CollectionController<Task> = CollectionController::open(store, TASKS_KEY);

    let report = import_from_file(&mut tasks, &fixture("tasks.csv")).expect("import");
    assert_eq!(report.imported, 3);
    let skipped: Vec<usize> = report.skipped.iter().map(|row| row.line).collect();
    assert_eq!(skipped, vec![3, 5]);

    let view = tasks.view(&ViewQuery::new().search("BANK").filter(TaskFilter::Active));
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].text, "Call the bank, ask about fees");

    let by_text = tasks.view(&ViewQuery::new().sort_by("text", SortDirection::Asc));
    let texts: Vec<&str> = by_text.iter().map(|task| task.text.as_str()).collect();
    assert_eq!(texts, vec!["Buy milk", "Call the bank, ask about fees", "Renew passport"]);
}

#[test]
fn inventory_fixture_keeps_discontinued_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut shelf = Shelf::open(config(dir.path())).expect("open shelf");

    let report = import_from_file(shelf.inventory_mut(), &fixture("inventory.csv")).expect("import");
    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped.len(), 2);

    let discontinued: Vec<InventoryItem> = shelf
        .inventory()
        .view(&ViewQuery::new().filter(StockFilter::Discontinued));
    assert_eq!(discontinued.len(), 1);
    assert_eq!(discontinued[0].sku, "GLUE-1");
    assert!(discontinued[0].discontinued_at.is_some());

    let summary = shelf.inventory_summary();
    assert_eq!(summary.items, 2);
    assert_eq!(summary.discontinued, 1);
}

#[tokio::test]
async fn shelf_reopens_with_every_collection_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut shelf = Shelf::open(config(dir.path())).expect("open shelf");
        shelf.tasks_mut().add(TaskDraft::new("Persist me")).expect("add");
        shelf.screener_mut().send("2").await.expect("screener reply");
        assert!(shelf.theme().is_dark());
        shelf.toggle_theme().expect("toggle theme");
    }

    let shelf = Shelf::open(config(dir.path())).expect("reopen shelf");
    assert_eq!(shelf.tasks().len(), 1);
    assert_eq!(shelf.screener().messages().len(), 3);
    assert!(!shelf.theme().is_dark());
}

#[cfg(unix)]
#[test]
fn cli_adds_and_lists_tasks() {
    use std::process::Command;

    let dir = tempfile::tempdir().expect("tempdir");
    let run = |args: &[&str]| {
        let output = Command::new(env!("CARGO_BIN_EXE_shelf"))
            .arg("--data-dir")
            .arg(dir.path())
            .args(args)
            .env("SHELF_BACKEND", "files")
            .env("SHELF_COLOR_SCHEME", "light")
            .env_remove("SHELF_CONFIG")
            .output()
            .expect("run shelf");
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice::<serde_json::Value>(&output.stdout).expect("json output")
    };

    let added = run(&["tasks", "add", "Buy milk", "--priority", "high"]);
    assert_eq!(added["text"], "Buy milk");
    assert_eq!(added["priority"], "high");

    let listed = run(&["tasks", "list", "--search", "MILK"]);
    assert_eq!(listed["items"].as_array().map(Vec::len), Some(1));

    let id = added["id"].as_str().expect("id").to_string();
    let toggled = run(&["tasks", "toggle", &id]);
    assert_eq!(toggled["task"]["completed"], true);

    let theme = run(&["theme", "show"]);
    assert_eq!(theme["dark"], false);
}

#[cfg(unix)]
#[test]
fn cli_default_purchase_date_is_accepted_east_of_utc() {
    use std::process::Command;

    let dir = tempfile::tempdir().expect("tempdir");
    // UTC+14: the local date is already tomorrow for most of the UTC day.
    let output = Command::new(env!("CARGO_BIN_EXE_shelf"))
        .arg("--data-dir")
        .arg(dir.path())
        .args(["investments", "add", "ACME", "--shares", "1", "--price", "10"])
        .env("TZ", "Pacific/Kiritimati")
        .env("SHELF_BACKEND", "files")
        .env_remove("SHELF_CONFIG")
        .output()
        .expect("run shelf");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let added: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(added["symbol"], "ACME");
    assert!(added["purchaseDate"].is_string());
}
