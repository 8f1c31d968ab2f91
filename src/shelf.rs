use crate::assist::{Assistant, CannedAssistant};
use crate::collection::CollectionController;
use crate::config::{Backend, ShelfConfig};
use crate::csv::{export_csv, import_csv, CsvRecord, ImportReport};
use crate::errors::{AppError, AppResult};
use crate::models::{
    InventoryItem, InventorySummary, Investment, PageResponse, PortfolioSummary, Task, TaskStats,
};
use crate::record::Record;
use crate::screener::Screener;
use crate::store::{FileStore, KeyValueStore, MemoryStore, PersistentStore, SqliteStore};
use crate::theme::{system_prefers_dark, Theme, ThemePreference};
use crate::view::{paginate, ViewQuery};
use chrono::{Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TASKS_KEY: &str = "shelf.tasks";
pub const INVENTORY_KEY: &str = "shelf.inventory";
pub const INVESTMENTS_KEY: &str = "shelf.investments";
pub const SCREENER_MESSAGES_KEY: &str = "shelf.screener.messages";
pub const SCREENER_ASSESSMENT_KEY: &str = "shelf.screener.assessment";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub path: String,
    pub rows: usize,
}

/// Application root: one store shared by every collection, opened once at
/// startup and kept for the life of the process.
pub struct Shelf {
    config: ShelfConfig,
    store: PersistentStore,
    tasks: CollectionController<Task>,
    inventory: CollectionController<InventoryItem>,
    investments: CollectionController<Investment>,
    theme: ThemePreference,
    screener: Screener,
}

impl Shelf {
    pub fn open(config: ShelfConfig) -> AppResult<Self> {
        let assistant = Arc::new(CannedAssistant::new(
            config.assistant_latency_ms,
            config.assistant_jitter_ms,
        ));
        Self::with_assistant(config, assistant)
    }

    pub fn with_assistant(config: ShelfConfig, assistant: Arc<dyn Assistant>) -> AppResult<Self> {
        config.validate()?;
        let backend = open_backend(&config)?;
        let store = PersistentStore::new(backend);

        let prefers_dark = config.prefers_dark.unwrap_or_else(system_prefers_dark);
        let shelf = Self {
            tasks: CollectionController::open(store.clone(), TASKS_KEY),
            inventory: CollectionController::open(store.clone(), INVENTORY_KEY),
            investments: CollectionController::open(store.clone(), INVESTMENTS_KEY),
            theme: ThemePreference::load(store.clone(), prefers_dark),
            screener: Screener::open(store.clone(), SCREENER_MESSAGES_KEY, SCREENER_ASSESSMENT_KEY, assistant),
            store,
            config,
        };
        tracing::info!(
            data_dir = %shelf.config.data_dir.display(),
            backend = ?shelf.config.backend,
            tasks = shelf.tasks.len(),
            items = shelf.inventory.len(),
            positions = shelf.investments.len(),
            "shelf opened"
        );
        Ok(shelf)
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn tasks(&self) -> &CollectionController<Task> {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut CollectionController<Task> {
        &mut self.tasks
    }

    pub fn inventory(&self) -> &CollectionController<InventoryItem> {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut CollectionController<InventoryItem> {
        &mut self.inventory
    }

    pub fn investments(&self) -> &CollectionController<Investment> {
        &self.investments
    }

    pub fn investments_mut(&mut self) -> &mut CollectionController<Investment> {
        &mut self.investments
    }

    pub fn screener(&self) -> &Screener {
        &self.screener
    }

    pub fn screener_mut(&mut self) -> &mut Screener {
        &mut self.screener
    }

    pub fn theme(&self) -> Theme {
        self.theme.theme()
    }

    pub fn set_theme(&mut self, theme: Theme) -> AppResult<Theme> {
        self.theme.set(theme)
    }

    pub fn toggle_theme(&mut self) -> AppResult<Theme> {
        self.theme.toggle()
    }

    pub fn task_stats(&self) -> TaskStats {
        TaskStats::from_tasks(self.tasks.records(), Local::now().date_naive())
    }

    pub fn clear_completed_tasks(&mut self) -> usize {
        self.tasks.remove_where(|task| task.completed)
    }

    pub fn inventory_summary(&self) -> InventorySummary {
        InventorySummary::from_items(self.inventory.records())
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        PortfolioSummary::from_positions(self.investments.records())
    }

    /// Default destination for exports: `<dataDir>/exports/<name>_<timestamp>.csv`.
    pub fn export_path(&self, name: &str) -> AppResult<PathBuf> {
        let export_dir = self.config.data_dir.join("exports");
        let file_name = format!(
            "{}_{}.csv",
            sanitize_component(name),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = export_dir.join(file_name);
        if !path.starts_with(&export_dir) {
            return Err(AppError::Io("Resolved export path escaped export directory".to_string()));
        }
        Ok(path)
    }
}

/// Applies the query, then pages the derived view.
pub fn list_page<R: Record>(
    controller: &CollectionController<R>,
    query: &ViewQuery<R::Filter>,
    limit: Option<u32>,
    cursor: Option<String>,
) -> AppResult<PageResponse<R>> {
    paginate(controller.view(query), limit, cursor)
}

pub fn export_to_file<R: CsvRecord>(records: &[R], path: &Path) -> AppResult<ExportResponse> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, export_csv(records))?;
    tracing::info!(kind = R::KIND, rows = records.len(), path = %path.display(), "exported collection");
    Ok(ExportResponse {
        path: path.to_string_lossy().to_string(),
        rows: records.len(),
    })
}

pub fn import_from_file<R: CsvRecord>(
    controller: &mut CollectionController<R>,
    path: &Path,
) -> AppResult<ImportReport> {
    let text = std::fs::read_to_string(path)
        .map_err(|error| AppError::Io(format!("cannot read {}: {}", path.display(), error)))?;
    import_csv(controller, &text)
}

fn open_backend(config: &ShelfConfig) -> AppResult<Arc<dyn KeyValueStore>> {
    let backend: Arc<dyn KeyValueStore> = match config.backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(
            &config.data_dir.join("shelf.sqlite"),
            config.quota_bytes,
        )?),
        Backend::Files => Arc::new(FileStore::open(&config.data_dir.join("store"), config.quota_bytes)?),
        Backend::Memory => match config.quota_bytes {
            Some(quota) => Arc::new(MemoryStore::with_quota(quota)),
            None => Arc::new(MemoryStore::new()),
        },
    };
    Ok(backend)
}

fn sanitize_component(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned.to_string()
    }
}
