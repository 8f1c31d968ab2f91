use crate::record::{FieldErrors, InsertAt, Record, SortValue};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

static SKU_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,31}$").expect("valid regex"));
static SYMBOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-]{0,9}$").expect("valid regex"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total_approx: Option<u64>,
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn date_value(date: Option<NaiveDate>) -> SortValue<'static> {
    date.map(|value| SortValue::Number(f64::from(value.num_days_from_ce())))
        .unwrap_or(SortValue::Missing)
}

// ─── Tasks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" | "normal" => Some(Self::Medium),
            "high" | "urgent" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// `Some(None)` on a double option clears the field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Some(Self::All),
            "active" | "open" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl Task {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

impl Record for Task {
    type Draft = TaskDraft;
    type Patch = TaskPatch;
    type Filter = TaskFilter;

    const KIND: &'static str = "task";
    const INSERT_AT: InsertAt = InsertAt::Front;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn build(id: String, created_at: DateTime<Utc>, draft: TaskDraft) -> Self {
        Self {
            id,
            text: draft.text.trim().to_string(),
            completed: draft.completed,
            priority: draft.priority,
            due_date: draft.due_date,
            category: normalize_optional(draft.category),
            created_at,
            completed_at: draft.completed.then_some(created_at),
        }
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("text", &self.text);
        if self.text.chars().count() > 500 {
            errors.push("text", "must be at most 500 characters");
        }
        errors.into_result()
    }

    fn patched(&self, patch: &TaskPatch) -> Self {
        let mut next = self.clone();
        if let Some(text) = patch.text.as_ref() {
            next.text = text.trim().to_string();
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            next.due_date = due_date;
        }
        if let Some(category) = patch.category.clone() {
            next.category = normalize_optional(category);
        }
        next
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.text.as_str()];
        if let Some(category) = self.category.as_deref() {
            fields.push(category);
        }
        fields
    }

    fn matches(&self, filter: &TaskFilter) -> bool {
        match filter {
            TaskFilter::All => true,
            TaskFilter::Active => !self.completed,
            TaskFilter::Completed => self.completed,
        }
    }

    fn sort_value(&self, key: &str) -> Option<SortValue<'_>> {
        let value = match key {
            "createdAt" => SortValue::time(self.created_at),
            "text" => SortValue::Text(&self.text),
            "dueDate" => date_value(self.due_date),
            "priority" => SortValue::Number(f64::from(self.priority.rank())),
            "category" => SortValue::optional_text(self.category.as_deref()),
            "completedAt" => self.completed_at.map(SortValue::time).unwrap_or(SortValue::Missing),
            _ => return None,
        };
        Some(value)
    }

    fn toggled(&self, flag: &str, now: DateTime<Utc>) -> Option<Self> {
        if flag != "completed" {
            return None;
        }
        let mut next = self.clone();
        next.completed = !self.completed;
        next.completed_at = if next.completed { Some(now) } else { None };
        Some(next)
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "text", "completed", "createdAt"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "text": { "type": "string" },
                "completed": { "type": "boolean" },
                "priority": { "enum": ["low", "medium", "high"] },
                "dueDate": { "type": ["string", "null"] },
                "category": { "type": ["string", "null"] },
                "createdAt": { "type": "string" },
                "completedAt": { "type": ["string", "null"] }
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub overdue: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task], today: NaiveDate) -> Self {
        let completed = tasks.iter().filter(|task| task.completed).count();
        Self {
            total: tasks.len(),
            active: tasks.len() - completed,
            completed,
            overdue: tasks.iter().filter(|task| task.is_overdue(today)).count(),
        }
    }
}

// ─── Inventory ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockLevel {
    InStock,
    LowStock,
    OutOfStock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reorder_level: u32,
    #[serde(default)]
    pub discontinued: bool,
    #[serde(default)]
    pub discontinued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryDraft {
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub category: Option<String>,
    pub reorder_level: u32,
    pub discontinued: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<u32>,
    pub unit_price: Option<f64>,
    pub category: Option<Option<String>>,
    pub reorder_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockFilter {
    #[default]
    All,
    InStock,
    LowStock,
    OutOfStock,
    Discontinued,
}

impl StockFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Some(Self::All),
            "in-stock" | "instock" => Some(Self::InStock),
            "low-stock" | "low" => Some(Self::LowStock),
            "out-of-stock" | "out" => Some(Self::OutOfStock),
            "discontinued" => Some(Self::Discontinued),
            _ => None,
        }
    }
}

impl InventoryItem {
    pub fn stock_level(&self) -> StockLevel {
        if self.quantity == 0 {
            StockLevel::OutOfStock
        } else if self.quantity <= self.reorder_level {
            StockLevel::LowStock
        } else {
            StockLevel::InStock
        }
    }

    pub fn stock_value(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

impl Record for InventoryItem {
    type Draft = InventoryDraft;
    type Patch = InventoryPatch;
    type Filter = StockFilter;

    const KIND: &'static str = "item";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn build(id: String, created_at: DateTime<Utc>, draft: InventoryDraft) -> Self {
        Self {
            id,
            name: draft.name.trim().to_string(),
            sku: draft.sku.trim().to_ascii_uppercase(),
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            category: normalize_optional(draft.category),
            reorder_level: draft.reorder_level,
            discontinued: draft.discontinued,
            discontinued_at: draft.discontinued.then_some(created_at),
            created_at,
        }
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("name", &self.name);
        if !SKU_PATTERN.is_match(&self.sku) {
            errors.push("sku", "must be 1-32 letters, digits, '-' or '_'");
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            errors.push("unitPrice", "must be a non-negative amount");
        }
        errors.into_result()
    }

    fn patched(&self, patch: &InventoryPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = patch.name.as_ref() {
            next.name = name.trim().to_string();
        }
        if let Some(sku) = patch.sku.as_ref() {
            next.sku = sku.trim().to_ascii_uppercase();
        }
        if let Some(quantity) = patch.quantity {
            next.quantity = quantity;
        }
        if let Some(unit_price) = patch.unit_price {
            next.unit_price = unit_price;
        }
        if let Some(category) = patch.category.clone() {
            next.category = normalize_optional(category);
        }
        if let Some(reorder_level) = patch.reorder_level {
            next.reorder_level = reorder_level;
        }
        next
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.sku.as_str()];
        if let Some(category) = self.category.as_deref() {
            fields.push(category);
        }
        fields
    }

    fn matches(&self, filter: &StockFilter) -> bool {
        match filter {
            StockFilter::All => true,
            StockFilter::InStock => !self.discontinued && self.stock_level() == StockLevel::InStock,
            StockFilter::LowStock => !self.discontinued && self.stock_level() == StockLevel::LowStock,
            StockFilter::OutOfStock => !self.discontinued && self.stock_level() == StockLevel::OutOfStock,
            StockFilter::Discontinued => self.discontinued,
        }
    }

    fn sort_value(&self, key: &str) -> Option<SortValue<'_>> {
        let value = match key {
            "name" => SortValue::Text(&self.name),
            "sku" => SortValue::Text(&self.sku),
            "quantity" => SortValue::Number(f64::from(self.quantity)),
            "unitPrice" => SortValue::Number(self.unit_price),
            "value" => SortValue::Number(self.stock_value()),
            "category" => SortValue::optional_text(self.category.as_deref()),
            "createdAt" => SortValue::time(self.created_at),
            _ => return None,
        };
        Some(value)
    }

    fn toggled(&self, flag: &str, now: DateTime<Utc>) -> Option<Self> {
        if flag != "discontinued" {
            return None;
        }
        let mut next = self.clone();
        next.discontinued = !self.discontinued;
        next.discontinued_at = if next.discontinued { Some(now) } else { None };
        Some(next)
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "name", "sku", "quantity", "unitPrice", "createdAt"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "name": { "type": "string" },
                "sku": { "type": "string" },
                "quantity": { "type": "integer", "minimum": 0 },
                "unitPrice": { "type": "number" },
                "category": { "type": ["string", "null"] },
                "reorderLevel": { "type": "integer", "minimum": 0 },
                "discontinued": { "type": "boolean" },
                "discontinuedAt": { "type": ["string", "null"] },
                "createdAt": { "type": "string" }
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub items: usize,
    pub units: u64,
    pub stock_value: f64,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub discontinued: usize,
}

impl InventorySummary {
    pub fn from_items(items: &[InventoryItem]) -> Self {
        let mut summary = Self {
            items: items.len(),
            ..Self::default()
        };
        for item in items {
            if item.discontinued {
                summary.discontinued += 1;
                continue;
            }
            summary.units += u64::from(item.quantity);
            summary.stock_value += item.stock_value();
            match item.stock_level() {
                StockLevel::LowStock => summary.low_stock += 1,
                StockLevel::OutOfStock => summary.out_of_stock += 1,
                StockLevel::InStock => {}
            }
        }
        summary
    }
}

// ─── Investments ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    #[default]
    Stock,
    Bond,
    Fund,
    Crypto,
    Cash,
    Other,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Bond => "bond",
            Self::Fund => "fund",
            Self::Crypto => "crypto",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stock" | "equity" => Some(Self::Stock),
            "bond" => Some(Self::Bond),
            "fund" | "etf" => Some(Self::Fund),
            "crypto" => Some(Self::Crypto),
            "cash" => Some(Self::Cash),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub kind: AssetKind,
    pub shares: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvestmentDraft {
    pub symbol: String,
    pub name: String,
    pub kind: AssetKind,
    pub shares: f64,
    pub purchase_price: f64,
    pub current_price: Option<f64>,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvestmentPatch {
    pub name: Option<String>,
    pub kind: Option<AssetKind>,
    pub shares: Option<f64>,
    pub purchase_price: Option<f64>,
    pub current_price: Option<f64>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentFilter {
    pub kind: Option<AssetKind>,
}

impl Investment {
    pub fn cost_basis(&self) -> f64 {
        self.shares * self.purchase_price
    }

    pub fn market_value(&self) -> f64 {
        self.shares * self.current_price
    }

    pub fn gain(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }

    pub fn gain_percent(&self) -> f64 {
        let basis = self.cost_basis();
        if basis == 0.0 {
            0.0
        } else {
            self.gain() / basis * 100.0
        }
    }
}

impl Record for Investment {
    type Draft = InvestmentDraft;
    type Patch = InvestmentPatch;
    type Filter = InvestmentFilter;

    const KIND: &'static str = "inv";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn build(id: String, created_at: DateTime<Utc>, draft: InvestmentDraft) -> Self {
        Self {
            id,
            symbol: draft.symbol.trim().to_ascii_uppercase(),
            name: draft.name.trim().to_string(),
            kind: draft.kind,
            shares: draft.shares,
            purchase_price: draft.purchase_price,
            current_price: draft.current_price.unwrap_or(draft.purchase_price),
            purchase_date: draft.purchase_date,
            notes: normalize_optional(draft.notes),
            created_at,
        }
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if !SYMBOL_PATTERN.is_match(&self.symbol) {
            errors.push("symbol", "must be 1-10 characters: A-Z, 0-9, '.' or '-'");
        }
        errors.require_text("name", &self.name);
        if !self.shares.is_finite() || self.shares <= 0.0 {
            errors.push("shares", "must be greater than zero");
        }
        if !self.purchase_price.is_finite() || self.purchase_price < 0.0 {
            errors.push("purchasePrice", "must be a non-negative amount");
        }
        if !self.current_price.is_finite() || self.current_price < 0.0 {
            errors.push("currentPrice", "must be a non-negative amount");
        }
        if self.purchase_date > self.created_at.date_naive() {
            errors.push("purchaseDate", "cannot be in the future");
        }
        errors.into_result()
    }

    fn patched(&self, patch: &InvestmentPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = patch.name.as_ref() {
            next.name = name.trim().to_string();
        }
        if let Some(kind) = patch.kind {
            next.kind = kind;
        }
        if let Some(shares) = patch.shares {
            next.shares = shares;
        }
        if let Some(purchase_price) = patch.purchase_price {
            next.purchase_price = purchase_price;
        }
        if let Some(current_price) = patch.current_price {
            next.current_price = current_price;
        }
        if let Some(notes) = patch.notes.clone() {
            next.notes = normalize_optional(notes);
        }
        next
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.symbol.as_str(), self.name.as_str()];
        if let Some(notes) = self.notes.as_deref() {
            fields.push(notes);
        }
        fields
    }

    fn matches(&self, filter: &InvestmentFilter) -> bool {
        filter.kind.map_or(true, |kind| kind == self.kind)
    }

    fn sort_value(&self, key: &str) -> Option<SortValue<'_>> {
        let value = match key {
            "symbol" => SortValue::Text(&self.symbol),
            "name" => SortValue::Text(&self.name),
            "kind" => SortValue::Text(self.kind.as_str()),
            "shares" => SortValue::Number(self.shares),
            "value" => SortValue::Number(self.market_value()),
            "gain" => SortValue::Number(self.gain()),
            "gainPercent" => SortValue::Number(self.gain_percent()),
            "purchaseDate" => date_value(Some(self.purchase_date)),
            "createdAt" => SortValue::time(self.created_at),
            _ => return None,
        };
        Some(value)
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "symbol", "name", "shares", "purchasePrice", "currentPrice", "purchaseDate", "createdAt"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "symbol": { "type": "string" },
                "name": { "type": "string" },
                "kind": { "enum": ["stock", "bond", "fund", "crypto", "cash", "other"] },
                "shares": { "type": "number" },
                "purchasePrice": { "type": "number" },
                "currentPrice": { "type": "number" },
                "purchaseDate": { "type": "string" },
                "notes": { "type": ["string", "null"] },
                "createdAt": { "type": "string" }
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub positions: usize,
    pub invested: f64,
    pub market_value: f64,
    pub gain: f64,
    pub gain_percent: f64,
    pub allocation: BTreeMap<String, f64>,
}

impl PortfolioSummary {
    pub fn from_positions(positions: &[Investment]) -> Self {
        let mut summary = Self {
            positions: positions.len(),
            ..Self::default()
        };
        for position in positions {
            summary.invested += position.cost_basis();
            summary.market_value += position.market_value();
            *summary
                .allocation
                .entry(position.kind.as_str().to_string())
                .or_insert(0.0) += position.market_value();
        }
        summary.gain = summary.market_value - summary.invested;
        summary.gain_percent = if summary.invested == 0.0 {
            0.0
        } else {
            summary.gain / summary.invested * 100.0
        };
        summary
    }
}

// ─── Screener chat ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatDraft {
    pub role: ChatRole,
    pub content: String,
}

impl ChatDraft {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatFilter {
    pub role: Option<ChatRole>,
}

pub const SCREENER_GREETING: &str =
    "Hi! I'll ask a few short questions to check whether you may qualify. What is your household size?";

impl Record for ChatMessage {
    type Draft = ChatDraft;
    type Patch = ChatPatch;
    type Filter = ChatFilter;

    const KIND: &'static str = "msg";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn build(id: String, created_at: DateTime<Utc>, draft: ChatDraft) -> Self {
        Self {
            id,
            role: draft.role,
            content: draft.content.trim().to_string(),
            created_at,
        }
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("content", &self.content);
        errors.into_result()
    }

    fn patched(&self, patch: &ChatPatch) -> Self {
        let mut next = self.clone();
        if let Some(content) = patch.content.as_ref() {
            next.content = content.trim().to_string();
        }
        next
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.content.as_str()]
    }

    fn matches(&self, filter: &ChatFilter) -> bool {
        filter.role.map_or(true, |role| role == self.role)
    }

    fn sort_value(&self, key: &str) -> Option<SortValue<'_>> {
        let value = match key {
            "createdAt" => SortValue::time(self.created_at),
            "role" => SortValue::Text(self.role.as_str()),
            _ => return None,
        };
        Some(value)
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "role", "content", "createdAt"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "role": { "enum": ["user", "assistant", "system"] },
                "content": { "type": "string" },
                "createdAt": { "type": "string" }
            }
        })
    }

    fn seed() -> Vec<ChatDraft> {
        vec![ChatDraft::assistant(SCREENER_GREETING)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Eligible,
    Ineligible,
    NeedsReview,
}

/// Summary derived from the screener conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub verdict: Verdict,
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "verdict", "summary", "messageCount", "createdAt"],
            "properties": {
                "id": { "type": "string", "minLength": 1 },
                "verdict": { "enum": ["eligible", "ineligible", "needs-review"] },
                "summary": { "type": "string" },
                "reasons": { "type": "array", "items": { "type": "string" } },
                "messageCount": { "type": "integer", "minimum": 0 },
                "createdAt": { "type": "string" }
            }
        })
    }
}

/// Shape the assistant must answer with when asked for an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReply {
    pub verdict: Verdict,
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl AssessmentReply {
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["verdict", "summary"],
            "properties": {
                "verdict": { "enum": ["eligible", "ineligible", "needs-review"] },
                "summary": { "type": "string", "minLength": 1 },
                "reasons": { "type": "array", "items": { "type": "string" } }
            }
        })
    }
}
