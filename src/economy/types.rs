use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const CHARACTER_SCHEMA_VERSION: u8 = 2;
pub const PROJECT_SCHEMA_VERSION: u8 = 1;
pub const TRADE_SCHEMA_VERSION: u8 = 1;
pub const DONATION_SCHEMA_VERSION: u8 = 1;

/// Reserved phase key for labor hours.
pub const LABOR_RESOURCE: &str = "labor";

/// Canonical character key: trimmed, lowercased, first letter capitalized.
/// Every entry point that accepts a character name goes through this.
pub fn normalize_character_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Title-case an item or resource name ("wooden mallet" -> "Wooden Mallet").
/// A letter is capitalized when it follows a non-letter, the rest are lowered.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for ch in input.trim().chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

// ============================================================================
// Characters
// ============================================================================

/// One entry of a character's item map. Kept as an ordered list so wildcard
/// resolution sees items in the order they were first acquired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemStack {
    pub item: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeOutput {
    pub item: String,
    pub quantity: u32,
}

/// The single timed activity a character may be engaged in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ActiveTask {
    #[default]
    Idle,
    Scavenge {
        group: Option<String>,
        completes_at: DateTime<Utc>,
    },
    Craft {
        item: String,
        outputs: Vec<RecipeOutput>,
        completes_at: DateTime<Utc>,
    },
    Disassemble {
        item: String,
        components: BTreeMap<String, u32>,
        completes_at: DateTime<Utc>,
    },
    Labor {
        project_id: u64,
        hours: u32,
        completes_at: DateTime<Utc>,
    },
}

impl ActiveTask {
    pub fn is_idle(&self) -> bool {
        matches!(self, ActiveTask::Idle)
    }

    pub fn completes_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ActiveTask::Idle => None,
            ActiveTask::Scavenge { completes_at, .. }
            | ActiveTask::Craft { completes_at, .. }
            | ActiveTask::Disassemble { completes_at, .. }
            | ActiveTask::Labor { completes_at, .. } => Some(*completes_at),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.completes_at().map(|at| now >= at).unwrap_or(false)
    }

    /// Short human label, e.g. "crafting Wooden Mallet".
    pub fn describe(&self) -> String {
        match self {
            ActiveTask::Idle => "nothing".to_string(),
            ActiveTask::Scavenge { group: Some(g), .. } => format!("scavenging for {}", g),
            ActiveTask::Scavenge { group: None, .. } => "scavenging".to_string(),
            ActiveTask::Craft { item, .. } => format!("crafting {}", item),
            ActiveTask::Disassemble { item, .. } => format!("disassembling {}", item),
            ActiveTask::Labor { project_id, .. } => format!("laboring on project {}", project_id),
        }
    }
}

/// Persistent character record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterRecord {
    /// Normalized name, also the storage key.
    pub name: String,
    /// Opaque identity of the owning chat account.
    pub owner_id: String,
    /// Display name of the owning account at creation time.
    pub owner_name: String,
    pub experience: u64,
    pub currency: i64,
    #[serde(default)]
    pub honor: u64,
    /// Working items: crafting, trades, contributions and donations use these.
    #[serde(default)]
    pub items: Vec<ItemStack>,
    /// Carried gear, reachable only through [`Section`] moves.
    #[serde(default)]
    pub inventory: Vec<ItemStack>,
    #[serde(default)]
    pub stash: Vec<ItemStack>,
    #[serde(default)]
    pub task: ActiveTask,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl CharacterRecord {
    pub fn new(name: &str, owner_id: &str, owner_name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: normalize_character_name(name),
            owner_id: owner_id.to_string(),
            owner_name: owner_name.trim().to_string(),
            experience: 0,
            currency: 0,
            honor: 0,
            items: Vec::new(),
            inventory: Vec::new(),
            stash: Vec::new(),
            task: ActiveTask::Idle,
            created_at: now,
            updated_at: now,
            schema_version: CHARACTER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn item_quantity(&self, item: &str) -> u32 {
        self.items
            .iter()
            .find(|s| s.item == item)
            .map(|s| s.quantity)
            .unwrap_or(0)
    }

    pub fn is_busy(&self) -> bool {
        !self.task.is_idle()
    }

    pub fn section(&self, section: Section) -> &Vec<ItemStack> {
        match section {
            Section::Items => &self.items,
            Section::Inventory => &self.inventory,
            Section::Stash => &self.stash,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut Vec<ItemStack> {
        match section {
            Section::Items => &mut self.items,
            Section::Inventory => &mut self.inventory,
            Section::Stash => &mut self.stash,
        }
    }
}

/// The three item lists a character keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Section {
    Items,
    Inventory,
    Stash,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Items, Section::Inventory, Section::Stash];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "items" => Some(Section::Items),
            "inventory" => Some(Section::Inventory),
            "stash" => Some(Section::Stash),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Items => write!(f, "items"),
            Section::Inventory => write!(f, "inventory"),
            Section::Stash => write!(f, "stash"),
        }
    }
}

/// Running tally of everything a character has donated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationRecord {
    pub character: String,
    pub items: BTreeMap<String, u64>,
    pub total_value: f64,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl DonationRecord {
    pub fn new(character: &str) -> Self {
        Self {
            character: normalize_character_name(character),
            items: BTreeMap::new(),
            total_value: 0.0,
            updated_at: Utc::now(),
            schema_version: DONATION_SCHEMA_VERSION,
        }
    }

    pub fn record(&mut self, item: &str, amount: u32, value: f64) {
        let entry = self.items.entry(item.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount as u64);
        self.total_value += value;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProjectStatus {
    Active,
    Completed,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectPhase {
    pub name: String,
    pub required: BTreeMap<String, u32>,
    pub contributed: BTreeMap<String, u32>,
}

impl ProjectPhase {
    pub fn new(name: &str, required: BTreeMap<String, u32>) -> Self {
        let contributed = required.keys().map(|k| (k.clone(), 0)).collect();
        Self {
            name: name.to_string(),
            required,
            contributed,
        }
    }

    /// Add to a resource's running total, saturating at `u32::MAX`.
    pub fn add_contribution(&mut self, resource: &str, amount: u32) {
        let total = self.contributed.entry(resource.to_string()).or_insert(0);
        *total = total.saturating_add(amount);
    }

    pub fn contributed_for(&self, resource: &str) -> u32 {
        self.contributed.get(resource).copied().unwrap_or(0)
    }

    pub fn is_satisfied(&self) -> bool {
        self.required
            .iter()
            .all(|(resource, needed)| self.contributed_for(resource) >= *needed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionEntry {
    pub resource: String,
    pub amount: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub id: u64,
    pub project_type: String,
    pub name: String,
    pub phases: Vec<ProjectPhase>,
    pub current_phase_index: usize,
    pub status: ProjectStatus,
    pub created_by: String,
    pub reward: String,
    /// Append-only audit trail keyed by character name.
    #[serde(default)]
    pub contributors: BTreeMap<String, Vec<ContributionEntry>>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ProjectRecord {
    pub fn current_phase(&self) -> Option<&ProjectPhase> {
        self.phases.get(self.current_phase_index)
    }

    pub fn current_phase_mut(&mut self) -> Option<&mut ProjectPhase> {
        self.phases.get_mut(self.current_phase_index)
    }

    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }

    pub fn record_contribution(&mut self, character: &str, resource: &str, amount: u32) {
        self.contributors
            .entry(character.to_string())
            .or_default()
            .push(ContributionEntry {
                resource: resource.to_string(),
                amount,
                at: Utc::now(),
            });
    }
}

// ============================================================================
// Trading
// ============================================================================

/// What a proposal offers or asks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeResource {
    Currency,
    Item(String),
}

impl TradeResource {
    /// "currency" (or the legacy "gold") names the currency bucket; anything
    /// else is an item name, title-cased to match inventory keys.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "currency" | "gold" => TradeResource::Currency,
            _ => TradeResource::Item(title_case(token)),
        }
    }
}

impl fmt::Display for TradeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResource::Currency => write!(f, "currency"),
            TradeResource::Item(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeProposal {
    pub id: String,
    pub owner_id: String,
    pub character: String,
    pub offer: TradeResource,
    pub offer_amount: u32,
    pub request: TradeResource,
    pub request_amount: u32,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl TradeProposal {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.is_open() && now - self.created_at > max_age
    }

    /// Closing is one-way; a closed proposal stays closed.
    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.is_open() {
            self.status = TradeStatus::Closed;
            self.closed_at = Some(at);
        }
    }
}
