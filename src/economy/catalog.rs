//! Read-only reference data: recipes, scavenge tables and project templates.
//!
//! The three documents are JSON files loaded once at startup and shared as an
//! `Arc<Catalog>`. A missing file yields an empty section so a fresh install
//! can start before any content is authored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Duration;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::economy::errors::EconomyError;
use crate::economy::types::{title_case, ProjectPhase, RecipeOutput};

pub const RECIPES_FILE: &str = "recipes.json";
pub const SCAVENGE_FILE: &str = "scavenge.json";
pub const PROJECTS_FILE: &str = "projects.json";
pub const VALUES_FILE: &str = "values.json";

/// Donation value of an item missing from the value table.
pub const DEFAULT_ITEM_VALUE: f64 = 0.001;

const DEFAULT_CRAFT_MINUTES: f64 = 30.0;

// ============================================================================
// Recipes
// ============================================================================

/// Components may be authored as a bare list (each entry needs one unit) or
/// as an explicit item -> quantity map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ComponentsSeed {
    List(Vec<String>),
    Map(BTreeMap<String, u32>),
}

impl Default for ComponentsSeed {
    fn default() -> Self {
        ComponentsSeed::Map(BTreeMap::new())
    }
}

impl ComponentsSeed {
    fn normalize(self) -> BTreeMap<String, u32> {
        match self {
            ComponentsSeed::List(names) => names.into_iter().map(|n| (n, 1)).collect(),
            ComponentsSeed::Map(map) => map,
        }
    }
}

/// Tools: either a comma separated string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ToolsSeed {
    Text(String),
    List(Vec<String>),
}

impl ToolsSeed {
    fn normalize(self) -> Vec<String> {
        let raw = match self {
            ToolsSeed::Text(text) => text.split(',').map(str::to_string).collect(),
            ToolsSeed::List(list) => list,
        };
        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Disassembly flag, authored as `true`/`false` or `1`/`0`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum FlagSeed {
    Bool(bool),
    Int(i64),
}

impl FlagSeed {
    fn enabled(self) -> bool {
        match self {
            FlagSeed::Bool(b) => b,
            FlagSeed::Int(n) => n != 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RecipeSeed {
    #[serde(default)]
    components: ComponentsSeed,
    #[serde(default)]
    requires: Option<ToolsSeed>,
    #[serde(default)]
    time: Option<f64>,
    #[serde(default)]
    outputs: Vec<RecipeOutput>,
    #[serde(default)]
    disassemble: Option<FlagSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub item: String,
    pub category: String,
    pub components: BTreeMap<String, u32>,
    pub tools: Vec<String>,
    /// Crafting time in minutes.
    pub minutes: f64,
    pub outputs: Vec<RecipeOutput>,
    pub disassemble: bool,
}

impl Recipe {
    pub fn craft_duration(&self) -> Duration {
        minutes_to_duration(self.minutes)
    }

    /// Taking an item apart takes half as long as making it.
    pub fn disassemble_duration(&self) -> Duration {
        minutes_to_duration(self.minutes / 2.0)
    }
}

fn minutes_to_duration(minutes: f64) -> Duration {
    Duration::seconds((minutes.max(0.0) * 60.0).round() as i64)
}

// ============================================================================
// Scavenge tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LootWeight {
    pub weight: u32,
}

/// Resource group -> item -> weight.
pub type ScavengeTable = BTreeMap<String, BTreeMap<String, LootWeight>>;

// ============================================================================
// Project templates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhaseTemplate {
    #[serde(alias = "phase")]
    pub name: String,
    #[serde(default)]
    pub required: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProjectTemplate {
    pub name: String,
    #[serde(default)]
    pub phases: Vec<PhaseTemplate>,
    #[serde(default = "default_reward")]
    pub reward: String,
}

fn default_reward() -> String {
    "None".to_string()
}

impl ProjectTemplate {
    /// Fresh phases with every contributed counter at zero.
    pub fn materialize_phases(&self) -> Vec<ProjectPhase> {
        self.phases
            .iter()
            .map(|p| ProjectPhase::new(&p.name, p.required.clone()))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProjectsDocument {
    #[serde(default)]
    project_types: BTreeMap<String, ProjectTemplate>,
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: BTreeMap<String, Recipe>,
    scavenge: ScavengeTable,
    project_types: BTreeMap<String, ProjectTemplate>,
    /// Donation values keyed by lowercased item name.
    values: BTreeMap<String, f64>,
}

impl Catalog {
    /// Load `recipes.json`, `scavenge.json`, `projects.json` and `values.json` from `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, EconomyError> {
        let dir = dir.as_ref();
        let catalog = Self::from_json(
            &read_optional(&dir.join(RECIPES_FILE))?,
            &read_optional(&dir.join(SCAVENGE_FILE))?,
            &read_optional(&dir.join(PROJECTS_FILE))?,
        )?
        .with_values(&read_optional(&dir.join(VALUES_FILE))?)?;
        info!(
            "catalog loaded from {}: {} recipes, {} scavenge groups, {} project types, {} item values",
            dir.display(),
            catalog.recipes.len(),
            catalog.scavenge.len(),
            catalog.project_types.len(),
            catalog.values.len()
        );
        Ok(catalog)
    }

    /// Build a catalog from raw JSON documents. Empty strings count as `{}`.
    pub fn from_json(recipes: &str, scavenge: &str, projects: &str) -> Result<Self, EconomyError> {
        let recipe_seeds: BTreeMap<String, BTreeMap<String, RecipeSeed>> = parse_or_empty(recipes)?;
        let scavenge: ScavengeTable = parse_or_empty(scavenge)?;
        let projects: ProjectsDocument = parse_or_empty(projects)?;

        let mut catalog = Catalog {
            scavenge,
            project_types: projects
                .project_types
                .into_iter()
                .map(|(key, template)| (key.to_lowercase(), template))
                .collect(),
            ..Default::default()
        };
        for (category, items) in recipe_seeds {
            for (item, seed) in items {
                catalog.insert_recipe(&category, &item, seed);
            }
        }
        Ok(catalog)
    }

    fn insert_recipe(&mut self, category: &str, item: &str, seed: RecipeSeed) {
        let key = title_case(item);
        if self.recipes.contains_key(&key) {
            warn!("duplicate recipe {} in category {}; keeping the first", key, category);
            return;
        }
        let recipe = Recipe {
            item: key.clone(),
            category: category.to_string(),
            components: seed.components.normalize(),
            tools: seed.requires.map(ToolsSeed::normalize).unwrap_or_default(),
            minutes: seed.time.unwrap_or(DEFAULT_CRAFT_MINUTES),
            outputs: seed.outputs,
            disassemble: seed.disassemble.map(FlagSeed::enabled).unwrap_or(true),
        };
        self.recipes.insert(key, recipe);
    }

    /// Attach the donation value table (`item -> points per unit`).
    pub fn with_values(mut self, values: &str) -> Result<Self, EconomyError> {
        let table: BTreeMap<String, f64> = parse_or_empty(values)?;
        for (item, value) in table {
            if !value.is_finite() || value < 0.0 {
                warn!("ignoring invalid value {} for {}", value, item);
                continue;
            }
            self.values.insert(item.trim().to_lowercase(), value);
        }
        Ok(self)
    }

    /// Per-unit donation value, matched case-insensitively.
    pub fn item_value(&self, item: &str) -> Option<f64> {
        self.values.get(&item.trim().to_lowercase()).copied()
    }

    /// Look up a recipe by (title-cased) item name across all categories.
    pub fn recipe(&self, item: &str) -> Option<&Recipe> {
        self.recipes.get(&title_case(item))
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn scavenge_table(&self) -> &ScavengeTable {
        &self.scavenge
    }

    /// Weighted entries for one group, or `None` if the group is unknown.
    pub fn scavenge_group(&self, group: &str) -> Option<Vec<(String, u32)>> {
        self.scavenge.get(group).map(|table| {
            table
                .iter()
                .map(|(item, w)| (item.clone(), w.weight))
                .collect()
        })
    }

    /// Every group flattened into one table. When an item appears in more
    /// than one group the later group's weight wins.
    pub fn merged_scavenge(&self) -> Vec<(String, u32)> {
        let mut merged: BTreeMap<&str, u32> = BTreeMap::new();
        for table in self.scavenge.values() {
            for (item, w) in table {
                merged.insert(item.as_str(), w.weight);
            }
        }
        merged
            .into_iter()
            .map(|(item, weight)| (item.to_string(), weight))
            .collect()
    }

    pub fn project_type(&self, key: &str) -> Option<&ProjectTemplate> {
        self.project_types.get(&key.trim().to_lowercase())
    }

    pub fn project_type_keys(&self) -> impl Iterator<Item = &String> {
        self.project_types.keys()
    }
}

fn read_optional(path: &Path) -> Result<String, EconomyError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("catalog file {} missing; treating as empty", path.display());
            Ok(String::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_or_empty<T: serde::de::DeserializeOwned + Default>(text: &str) -> Result<T, EconomyError> {
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(text)?)
}
