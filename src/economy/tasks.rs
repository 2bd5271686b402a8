//! Timed actions: scavenging, crafting, disassembly and labor.
//!
//! A character holds at most one [`ActiveTask`]. Starting a task validates
//! and pays its cost up front; the sweep pays out whatever is due.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::ledger::{self, Bucket};
use crate::economy::locks;
use crate::economy::port::GameEvent;
use crate::economy::storage::StoreBatch;
use crate::economy::types::{title_case, ActiveTask, CharacterRecord};
use crate::logutil::escape_log;

/// Outcome counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub skipped: usize,
}

/// Loot table and roll count for one scavenging trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ScavengePlan {
    pub table: Vec<(String, u32)>,
    pub rolls: u32,
}

/// Roll `rolls` times. Each roll succeeds with probability `chance` and then
/// draws one item from `table` by weight.
pub fn roll_scavenge<R: Rng + ?Sized>(
    rng: &mut R,
    table: &[(String, u32)],
    rolls: u32,
    chance: f64,
) -> Vec<String> {
    let chance = if chance.is_nan() { 0.0 } else { chance.clamp(0.0, 1.0) };
    let Ok(dist) = WeightedIndex::new(table.iter().map(|(_, weight)| *weight)) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for _ in 0..rolls {
        if rng.gen_bool(chance) {
            found.push(table[dist.sample(rng)].0.clone());
        }
    }
    found
}

/// Resolve each (possibly wildcarded) component against the inventory,
/// merging entries that land on the same item.
fn resolve_components(character: &CharacterRecord, components: &BTreeMap<String, u32>) -> Vec<(String, u32)> {
    let mut resolved: Vec<(String, u32)> = Vec::new();
    for (token, qty) in components {
        let item = ledger::resolve_wildcard(character, token);
        match resolved.iter_mut().find(|(name, _)| *name == item) {
            Some(entry) => entry.1 = entry.1.saturating_add(*qty),
            None => resolved.push((item, *qty)),
        }
    }
    resolved
}

/// Name under which a returned component is credited. Unresolved wildcard
/// tokens fall back to their bare base name.
fn returned_component(character: &CharacterRecord, token: &str) -> String {
    let resolved = ledger::resolve_wildcard(character, token);
    if resolved.contains('*') {
        title_case(resolved.replace('*', "").trim())
    } else {
        resolved
    }
}

impl Economy {
    /// Load an idle character under its lock, let `start` validate, pay and
    /// build the task, then persist.
    async fn start_task<F>(&self, name: &str, start: F) -> Result<ActiveTask, EconomyError>
    where
        F: FnOnce(&mut CharacterRecord) -> Result<ActiveTask, EconomyError>,
    {
        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        if character.is_busy() {
            return Err(EconomyError::Busy {
                character: character.name.clone(),
                task: character.task.describe(),
            });
        }
        let task = start(&mut character)?;
        character.task = task.clone();
        info!("{} started {}", character.name, escape_log(&task.describe()));
        self.store.put_character(character)?;
        Ok(task)
    }

    pub fn scavenge_plan(&self, group: Option<&str>) -> ScavengePlan {
        match group {
            Some(group) => ScavengePlan {
                table: self
                    .catalog
                    .scavenge_group(group)
                    .unwrap_or_else(|| self.catalog.merged_scavenge()),
                rolls: self.rules.targeted_scavenge_rolls,
            },
            None => ScavengePlan {
                table: self.catalog.merged_scavenge(),
                rolls: self.rules.general_scavenge_rolls,
            },
        }
    }

    pub async fn start_scavenge(&self, character: &str, group: Option<&str>) -> Result<ActiveTask, EconomyError> {
        let group = group
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty());
        let completes_at = Utc::now() + self.rules.scavenge_duration;
        self.start_task(character, move |_| Ok(ActiveTask::Scavenge { group, completes_at }))
            .await
    }

    pub async fn start_craft(&self, character: &str, item: &str) -> Result<ActiveTask, EconomyError> {
        let recipe = self
            .catalog
            .recipe(item)
            .cloned()
            .ok_or_else(|| EconomyError::NotFound(format!("recipe: {}", title_case(item))))?;
        let completes_at = Utc::now() + recipe.craft_duration();

        self.start_task(character, move |c| {
            for tool in &recipe.tools {
                let resolved = ledger::resolve_wildcard(c, tool);
                ledger::require(c, &Bucket::Item(resolved), 1)?;
            }
            let components = resolve_components(c, &recipe.components);
            for (item, qty) in &components {
                ledger::require(c, &Bucket::Item(item.clone()), *qty as i64)?;
            }
            for (item, qty) in &components {
                ledger::adjust(c, &Bucket::Item(item.clone()), -(*qty as i64));
            }
            Ok(ActiveTask::Craft {
                item: recipe.item.clone(),
                outputs: recipe.outputs.clone(),
                completes_at,
            })
        })
        .await
    }

    pub async fn start_disassemble(&self, character: &str, item: &str) -> Result<ActiveTask, EconomyError> {
        let recipe = self
            .catalog
            .recipe(item)
            .cloned()
            .ok_or_else(|| EconomyError::NotFound(format!("recipe: {}", title_case(item))))?;
        if !recipe.disassemble {
            return Err(EconomyError::Forbidden(format!("{} cannot be disassembled", recipe.item)));
        }
        let completes_at = Utc::now() + recipe.disassemble_duration();

        self.start_task(character, move |c| {
            let batch: Vec<(String, u32)> = if recipe.outputs.is_empty() {
                vec![(recipe.item.clone(), 1)]
            } else {
                recipe.outputs.iter().map(|o| (o.item.clone(), o.quantity)).collect()
            };
            for (item, qty) in &batch {
                ledger::require(c, &Bucket::Item(item.clone()), *qty as i64)?;
            }
            for (item, qty) in &batch {
                ledger::adjust(c, &Bucket::Item(item.clone()), -(*qty as i64));
            }
            let mut components = BTreeMap::new();
            for (token, qty) in &recipe.components {
                let total = components.entry(returned_component(c, token)).or_insert(0u32);
                *total = total.saturating_add(*qty);
            }
            Ok(ActiveTask::Disassemble {
                item: recipe.item.clone(),
                components,
                completes_at,
            })
        })
        .await
    }

    pub async fn start_labor(&self, character: &str, project_id: u64, hours: u32) -> Result<ActiveTask, EconomyError> {
        if hours == 0 || hours > self.rules.max_labor_hours {
            return Err(EconomyError::LimitExceeded(format!(
                "labor must be between 1 and {} hours",
                self.rules.max_labor_hours
            )));
        }
        let project = self.store.get_project(project_id)?;
        if !project.is_active() {
            return Err(EconomyError::NotFound(format!("active project: {}", project_id)));
        }
        let completes_at = Utc::now() + Duration::hours(hours as i64);
        self.start_task(character, move |_| {
            Ok(ActiveTask::Labor {
                project_id,
                hours,
                completes_at,
            })
        })
        .await
    }

    /// Finish every task that is due now.
    pub async fn sweep_due_tasks(&self) -> SweepReport {
        self.sweep_due_tasks_at(Utc::now()).await
    }

    pub async fn sweep_due_tasks_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for name in self.store.list_character_names() {
            report.examined += 1;
            let due = match self.store.find_character(&name) {
                Ok(Some(character)) => character.task.is_due(now),
                Ok(None) => false,
                Err(e) => {
                    warn!("skipping unreadable character {}: {}", name, e);
                    report.skipped += 1;
                    continue;
                }
            };
            if !due {
                continue;
            }
            match self.complete_task(&name, now).await {
                Ok(true) => report.completed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("could not finish task for {}: {}", name, e);
                    report.skipped += 1;
                }
            }
        }
        debug!(
            "task sweep: examined={} completed={} skipped={}",
            report.examined, report.completed, report.skipped
        );
        report
    }

    /// Pay out one character's due task. Returns false when, after taking
    /// the locks, there was nothing left to do.
    async fn complete_task(&self, name: &str, now: DateTime<Utc>) -> Result<bool, EconomyError> {
        let peeked = self.store.get_character(name)?;
        let mut keys = vec![locks::character_key(name)];
        let labor_project = match peeked.task {
            ActiveTask::Labor { project_id, .. } => {
                keys.push(locks::project_key(project_id));
                Some(project_id)
            }
            _ => None,
        };
        let _guard = self.locks.lock_many(keys).await;

        let mut character = self.store.get_character(name)?;
        if !character.task.is_due(now) {
            return Ok(false);
        }
        if let ActiveTask::Labor { project_id, .. } = character.task {
            if labor_project != Some(project_id) {
                // The task changed between the peek and the lock; next tick.
                return Ok(false);
            }
        }

        let task = std::mem::take(&mut character.task);
        let mut batch = StoreBatch::new();
        let events = match task {
            ActiveTask::Idle => return Ok(false),
            ActiveTask::Craft { item, outputs, .. } => {
                for output in &outputs {
                    ledger::adjust(&mut character, &Bucket::Item(output.item.clone()), output.quantity as i64);
                }
                vec![GameEvent::CraftCompleted {
                    character: character.name.clone(),
                    item,
                    outputs: outputs.into_iter().map(|o| (o.item, o.quantity)).collect(),
                }]
            }
            ActiveTask::Disassemble { item, components, .. } => {
                for (component, qty) in &components {
                    ledger::adjust(&mut character, &Bucket::Item(component.clone()), *qty as i64);
                }
                vec![GameEvent::DisassembleCompleted {
                    character: character.name.clone(),
                    item,
                    components: components.into_iter().collect(),
                }]
            }
            ActiveTask::Scavenge { group, .. } => {
                let plan = self.scavenge_plan(group.as_deref());
                let found = roll_scavenge(&mut rand::thread_rng(), &plan.table, plan.rolls, self.rules.scavenge_chance);
                for item in &found {
                    ledger::adjust(&mut character, &Bucket::Item(item.clone()), 1);
                }
                vec![GameEvent::ScavengeCompleted {
                    character: character.name.clone(),
                    group,
                    found,
                }]
            }
            ActiveTask::Labor { project_id, hours, .. } => {
                let mut events = Vec::new();
                let applied = match self.labor_into_project(project_id, &character.name, hours) {
                    Ok(Some((project, project_events))) => {
                        batch.put_project(project)?;
                        events.extend(project_events);
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        warn!(
                            "discarding {} hours from {}: project {} unreadable: {}",
                            hours, character.name, project_id, e
                        );
                        false
                    }
                };
                events.insert(
                    0,
                    GameEvent::LaborCompleted {
                        character: character.name.clone(),
                        project_id,
                        hours,
                        applied,
                    },
                );
                events
            }
        };

        info!("{} finished a task", character.name);
        batch.put_character(character)?;
        self.store.commit(batch)?;
        self.announce(&events);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table() -> Vec<(String, u32)> {
        vec![("Oak Log".to_string(), 3), ("Stick".to_string(), 1)]
    }

    #[test]
    fn certain_rolls_always_find_something() {
        let mut rng = StdRng::seed_from_u64(7);
        let found = roll_scavenge(&mut rng, &table(), 5, 1.0);
        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|item| item == "Oak Log" || item == "Stick"));
    }

    #[test]
    fn zero_chance_finds_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(roll_scavenge(&mut rng, &table(), 10, 0.0).is_empty());
    }

    #[test]
    fn empty_or_weightless_table_finds_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(roll_scavenge(&mut rng, &[], 10, 1.0).is_empty());
        let zero = vec![("Dust".to_string(), 0)];
        assert!(roll_scavenge(&mut rng, &zero, 10, 1.0).is_empty());
    }

    #[test]
    fn components_merge_when_wildcards_collide() {
        let mut c = CharacterRecord::new("Taco", "u1", "a");
        c.items.push(crate::economy::types::ItemStack::new("Oak Log", 5));
        let mut components = BTreeMap::new();
        components.insert("* Log".to_string(), 1);
        components.insert("Oak Log".to_string(), 2);
        assert_eq!(resolve_components(&c, &components), vec![("Oak Log".to_string(), 3)]);
    }

    #[tokio::test]
    async fn labor_on_an_unreadable_project_still_frees_the_worker() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let economy = crate::economy::engine::testing::economy(dir.path());
        economy.create_character("u1", "alice", "Taco").await.expect("create");
        let project = economy.start_project("u1", "wall").await.expect("project");
        economy.start_labor("Taco", project.id, 2).await.expect("labor");
        economy
            .store
            .insert_raw(&format!("projects:{:020}", project.id), b"\x07garbage")
            .expect("raw");

        let report = economy.sweep_due_tasks_at(Utc::now() + Duration::hours(5)).await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 0);
        assert!(economy.store.get_character("Taco").expect("taco").task.is_idle());

        let again = economy.sweep_due_tasks_at(Utc::now() + Duration::hours(6)).await;
        assert_eq!(again.completed, 0);
    }

    #[test]
    fn unresolved_returned_component_uses_base_name() {
        let c = CharacterRecord::new("Taco", "u1", "a");
        assert_eq!(returned_component(&c, "* log"), "Log");
        assert_eq!(returned_component(&c, "Nail"), "Nail");
    }
}
