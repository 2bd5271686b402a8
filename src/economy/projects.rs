//! Multi-phase group projects.

use chrono::Utc;
use log::{info, warn};

use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::ledger::{self, Bucket};
use crate::economy::locks;
use crate::economy::port::GameEvent;
use crate::economy::storage::StoreBatch;
use crate::economy::types::{
    title_case, ProjectRecord, ProjectStatus, LABOR_RESOURCE, PROJECT_SCHEMA_VERSION,
};
use crate::logutil::escape_log;

/// Progress toward one required resource of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProgress {
    pub resource: String,
    pub contributed: u32,
    pub required: u32,
}

/// Read-only snapshot of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectView {
    pub id: u64,
    pub name: String,
    pub status: ProjectStatus,
    pub phase: Option<String>,
    pub progress: Vec<ResourceProgress>,
    pub reward: String,
}

impl ProjectView {
    fn of(project: &ProjectRecord) -> Self {
        let phase = project.current_phase();
        Self {
            id: project.id,
            name: project.name.clone(),
            status: project.status,
            phase: phase.map(|p| p.name.clone()),
            progress: phase
                .map(|p| {
                    p.required
                        .iter()
                        .map(|(resource, required)| ResourceProgress {
                            resource: resource.clone(),
                            contributed: p.contributed_for(resource),
                            required: *required,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            reward: project.reward.clone(),
        }
    }
}

/// Advance `project` while its current phase is satisfied. Completing the
/// last phase marks the project completed. A completed project is left
/// untouched, so running this twice never produces a second event.
pub fn check_phase_completion(project: &mut ProjectRecord) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while project.is_active() {
        let Some(phase) = project.current_phase() else {
            warn!("project {} has no phase at index {}", project.id, project.current_phase_index);
            break;
        };
        if !phase.is_satisfied() {
            break;
        }
        if project.current_phase_index + 1 < project.phases.len() {
            project.current_phase_index += 1;
            let next = project.phases[project.current_phase_index].name.clone();
            info!("project {} advanced to phase {}", project.id, next);
            events.push(GameEvent::PhaseAdvanced {
                project_id: project.id,
                project: project.name.clone(),
                phase: next,
            });
        } else {
            project.status = ProjectStatus::Completed;
            info!("project {} completed", project.id);
            events.push(GameEvent::ProjectCompleted {
                project_id: project.id,
                project: project.name.clone(),
                reward: project.reward.clone(),
            });
        }
    }
    events
}

/// Add labor hours to the current phase and record who worked.
pub fn contribute_labor(project: &mut ProjectRecord, character: &str, hours: u32) -> Vec<GameEvent> {
    let Some(phase) = project.current_phase_mut() else {
        return Vec::new();
    };
    phase.add_contribution(LABOR_RESOURCE, hours);
    project.record_contribution(character, LABOR_RESOURCE, hours);
    check_phase_completion(project)
}

impl Economy {
    pub async fn start_project(&self, actor: &str, project_type: &str) -> Result<ProjectRecord, EconomyError> {
        let template = self
            .catalog
            .project_type(project_type)
            .cloned()
            .ok_or_else(|| EconomyError::NotFound(format!("project type: {}", project_type.trim())))?;

        let _guard = self.locks.lock(locks::PROJECT_IDS_KEY).await;
        let id = self.store.next_project_id()?;
        let project = ProjectRecord {
            id,
            project_type: project_type.trim().to_lowercase(),
            name: template.name.clone(),
            phases: template.materialize_phases(),
            current_phase_index: 0,
            status: ProjectStatus::Active,
            created_by: actor.to_string(),
            reward: template.reward.clone(),
            contributors: Default::default(),
            created_at: Utc::now(),
            schema_version: PROJECT_SCHEMA_VERSION,
        };
        self.store.put_project(project.clone())?;
        info!("project {} ({}) started by {}", id, project.name, escape_log(actor));
        Ok(project)
    }

    /// Donate inventory toward the current phase of a project.
    pub async fn contribute(
        &self,
        character: &str,
        project_id: u64,
        resource: &str,
        amount: u32,
    ) -> Result<ProjectView, EconomyError> {
        let label = title_case(resource);
        if label.eq_ignore_ascii_case(LABOR_RESOURCE) {
            return Err(EconomyError::Forbidden("labor is contributed by working, not donating".into()));
        }
        if amount == 0 {
            return Err(EconomyError::LimitExceeded("contribution must be positive".into()));
        }

        let _guard = self
            .locks
            .lock_many(vec![locks::character_key(character), locks::project_key(project_id)])
            .await;

        let mut project = self.store.get_project(project_id)?;
        if !project.is_active() {
            return Err(EconomyError::NotFound(format!("active project: {}", project_id)));
        }
        let mut member = self.store.get_character(character)?;

        let key = project
            .current_phase()
            .and_then(|phase| {
                phase
                    .required
                    .keys()
                    .find(|k| k.to_lowercase() == label.to_lowercase())
                    .cloned()
            })
            .ok_or_else(|| {
                EconomyError::Forbidden(format!("{} is not needed for the current phase of {}", label, project.name))
            })?;

        let item = ledger::resolve_wildcard(&member, &key);
        let bucket = Bucket::Item(item.clone());
        ledger::require(&member, &bucket, amount as i64)?;
        ledger::adjust(&mut member, &bucket, -(amount as i64));

        if let Some(phase) = project.current_phase_mut() {
            phase.add_contribution(&key, amount);
        }
        project.record_contribution(&member.name, &item, amount);
        let events = check_phase_completion(&mut project);
        info!("{} contributed {} {} to project {}", member.name, amount, item, project_id);

        let view = ProjectView::of(&project);
        let mut batch = StoreBatch::new();
        batch.put_character(member)?;
        batch.put_project(project)?;
        self.store.commit(batch)?;
        self.announce(&events);
        Ok(view)
    }

    /// Apply finished labor to a project. `None` when the project is gone
    /// or already completed; the hours are then discarded. Callers hold the
    /// project lock and persist the returned record.
    pub(crate) fn labor_into_project(
        &self,
        project_id: u64,
        character: &str,
        hours: u32,
    ) -> Result<Option<(ProjectRecord, Vec<GameEvent>)>, EconomyError> {
        let Some(mut project) = self.store.find_project(project_id)? else {
            info!("discarding {} hours from {}: project {} not found", hours, character, project_id);
            return Ok(None);
        };
        if !project.is_active() {
            info!("discarding {} hours from {}: project {} already completed", hours, character, project_id);
            return Ok(None);
        }
        let events = contribute_labor(&mut project, character, hours);
        Ok(Some((project, events)))
    }

    /// Re-run the phase check and persist only if something changed.
    pub async fn check_project(&self, project_id: u64) -> Result<ProjectView, EconomyError> {
        let _guard = self.locks.lock(locks::project_key(project_id)).await;
        let mut project = self.store.get_project(project_id)?;
        let events = check_phase_completion(&mut project);
        let view = ProjectView::of(&project);
        if !events.is_empty() {
            self.store.put_project(project)?;
            self.announce(&events);
        }
        Ok(view)
    }

    pub fn query_project(&self, project_id: u64) -> Result<ProjectView, EconomyError> {
        Ok(ProjectView::of(&self.store.get_project(project_id)?))
    }

    /// Active projects in id order.
    pub fn list_projects(&self) -> Result<Vec<ProjectView>, EconomyError> {
        Ok(self
            .store
            .list_projects()?
            .iter()
            .filter(|p| p.is_active())
            .map(ProjectView::of)
            .collect())
    }
}
