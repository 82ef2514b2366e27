//! Two-step bulk assignment wizard.
//!
//! Step 1 picks modules, step 2 picks objects of those modules (all
//! pre-selected). The wizard is a plain value owned by the caller; nothing
//! is written until [`BulkAssignment::commit`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use crate::model::{AccessTemplate, BatchReport, BulkAssign, CascadeLevel};
use crate::service::{AuthzError, AuthzService};

/// Modules split by whether the role already holds grants in them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleAvailability {
    /// Modules with active objects and no grant for the role.
    pub available: Vec<String>,
    /// Modules where the role holds at least one grant.
    pub assigned: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    SelectModules,
    SelectObjects,
    Committed,
}

/// Template and inheritance level applied on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    pub template: AccessTemplate,
    pub cascade_level: CascadeLevel,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            template: AccessTemplate::FullAccess,
            cascade_level: CascadeLevel::Object,
        }
    }
}

/// In-progress bulk assignment for one role.
#[derive(Debug, Clone)]
pub struct BulkAssignment {
    role_id: String,
    /// Offered modules → their active object ids, captured at begin.
    offered: BTreeMap<String, Vec<String>>,
    modules: BTreeSet<String>,
    objects: BTreeSet<String>,
    step: WizardStep,
}

impl AuthzService {
    /// Modules a role can still be bulk-assigned, and those it already has.
    pub fn available_modules(&self, role_id: &str) -> Result<ModuleAvailability, AuthzError> {
        self.require_role(role_id)?;
        let assigned_modules: BTreeSet<String> = self
            .list_role_authorizations(role_id, None)?
            .into_iter()
            .map(|g| g.module)
            .collect();

        let mut availability = ModuleAvailability::default();
        for (module, objects) in self.list_objects_by_module()? {
            if assigned_modules.contains(&module) {
                availability.assigned.push(module);
            } else if objects.iter().any(|o| o.is_active) {
                availability.available.push(module);
            }
        }
        Ok(availability)
    }

    /// Start the wizard over the role's available modules.
    pub fn begin_bulk_assignment(&self, role_id: &str) -> Result<BulkAssignment, AuthzError> {
        let availability = self.available_modules(role_id)?;
        let mut offered = BTreeMap::new();
        for module in availability.available {
            let ids = self
                .active_objects_in_module(&module)?
                .into_iter()
                .map(|o| o.id)
                .collect();
            offered.insert(module, ids);
        }
        Ok(BulkAssignment {
            role_id: role_id.to_string(),
            offered,
            modules: BTreeSet::new(),
            objects: BTreeSet::new(),
            step: WizardStep::SelectModules,
        })
    }
}

impl BulkAssignment {
    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn offered_modules(&self) -> impl Iterator<Item = &str> {
        self.offered.keys().map(String::as_str)
    }

    /// Objects offered in step 2: those of the selected modules.
    pub fn offered_objects(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .filter_map(|m| self.offered.get(m))
            .flatten()
            .map(String::as_str)
    }

    pub fn selected_modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn selected_objects(&self) -> &BTreeSet<String> {
        &self.objects
    }

    // ── Step 1 ──

    /// Returns whether the module is now selected.
    pub fn toggle_module(&mut self, module: &str) -> Result<bool, AuthzError> {
        self.expect_step(WizardStep::SelectModules)?;
        if !self.offered.contains_key(module) {
            return Err(AuthzError::Validation(format!("module '{module}' is not offered")));
        }
        if self.modules.remove(module) {
            Ok(false)
        } else {
            self.modules.insert(module.to_string());
            Ok(true)
        }
    }

    pub fn select_all_modules(&mut self) -> Result<(), AuthzError> {
        self.expect_step(WizardStep::SelectModules)?;
        self.modules = self.offered.keys().cloned().collect();
        Ok(())
    }

    /// Move to object selection with every object of the chosen modules selected.
    pub fn proceed(&mut self) -> Result<(), AuthzError> {
        self.expect_step(WizardStep::SelectModules)?;
        if self.modules.is_empty() {
            return Err(AuthzError::Validation("select at least one module".into()));
        }
        self.objects = self.offered_objects().map(str::to_string).collect();
        self.step = WizardStep::SelectObjects;
        Ok(())
    }

    // ── Step 2 ──

    /// Returns whether the object is now selected.
    pub fn toggle_object(&mut self, object_id: &str) -> Result<bool, AuthzError> {
        self.expect_step(WizardStep::SelectObjects)?;
        if !self.offered_objects().any(|id| id == object_id) {
            return Err(AuthzError::Validation(format!(
                "object '{object_id}' is not in a selected module"
            )));
        }
        if self.objects.remove(object_id) {
            Ok(false)
        } else {
            self.objects.insert(object_id.to_string());
            Ok(true)
        }
    }

    /// Select every object of a module, or deselect them all if all were selected.
    /// Returns whether the module's objects are now selected.
    pub fn toggle_module_objects(&mut self, module: &str) -> Result<bool, AuthzError> {
        self.expect_step(WizardStep::SelectObjects)?;
        let ids = match self.offered.get(module) {
            Some(ids) if self.modules.contains(module) => ids.clone(),
            _ => {
                return Err(AuthzError::Validation(format!("module '{module}' is not selected")));
            }
        };
        let all_selected = ids.iter().all(|id| self.objects.contains(id));
        for id in ids {
            if all_selected {
                self.objects.remove(&id);
            } else {
                self.objects.insert(id);
            }
        }
        Ok(!all_selected)
    }

    /// Return to module selection, discarding the object selection.
    pub fn back(&mut self) -> Result<(), AuthzError> {
        self.expect_step(WizardStep::SelectObjects)?;
        self.objects.clear();
        self.step = WizardStep::SelectModules;
        Ok(())
    }

    /// Write the selected objects through [`AuthzService::bulk_assign`].
    ///
    /// The wizard is spent once the batch reaches the store, including on a
    /// partial batch. Errors raised before any write leave it retryable.
    pub fn commit(
        &mut self,
        svc: &AuthzService,
        options: CommitOptions,
    ) -> Result<BatchReport, AuthzError> {
        self.expect_step(WizardStep::SelectObjects)?;
        if self.objects.is_empty() {
            return Err(AuthzError::Validation("select at least one object".into()));
        }

        // Keep module order so the report reads module by module.
        let object_ids: Vec<String> = self
            .offered_objects()
            .filter(|id| self.objects.contains(*id))
            .map(str::to_string)
            .collect();

        let input = BulkAssign {
            role_id: self.role_id.clone(),
            object_ids,
            template: options.template,
            cascade_level: options.cascade_level,
            module: None,
        };
        let result = svc.bulk_assign(input);
        // Only a batch that reached the store spends the wizard.
        if matches!(result, Ok(_) | Err(AuthzError::PartialBatch(_))) {
            self.step = WizardStep::Committed;
            info!(
                role = %self.role_id,
                modules = self.modules.len(),
                objects = self.objects.len(),
                "bulk assignment committed"
            );
        }
        result
    }

    /// Abandon the wizard. Nothing has been written.
    pub fn cancel(self) {}

    fn expect_step(&self, step: WizardStep) -> Result<(), AuthzError> {
        if self.step != step {
            return Err(AuthzError::Validation(format!(
                "wizard is at {:?}, expected {:?}",
                self.step, step
            )));
        }
        Ok(())
    }
}
