//! Field value editor for custom grants.
//!
//! A [`FieldEditSession`] buffers edits per field. Saving writes only the
//! fields with pending edits, guarded by the version seen when the session
//! was opened.

use std::collections::BTreeMap;

use tracing::{debug, info};

use openerp_core::now_rfc3339;

use crate::model::{RoleAuthorization, ValueSet};
use crate::service::{AuthzError, AuthzService};

/// Pending edits to one custom grant. Owned by the caller.
#[derive(Debug, Clone)]
pub struct FieldEditSession {
    grant_id: String,
    version: i64,
    /// Catalog field codes of the object, in position order.
    fields: Vec<String>,
    stored: BTreeMap<String, ValueSet>,
    pending: BTreeMap<String, ValueSet>,
}

impl FieldEditSession {
    pub fn grant_id(&self) -> &str {
        &self.grant_id
    }

    /// Grant version the session was opened (or last saved) at.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Replace the field's pending set with `{*}`.
    pub fn select_all(&mut self, field_code: &str) -> Result<(), AuthzError> {
        self.require_field(field_code)?;
        self.pending.insert(field_code.to_string(), ValueSet::wildcard());
        Ok(())
    }

    /// Replace the field's pending set with the empty set.
    pub fn clear(&mut self, field_code: &str) -> Result<(), AuthzError> {
        self.require_field(field_code)?;
        self.pending.insert(field_code.to_string(), ValueSet::new());
        Ok(())
    }

    /// Flip one value in the field's working set. Returns whether it is now present.
    pub fn toggle(&mut self, field_code: &str, value: &str) -> Result<bool, AuthzError> {
        self.require_field(field_code)?;
        let mut working = self.current(field_code);
        let present = working.toggle(value);
        self.pending.insert(field_code.to_string(), working);
        Ok(present)
    }

    /// The buffered set for a field, if it was edited.
    pub fn pending(&self, field_code: &str) -> Option<&ValueSet> {
        self.pending.get(field_code)
    }

    /// What the field would hold after saving: pending if edited, else stored.
    pub fn current(&self, field_code: &str) -> ValueSet {
        self.pending
            .get(field_code)
            .or_else(|| self.stored.get(field_code))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop every pending edit.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    fn require_field(&self, field_code: &str) -> Result<(), AuthzError> {
        if self.fields.iter().any(|f| f == field_code) || self.stored.contains_key(field_code) {
            Ok(())
        } else {
            Err(AuthzError::Validation(format!(
                "field '{field_code}' is not part of this grant's object"
            )))
        }
    }
}

impl AuthzService {
    /// Open an editor on a custom grant. Inherited grants must be converted first.
    pub fn open_field_editor(&self, grant_id: &str) -> Result<FieldEditSession, AuthzError> {
        let grant = self.store.get_grant(grant_id)?;
        if !grant.is_custom() {
            return Err(AuthzError::Validation(format!(
                "grant {grant_id} inherits full access; convert it to custom before editing"
            )));
        }
        let fields = self
            .store
            .list_fields(&grant.object_id)?
            .into_iter()
            .map(|f| f.field_code)
            .collect();
        Ok(FieldEditSession {
            grant_id: grant.id,
            version: grant.version,
            fields,
            stored: grant.field_values,
            pending: BTreeMap::new(),
        })
    }

    /// Persist the session's pending fields.
    ///
    /// Conflict if the grant changed since the session was opened. The
    /// buffer is cleared only when the write succeeds.
    pub fn save_field_edits(&self, session: &mut FieldEditSession) -> Result<RoleAuthorization, AuthzError> {
        let current = self.store.get_grant(&session.grant_id)?;
        if current.version != session.version {
            return Err(AuthzError::Conflict(format!(
                "grant {} changed since the editor was opened (version {} → {})",
                session.grant_id, session.version, current.version
            )));
        }
        if !session.is_dirty() {
            return Ok(current);
        }
        if self.config.validate_field_values {
            self.validate_pending(&current, &session.pending)?;
        }

        let mut next = current.clone();
        for (code, values) in &session.pending {
            next.field_values.insert(code.clone(), values.clone());
        }
        next.updated_at = now_rfc3339();

        let stored = self.store.write_grant(&next, Some(session.version))?;
        info!(
            grant = %stored.id,
            fields = session.pending.len(),
            version = stored.version,
            "field edits saved"
        );
        session.version = stored.version;
        session.stored = stored.field_values.clone();
        session.pending.clear();
        Ok(stored)
    }

    /// Reject tokens outside a field's domain. Fields whose domain cannot be
    /// resolved are accepted as-is.
    fn validate_pending(
        &self,
        grant: &RoleAuthorization,
        pending: &BTreeMap<String, ValueSet>,
    ) -> Result<(), AuthzError> {
        let fields = self.store.list_fields(&grant.object_id)?;
        for (code, values) in pending {
            let Some(field) = fields.iter().find(|f| &f.field_code == code) else {
                continue;
            };
            let domain = match self.domain_of(field) {
                Ok(domain) => domain,
                Err(AuthzError::NotFound(_)) => {
                    debug!(field = %code, "no resolvable domain; skipping validation");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(stray) = values.iter().find(|v| !domain.accepts(v)) {
                return Err(AuthzError::Validation(format!(
                    "value '{stray}' is not valid for field '{code}'"
                )));
            }
        }
        Ok(())
    }
}
