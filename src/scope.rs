//! Role-scoped query predicates.
//!
//! Pure function of (role, caller identity, requested filters) into a SQL
//! WHERE fragment plus its parameters. Callers never get to widen their
//! own scope: a patient's listing is pinned to their own patient id no
//! matter what `patient_id` filter they supply, and roles outside the
//! supported set are rejected rather than silently given an empty or
//! unrestricted predicate.

use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::Role;
use crate::models::filters::ListFilters;

/// Profile ids resolved for the authenticated caller. A patient caller
/// carries their patient profile id, a doctor their doctor profile id.
#[derive(Debug, Clone, Default)]
pub struct CallerIds {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

/// A WHERE fragment with positional `?` placeholders and the matching
/// parameter values (all TEXT: ids and status strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub clause: String,
    pub params: Vec<String>,
}

impl QueryScope {
    fn unrestricted() -> Self {
        Self {
            clause: "1=1".into(),
            params: Vec::new(),
        }
    }

    fn and(&mut self, column: &str, value: String) {
        if self.clause == "1=1" {
            self.clause = format!("{column} = ?");
        } else {
            self.clause = format!("{} AND {column} = ?", self.clause);
        }
        self.params.push(value);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("role {0} may not query this collection")]
    RoleNotPermitted(&'static str),
    #[error("caller has no {0} profile")]
    MissingProfile(&'static str),
}

/// Build the predicate for a patient/doctor-owned collection
/// (appointments, prescriptions, consultations).
pub fn scope_for(
    role: Role,
    caller: &CallerIds,
    filters: &ListFilters,
) -> Result<QueryScope, ScopeError> {
    let mut scope = QueryScope::unrestricted();
    match role {
        Role::Patient => {
            let pid = caller
                .patient_id
                .ok_or(ScopeError::MissingProfile("patient"))?;
            // Caller-supplied patient_id is ignored outright.
            scope.and("patient_id", pid.to_string());
            if let Some(status) = &filters.status {
                scope.and("status", status.clone());
            }
        }
        Role::Doctor => {
            let did = caller
                .doctor_id
                .ok_or(ScopeError::MissingProfile("doctor"))?;
            scope.and("doctor_id", did.to_string());
            if let Some(pid) = &filters.patient_id {
                scope.and("patient_id", pid.to_string());
            }
            if let Some(status) = &filters.status {
                scope.and("status", status.clone());
            }
        }
        Role::Pharmacist => {
            if let Some(pid) = &filters.patient_id {
                scope.and("patient_id", pid.to_string());
            }
            if let Some(status) = &filters.status {
                scope.and("status", status.clone());
            }
        }
        Role::Admin => {
            if let Some(pid) = &filters.patient_id {
                scope.and("patient_id", pid.to_string());
            }
            if let Some(did) = &filters.doctor_id {
                scope.and("doctor_id", did.to_string());
            }
            if let Some(status) = &filters.status {
                scope.and("status", status.clone());
            }
        }
        Role::Distributor => return Err(ScopeError::RoleNotPermitted("distributor")),
    }
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_caller() -> (CallerIds, Uuid) {
        let pid = Uuid::new_v4();
        (
            CallerIds {
                patient_id: Some(pid),
                doctor_id: None,
            },
            pid,
        )
    }

    #[test]
    fn patient_is_pinned_to_own_id() {
        let (caller, pid) = patient_caller();
        let scope = scope_for(Role::Patient, &caller, &ListFilters::default()).unwrap();
        assert_eq!(scope.clause, "patient_id = ?");
        assert_eq!(scope.params, vec![pid.to_string()]);
    }

    #[test]
    fn patient_supplied_patient_id_is_ignored() {
        let (caller, pid) = patient_caller();
        let foreign = Uuid::new_v4();
        let filters = ListFilters {
            patient_id: Some(foreign),
            ..Default::default()
        };
        let scope = scope_for(Role::Patient, &caller, &filters).unwrap();
        assert_eq!(scope.params, vec![pid.to_string()]);
        assert!(!scope.params.contains(&foreign.to_string()));
    }

    #[test]
    fn patient_may_filter_by_status() {
        let (caller, pid) = patient_caller();
        let filters = ListFilters {
            status: Some("scheduled".into()),
            ..Default::default()
        };
        let scope = scope_for(Role::Patient, &caller, &filters).unwrap();
        assert_eq!(scope.clause, "patient_id = ? AND status = ?");
        assert_eq!(scope.params, vec![pid.to_string(), "scheduled".into()]);
    }

    #[test]
    fn doctor_is_pinned_and_may_narrow_by_patient() {
        let did = Uuid::new_v4();
        let pid = Uuid::new_v4();
        let caller = CallerIds {
            patient_id: None,
            doctor_id: Some(did),
        };
        let filters = ListFilters {
            patient_id: Some(pid),
            ..Default::default()
        };
        let scope = scope_for(Role::Doctor, &caller, &filters).unwrap();
        assert_eq!(scope.clause, "doctor_id = ? AND patient_id = ?");
        assert_eq!(scope.params, vec![did.to_string(), pid.to_string()]);
    }

    #[test]
    fn pharmacist_unrestricted_without_filters() {
        let scope =
            scope_for(Role::Pharmacist, &CallerIds::default(), &ListFilters::default()).unwrap();
        assert_eq!(scope.clause, "1=1");
        assert!(scope.params.is_empty());
    }

    #[test]
    fn admin_applies_all_supplied_filters() {
        let pid = Uuid::new_v4();
        let did = Uuid::new_v4();
        let filters = ListFilters {
            patient_id: Some(pid),
            doctor_id: Some(did),
            status: Some("active".into()),
        };
        let scope = scope_for(Role::Admin, &CallerIds::default(), &filters).unwrap();
        assert_eq!(
            scope.clause,
            "patient_id = ? AND doctor_id = ? AND status = ?"
        );
        assert_eq!(scope.params.len(), 3);
    }

    #[test]
    fn distributor_is_rejected() {
        let err =
            scope_for(Role::Distributor, &CallerIds::default(), &ListFilters::default())
                .unwrap_err();
        assert_eq!(err, ScopeError::RoleNotPermitted("distributor"));
    }

    #[test]
    fn patient_without_profile_is_rejected() {
        let err = scope_for(Role::Patient, &CallerIds::default(), &ListFilters::default())
            .unwrap_err();
        assert_eq!(err, ScopeError::MissingProfile("patient"));
    }
}
