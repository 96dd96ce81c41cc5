use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::auth::IdentityProvider;
use crate::database::models::{Patient, Session, SessionWithPatient};
use crate::database::{
    DatabaseError, NewSession, SessionChanges, SessionQuery, SessionStore, SortDirection, UserId,
};
use crate::observer::{ObserverError, View, ViewObserver};

#[derive(Default)]
struct MemoryState {
    patients: BTreeMap<i32, Patient>,
    sessions: BTreeMap<i32, Session>,
    next_patient_id: i32,
    next_session_id: i32,
    failing: bool,
}

/// In-memory session store with the same ownership rules as the Postgres one
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_patient(&self, owner: UserId, nome: &str) -> Patient {
        let mut state = self.state.lock().unwrap();
        state.next_patient_id += 1;
        let patient = Patient {
            id: state.next_patient_id,
            usuario_id: owner,
            nome: nome.to_string(),
            created_at: Utc::now(),
        };
        state.patients.insert(patient.id, patient.clone());
        patient
    }

    pub fn session(&self, id: i32) -> Option<Session> {
        self.state.lock().unwrap().sessions.get(&id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Make every store call fail as if the database were gone
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    fn check(state: &MemoryState) -> Result<(), DatabaseError> {
        if state.failing {
            return Err(DatabaseError::QueryError("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl MemoryState {
    fn owner_of(&self, session: &Session) -> Option<UserId> {
        self.patients.get(&session.paciente_id).map(|p| p.usuario_id)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_owned_patient(
        &self,
        patient_id: i32,
        owner: UserId,
    ) -> Result<Option<Patient>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Self::check(&state)?;
        Ok(state
            .patients
            .get(&patient_id)
            .filter(|p| p.is_owned_by(owner))
            .cloned())
    }

    async fn find_owned_session(
        &self,
        session_id: i32,
        owner: UserId,
    ) -> Result<Option<Session>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Self::check(&state)?;
        Ok(state
            .sessions
            .get(&session_id)
            .filter(|s| state.owner_of(s) == Some(owner))
            .cloned())
    }

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<SessionWithPatient>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Self::check(&state)?;

        let mut rows: Vec<SessionWithPatient> = state
            .sessions
            .values()
            .filter_map(|s| {
                let patient = state.patients.get(&s.paciente_id)?;
                let matches = patient.is_owned_by(query.owner)
                    && query.patient_id.map_or(true, |id| s.paciente_id == id)
                    && query.status.map_or(true, |status| s.situacao == status);
                matches.then(|| SessionWithPatient {
                    session: s.clone(),
                    paciente_nome: patient.nome.clone(),
                })
            })
            .collect();

        rows.sort_by_key(|row| (row.session.data, row.session.id));
        if query.order == SortDirection::Desc {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert_session(&self, new: NewSession) -> Result<Session, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state)?;

        state.next_session_id += 1;
        let now = Utc::now();
        let session = Session {
            id: state.next_session_id,
            paciente_id: new.paciente_id,
            data: new.data,
            valor_praticado: new.valor_praticado,
            tipo: new.tipo,
            situacao: new.situacao,
            data_pagamento: None,
            observacoes: new.observacoes,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_session(
        &self,
        id: i32,
        changes: SessionChanges,
    ) -> Result<Session, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state)?;

        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("session {}", id)))?;
        changes.apply_to(session);
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete_session(&self, id: i32) -> Result<Session, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state)?;
        state
            .sessions
            .remove(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("session {}", id)))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let state = self.state.lock().unwrap();
        Self::check(&state)
    }
}

/// Identity provider with a fixed answer
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn user(id: UserId) -> Self {
        Self(Some(id))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn resolve_current_user(&self) -> Option<UserId> {
        self.0
    }
}

/// Observer that remembers every batch of views it was handed
#[derive(Clone, Default)]
pub struct RecordingObserver {
    calls: Arc<Mutex<Vec<Vec<View>>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<View>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn views(&self) -> Vec<View> {
        self.calls().into_iter().flatten().collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl ViewObserver for RecordingObserver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn invalidate(&self, views: &[View]) -> Result<(), ObserverError> {
        self.calls.lock().unwrap().push(views.to_vec());
        Ok(())
    }
}
