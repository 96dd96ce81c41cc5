use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Patient, Session, SessionStatus, SessionWithPatient};

/// Identity of the authenticated caller, as issued by the identity service
pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Predicate for session listings. The owner is always part of the predicate,
/// so a patient id belonging to someone else simply matches nothing.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    pub owner: UserId,
    pub patient_id: Option<i32>,
    pub status: Option<SessionStatus>,
    pub order: SortDirection,
}

impl SessionQuery {
    pub fn for_owner(owner: UserId) -> Self {
        Self {
            owner,
            patient_id: None,
            status: None,
            order: SortDirection::Desc,
        }
    }

    pub fn patient(mut self, patient_id: i32) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn order(mut self, order: SortDirection) -> Self {
        self.order = order;
        self
    }
}

/// Fields of a session about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub paciente_id: i32,
    pub data: DateTime<Utc>,
    pub valor_praticado: Decimal,
    pub tipo: String,
    pub situacao: SessionStatus,
    pub observacoes: Option<String>,
}

/// What an update writes to `data_pagamento`. Decided by the store inside
/// the same statement that writes `situacao`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaymentChange {
    /// Write NULL
    Clear,
    /// Overwrite with this instant
    Set(DateTime<Utc>),
    /// Stamp the current time unless a payment date is already recorded
    StampIfMissing,
}

/// Partial update of a session. `None` leaves the column untouched; for
/// `observacoes` `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionChanges {
    pub data: Option<DateTime<Utc>>,
    pub valor_praticado: Option<Decimal>,
    pub situacao: Option<SessionStatus>,
    pub data_pagamento: Option<PaymentChange>,
    pub observacoes: Option<Option<String>>,
}

impl SessionChanges {
    /// Apply the changes to an in-memory copy of the row
    pub fn apply_to(&self, session: &mut Session) {
        if let Some(data) = self.data {
            session.data = data;
        }
        if let Some(valor) = self.valor_praticado {
            session.valor_praticado = valor;
        }
        if let Some(situacao) = self.situacao {
            session.situacao = situacao;
        }
        match self.data_pagamento {
            Some(PaymentChange::Clear) => session.data_pagamento = None,
            Some(PaymentChange::Set(at)) => session.data_pagamento = Some(at),
            Some(PaymentChange::StampIfMissing) => {
                session.data_pagamento.get_or_insert_with(Utc::now);
            }
            None => {}
        }
        if let Some(observacoes) = &self.observacoes {
            session.observacoes = observacoes.clone();
        }
    }
}

/// Store primitives the session ledger is built on
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Patient `patient_id` if it belongs to `owner`
    async fn find_owned_patient(
        &self,
        patient_id: i32,
        owner: UserId,
    ) -> Result<Option<Patient>, DatabaseError>;

    /// Session `session_id` if its patient belongs to `owner`
    async fn find_owned_session(
        &self,
        session_id: i32,
        owner: UserId,
    ) -> Result<Option<Session>, DatabaseError>;

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<SessionWithPatient>, DatabaseError>;

    async fn insert_session(&self, new: NewSession) -> Result<Session, DatabaseError>;

    /// Fails with `DatabaseError::NotFound` when no row has `id`
    async fn update_session(
        &self,
        id: i32,
        changes: SessionChanges,
    ) -> Result<Session, DatabaseError>;

    /// Removes the row permanently and returns it
    async fn delete_session(&self, id: i32) -> Result<Session, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
