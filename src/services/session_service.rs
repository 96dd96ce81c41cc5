use chrono::Utc;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::IdentityProvider;
use crate::database::models::{
    amount_to_decimal, normalize_session_date, Session, SessionListItem, SessionStatus,
    SessionView, SESSION_KIND_CONSULTATION,
};
use crate::database::{
    DatabaseError, NewSession, PaymentChange, SessionChanges, SessionQuery, SessionStore, SortDirection, UserId,
};
use crate::observer::{InvalidationPipeline, View};

/// Failures surfaced by ledger mutations. Listings never fail, they come back empty.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    OperationFailed(&'static str),
}

/// Input of `create_session`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionInput {
    pub paciente_id: i32,
    /// Calendar date (`YYYY-MM-DD`) or timestamp
    pub data: String,
    pub valor_praticado: f64,
    #[serde(default)]
    pub observacoes: Option<String>,
}

/// Input of `update_session`: any subset of the updatable fields. An absent
/// field is left unchanged; `observacoes: null` clears the note.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub valor_praticado: Option<f64>,
    #[serde(default)]
    pub situacao: Option<SessionStatus>,
    #[serde(default, deserialize_with = "present")]
    pub observacoes: Option<Option<String>>,
}

// Distinguishes `"field": null` (Some(None)) from a missing field (None)
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Ownership-scoped operations over therapy sessions.
///
/// Every operation resolves the caller first. A session is reachable only
/// when its patient's `usuario_id` is the caller; listings filter on that,
/// mutations check it before touching the row. Successful mutations then
/// announce the views they made stale.
pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    observers: Arc<InvalidationPipeline>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>, observers: Arc<InvalidationPipeline>) -> Self {
        Self { store, observers }
    }

    /// Create an open consultation for one of the caller's patients
    pub async fn create_session(
        &self,
        identity: &dyn IdentityProvider,
        input: CreateSessionInput,
    ) -> Result<SessionView, LedgerError> {
        const FAILED: &str = "Failed to create session";

        let user = require_user(identity).await?;
        let data = normalize_session_date(&input.data)
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        let valor_praticado = parse_amount(input.valor_praticado)?;

        // Another user's patient is reported as missing, not forbidden
        let patient = self
            .store
            .find_owned_patient(input.paciente_id, user)
            .await
            .map_err(|e| operation_failed(FAILED, e))?;
        if patient.is_none() {
            return Err(LedgerError::NotFound("Patient not found"));
        }

        let session = self
            .store
            .insert_session(NewSession {
                paciente_id: input.paciente_id,
                data,
                valor_praticado,
                tipo: SESSION_KIND_CONSULTATION.to_string(),
                situacao: SessionStatus::Open,
                observacoes: input.observacoes.filter(|s| !s.is_empty()),
            })
            .await
            .map_err(|e| operation_failed(FAILED, e))?;

        tracing::info!(session_id = session.id, paciente_id = session.paciente_id, "Session created");

        self.observers
            .notify(&[View::SessionList, View::PatientDetail(session.paciente_id)])
            .await;
        Ok(session.into())
    }

    /// Every session of the caller's patients, newest first, with patient names
    pub async fn list_sessions(&self, identity: &dyn IdentityProvider) -> Vec<SessionListItem> {
        let Some(user) = identity.resolve_current_user().await else {
            return Vec::new();
        };

        match self.store.list_sessions(&SessionQuery::for_owner(user)).await {
            Ok(rows) => rows.into_iter().map(SessionListItem::from).collect(),
            Err(e) => {
                tracing::error!("Failed to list sessions: {}", e);
                Vec::new()
            }
        }
    }

    /// Sessions of one patient, newest first
    pub async fn list_sessions_for_patient(
        &self,
        identity: &dyn IdentityProvider,
        patient_id: i32,
    ) -> Vec<SessionView> {
        let Some(user) = identity.resolve_current_user().await else {
            return Vec::new();
        };

        let query = SessionQuery::for_owner(user).patient(patient_id);
        self.list_views(&query, "Failed to list patient sessions").await
    }

    /// Unpaid sessions of one patient, oldest first for payment follow-up
    pub async fn list_open_sessions_for_patient(
        &self,
        identity: &dyn IdentityProvider,
        patient_id: i32,
    ) -> Vec<SessionView> {
        let Some(user) = identity.resolve_current_user().await else {
            return Vec::new();
        };

        let query = SessionQuery::for_owner(user)
            .patient(patient_id)
            .status(SessionStatus::Open)
            .order(SortDirection::Asc);
        self.list_views(&query, "Failed to list open sessions").await
    }

    /// Mark a session paid (stamping the payment time) or open (clearing it)
    pub async fn update_session_status(
        &self,
        identity: &dyn IdentityProvider,
        id: i32,
        situacao: SessionStatus,
    ) -> Result<(), LedgerError> {
        const FAILED: &str = "Failed to update session";

        let user = require_user(identity).await?;
        self.require_owned_session(id, user, FAILED).await?;

        let changes = SessionChanges {
            situacao: Some(situacao),
            data_pagamento: Some(match situacao {
                SessionStatus::Paid => PaymentChange::Set(Utc::now()),
                SessionStatus::Open => PaymentChange::Clear,
            }),
            ..Default::default()
        };
        self.store
            .update_session(id, changes)
            .await
            .map_err(|e| operation_failed(FAILED, e))?;

        tracing::info!(session_id = id, situacao = %situacao, "Session status updated");

        self.observers.notify(&[View::SessionList, View::Payments]).await;
        Ok(())
    }

    /// Update any subset of date, amount, status and note
    pub async fn update_session(
        &self,
        identity: &dyn IdentityProvider,
        id: i32,
        patch: SessionPatch,
    ) -> Result<SessionView, LedgerError> {
        const FAILED: &str = "Failed to update session";

        let user = require_user(identity).await?;
        let data = patch
            .data
            .as_deref()
            .map(normalize_session_date)
            .transpose()
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        let valor_praticado = patch.valor_praticado.map(parse_amount).transpose()?;

        self.require_owned_session(id, user, FAILED).await?;

        // The payment date follows the status inside the same write; an
        // already paid session keeps the time it was first paid
        let data_pagamento = patch.situacao.map(|situacao| match situacao {
            SessionStatus::Paid => PaymentChange::StampIfMissing,
            SessionStatus::Open => PaymentChange::Clear,
        });

        let changes = SessionChanges {
            data,
            valor_praticado,
            situacao: patch.situacao,
            data_pagamento,
            observacoes: patch.observacoes,
        };
        let session = self
            .store
            .update_session(id, changes)
            .await
            .map_err(|e| operation_failed(FAILED, e))?;

        tracing::info!(session_id = id, "Session updated");

        self.observers
            .notify(&[View::SessionList, View::PatientDetail(session.paciente_id)])
            .await;
        Ok(session.into())
    }

    /// Remove a session permanently
    pub async fn delete_session(
        &self,
        identity: &dyn IdentityProvider,
        id: i32,
    ) -> Result<(), LedgerError> {
        const FAILED: &str = "Failed to delete session";

        let user = require_user(identity).await?;
        self.require_owned_session(id, user, FAILED).await?;

        let deleted = self
            .store
            .delete_session(id)
            .await
            .map_err(|e| operation_failed(FAILED, e))?;

        tracing::info!(session_id = id, paciente_id = deleted.paciente_id, "Session deleted");

        self.observers
            .notify(&[View::SessionList, View::PatientDetail(deleted.paciente_id)])
            .await;
        Ok(())
    }

    async fn require_owned_session(
        &self,
        id: i32,
        user: UserId,
        context: &'static str,
    ) -> Result<Session, LedgerError> {
        self.store
            .find_owned_session(id, user)
            .await
            .map_err(|e| operation_failed(context, e))?
            .ok_or(LedgerError::Unauthorized)
    }

    async fn list_views(&self, query: &SessionQuery, context: &str) -> Vec<SessionView> {
        match self.store.list_sessions(query).await {
            Ok(rows) => rows.into_iter().map(|row| row.session.into()).collect(),
            Err(e) => {
                tracing::error!("{}: {}", context, e);
                Vec::new()
            }
        }
    }
}

async fn require_user(identity: &dyn IdentityProvider) -> Result<UserId, LedgerError> {
    identity
        .resolve_current_user()
        .await
        .ok_or(LedgerError::Unauthenticated)
}

fn parse_amount(amount: f64) -> Result<rust_decimal::Decimal, LedgerError> {
    amount_to_decimal(amount).map_err(|e| LedgerError::InvalidInput(format!("valorPraticado {}", e)))
}

// Log the real cause, hand the caller a generic message
fn operation_failed(context: &'static str, error: DatabaseError) -> LedgerError {
    tracing::error!("{}: {}", context, error);
    LedgerError::OperationFailed(context)
}
