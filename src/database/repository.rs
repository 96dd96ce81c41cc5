use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{Patient, Session, SessionWithPatient};
use crate::database::store::{NewSession, PaymentChange, SessionChanges, SessionQuery, SessionStore, UserId};

const SESSION_COLUMNS: &str = "s.id, s.paciente_id, s.data, s.valor_praticado, s.tipo, \
     s.situacao, s.data_pagamento, s.observacoes, s.created_at, s.updated_at";

const RETURNING_COLUMNS: &str = "id, paciente_id, data, valor_praticado, tipo, \
     situacao, data_pagamento, observacoes, created_at, updated_at";

/// Postgres-backed session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn list_query(query: &SessionQuery) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {}, p.nome AS paciente_nome FROM sessao s \
             JOIN paciente p ON p.id = s.paciente_id WHERE p.usuario_id = ",
            SESSION_COLUMNS
        ));
        qb.push_bind(query.owner);

        if let Some(patient_id) = query.patient_id {
            qb.push(" AND s.paciente_id = ").push_bind(patient_id);
        }
        if let Some(status) = query.status {
            qb.push(" AND s.situacao = ").push_bind(status.as_str());
        }

        let dir = query.order.to_sql();
        qb.push(format!(" ORDER BY s.data {}, s.id {}", dir, dir));
        qb
    }

    fn update_query(id: i32, changes: SessionChanges) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("UPDATE sessao SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(data) = changes.data {
                set.push("data = ");
                set.push_bind_unseparated(data);
            }
            if let Some(valor) = changes.valor_praticado {
                set.push("valor_praticado = ");
                set.push_bind_unseparated(valor);
            }
            if let Some(situacao) = changes.situacao {
                set.push("situacao = ");
                set.push_bind_unseparated(situacao.as_str());
            }
            match changes.data_pagamento {
                Some(PaymentChange::Clear) => {
                    set.push("data_pagamento = NULL");
                }
                Some(PaymentChange::Set(at)) => {
                    set.push("data_pagamento = ");
                    set.push_bind_unseparated(at);
                }
                Some(PaymentChange::StampIfMissing) => {
                    set.push("data_pagamento = COALESCE(data_pagamento, NOW())");
                }
                None => {}
            }
            if let Some(observacoes) = changes.observacoes {
                set.push("observacoes = ");
                set.push_bind_unseparated(observacoes);
            }
            set.push("updated_at = NOW()");
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(RETURNING_COLUMNS);
        qb
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_owned_patient(
        &self,
        patient_id: i32,
        owner: UserId,
    ) -> Result<Option<Patient>, DatabaseError> {
        let patient = sqlx::query_as::<_, Patient>(
            "SELECT id, usuario_id, nome, created_at FROM paciente WHERE id = $1 AND usuario_id = $2",
        )
        .bind(patient_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn find_owned_session(
        &self,
        session_id: i32,
        owner: UserId,
    ) -> Result<Option<Session>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM sessao s JOIN paciente p ON p.id = s.paciente_id \
             WHERE s.id = $1 AND p.usuario_id = $2",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(session_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<SessionWithPatient>, DatabaseError> {
        let mut qb = Self::list_query(query);
        let rows = qb
            .build_query_as::<SessionWithPatient>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert_session(&self, new: NewSession) -> Result<Session, DatabaseError> {
        let sql = format!(
            "INSERT INTO sessao (paciente_id, data, valor_praticado, tipo, situacao, observacoes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            RETURNING_COLUMNS
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(new.paciente_id)
            .bind(new.data)
            .bind(new.valor_praticado)
            .bind(new.tipo)
            .bind(new.situacao.as_str())
            .bind(new.observacoes)
            .fetch_one(&self.pool)
            .await?;
        Ok(session)
    }

    async fn update_session(
        &self,
        id: i32,
        changes: SessionChanges,
    ) -> Result<Session, DatabaseError> {
        let mut qb = Self::update_query(id, changes);
        qb.build_query_as::<Session>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("session {}", id)))
    }

    async fn delete_session(&self, id: i32) -> Result<Session, DatabaseError> {
        let sql = format!("DELETE FROM sessao WHERE id = $1 RETURNING {}", RETURNING_COLUMNS);
        sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("session {}", id)))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}
