use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The only session kind this service produces
pub const SESSION_KIND_CONSULTATION: &str = "CONSULTA";

/// Currency precision used for `valor_praticado`
pub const AMOUNT_SCALE: u32 = 2;

/// Total digits of the `valor_praticado` column
pub const AMOUNT_PRECISION: u32 = 10;

/// Payment status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "ABERTO", alias = "OPEN")]
    Open,
    #[serde(rename = "PAGO", alias = "PAID")]
    Paid,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "ABERTO",
            SessionStatus::Paid => "PAGO",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, SessionStatus::Paid)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown session status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABERTO" | "OPEN" => Ok(SessionStatus::Open),
            "PAGO" | "PAID" => Ok(SessionStatus::Paid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Session row as stored
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: i32,
    pub paciente_id: i32,
    pub data: DateTime<Utc>,
    pub valor_praticado: Decimal,
    pub tipo: String,
    pub situacao: SessionStatus,
    pub data_pagamento: Option<DateTime<Utc>>,
    pub observacoes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let situacao: String = row.try_get("situacao")?;
        let situacao = situacao
            .parse::<SessionStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "situacao".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            paciente_id: row.try_get("paciente_id")?,
            data: row.try_get("data")?,
            valor_praticado: row.try_get("valor_praticado")?,
            tipo: row.try_get("tipo")?,
            situacao,
            data_pagamento: row.try_get("data_pagamento")?,
            observacoes: row.try_get("observacoes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Session joined with the name of the patient it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWithPatient {
    pub session: Session,
    pub paciente_nome: String,
}

impl<'r> FromRow<'r, PgRow> for SessionWithPatient {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session: Session::from_row(row)?,
            paciente_nome: row.try_get("paciente_nome")?,
        })
    }
}

/// Caller-facing shape of a session: the amount is a plain number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: i32,
    pub paciente_id: i32,
    pub data: DateTime<Utc>,
    pub valor_praticado: f64,
    pub tipo: String,
    pub situacao: SessionStatus,
    pub data_pagamento: Option<DateTime<Utc>>,
    pub observacoes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            paciente_id: s.paciente_id,
            data: s.data,
            valor_praticado: decimal_to_amount(s.valor_praticado),
            tipo: s.tipo,
            situacao: s.situacao,
            data_pagamento: s.data_pagamento,
            observacoes: s.observacoes,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// List entry annotated with the owning patient's name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListItem {
    #[serde(flatten)]
    pub session: SessionView,
    pub paciente_nome: String,
}

impl From<SessionWithPatient> for SessionListItem {
    fn from(row: SessionWithPatient) -> Self {
        Self {
            session: row.session.into(),
            paciente_nome: row.paciente_nome,
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid session date '{0}'")]
pub struct InvalidDate(pub String);

/// Reduce a caller-supplied date or timestamp to its calendar day and anchor
/// it at midday UTC.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (reduced to their UTC day) and
/// offset-less `YYYY-MM-DDTHH:MM:SS` timestamps. A midday UTC instant falls on
/// the same calendar day in every offset between -11:59 and +11:59.
pub fn normalize_session_date(input: &str) -> Result<DateTime<Utc>, InvalidDate> {
    let trimmed = input.trim();

    let day = if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        day
    } else if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        ts.with_timezone(&Utc).date_naive()
    } else if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        ts.date()
    } else {
        return Err(InvalidDate(input.to_string()));
    };

    Ok(anchor_at_midday(day))
}

pub fn anchor_at_midday(day: NaiveDate) -> DateTime<Utc> {
    let midday = NaiveTime::default() + Duration::hours(12);
    Utc.from_utc_datetime(&day.and_time(midday))
}

/// Amounts a caller sent that the `NUMERIC(10, 2)` column cannot hold
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidAmount {
    #[error("must be a finite number")]
    NotFinite,

    #[error("must be between -{max} and {max}", max = max_amount())]
    OutOfRange,
}

/// Largest magnitude the column stores: `AMOUNT_PRECISION` digits, two of
/// them after the point
pub fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(AMOUNT_PRECISION) - 1, AMOUNT_SCALE)
}

/// Convert a caller amount to the stored decimal, rounded to currency precision
pub fn amount_to_decimal(amount: f64) -> Result<Decimal, InvalidAmount> {
    if !amount.is_finite() {
        return Err(InvalidAmount::NotFinite);
    }
    // f64 Display is the shortest text that reads back as the same number;
    // it fails to parse only beyond Decimal's own range
    let value = amount
        .to_string()
        .parse::<Decimal>()
        .map_err(|_| InvalidAmount::OutOfRange)?
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    if value.abs() > max_amount() {
        return Err(InvalidAmount::OutOfRange);
    }
    Ok(value)
}

/// Convert a stored decimal to the caller-facing number. Parsing the decimal
/// text yields the nearest f64, so any 2-dp amount maps back to the same
/// number the caller sent.
pub fn decimal_to_amount(value: Decimal) -> f64 {
    let value = value.normalize();
    match value.to_string().parse::<f64>() {
        Ok(amount) => amount,
        // Decimal text is always a valid float literal; kept only so the
        // conversion stays total
        Err(_) => value.to_f64().unwrap_or(f64::NAN),
    }
}
