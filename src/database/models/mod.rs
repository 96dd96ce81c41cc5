pub mod patient;
pub mod session;

pub use patient::Patient;
pub use session::{
    amount_to_decimal, anchor_at_midday, decimal_to_amount, max_amount, normalize_session_date,
    InvalidAmount, InvalidDate, Session, SessionListItem, SessionStatus, SessionView,
    SessionWithPatient, SESSION_KIND_CONSULTATION,
};
