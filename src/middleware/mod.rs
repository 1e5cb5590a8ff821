pub mod request_context;
pub mod session_auth;

pub use request_context::{ActionOutcome, ActiveSession, VerifiedForm};
pub use session_auth::SessionAuthentication;
