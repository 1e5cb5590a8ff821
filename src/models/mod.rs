pub mod app_state;
pub mod authenticated_user;
pub mod care_plan;
pub mod crm;
pub mod flash;
pub mod ticket;

pub use app_state::AppState;
pub use authenticated_user::{AuthenticatedUser, UserRole};
pub use care_plan::{BillingCycle, SubscriptionStatus};
pub use crm::CrmStatus;
pub use flash::{FlashLevel, FlashMessage};
pub use ticket::{TicketPriority, TicketStatus};
