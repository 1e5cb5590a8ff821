pub mod admin_user_handlers;
pub mod assignment_handlers;
pub mod auth_handlers;
pub mod azure_handlers;
pub mod care_plan_handlers;
pub mod client_handlers;
pub mod dashboard_handlers;
pub mod health;
pub mod media_handlers;
pub mod profile_handlers;
pub mod settings_handlers;
pub mod shared;
pub mod subscription_handlers;
pub mod ticket_handlers;
pub mod time_tracking_handlers;
