pub mod azure_service;
pub mod care_plan_service;
pub mod client_service;
pub mod dashboard_service;
pub mod file_storage;
pub mod media_service;
pub mod session_store;
pub mod settings_service;
pub mod ticket_service;
pub mod time_tracking_service;
pub mod user_service;

// Re-export commonly used types
pub use azure_service::AzureService;
pub use care_plan_service::CarePlanService;
pub use client_service::ClientService;
pub use dashboard_service::DashboardService;
pub use file_storage::FileStorage;
pub use media_service::MediaService;
pub use session_store::SessionStore;
pub use settings_service::SettingsService;
pub use ticket_service::TicketService;
pub use time_tracking_service::TimeTrackingService;
pub use user_service::UserService;
