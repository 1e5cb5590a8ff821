pub mod assignment_repository;
pub mod azure_container_repository;
pub mod client_crm_repository;
pub mod media_repository;
pub mod plan_document_repository;
pub mod service_plan_repository;
pub mod service_repository;
pub mod settings_repository;
pub mod subscription_repository;
pub mod ticket_repository;
pub mod time_log_repository;
pub mod user_repository;

pub use assignment_repository::{AssignOutcome, Assignment, AssignmentFilter, AssignmentRepository};
pub use azure_container_repository::{AzureContainer, AzureContainerRepository};
pub use client_crm_repository::{ClientCrmRepository, ClientFilter, ClientRecord, CrmUpdate};
pub use media_repository::{MediaItem, MediaKind, MediaRepository, NewMedia};
pub use plan_document_repository::{DocumentCategory, PlanDocument, PlanDocumentRepository};
pub use service_plan_repository::{PlanTier, ServicePlan, ServicePlanRepository, TierInput, TierService};
pub use service_repository::{Service, ServiceRepository};
pub use settings_repository::{LegacyKey, SettingsRepository};
pub use subscription_repository::{ClientSubscription, NewSubscription, SubscriptionFilter, SubscriptionRepository};
pub use ticket_repository::{
    AssigneeFilter, NewAttachment, NewTicket, Ticket, TicketAttachment, TicketFilter, TicketReply,
    TicketRepository, TicketScope,
};
pub use time_log_repository::{TimeEntry, TimeLog, TimeLogFilter, TimeLogRepository, TimeTotals};
pub use user_repository::{User, UserFilter, UserOption, UserRepository};
