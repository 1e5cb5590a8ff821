use std::sync::Arc;

use sqlx::PgPool;

use crate::clients::AzureBlobClient;
use crate::config::AppSettings;
use crate::db::repositories::{
    AssignmentRepository, AzureContainerRepository, ClientCrmRepository, MediaRepository, PlanDocumentRepository,
    ServicePlanRepository, ServiceRepository, SettingsRepository, SubscriptionRepository, TicketRepository,
    TimeLogRepository, UserRepository,
};
use crate::error::AppError;
use crate::security::share_links::ShareLinkSigner;
use crate::services::{
    AzureService, CarePlanService, ClientService, DashboardService, FileStorage, MediaService, SessionStore,
    SettingsService, TicketService, TimeTrackingService, UserService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub db_pool: PgPool,
    pub sessions: SessionStore,
    pub storage: FileStorage,

    pub user_repository: Arc<UserRepository>,
    pub assignment_repository: Arc<AssignmentRepository>,
    pub time_log_repository: Arc<TimeLogRepository>,
    pub service_repository: Arc<ServiceRepository>,
    pub service_plan_repository: Arc<ServicePlanRepository>,
    pub plan_document_repository: Arc<PlanDocumentRepository>,
    pub subscription_repository: Arc<SubscriptionRepository>,

    pub users: Arc<UserService>,
    pub clients: Arc<ClientService>,
    pub time_tracking: Arc<TimeTrackingService>,
    pub tickets: Arc<TicketService>,
    pub care_plans: Arc<CarePlanService>,
    pub media: Arc<MediaService>,
    pub azure: Arc<AzureService>,
    pub app_settings: Arc<SettingsService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppState {
    /// Wires repositories and services over one pool.
    pub fn new(db_pool: PgPool, settings: AppSettings, sessions: SessionStore) -> Result<Self, AppError> {
        let storage = FileStorage::new(settings.uploads.dir.clone());
        let azure_client = settings.azure.as_ref().map(AzureBlobClient::new).transpose()?;
        if azure_client.is_none() {
            log::info!("Azure storage not configured; container pages are read-only");
        }

        let user_repository = Arc::new(UserRepository::new(db_pool.clone()));
        let client_repository = Arc::new(ClientCrmRepository::new(db_pool.clone()));
        let assignment_repository = Arc::new(AssignmentRepository::new(db_pool.clone()));
        let time_log_repository = Arc::new(TimeLogRepository::new(db_pool.clone()));
        let service_repository = Arc::new(ServiceRepository::new(db_pool.clone()));
        let service_plan_repository = Arc::new(ServicePlanRepository::new(db_pool.clone()));
        let plan_document_repository = Arc::new(PlanDocumentRepository::new(db_pool.clone()));
        let subscription_repository = Arc::new(SubscriptionRepository::new(db_pool.clone()));
        let ticket_repository = Arc::new(TicketRepository::new(db_pool.clone()));
        let settings_repository = Arc::new(SettingsRepository::new(db_pool.clone()));
        let media_repository = Arc::new(MediaRepository::new(db_pool.clone()));
        let container_repository = Arc::new(AzureContainerRepository::new(db_pool.clone()));

        let signer = ShareLinkSigner::new(&settings.security.token_secret);
        if settings.security.share_link_hours < 1 {
            return Err(AppError::Configuration("SHARE_LINK_HOURS must be a positive number of hours".to_string()));
        }

        Ok(Self {
            users: Arc::new(UserService::new(user_repository.clone(), sessions.clone())),
            clients: Arc::new(ClientService::new(
                client_repository,
                assignment_repository.clone(),
                subscription_repository.clone(),
                ticket_repository.clone(),
                time_log_repository.clone(),
            )),
            time_tracking: Arc::new(TimeTrackingService::new(
                time_log_repository.clone(),
                assignment_repository.clone(),
            )),
            tickets: Arc::new(TicketService::new(
                ticket_repository.clone(),
                user_repository.clone(),
                assignment_repository.clone(),
                storage.clone(),
            )),
            care_plans: Arc::new(CarePlanService::new(
                service_plan_repository.clone(),
                subscription_repository.clone(),
                plan_document_repository.clone(),
                user_repository.clone(),
                media_repository.clone(),
            )),
            media: Arc::new(MediaService::new(
                media_repository,
                plan_document_repository.clone(),
                storage.clone(),
                signer,
                settings.security.share_link_hours,
            )),
            azure: Arc::new(AzureService::new(container_repository, user_repository.clone(), azure_client)),
            app_settings: Arc::new(SettingsService::new(settings_repository)),
            dashboard: Arc::new(DashboardService::new(
                ticket_repository,
                subscription_repository.clone(),
                user_repository.clone(),
                time_log_repository.clone(),
                assignment_repository.clone(),
            )),
            settings: Arc::new(settings),
            db_pool,
            sessions,
            storage,
            user_repository,
            assignment_repository,
            time_log_repository,
            service_repository,
            service_plan_repository,
            plan_document_repository,
            subscription_repository,
        })
    }
}
