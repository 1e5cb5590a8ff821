pub mod admin_users;
pub mod assignments;
pub mod azure;
pub mod care_plans;
pub mod clients;
pub mod dashboard;
pub mod layout;
pub mod login;
pub mod media;
pub mod profile;
pub mod settings;
pub mod subscriptions;
pub mod templates;
pub mod tickets;
pub mod time_tracking;
