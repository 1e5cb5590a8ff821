use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::db::repositories::{
    AssignmentRepository, NewAttachment, NewTicket, Ticket, TicketAttachment, TicketRepository, TicketScope,
    UserRepository,
};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, TicketPriority, TicketStatus, UserRole};
use crate::services::file_storage::{FileStorage, StoredFile};
use crate::utils::form::FormFields;
use crate::utils::multipart_utils::UploadedFile;

const MAX_SUBJECT_CHARS: usize = 200;

/// An operation applied to each selected ticket on the list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Close,
    SetStatus(TicketStatus),
    SetPriority(TicketPriority),
    Assign(Option<Uuid>),
    Delete,
}

impl BatchAction {
    pub fn from_form(form: &FormFields) -> Result<BatchAction, AppError> {
        match form.required("batch_action", "Batch action")? {
            "close" => Ok(BatchAction::Close),
            "status" => Ok(BatchAction::SetStatus(form.parse_required("batch_status", "Status")?)),
            "priority" => Ok(BatchAction::SetPriority(form.parse_required("batch_priority", "Priority")?)),
            "assign" => Ok(BatchAction::Assign(form.optional_uuid("batch_assignee", "Assignee")?)),
            "delete" => Ok(BatchAction::Delete),
            other => Err(AppError::BadRequest(format!("Unknown batch action: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

pub fn validate_subject(subject: &str) -> Result<&str, AppError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(AppError::Validation("Subject is required".to_string()));
    }
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(AppError::Validation(format!(
            "Subject must be at most {} characters",
            MAX_SUBJECT_CHARS
        )));
    }
    Ok(subject)
}

pub struct TicketService {
    tickets: Arc<TicketRepository>,
    users: Arc<UserRepository>,
    assignments: Arc<AssignmentRepository>,
    storage: FileStorage,
}

impl TicketService {
    pub fn new(
        tickets: Arc<TicketRepository>,
        users: Arc<UserRepository>,
        assignments: Arc<AssignmentRepository>,
        storage: FileStorage,
    ) -> Self {
        Self { tickets, users, assignments, storage }
    }

    pub fn repository(&self) -> &TicketRepository {
        &self.tickets
    }

    /// Loads a ticket the user may see. Tickets outside the user's scope are
    /// reported as missing.
    pub async fn get_visible(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<Ticket, AppError> {
        let scope = TicketScope::for_user(user.user_id, user.role);
        if !self.tickets.is_visible(id, scope).await? {
            return Err(AppError::NotFound("Ticket not found".to_string()));
        }
        self.tickets.get(id).await
    }

    fn store_uploads(&self, uploads: Vec<UploadedFile>) -> Result<Vec<StoredFile>, AppError> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.storage.store(upload) {
                Ok(file) => stored.push(file),
                Err(e) => {
                    self.discard(&stored);
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    fn discard(&self, stored: &[StoredFile]) {
        for file in stored {
            self.storage.remove(&file.stored_name);
        }
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        client_id: Option<Uuid>,
        subject: &str,
        description: &str,
        priority: TicketPriority,
        uploads: Vec<UploadedFile>,
    ) -> Result<(Uuid, i64), AppError> {
        let client_id = match user.role {
            UserRole::Client => user.user_id,
            UserRole::Admin | UserRole::Employee => {
                let client_id = client_id.ok_or_else(|| AppError::Validation("Choose a client".to_string()))?;
                self.users.get_with_role(&client_id, UserRole::Client).await?;
                if user.role == UserRole::Employee && !self.assignments.is_assigned(&user.user_id, &client_id).await? {
                    return Err(AppError::Validation(
                        "You can only open tickets for clients assigned to you".to_string(),
                    ));
                }
                client_id
            }
        };
        let subject = validate_subject(subject)?;
        if description.trim().is_empty() {
            return Err(AppError::Validation("Description is required".to_string()));
        }

        let stored = self.store_uploads(uploads)?;
        let new = NewTicket {
            client_id,
            created_by: user.user_id,
            subject: subject.to_string(),
            description: description.to_string(),
            priority,
        };
        match self.tickets.create(&new, &to_attachments(&stored)).await {
            Ok((id, number)) => {
                log::info!("Ticket #{} opened by {} for client {}", number, user.user_id, client_id);
                Ok((id, number))
            }
            Err(e) => {
                self.discard(&stored);
                Err(e)
            }
        }
    }

    /// Adds a reply and returns the status the ticket moved to, if any.
    pub async fn reply(
        &self,
        user: &AuthenticatedUser,
        ticket_id: &Uuid,
        body: &str,
        internal: bool,
        uploads: Vec<UploadedFile>,
    ) -> Result<Option<TicketStatus>, AppError> {
        let ticket = self.get_visible(user, ticket_id).await?;
        if body.trim().is_empty() && uploads.is_empty() {
            return Err(AppError::Validation("Write a message or attach a file".to_string()));
        }
        let internal = internal && user.is_staff();
        let new_status = ticket.status.after_reply(user.is_staff(), internal);

        let stored = self.store_uploads(uploads)?;
        let body = if body.trim().is_empty() { "(attachment)" } else { body };
        if let Err(e) = self
            .tickets
            .add_reply(ticket_id, &user.user_id, body, internal, new_status, &to_attachments(&stored))
            .await
        {
            self.discard(&stored);
            return Err(e);
        }
        Ok(new_status)
    }

    /// Status change from the ticket page. Clients may only close their own
    /// tickets, and only when `clients_can_close` is on.
    pub async fn change_status(
        &self,
        user: &AuthenticatedUser,
        id: &Uuid,
        status: TicketStatus,
        clients_can_close: bool,
    ) -> Result<(), AppError> {
        self.get_visible(user, id).await?;
        if !user.is_staff() && !(clients_can_close && status == TicketStatus::Closed) {
            return Err(AppError::Forbidden(format!("Client {} may not set status {}", user.user_id, status)));
        }
        self.tickets.set_status(id, status).await
    }

    pub async fn change_priority(&self, user: &AuthenticatedUser, id: &Uuid, priority: TicketPriority) -> Result<(), AppError> {
        user.require_staff()?;
        self.get_visible(user, id).await?;
        self.tickets.set_priority(id, priority).await
    }

    /// Admins assign to any active staff member; employees may only take a
    /// ticket themselves or release their own.
    pub async fn assign(&self, user: &AuthenticatedUser, id: &Uuid, assignee: Option<Uuid>) -> Result<(), AppError> {
        user.require_staff()?;
        let ticket = self.get_visible(user, id).await?;
        self.check_assignment(user, &ticket, assignee).await?;
        self.tickets.assign(id, assignee).await
    }

    async fn check_assignment(&self, user: &AuthenticatedUser, ticket: &Ticket, assignee: Option<Uuid>) -> Result<(), AppError> {
        if user.role == UserRole::Employee {
            let allowed = match assignee {
                Some(target) => target == user.user_id,
                None => ticket.assigned_to == Some(user.user_id),
            };
            if !allowed {
                return Err(AppError::Forbidden(format!(
                    "Employee {} may only assign tickets to themselves",
                    user.user_id
                )));
            }
        }
        if let Some(target) = assignee {
            let staff = self.users.get_by_id(&target).await?;
            if !staff.role.is_staff() || !staff.is_active {
                return Err(AppError::Validation(format!("{} cannot be assigned tickets", staff.full_name)));
            }
        }
        Ok(())
    }

    pub async fn delete(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<(), AppError> {
        user.require_admin()?;
        let stored = self.tickets.delete(id).await?;
        for name in stored {
            self.storage.remove(&name);
        }
        log::info!("Ticket {} deleted by {}", id, user.user_id);
        Ok(())
    }

    /// Applies the action to each ticket on its own. Failures are counted
    /// and logged, not rolled back.
    pub async fn batch(&self, user: &AuthenticatedUser, action: BatchAction, ids: &[Uuid]) -> Result<BatchResult, AppError> {
        user.require_staff()?;
        if action == BatchAction::Delete {
            user.require_admin()?;
        }
        if ids.is_empty() {
            return Err(AppError::Validation("Select at least one ticket".to_string()));
        }

        let mut result = BatchResult::default();
        for id in ids {
            let outcome = match action {
                BatchAction::Close => self.change_status(user, id, TicketStatus::Closed, false).await,
                BatchAction::SetStatus(status) => self.change_status(user, id, status, false).await,
                BatchAction::SetPriority(priority) => self.change_priority(user, id, priority).await,
                BatchAction::Assign(assignee) => self.assign(user, id, assignee).await,
                BatchAction::Delete => self.delete(user, id).await,
            };
            match outcome {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    log::warn!("Batch {:?} on ticket {} failed: {}", action, id, e);
                    result.failed += 1;
                }
            }
        }
        log::info!("Batch {:?} by {}: {}", action, user.user_id, result);
        Ok(result)
    }

    /// Attachment and its file path, if the user may see the ticket and the
    /// reply it belongs to.
    pub async fn attachment_for_download(
        &self,
        user: &AuthenticatedUser,
        attachment_id: &Uuid,
    ) -> Result<(TicketAttachment, PathBuf), AppError> {
        let attachment = self.tickets.get_attachment(attachment_id).await?;
        self.get_visible(user, &attachment.ticket_id).await?;
        if !user.is_staff() {
            if let Some(reply_id) = attachment.reply_id {
                if self.tickets.reply_is_internal(&reply_id).await? {
                    return Err(AppError::NotFound("Attachment not found".to_string()));
                }
            }
        }
        let path = self.storage.path_for(&attachment.stored_name)?;
        Ok((attachment, path))
    }
}

fn to_attachments(stored: &[StoredFile]) -> Vec<NewAttachment> {
    stored
        .iter()
        .map(|file| NewAttachment {
            original_name: file.original_name.clone(),
            stored_name: file.stored_name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size_bytes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormFields {
        FormFields::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_batch_action_from_form() {
        assert_eq!(BatchAction::from_form(&form(&[("batch_action", "close")])).unwrap(), BatchAction::Close);
        assert_eq!(
            BatchAction::from_form(&form(&[("batch_action", "priority"), ("batch_priority", "urgent")])).unwrap(),
            BatchAction::SetPriority(TicketPriority::Urgent)
        );
        assert_eq!(
            BatchAction::from_form(&form(&[("batch_action", "assign"), ("batch_assignee", "")])).unwrap(),
            BatchAction::Assign(None)
        );
        assert!(BatchAction::from_form(&form(&[("batch_action", "status"), ("batch_status", "bogus")])).is_err());
        assert!(BatchAction::from_form(&form(&[("batch_action", "archive")])).is_err());
    }

    #[test]
    fn test_batch_result_message() {
        let result = BatchResult { succeeded: 3, failed: 1 };
        assert_eq!(result.to_string(), "3 succeeded, 1 failed");
    }

    #[test]
    fn test_validate_subject() {
        assert_eq!(validate_subject("  Site down  ").unwrap(), "Site down");
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject(&"x".repeat(201)).is_err());
    }
}
