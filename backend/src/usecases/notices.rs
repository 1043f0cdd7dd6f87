use super::{require_admin, UseCaseError, UseCaseResult};
use crate::clock::Clock;
use crate::repository::NoticeRepository;
use noticeboard_core::validation::validate_notice;
use noticeboard_core::{Notice, NoticePriority, User};
use std::sync::Arc;
use tracing::info;

/// Raw notice fields
#[derive(Debug, Clone)]
pub struct NoticeInput {
    pub title: String,
    pub content: String,
    pub priority: NoticePriority,
}

/// Notice use-cases
#[derive(Clone)]
pub struct NoticeUseCases {
    repo: NoticeRepository,
    clock: Arc<dyn Clock>,
}

impl NoticeUseCases {
    pub fn new(repo: NoticeRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn repository(&self) -> &NoticeRepository {
        &self.repo
    }

    /// Newest first.
    pub async fn list_notices(&self) -> UseCaseResult<Vec<Notice>> {
        Ok(self.repo.list_notices().await?)
    }

    pub async fn get_notice(&self, notice_id: &str) -> UseCaseResult<Notice> {
        self.repo
            .get_notice_by_id(notice_id)
            .await
            .ok_or_else(|| UseCaseError::NotFound("Notice not found".to_string()))
    }

    pub async fn create_notice(&self, input: NoticeInput, user: Option<&User>) -> UseCaseResult<Notice> {
        validate_notice(&input.title, &input.content)?;
        let admin = require_admin(user, "Only administrators can create notices")?;

        let notice = Notice::new(
            input.title,
            input.content,
            input.priority,
            admin.id.clone(),
            self.clock.now(),
        );
        let notice = self.repo.create_notice(notice).await?;
        info!(notice_id = %notice.id, priority = ?notice.priority, "Created notice");
        Ok(notice)
    }

    pub async fn delete_notice(&self, notice_id: &str, user: Option<&User>) -> UseCaseResult<()> {
        require_admin(user, "Only administrators can delete notices")?;
        self.get_notice(notice_id).await?;

        self.repo.delete_notice(notice_id).await?;
        info!(notice_id = %notice_id, "Deleted notice");
        Ok(())
    }
}
