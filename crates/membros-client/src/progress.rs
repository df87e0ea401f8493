//! Lesson progress operations.
//!
//! Progress rows are keyed on `(user_id, lesson_id)` and written with
//! upserts, so toggling never duplicates a record.

use membros_gateway::Table;
use membros_shared::models::LessonProgress;
use membros_store::{mappers, Mutation};

use crate::client::{Client, Result};

impl Client {
    /// Flip the completion flag of a lesson for the logged-in user.
    /// Watched seconds are preserved.
    pub async fn toggle_lesson_complete(&self, lesson_id: &str) -> Result<LessonProgress> {
        let user = self.require_user()?;
        let snapshot = self.cache.snapshot();
        let current = snapshot.progress_for(&user.id, lesson_id);

        let next = LessonProgress {
            user_id: user.id,
            lesson_id: lesson_id.to_string(),
            completed: current.map_or(true, |p| !p.completed),
            watched_seconds: current.map_or(0, |p| p.watched_seconds),
        };

        self.cache
            .apply(Mutation::upsert(
                Table::UserProgress,
                mappers::progress_to_row(&next),
            ))
            .await?;
        Ok(next)
    }

    /// Write a lesson's watch state for the logged-in user.
    pub async fn update_progress(
        &self,
        lesson_id: &str,
        completed: bool,
        watched_seconds: u32,
    ) -> Result<LessonProgress> {
        let user = self.require_user()?;

        let next = LessonProgress {
            user_id: user.id,
            lesson_id: lesson_id.to_string(),
            completed,
            watched_seconds,
        };

        self.cache
            .apply(Mutation::upsert(
                Table::UserProgress,
                mappers::progress_to_row(&next),
            ))
            .await?;
        Ok(next)
    }
}
