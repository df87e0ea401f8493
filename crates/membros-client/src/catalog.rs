//! Admin CRUD for the course catalog: categories, courses, modules, lessons.
//!
//! Every operation is an optimistic mutation through the cache, so the admin
//! UI sees its edit immediately and a failure rolls it back.

use serde::{Deserialize, Serialize};
use serde_json::json;

use membros_gateway::Table;
use membros_shared::models::*;
use membros_store::{mappers, Mutation, StoreError};

use crate::client::{Client, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDraft {
    pub category_id: Option<String>,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub cover_position: CoverPosition,
    pub is_featured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub cover_url: Option<String>,
    pub cover_position: Option<CoverPosition>,
    pub order_number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonDraft {
    pub module_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub video_url: String,
    pub video_type: VideoType,
    pub support_material_url: Option<String>,
    pub support_material_name: Option<String>,
    pub duration_seconds: u32,
    pub order_number: i64,
}

fn category_row(draft: &CategoryDraft) -> serde_json::Value {
    json!({ "name": draft.name, "display_order": draft.order })
}

fn course_row(draft: &CourseDraft, created_by: &str) -> serde_json::Value {
    json!({
        "category_id": draft.category_id,
        "title": draft.title,
        "description": draft.description,
        "cover_url": draft.cover_url,
        "cover_position": draft.cover_position,
        "is_featured": draft.is_featured,
        "created_by": created_by,
    })
}

fn module_row(draft: &ModuleDraft) -> serde_json::Value {
    json!({
        "course_id": draft.course_id,
        "title": draft.title,
        "description": draft.description,
        "cover_url": draft.cover_url,
        "cover_position": draft.cover_position,
        "order_number": draft.order_number,
    })
}

fn lesson_row(draft: &LessonDraft) -> serde_json::Value {
    json!({
        "module_id": draft.module_id,
        "title": draft.title,
        "description": draft.description,
        "content": draft.content,
        "video_url": draft.video_url,
        "video_type": draft.video_type,
        "support_material_url": draft.support_material_url,
        "support_material_name": draft.support_material_name,
        "duration_seconds": draft.duration_seconds,
        "order_number": draft.order_number,
    })
}

impl Client {
    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::insert(Table::Categories, category_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::category_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn update_category(&self, id: &str, draft: CategoryDraft) -> Result<Category> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::update(Table::Categories, id, category_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::category_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn delete_category(&self, id: &str) -> Result<()> {
        self.require_admin()?;
        self.cache
            .apply(Mutation::delete(Table::Categories, id))
            .await?;
        Ok(())
    }

    pub async fn create_course(&self, draft: CourseDraft) -> Result<Course> {
        let admin = self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::insert(
                Table::Courses,
                course_row(&draft, &admin.id),
            ))
            .await?
            .unwrap_or_default();
        Ok(mappers::course_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn update_course(&self, id: &str, draft: CourseDraft) -> Result<Course> {
        let admin = self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::update(
                Table::Courses,
                id,
                course_row(&draft, &admin.id),
            ))
            .await?
            .unwrap_or_default();
        Ok(mappers::course_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn delete_course(&self, id: &str) -> Result<()> {
        self.require_admin()?;
        self.cache
            .apply(Mutation::delete(Table::Courses, id))
            .await?;
        Ok(())
    }

    pub async fn create_module(&self, draft: ModuleDraft) -> Result<Module> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::insert(Table::Modules, module_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::module_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn update_module(&self, id: &str, draft: ModuleDraft) -> Result<Module> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::update(Table::Modules, id, module_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::module_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn delete_module(&self, id: &str) -> Result<()> {
        self.require_admin()?;
        self.cache
            .apply(Mutation::delete(Table::Modules, id))
            .await?;
        Ok(())
    }

    pub async fn create_lesson(&self, draft: LessonDraft) -> Result<Lesson> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::insert(Table::Lessons, lesson_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::lesson_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn update_lesson(&self, id: &str, draft: LessonDraft) -> Result<Lesson> {
        self.require_admin()?;
        let stored = self
            .cache
            .apply(Mutation::update(Table::Lessons, id, lesson_row(&draft)))
            .await?
            .unwrap_or_default();
        Ok(mappers::lesson_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn delete_lesson(&self, id: &str) -> Result<()> {
        self.require_admin()?;
        self.cache
            .apply(Mutation::delete(Table::Lessons, id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::logged_in_client;
    use crate::client::ClientError;

    #[tokio::test]
    async fn test_build_course_tree() {
        let (_gateway, admin) = logged_in_client(true).await;

        let category = admin
            .create_category(CategoryDraft {
                name: "Programação".into(),
                order: 1,
            })
            .await
            .unwrap();

        let course = admin
            .create_course(CourseDraft {
                category_id: Some(category.id.clone()),
                title: "Rust".into(),
                description: "do zero".into(),
                cover_url: String::new(),
                cover_position: CoverPosition::Center,
                is_featured: true,
            })
            .await
            .unwrap();
        assert_eq!(course.created_by, "u1");

        let module = admin
            .create_module(ModuleDraft {
                course_id: course.id.clone(),
                title: "Básico".into(),
                description: String::new(),
                cover_url: None,
                cover_position: None,
                order_number: 1,
            })
            .await
            .unwrap();

        admin
            .create_lesson(LessonDraft {
                module_id: module.id.clone(),
                title: "Aula 1".into(),
                description: String::new(),
                content: String::new(),
                video_url: "https://youtu.be/x".into(),
                video_type: VideoType::Youtube,
                support_material_url: None,
                support_material_name: None,
                duration_seconds: 300,
                order_number: 1,
            })
            .await
            .unwrap();

        let snapshot = admin.snapshot();
        assert_eq!(snapshot.courses_in_category(Some(&category.id)).len(), 1);
        assert_eq!(snapshot.featured_courses().len(), 1);
        assert_eq!(snapshot.lessons_for_course(&course.id).len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_category() {
        let (_gateway, admin) = logged_in_client(true).await;
        let category = admin
            .create_category(CategoryDraft {
                name: "Antes".into(),
                order: 1,
            })
            .await
            .unwrap();

        let renamed = admin
            .update_category(
                &category.id,
                CategoryDraft {
                    name: "Depois".into(),
                    order: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Depois");
        assert_eq!(renamed.order, 2);

        admin.delete_category(&category.id).await.unwrap();
        assert!(admin.snapshot().categories.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_writes_require_admin() {
        let (_gateway, client) = logged_in_client(false).await;
        let err = client
            .create_category(CategoryDraft {
                name: "x".into(),
                order: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Forbidden);
    }
}
