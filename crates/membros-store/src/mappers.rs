//! Wire row ⇄ canonical entity translation.
//!
//! One `*_from_row` / `*_to_row` pair per entity kind.  The `from_row`
//! functions are total over rows that carry their identity: every optional
//! field has a documented default (empty string, `0`, `false`, or the named
//! default enum value) and an unparseable value degrades to that default
//! rather than failing the row.  Only a missing identity field is an error.
//!
//! `to_row` emits the backend's snake_case column names, so
//! `from_row(&to_row(&e)) == e` for any canonical entity.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use membros_gateway::{Row, Table};
use membros_shared::models::*;

use crate::error::MappingError;

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn required_str(row: &Row, table: Table, field: &'static str) -> Result<String, MappingError> {
    row.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(MappingError { table, field })
}

fn string_or_empty(row: &Row, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Optional text column: absent, null and empty string all collapse to `None`.
fn opt_string(row: &Row, field: &str) -> Option<String> {
    row.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn i64_or_zero(row: &Row, field: &str) -> i64 {
    row.get(field).and_then(Value::as_i64).unwrap_or(0)
}

/// Non-negative integer column; negative values clamp to zero.
fn u32_or_zero(row: &Row, field: &str) -> u32 {
    row.get(field)
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as u32)
        .unwrap_or(0)
}

/// Non-negative numeric column; negative values clamp to zero.
fn f64_or_zero(row: &Row, field: &str) -> f64 {
    row.get(field)
        .and_then(Value::as_f64)
        .map(|x| x.max(0.0))
        .unwrap_or(0.0)
}

fn bool_or(row: &Row, field: &str, default: bool) -> bool {
    row.get(field).and_then(Value::as_bool).unwrap_or(default)
}

/// Enum column with a named default; unknown spellings degrade to it.
fn enum_or_default<T: DeserializeOwned + Default>(row: &Row, field: &str) -> T {
    opt_enum(row, field).unwrap_or_default()
}

fn opt_enum<T: DeserializeOwned>(row: &Row, field: &str) -> Option<T> {
    row.get(field)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn opt_datetime(row: &Row, field: &str) -> Option<DateTime<Utc>> {
    row.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn enum_to_value<T: serde::Serialize>(value: &T) -> Value {
    // Unit enums serialize to their lowercase wire spelling.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn opt_to_value(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

fn opt_datetime_to_value(value: &Option<DateTime<Utc>>) -> Value {
    match value {
        Some(dt) => Value::String(dt.to_rfc3339()),
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

pub fn category_from_row(row: &Row) -> Result<Category, MappingError> {
    Ok(Category {
        id: required_str(row, Table::Categories, "id")?,
        name: string_or_empty(row, "name"),
        order: i64_or_zero(row, "display_order"),
    })
}

pub fn category_to_row(category: &Category) -> Row {
    json!({
        "id": category.id,
        "name": category.name,
        "display_order": category.order,
    })
}

// ---------------------------------------------------------------------------
// Course
// ---------------------------------------------------------------------------

pub fn course_from_row(row: &Row) -> Result<Course, MappingError> {
    Ok(Course {
        id: required_str(row, Table::Courses, "id")?,
        category_id: opt_string(row, "category_id"),
        title: string_or_empty(row, "title"),
        description: string_or_empty(row, "description"),
        cover_url: string_or_empty(row, "cover_url"),
        cover_position: enum_or_default(row, "cover_position"),
        is_featured: bool_or(row, "is_featured", false),
        created_by: string_or_empty(row, "created_by"),
    })
}

pub fn course_to_row(course: &Course) -> Row {
    json!({
        "id": course.id,
        "category_id": opt_to_value(&course.category_id),
        "title": course.title,
        "description": course.description,
        "cover_url": course.cover_url,
        "cover_position": enum_to_value(&course.cover_position),
        "is_featured": course.is_featured,
        "created_by": course.created_by,
    })
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

pub fn module_from_row(row: &Row) -> Result<Module, MappingError> {
    Ok(Module {
        id: required_str(row, Table::Modules, "id")?,
        course_id: string_or_empty(row, "course_id"),
        title: string_or_empty(row, "title"),
        description: string_or_empty(row, "description"),
        cover_url: opt_string(row, "cover_url"),
        cover_position: opt_enum(row, "cover_position"),
        order_number: i64_or_zero(row, "order_number"),
    })
}

pub fn module_to_row(module: &Module) -> Row {
    json!({
        "id": module.id,
        "course_id": module.course_id,
        "title": module.title,
        "description": module.description,
        "cover_url": opt_to_value(&module.cover_url),
        "cover_position": module.cover_position.as_ref().map(enum_to_value).unwrap_or(Value::Null),
        "order_number": module.order_number,
    })
}

// ---------------------------------------------------------------------------
// Lesson
// ---------------------------------------------------------------------------

pub fn lesson_from_row(row: &Row) -> Result<Lesson, MappingError> {
    Ok(Lesson {
        id: required_str(row, Table::Lessons, "id")?,
        module_id: string_or_empty(row, "module_id"),
        title: string_or_empty(row, "title"),
        description: string_or_empty(row, "description"),
        content: string_or_empty(row, "content"),
        video_url: string_or_empty(row, "video_url"),
        video_type: enum_or_default(row, "video_type"),
        support_material_url: opt_string(row, "support_material_url"),
        support_material_name: opt_string(row, "support_material_name"),
        duration_seconds: u32_or_zero(row, "duration_seconds"),
        order_number: i64_or_zero(row, "order_number"),
    })
}

pub fn lesson_to_row(lesson: &Lesson) -> Row {
    json!({
        "id": lesson.id,
        "module_id": lesson.module_id,
        "title": lesson.title,
        "description": lesson.description,
        "content": lesson.content,
        "video_url": lesson.video_url,
        "video_type": enum_to_value(&lesson.video_type),
        "support_material_url": opt_to_value(&lesson.support_material_url),
        "support_material_name": opt_to_value(&lesson.support_material_name),
        "duration_seconds": lesson.duration_seconds,
        "order_number": lesson.order_number,
    })
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress identity is the composite `(user_id, lesson_id)`; both halves
/// are required.
pub fn progress_from_row(row: &Row) -> Result<LessonProgress, MappingError> {
    Ok(LessonProgress {
        user_id: required_str(row, Table::UserProgress, "user_id")?,
        lesson_id: required_str(row, Table::UserProgress, "lesson_id")?,
        completed: bool_or(row, "completed", false),
        watched_seconds: u32_or_zero(row, "watched_seconds"),
    })
}

pub fn progress_to_row(progress: &LessonProgress) -> Row {
    json!({
        "user_id": progress.user_id,
        "lesson_id": progress.lesson_id,
        "completed": progress.completed,
        "watched_seconds": progress.watched_seconds,
    })
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// Author fields come from the joined `profiles` object when the backend
/// returns one, from the flat denormalized columns otherwise.
pub fn post_from_row(row: &Row) -> Result<Post, MappingError> {
    let author = row.get("profiles").filter(|v| v.is_object());
    let user_name = author
        .and_then(|profile| profile.get("name"))
        .or_else(|| row.get("user_name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Usuário")
        .to_string();
    let user_avatar = author
        .and_then(|profile| profile.get("avatar"))
        .or_else(|| row.get("user_avatar"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Post {
        id: required_str(row, Table::Posts, "id")?,
        user_id: string_or_empty(row, "user_id"),
        user_name,
        user_avatar,
        title: opt_string(row, "title"),
        content: string_or_empty(row, "content"),
        image_url: opt_string(row, "image_url"),
        likes_count: u32_or_zero(row, "likes_count"),
        allow_comments: bool_or(row, "allow_comments", true),
        status: enum_or_default(row, "status"),
        created_at: opt_datetime(row, "created_at").unwrap_or(DateTime::UNIX_EPOCH),
    })
}

pub fn post_to_row(post: &Post) -> Row {
    json!({
        "id": post.id,
        "user_id": post.user_id,
        "user_name": post.user_name,
        "user_avatar": post.user_avatar,
        "title": opt_to_value(&post.title),
        "content": post.content,
        "image_url": opt_to_value(&post.image_url),
        "likes_count": post.likes_count,
        "allow_comments": post.allow_comments,
        "status": enum_to_value(&post.status),
        "created_at": post.created_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

pub fn offer_from_row(row: &Row) -> Result<Offer, MappingError> {
    Ok(Offer {
        id: required_str(row, Table::Offers, "id")?,
        title: string_or_empty(row, "title"),
        short_description: string_or_empty(row, "short_description"),
        url_destino: string_or_empty(row, "url_destino"),
        image_url: string_or_empty(row, "image_url"),
        preco_original: f64_or_zero(row, "preco_original"),
        preco_promocional: f64_or_zero(row, "preco_promocional"),
        data_inicio: opt_datetime(row, "data_inicio"),
        data_expiracao: opt_datetime(row, "data_expiracao"),
        status: enum_or_default(row, "status"),
        priority: i64_or_zero(row, "priority"),
    })
}

pub fn offer_to_row(offer: &Offer) -> Row {
    json!({
        "id": offer.id,
        "title": offer.title,
        "short_description": offer.short_description,
        "url_destino": offer.url_destino,
        "image_url": offer.image_url,
        "preco_original": offer.preco_original,
        "preco_promocional": offer.preco_promocional,
        "data_inicio": opt_datetime_to_value(&offer.data_inicio),
        "data_expiracao": opt_datetime_to_value(&offer.data_expiracao),
        "status": enum_to_value(&offer.status),
        "priority": offer.priority,
    })
}

// ---------------------------------------------------------------------------
// User (profile)
// ---------------------------------------------------------------------------

pub fn user_from_row(row: &Row) -> Result<User, MappingError> {
    Ok(User {
        id: required_str(row, Table::Profiles, "id")?,
        name: string_or_empty(row, "name"),
        email: string_or_empty(row, "email"),
        avatar: string_or_empty(row, "avatar"),
        role: enum_or_default(row, "role"),
        bio: opt_string(row, "bio"),
        login_count: u32_or_zero(row, "login_count"),
    })
}

pub fn user_to_row(user: &User) -> Row {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "avatar": user.avatar,
        "role": enum_to_value(&user.role),
        "bio": opt_to_value(&user.bio),
        "login_count": user.login_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offer_defaults() {
        let offer = offer_from_row(&json!({ "id": "x", "title": "t" })).unwrap();
        assert_eq!(offer.status, OfferStatus::Inactive);
        assert_eq!(offer.priority, 0);
        assert_eq!(offer.preco_original, 0.0);
        assert_eq!(offer.data_inicio, None);
        assert_eq!(offer.short_description, "");
    }

    #[test]
    fn test_missing_id_is_mapping_error() {
        let err = offer_from_row(&json!({ "title": "t" })).unwrap_err();
        assert_eq!(
            err,
            MappingError {
                table: Table::Offers,
                field: "id"
            }
        );
        assert!(category_from_row(&json!({ "name": "n" })).is_err());
        assert!(post_from_row(&json!({ "content": "c" })).is_err());
    }

    #[test]
    fn test_progress_requires_both_key_halves() {
        assert!(progress_from_row(&json!({ "user_id": "u1" })).is_err());
        assert!(progress_from_row(&json!({ "lesson_id": "l1" })).is_err());
        let progress =
            progress_from_row(&json!({ "user_id": "u1", "lesson_id": "l1" })).unwrap();
        assert!(!progress.completed);
        assert_eq!(progress.watched_seconds, 0);
    }

    #[test]
    fn test_course_defaults() {
        let course = course_from_row(&json!({ "id": "c1", "title": "Rust" })).unwrap();
        assert_eq!(course.cover_position, CoverPosition::Center);
        assert_eq!(course.category_id, None);
        assert!(!course.is_featured);
    }

    #[test]
    fn test_lesson_unknown_video_type_degrades_to_default() {
        let lesson =
            lesson_from_row(&json!({ "id": "l1", "video_type": "vimeo" })).unwrap();
        assert_eq!(lesson.video_type, VideoType::Youtube);
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        let post = post_from_row(&json!({ "id": "p1", "likes_count": -3 })).unwrap();
        assert_eq!(post.likes_count, 0);
        let lesson =
            lesson_from_row(&json!({ "id": "l1", "duration_seconds": -10 })).unwrap();
        assert_eq!(lesson.duration_seconds, 0);
    }

    #[test]
    fn test_post_author_from_joined_profile() {
        let row = json!({
            "id": "p1",
            "user_id": "u1",
            "content": "olá",
            "profiles": { "name": "Ana", "avatar": "https://a/ana.png" },
        });
        let post = post_from_row(&row).unwrap();
        assert_eq!(post.user_name, "Ana");
        assert_eq!(post.user_avatar, "https://a/ana.png");
    }

    #[test]
    fn test_post_author_fallbacks() {
        let flat = post_from_row(&json!({ "id": "p1", "user_name": "Bia" })).unwrap();
        assert_eq!(flat.user_name, "Bia");

        let bare = post_from_row(&json!({ "id": "p1" })).unwrap();
        assert_eq!(bare.user_name, "Usuário");
        assert_eq!(bare.user_avatar, "");
        assert!(bare.allow_comments);
        assert_eq!(bare.status, PostStatus::Published);
    }

    #[test]
    fn test_round_trips() {
        let course = Course {
            id: "c1".into(),
            category_id: Some("cat1".into()),
            title: "Fullstack".into(),
            description: "desc".into(),
            cover_url: "https://img/c1.jpg".into(),
            cover_position: CoverPosition::Bottom,
            is_featured: true,
            created_by: "admin".into(),
        };
        assert_eq!(course_from_row(&course_to_row(&course)).unwrap(), course);

        let lesson = Lesson {
            id: "l1".into(),
            module_id: "m1".into(),
            title: "Aula 1".into(),
            description: "d".into(),
            content: "c".into(),
            video_url: "https://youtu.be/x".into(),
            video_type: VideoType::Drive,
            support_material_url: Some("https://files/x.pdf".into()),
            support_material_name: Some("x.pdf".into()),
            duration_seconds: 600,
            order_number: 3,
        };
        assert_eq!(lesson_from_row(&lesson_to_row(&lesson)).unwrap(), lesson);

        let offer = Offer {
            id: "o1".into(),
            title: "Oferta".into(),
            short_description: "s".into(),
            url_destino: "https://loja".into(),
            image_url: "https://img/o1.jpg".into(),
            preco_original: 197.0,
            preco_promocional: 97.0,
            data_inicio: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            data_expiracao: Some(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()),
            status: OfferStatus::Active,
            priority: 7,
        };
        assert_eq!(offer_from_row(&offer_to_row(&offer)).unwrap(), offer);

        let post = Post {
            id: "p1".into(),
            user_id: "u1".into(),
            user_name: "Ana".into(),
            user_avatar: "https://a/ana.png".into(),
            title: Some("Título".into()),
            content: "conteúdo".into(),
            image_url: None,
            likes_count: 12,
            allow_comments: false,
            status: PostStatus::Draft,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        };
        assert_eq!(post_from_row(&post_to_row(&post)).unwrap(), post);

        let progress = LessonProgress {
            user_id: "u1".into(),
            lesson_id: "l1".into(),
            completed: true,
            watched_seconds: 42,
        };
        assert_eq!(
            progress_from_row(&progress_to_row(&progress)).unwrap(),
            progress
        );

        let user = User {
            id: "u1".into(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            avatar: "https://a/ana.png".into(),
            role: UserRole::Admin,
            bio: None,
            login_count: 5,
        };
        assert_eq!(user_from_row(&user_to_row(&user)).unwrap(), user);

        let category = Category {
            id: "cat1".into(),
            name: "Programação".into(),
            order: 2,
        };
        assert_eq!(
            category_from_row(&category_to_row(&category)).unwrap(),
            category
        );

        let module = Module {
            id: "m1".into(),
            course_id: "c1".into(),
            title: "Módulo 1".into(),
            description: String::new(),
            cover_url: None,
            cover_position: None,
            order_number: 1,
        };
        assert_eq!(module_from_row(&module_to_row(&module)).unwrap(), module);
    }
}
