//! Canonical in-memory entity structs.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer over IPC.  Entities are immutable-by-replacement:
//! a mutation produces a new value, never patches one in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Vertical anchor for a cover image crop.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoverPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

/// Where a lesson's video is hosted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    #[default]
    Youtube,
    Drive,
    Upload,
}

/// Publication state of a feed post.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Published,
    Draft,
}

/// Whether an offer is enabled at all.  Display additionally requires the
/// current time to fall inside the offer's activity window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    #[default]
    Inactive,
}

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An authenticated identity / profile row.
///
/// Doubles as the session slot payload and as an element of the admin users
/// slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub role: UserRole,
    pub bio: Option<String>,
    /// Number of completed logins, maintained server-side.
    pub login_count: u32,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A course category.  Categories order the "Netflix-style" shelf rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Display rank, ascending.  Not guaranteed unique; ties keep fetch order.
    pub order: i64,
}

/// A course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    /// Owning category, if any.  Uncategorised courses still render.
    pub category_id: Option<String>,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub cover_position: CoverPosition,
    pub is_featured: bool,
    pub created_by: String,
}

/// A module groups lessons inside a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub cover_url: Option<String>,
    pub cover_position: Option<CoverPosition>,
    /// Rank within the course, ascending.
    pub order_number: i64,
}

/// A single lesson.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub video_url: String,
    pub video_type: VideoType,
    pub support_material_url: Option<String>,
    pub support_material_name: Option<String>,
    pub duration_seconds: u32,
    /// Rank within the module, ascending.
    pub order_number: i64,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Per-user, per-lesson watch state.
///
/// Identity is the composite `(user_id, lesson_id)`; writing a second record
/// for the same pair overwrites the first (upsert), never duplicates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonProgress {
    pub user_id: String,
    pub lesson_id: String,
    pub completed: bool,
    pub watched_seconds: u32,
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A social feed post.
///
/// `user_name` and `user_avatar` are a denormalized snapshot of the author at
/// post time.  A later profile rename does not retroactively rewrite posts;
/// the only exception is the explicit re-join performed by a profile edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: String,
    pub title: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    /// Server-maintained like counter.  The counter, not a like-set, is the
    /// source of truth client-side.
    pub likes_count: u32,
    pub allow_comments: bool,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

/// A promotional offer shown to students.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub url_destino: String,
    pub image_url: String,
    pub preco_original: f64,
    pub preco_promocional: f64,
    /// Start of the activity window.  An offer with no window never displays.
    pub data_inicio: Option<DateTime<Utc>>,
    /// End of the activity window.
    pub data_expiracao: Option<DateTime<Utc>>,
    pub status: OfferStatus,
    /// Higher priority offers are shown first.
    pub priority: i64,
}

impl Offer {
    /// Whether the offer should be displayed at `now`: enabled *and* inside
    /// its activity window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != OfferStatus::Active {
            return false;
        }
        match (self.data_inicio, self.data_expiracao) {
            (Some(start), Some(end)) => start <= now && now <= end,
            _ => false,
        }
    }
}
