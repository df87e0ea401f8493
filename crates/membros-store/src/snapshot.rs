//! The immutable point-in-time snapshot and its derived read queries.
//!
//! A [`Snapshot`] is built once per refresh cycle (or derived from the
//! previous one by a mutation) and handed to readers behind an `Arc`.  It is
//! never mutated after publication, so every read sees one internally
//! consistent view of the world.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use membros_shared::models::*;

/// One consistent view of every cached entity slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub categories: Vec<Category>,
    pub courses: Vec<Course>,
    pub modules: Vec<Module>,
    pub lessons: Vec<Lesson>,
    pub progress: Vec<LessonProgress>,
    pub posts: Vec<Post>,
    pub offers: Vec<Offer>,
    pub profiles: Vec<User>,
}

impl Snapshot {
    /// Sort every slice into display order.
    ///
    /// Display order fields carry no uniqueness guarantee; the sorts are
    /// stable so ties keep their original fetch order.
    pub(crate) fn normalize(&mut self) {
        self.categories.sort_by_key(|c| c.order);
        self.modules.sort_by_key(|m| m.order_number);
        self.lessons.sort_by_key(|l| l.order_number);
        self.offers.sort_by_key(|o| std::cmp::Reverse(o.priority));
        self.posts.sort_by_key(|p| std::cmp::Reverse(p.created_at));
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn lesson(&self, id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn offer(&self, id: &str) -> Option<&Offer> {
        self.offers.iter().find(|o| o.id == id)
    }

    pub fn profile(&self, id: &str) -> Option<&User> {
        self.profiles.iter().find(|u| u.id == id)
    }

    // ------------------------------------------------------------------
    // Catalog queries
    // ------------------------------------------------------------------

    /// Courses in a category (`None` selects the uncategorised shelf).
    pub fn courses_in_category(&self, category_id: Option<&str>) -> Vec<&Course> {
        self.courses
            .iter()
            .filter(|c| c.category_id.as_deref() == category_id)
            .collect()
    }

    pub fn featured_courses(&self) -> Vec<&Course> {
        self.courses.iter().filter(|c| c.is_featured).collect()
    }

    /// Modules of a course, in display order.
    pub fn modules_for_course(&self, course_id: &str) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .collect()
    }

    /// Lessons of a module, in display order.
    pub fn lessons_for_module(&self, module_id: &str) -> Vec<&Lesson> {
        self.lessons
            .iter()
            .filter(|l| l.module_id == module_id)
            .collect()
    }

    /// All lessons transitively under a course, module by module.
    ///
    /// A lesson whose module no longer exists is orphaned and silently
    /// excluded from every course-scoped view.
    pub fn lessons_for_course(&self, course_id: &str) -> Vec<&Lesson> {
        self.modules_for_course(course_id)
            .into_iter()
            .flat_map(|module| self.lessons_for_module(&module.id))
            .collect()
    }

    // ------------------------------------------------------------------
    // Progress queries
    // ------------------------------------------------------------------

    pub fn progress_for(&self, user_id: &str, lesson_id: &str) -> Option<&LessonProgress> {
        self.progress
            .iter()
            .find(|p| p.user_id == user_id && p.lesson_id == lesson_id)
    }

    /// Completion percentage (0–100) of a course for one user.
    ///
    /// A course with no lessons reports 0, never a division by zero.
    pub fn course_progress_percent(&self, course_id: &str, user_id: &str) -> u8 {
        let lessons = self.lessons_for_course(course_id);
        if lessons.is_empty() {
            return 0;
        }
        let completed = lessons
            .iter()
            .filter(|lesson| {
                self.progress_for(user_id, &lesson.id)
                    .is_some_and(|p| p.completed)
            })
            .count();
        (completed * 100 / lessons.len()) as u8
    }

    // ------------------------------------------------------------------
    // Feed & offer queries
    // ------------------------------------------------------------------

    /// Published posts, newest first.
    pub fn published_posts(&self) -> Vec<&Post> {
        self.posts
            .iter()
            .filter(|p| p.status == PostStatus::Published)
            .collect()
    }

    /// Offers displayable at `now`: enabled, inside their activity window,
    /// highest priority first.
    pub fn active_offers(&self, now: DateTime<Utc>) -> Vec<&Offer> {
        self.offers
            .iter()
            .filter(|o| o.is_active_at(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lesson(id: &str, module_id: &str, order: i64) -> Lesson {
        Lesson {
            id: id.into(),
            module_id: module_id.into(),
            title: id.into(),
            description: String::new(),
            content: String::new(),
            video_url: String::new(),
            video_type: VideoType::default(),
            support_material_url: None,
            support_material_name: None,
            duration_seconds: 0,
            order_number: order,
        }
    }

    fn module(id: &str, course_id: &str, order: i64) -> Module {
        Module {
            id: id.into(),
            course_id: course_id.into(),
            title: id.into(),
            description: String::new(),
            cover_url: None,
            cover_position: None,
            order_number: order,
        }
    }

    fn progress(user_id: &str, lesson_id: &str, completed: bool) -> LessonProgress {
        LessonProgress {
            user_id: user_id.into(),
            lesson_id: lesson_id.into(),
            completed,
            watched_seconds: 0,
        }
    }

    fn course_fixture() -> Snapshot {
        let mut snapshot = Snapshot {
            modules: vec![module("m2", "c1", 2), module("m1", "c1", 1)],
            lessons: vec![
                lesson("l3", "m2", 1),
                lesson("l1", "m1", 1),
                lesson("l2", "m1", 2),
                lesson("l4", "m2", 2),
                // module "ghost" does not exist: l5 is orphaned
                lesson("l5", "ghost", 1),
            ],
            ..Snapshot::default()
        };
        snapshot.normalize();
        snapshot
    }

    #[test]
    fn test_lessons_for_course_transitive_order() {
        let snapshot = course_fixture();
        let ids: Vec<_> = snapshot
            .lessons_for_course("c1")
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(ids, ["l1", "l2", "l3", "l4"]);
    }

    #[test]
    fn test_orphan_lesson_excluded() {
        let snapshot = course_fixture();
        assert!(snapshot
            .lessons_for_course("c1")
            .iter()
            .all(|l| l.id != "l5"));
    }

    #[test]
    fn test_course_progress_percent() {
        let mut snapshot = course_fixture();
        snapshot.progress = vec![progress("u1", "l1", true), progress("u1", "l2", false)];
        assert_eq!(snapshot.course_progress_percent("c1", "u1"), 25);
        assert_eq!(snapshot.course_progress_percent("c1", "u2"), 0);
    }

    #[test]
    fn test_empty_course_progress_is_zero() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.course_progress_percent("c1", "u1"), 0);
    }

    #[test]
    fn test_order_ties_keep_fetch_order() {
        let mut snapshot = Snapshot {
            categories: vec![
                Category {
                    id: "b".into(),
                    name: "B".into(),
                    order: 1,
                },
                Category {
                    id: "a".into(),
                    name: "A".into(),
                    order: 1,
                },
                Category {
                    id: "z".into(),
                    name: "Z".into(),
                    order: 0,
                },
            ],
            ..Snapshot::default()
        };
        snapshot.normalize();
        let ids: Vec<_> = snapshot.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["z", "b", "a"]);
    }

    #[test]
    fn test_active_offers_priority_order() {
        let now = Utc.timestamp_opt(150, 0).unwrap();
        let make = |id: &str, priority: i64, status: OfferStatus| Offer {
            id: id.into(),
            title: String::new(),
            short_description: String::new(),
            url_destino: String::new(),
            image_url: String::new(),
            preco_original: 0.0,
            preco_promocional: 0.0,
            data_inicio: Some(Utc.timestamp_opt(100, 0).unwrap()),
            data_expiracao: Some(Utc.timestamp_opt(200, 0).unwrap()),
            status,
            priority,
        };
        let mut snapshot = Snapshot {
            offers: vec![
                make("low", 1, OfferStatus::Active),
                make("high", 9, OfferStatus::Active),
                make("off", 99, OfferStatus::Inactive),
            ],
            ..Snapshot::default()
        };
        snapshot.normalize();
        let ids: Vec<_> = snapshot
            .active_offers(now)
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, ["high", "low"]);
    }
}
