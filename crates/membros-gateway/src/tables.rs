//! The table registry and change-notification types.

use serde::{Deserialize, Serialize};

use crate::gateway::Row;

/// Every remote table the client reads or watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Categories,
    Courses,
    Modules,
    Lessons,
    UserProgress,
    Posts,
    Offers,
    Profiles,
}

impl Table {
    /// Wire name of the table on the hosted backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Courses => "courses",
            Table::Modules => "modules",
            Table::Lessons => "lessons",
            Table::UserProgress => "user_progress",
            Table::Posts => "posts",
            Table::Offers => "offers",
            Table::Profiles => "profiles",
        }
    }

    /// All known tables, in fetch order.
    pub fn all() -> [Table; 8] {
        [
            Table::Categories,
            Table::Courses,
            Table::Modules,
            Table::Lessons,
            Table::UserProgress,
            Table::Posts,
            Table::Offers,
            Table::Profiles,
        ]
    }
}

impl std::str::FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "categories" => Ok(Table::Categories),
            "courses" => Ok(Table::Courses),
            "modules" => Ok(Table::Modules),
            "lessons" => Ok(Table::Lessons),
            "user_progress" => Ok(Table::UserProgress),
            "posts" => Ok(Table::Posts),
            "offers" => Ok(Table::Offers),
            "profiles" => Ok(Table::Profiles),
            other => Err(format!("unknown table: {other}")),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row change reported by the backend's realtime channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change notification for a watched table.
///
/// The payload row is best-effort; the subscription router only uses the
/// table name and re-fetches authoritative state, so a missing row is fine.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: Option<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip() {
        for table in Table::all() {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!("support_chat".parse::<Table>().is_err());
    }
}
