//! Queue discipline configuration (C7 Queue Manager).

use serde::{Deserialize, Serialize};

/// How a queue orders its waiting entities.
///
/// `LowAttribute`/`HighAttribute` order by an entity attribute named in
/// `attribute`; an entity missing that attribute sorts last for `Low`
/// (treated as `+infinity`) and first for `High` (treated as `0`), matching
/// `original_source/queue_manager.py`'s `PriorityStore` key construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDiscipline {
    Fifo,
    Lifo,
    LowAttribute,
    HighAttribute,
}

impl Default for QueueDiscipline {
    fn default() -> Self {
        QueueDiscipline::Fifo
    }
}

impl QueueDiscipline {
    pub fn requires_attribute(&self) -> bool {
        matches!(
            self,
            QueueDiscipline::LowAttribute | QueueDiscipline::HighAttribute
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub discipline: QueueDiscipline,
    /// Required when `discipline` is `LowAttribute`/`HighAttribute`.
    #[serde(default)]
    pub priority_attribute: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_discipline_is_fifo() {
        assert_eq!(QueueDiscipline::default(), QueueDiscipline::Fifo);
    }

    #[test]
    fn priority_disciplines_require_attribute() {
        assert!(QueueDiscipline::LowAttribute.requires_attribute());
        assert!(QueueDiscipline::HighAttribute.requires_attribute());
        assert!(!QueueDiscipline::Fifo.requires_attribute());
    }
}
