use serde::{Deserialize, Serialize};

/// Job priority: an integer in `[1, 10]` where smaller numbers are more
/// urgent. Defaults to 5. Dequeue orders ascending by priority, then by
/// `created_at` within a priority so same-priority jobs stay FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u8);

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
pub const PRIORITY_DEFAULT: u8 = 5;

impl Priority {
    /// Clamp into `[PRIORITY_MIN, PRIORITY_MAX]` rather than reject, since a
    /// caller-supplied priority is advisory scheduling input, not a value
    /// whose out-of-range-ness should fail the enqueue.
    pub const fn new(value: u8) -> Self {
        if value < PRIORITY_MIN {
            Self(PRIORITY_MIN)
        } else if value > PRIORITY_MAX {
            Self(PRIORITY_MAX)
        } else {
            Self(value)
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_valid(value: u8) -> bool {
        (PRIORITY_MIN..=PRIORITY_MAX).contains(&value)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(PRIORITY_DEFAULT)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if Self::is_valid(value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "priority {value} out of range [{PRIORITY_MIN}, {PRIORITY_MAX}]"
            ))
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_five() {
        assert_eq!(Priority::default().get(), 5);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(Priority::new(0).get(), PRIORITY_MIN);
        assert_eq!(Priority::new(255).get(), PRIORITY_MAX);
    }

    #[test]
    fn smaller_is_more_urgent_in_ordering() {
        let urgent = Priority::new(1);
        let normal = Priority::new(5);
        assert!(urgent < normal);
    }

    #[test]
    fn try_from_rejects_out_of_range() {
        assert!(Priority::try_from(0u8).is_err());
        assert!(Priority::try_from(11u8).is_err());
        assert!(Priority::try_from(5u8).is_ok());
    }
}
