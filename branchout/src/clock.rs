use chrono::{DateTime, Utc};

/// Source of the current UTC time. Fixed clocks make branch names
/// reproducible in tests.
#[derive(Debug, Clone)]
pub struct Clock {
    pub fixed_time: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self { fixed_time: None }
    }

    pub fn new_with_fixed_time(fixed_time: DateTime<Utc>) -> Self {
        Self {
            fixed_time: Some(fixed_time),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed_time.unwrap_or_else(Utc::now)
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_time.is_some()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
