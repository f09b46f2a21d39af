use chrono::{DateTime, Utc};

pub trait Expired {
    fn expired(&self) -> bool;
}

impl Expired for DateTime<Utc> {
    fn expired(&self) -> bool {
        (self.timestamp() - Utc::now().timestamp()) <= 0
    }
}

/// For not-before bounds, true while the instant is still in the future.
pub trait Pending {
    fn pending(&self) -> bool;
}

impl Pending for DateTime<Utc> {
    fn pending(&self) -> bool {
        (self.timestamp() - Utc::now().timestamp()).is_positive()
    }
}
