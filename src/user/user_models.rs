use serde::Serialize;
use std::time::SystemTime;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: usize,
    pub handle: String,
    pub email: String,
    pub created: SystemTime,
}
