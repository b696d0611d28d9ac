//! Domain entities - the core business objects.

mod rate_limit;
mod todo;
mod user;

pub use rate_limit::{Admission, IdentityKey, RateLimitProfile};
pub use todo::{TITLE_MAX_LEN, Todo, TodoChanges};
pub use user::User;
