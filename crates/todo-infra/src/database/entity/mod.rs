//! SeaORM entities. Tables are created by the `migration` app.

pub mod todo;
pub mod user;
