pub mod actions;
pub mod health;
pub mod logs;
pub mod reports;
pub mod runs;
pub mod session;
pub mod test_cases;
pub mod users;
