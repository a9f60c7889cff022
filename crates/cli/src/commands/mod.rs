pub mod agent;
pub mod modes;
pub mod onboard;
