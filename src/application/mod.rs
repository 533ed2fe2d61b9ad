pub mod aggregation;
pub mod allocation;
pub mod layout;
