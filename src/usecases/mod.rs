pub mod errors;
pub mod payments;
pub mod sweeper;
pub mod unit_of_work;
