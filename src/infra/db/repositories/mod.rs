pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod unit_of_work;
