pub mod razorpay_client;
pub mod signature;
