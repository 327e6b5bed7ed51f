pub mod conversations;
pub mod members;
pub mod messages;
pub mod pins;
pub mod reactions;
pub mod receipts;
pub mod users;
