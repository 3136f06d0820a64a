pub mod turn;

pub use turn::{completion_gateway, store_conversation, TurnOutcome, TurnRequest};
