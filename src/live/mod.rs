pub mod conversation;
pub mod subscription;

pub use conversation::{Conversation, ConversationSync, ConversationView, Message};
pub use subscription::SubscriptionHandle;
