use super::{
    ids::UserId,
    message::{Message, SenderRef},
};

/// Identity of the signed-in user, attached to outbound messages and used to
/// tell own messages from the other participant's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProfile {
    pub id: Option<UserId>,
    pub username: String,
}

impl LocalProfile {
    pub fn new(id: Option<UserId>, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }

    pub fn sender_ref(&self) -> SenderRef {
        SenderRef {
            id: self.id.clone(),
            username: Some(self.username.clone()),
        }
    }

    /// Decides authorship by id when both sides carry one, then by username.
    /// Anything undecidable renders as the other party's message.
    pub fn authored(&self, sender: &SenderRef) -> bool {
        if let (Some(own_id), Some(sender_id)) = (&self.id, &sender.id) {
            return own_id == sender_id;
        }

        sender
            .username
            .as_deref()
            .is_some_and(|username| username == self.username)
    }

    pub fn is_own(&self, message: &Message) -> bool {
        self.authored(&message.sender)
    }

    pub fn is_self(&self, user_id: Option<&UserId>) -> bool {
        matches!((&self.id, user_id), (Some(own), Some(other)) if own == other)
    }
}
