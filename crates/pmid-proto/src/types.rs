//! Domain-level envelope types.
//!
//! These are the shapes the rest of the workspace works with. Optional wire
//! fields become `Option`s and the wallet type string becomes a closed enum.

use std::fmt;
use std::str::FromStr;

/// Which kind of wallet backs an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletType {
    /// Ephemeral keypair generated without a real wallet signature.
    Temp,
    /// Keypair controlled by a connected wallet.
    Real,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Temp => "temp",
            WalletType::Real => "real",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temp" => Ok(WalletType::Temp),
            "real" => Ok(WalletType::Real),
            _ => Err("wallet type must be \"temp\" or \"real\""),
        }
    }
}

/// Reference to a blob uploaded to the attachment store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_address: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_user_id: String,
    pub recipient_user_id: String,
    pub encrypted_content: Vec<u8>,
    pub content_type: String,
    pub timestamp: u64,
    pub signature: Vec<u8>,
    pub nonce: Vec<u8>,
    pub attachment: Option<Attachment>,
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: String,
    pub public_key: Vec<u8>,
    pub wallet_type: WalletType,
    pub timestamp: u64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRotation {
    pub user_id: String,
    pub old_public_key: Vec<u8>,
    pub new_public_key: Vec<u8>,
    pub signature_old: Vec<u8>,
    pub signature_new: Vec<u8>,
    pub sequence_number: u32,
    pub nonce: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator {
    pub user_id: String,
    pub conversation_id: String,
    pub is_typing: bool,
    pub timestamp: u64,
}

/// The four envelope kinds carried by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Chat,
    Handshake,
    KeyRotation,
    Typing,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeKind::Chat => "chat",
            EnvelopeKind::Handshake => "handshake",
            EnvelopeKind::KeyRotation => "key_rotation",
            EnvelopeKind::Typing => "typing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Chat(ChatMessage),
    Handshake(Handshake),
    KeyRotation(KeyRotation),
    Typing(TypingIndicator),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Chat(_) => EnvelopeKind::Chat,
            Envelope::Handshake(_) => EnvelopeKind::Handshake,
            Envelope::KeyRotation(_) => EnvelopeKind::KeyRotation,
            Envelope::Typing(_) => EnvelopeKind::Typing,
        }
    }
}

impl From<ChatMessage> for Envelope {
    fn from(m: ChatMessage) -> Self {
        Envelope::Chat(m)
    }
}

impl From<Handshake> for Envelope {
    fn from(h: Handshake) -> Self {
        Envelope::Handshake(h)
    }
}

impl From<KeyRotation> for Envelope {
    fn from(r: KeyRotation) -> Self {
        Envelope::KeyRotation(r)
    }
}

impl From<TypingIndicator> for Envelope {
    fn from(t: TypingIndicator) -> Self {
        Envelope::Typing(t)
    }
}
